//! Turn rotation for a room.
//!
//! A room is either `Idle` (no drawer) or `RoundActive` (drawer and secret
//! word set). The engine only computes transitions on a `&mut Room` the
//! caller already holds under the registry lock; delivering the resulting
//! notifications is left to the caller, after the lock is released.

use crate::connection::{Connection, ConnectionId};
use crate::room::{Room, RoundState};
use crate::words::WordList;
use log::{debug, info};
use rand::Rng;
use shared::{Message, MIN_PLAYERS_FOR_ROUND};

/// Outcome of a successful round transition: who draws what, and who guesses.
#[derive(Debug, Clone)]
pub struct RoundStart {
    pub code: String,
    pub drawer: Connection,
    pub drawer_nickname: String,
    pub word: String,
    pub guessers: Vec<Connection>,
}

impl RoundStart {
    /// The private word for the drawer, then a start notice for everyone else.
    pub fn notifications(&self) -> Vec<(Connection, Message)> {
        let mut out = Vec::with_capacity(self.guessers.len() + 1);
        out.push((self.drawer.clone(), Message::your_word(self.word.clone())));
        out.extend(
            self.guessers
                .iter()
                .map(|guesser| (guesser.clone(), Message::start_guessing())),
        );
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct TurnEngine {
    words: WordList,
}

impl TurnEngine {
    pub fn new(words: WordList) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &WordList {
        &self.words
    }

    /// Picks who draws next when no explicit drawer is requested.
    ///
    /// Without a previous drawer the pick is uniform over the room. Otherwise
    /// it is the participant after the previous drawer in join order,
    /// wrapping around, or the first participant if the previous drawer has
    /// left.
    pub fn rotate<R: Rng + ?Sized>(room: &Room, rng: &mut R) -> Option<ConnectionId> {
        let participants = room.participants();
        if participants.is_empty() {
            return None;
        }

        let index = match room.last_drawer() {
            None => rng.gen_range(0..participants.len()),
            Some(previous) => match room.position_of(previous) {
                Some(i) => (i + 1) % participants.len(),
                None => 0,
            },
        };
        Some(participants[index].connection.id())
    }

    /// Starts a new round, replacing any round in progress.
    ///
    /// `next_drawer` wins when it is still in the room; otherwise rotation
    /// decides. Returns `None`, leaving the room untouched, when the room is
    /// too small or the dictionary is empty.
    pub fn begin_round(
        &self,
        room: &mut Room,
        next_drawer: Option<ConnectionId>,
    ) -> Option<RoundStart> {
        if room.len() < MIN_PLAYERS_FOR_ROUND {
            debug!("Room {} too small for a round ({} players)", room.code(), room.len());
            return None;
        }

        let mut rng = rand::thread_rng();
        let word = match self.words.choose(&mut rng) {
            Some(word) => word.to_string(),
            None => {
                debug!("Empty dictionary, room {} stays idle", room.code());
                return None;
            }
        };

        let drawer = next_drawer
            .filter(|id| room.contains(*id))
            .or_else(|| Self::rotate(room, &mut rng))?;

        if !room.assign_round(drawer, word.clone()) {
            return None;
        }

        let participant = room.participant(drawer)?;
        let start = RoundStart {
            code: room.code().to_string(),
            drawer: participant.connection.clone(),
            drawer_nickname: participant.nickname.clone(),
            word,
            guessers: room
                .participants()
                .iter()
                .filter(|p| p.connection.id() != drawer)
                .map(|p| p.connection.clone())
                .collect(),
        };

        info!(
            "Room {}: new round, {} ({}) is drawing",
            start.code,
            start.drawer_nickname,
            drawer
        );
        Some(start)
    }

    /// Starts the first round of an idle room once it has enough players.
    pub fn start_if_ready(&self, room: &mut Room) -> Option<RoundStart> {
        if room.state() == RoundState::RoundActive || room.len() < MIN_PLAYERS_FOR_ROUND {
            return None;
        }
        self.begin_round(room, None)
    }
}
