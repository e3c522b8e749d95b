//! In-memory room entity.
//!
//! Participants are kept in join order. That order is what turn rotation
//! walks, so it must not depend on hashing. Every mutator keeps the room
//! consistent on its own: the drawer is always a participant, the secret
//! word is non-empty while a round runs, and no round runs with fewer than
//! `MIN_PLAYERS_FOR_ROUND` participants.

use crate::connection::{Connection, ConnectionId};
use shared::MIN_PLAYERS_FOR_ROUND;

#[derive(Debug, Clone)]
pub struct Participant {
    pub connection: Connection,
    pub nickname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    RoundActive,
}

/// Result of removing a participant from a room
#[derive(Debug, Clone)]
pub struct Removal {
    pub participant: Participant,
    pub was_drawer: bool,
    /// A round was running before the removal and no longer is.
    pub round_ended: bool,
}

#[derive(Debug)]
pub struct Room {
    code: String,
    participants: Vec<Participant>,
    current_drawer: Option<ConnectionId>,
    /// Most recent drawer, kept after the round ends so rotation can resume.
    last_drawer: Option<ConnectionId>,
    secret_word: String,
}

impl Room {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            participants: Vec::new(),
            current_drawer: None,
            last_drawer: None,
            secret_word: String::new(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Participants in join order
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn position_of(&self, id: ConnectionId) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| p.connection.id() == id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.position_of(id).is_some()
    }

    pub fn participant(&self, id: ConnectionId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.connection.id() == id)
    }

    pub fn nickname_of(&self, id: ConnectionId) -> Option<&str> {
        self.participant(id).map(|p| p.nickname.as_str())
    }

    /// Snapshot of every participant's connection, in join order.
    pub fn connections(&self) -> Vec<Connection> {
        self.participants
            .iter()
            .map(|p| p.connection.clone())
            .collect()
    }

    pub fn state(&self) -> RoundState {
        if self.current_drawer.is_some() {
            RoundState::RoundActive
        } else {
            RoundState::Idle
        }
    }

    pub fn current_drawer(&self) -> Option<ConnectionId> {
        self.current_drawer
    }

    pub fn last_drawer(&self) -> Option<ConnectionId> {
        self.last_drawer
    }

    pub fn is_drawer(&self, id: ConnectionId) -> bool {
        self.current_drawer == Some(id)
    }

    /// The word to guess, only while a round is active.
    pub fn secret_word(&self) -> Option<&str> {
        self.current_drawer.map(|_| self.secret_word.as_str())
    }

    /// Adds a participant or updates the nickname of an existing one.
    ///
    /// Returns true when the connection was not in the room before.
    pub fn add_participant(&mut self, connection: Connection, nickname: String) -> bool {
        match self.position_of(connection.id()) {
            Some(index) => {
                self.participants[index].nickname = nickname;
                false
            }
            None => {
                self.participants.push(Participant {
                    connection,
                    nickname,
                });
                true
            }
        }
    }

    pub fn set_nickname(&mut self, id: ConnectionId, nickname: String) -> bool {
        match self.participants.iter_mut().find(|p| p.connection.id() == id) {
            Some(participant) => {
                participant.nickname = nickname;
                true
            }
            None => false,
        }
    }

    /// Removes a participant, ending the round if it can no longer continue.
    pub fn remove_participant(&mut self, id: ConnectionId) -> Option<Removal> {
        let index = self.position_of(id)?;
        let participant = self.participants.remove(index);

        let was_active = self.state() == RoundState::RoundActive;
        let was_drawer = self.is_drawer(id);
        if was_drawer || self.participants.len() < MIN_PLAYERS_FOR_ROUND {
            self.end_round();
        }

        Some(Removal {
            participant,
            was_drawer,
            round_ended: was_active && self.state() == RoundState::Idle,
        })
    }

    /// Starts a round with `drawer` drawing `word`.
    ///
    /// Refuses (returning false) when the drawer is not a participant, the
    /// word is empty, or the room is below the player threshold.
    pub fn assign_round(&mut self, drawer: ConnectionId, word: String) -> bool {
        if word.is_empty()
            || !self.contains(drawer)
            || self.participants.len() < MIN_PLAYERS_FOR_ROUND
        {
            return false;
        }
        self.current_drawer = Some(drawer);
        self.last_drawer = Some(drawer);
        self.secret_word = word;
        true
    }

    pub fn end_round(&mut self) {
        if let Some(drawer) = self.current_drawer.take() {
            self.last_drawer = Some(drawer);
        }
        self.secret_word.clear();
    }

    /// Checks the room invariants. Used by tests and debug assertions.
    pub fn is_consistent(&self) -> bool {
        match self.current_drawer {
            None => true,
            Some(drawer) => {
                self.contains(drawer)
                    && !self.secret_word.is_empty()
                    && self.participants.len() >= MIN_PLAYERS_FOR_ROUND
            }
        }
    }
}
