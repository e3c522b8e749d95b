//! Registry of rooms and their participants
//!
//! This module owns all shared mutable state of the server:
//! - Room creation with collision-checked room codes
//! - Membership changes (join, rename, leave, eviction)
//! - Scoped access to a room for round transitions
//!
//! Every operation takes the same registry-wide lock, so membership changes
//! and drawer assignment can never interleave into an inconsistent room. The
//! lock is never held while sending to a connection: callers take a snapshot
//! of the connections they need and release the lock first.
//!
//! A single lock serializes unrelated rooms too. That is the scalability
//! bound of this design; sharding the map per room code would not change any
//! of the contracts below.

use crate::connection::{Connection, ConnectionId};
use crate::error::RoomError;
use crate::room::Room;
use log::{debug, info};
use rand::Rng;
use shared::MIN_PLAYERS_FOR_ROUND;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Number of decimal digits in a generated room code
pub const ROOM_CODE_DIGITS: u32 = 4;
/// Codes tried before room creation gives up
pub const MAX_CODE_ATTEMPTS: usize = 64;

type CodeGenerator = Box<dyn Fn() -> String + Send + Sync>;

/// Draws a zero padded numeric room code.
pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let n = rng.gen_range(0..10u32.pow(ROOM_CODE_DIGITS));
    format!("{:0width$}", n, width = ROOM_CODE_DIGITS as usize)
}

/// A participant that left a room, and what that did to the round
#[derive(Debug, Clone)]
pub struct Departure {
    pub code: String,
    pub connection: ConnectionId,
    pub nickname: String,
    pub was_drawer: bool,
    pub round_ended: bool,
    /// Participants still in the room afterwards
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// The room now has enough participants for a round.
    pub ready: bool,
    /// Set when joining moved the connection out of another room.
    pub left: Option<Departure>,
}

#[derive(Default)]
struct RegistryState {
    rooms: HashMap<String, Room>,
    /// Room each connection currently belongs to
    memberships: HashMap<ConnectionId, String>,
}

impl RegistryState {
    fn detach(&mut self, code: &str, id: ConnectionId) -> Option<Departure> {
        if self.memberships.get(&id).map(String::as_str) != Some(code) {
            return None;
        }
        self.memberships.remove(&id);

        let room = self.rooms.get_mut(code)?;
        let removal = room.remove_participant(id)?;
        debug_assert!(room.is_consistent());

        info!(
            "{} ({}) left room {}, {} remaining",
            removal.participant.nickname,
            id,
            code,
            room.len()
        );

        Some(Departure {
            code: code.to_string(),
            connection: id,
            nickname: removal.participant.nickname,
            was_drawer: removal.was_drawer,
            round_ended: removal.round_ended,
            remaining: room.len(),
        })
    }
}

pub struct RoomRegistry {
    state: Mutex<RegistryState>,
    generate_code: CodeGenerator,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_code_generator(|| generate_room_code(&mut rand::thread_rng()))
    }

    /// Creates a registry drawing room codes from `generator`.
    ///
    /// The generator may repeat itself; collisions are retried.
    pub fn with_code_generator<F>(generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(RegistryState::default()),
            generate_code: Box::new(generator),
        }
    }

    /// Creates an empty room under a fresh code.
    pub async fn create_room(&self) -> Result<String, RoomError> {
        let mut state = self.state.lock().await;

        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = (self.generate_code)();
            if state.rooms.contains_key(&code) {
                debug!("Room code {} already taken, retrying", code);
                continue;
            }
            state.rooms.insert(code.clone(), Room::new(code.clone()));
            info!("Room {} created", code);
            return Ok(code);
        }

        Err(RoomError::RoomCodesExhausted(MAX_CODE_ATTEMPTS))
    }

    /// Adds `connection` to the room under `code`.
    ///
    /// An unknown code leaves every room untouched. A connection already in
    /// another room is moved out of it first; joining the same room again
    /// only refreshes the nickname.
    pub async fn join_room(
        &self,
        code: &str,
        connection: Connection,
        nickname: String,
    ) -> Result<JoinOutcome, RoomError> {
        let mut state = self.state.lock().await;

        if !state.rooms.contains_key(code) {
            return Err(RoomError::RoomNotFound(code.to_string()));
        }

        let id = connection.id();
        let left = match state.memberships.get(&id).cloned() {
            Some(previous) if previous != code => state.detach(&previous, id),
            _ => None,
        };

        let room = state
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;
        if room.add_participant(connection, nickname.clone()) {
            info!("{} ({}) joined room {}", nickname, id, code);
        }
        let ready = room.len() >= MIN_PLAYERS_FOR_ROUND;
        debug_assert!(room.is_consistent());

        state.memberships.insert(id, code.to_string());

        Ok(JoinOutcome { ready, left })
    }

    /// Renames a connection in its room. Returns false if it has no room.
    pub async fn set_nickname(&self, id: ConnectionId, nickname: String) -> bool {
        let mut state = self.state.lock().await;
        let RegistryState { rooms, memberships } = &mut *state;

        match memberships.get(&id).and_then(|code| rooms.get_mut(code)) {
            Some(room) => room.set_nickname(id, nickname),
            None => false,
        }
    }

    /// Runs `f` on the room under `code` while holding the registry lock.
    ///
    /// Returns `None` if there is no such room. `f` must not block.
    pub async fn with_room<F, R>(&self, code: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Room) -> R,
    {
        let mut state = self.state.lock().await;
        let room = state.rooms.get_mut(code)?;
        let result = f(&mut *room);
        debug_assert!(room.is_consistent());
        Some(result)
    }

    /// Removes a connection from the room under `code`.
    ///
    /// Clears the drawer if it was the one leaving. Returns `None` when the
    /// connection was not in that room, which makes repeated removal harmless.
    pub async fn remove_connection(&self, code: &str, id: ConnectionId) -> Option<Departure> {
        let mut state = self.state.lock().await;
        state.detach(code, id)
    }

    pub async fn room_of(&self, id: ConnectionId) -> Option<String> {
        let state = self.state.lock().await;
        state.memberships.get(&id).cloned()
    }

    /// Snapshot of the connections in a room, in join order.
    pub async fn connections(&self, code: &str) -> Vec<Connection> {
        self.with_room(code, |room| room.connections())
            .await
            .unwrap_or_default()
    }

    pub async fn contains_room(&self, code: &str) -> bool {
        let state = self.state.lock().await;
        state.rooms.contains_key(code)
    }

    pub async fn room_count(&self) -> usize {
        let state = self.state.lock().await;
        state.rooms.len()
    }

    /// Number of connections currently in any room
    pub async fn member_count(&self) -> usize {
        let state = self.state.lock().await;
        state.memberships.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
