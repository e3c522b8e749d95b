//! # Room Server Library
//!
//! This library implements the session core of a multiplayer drawing and
//! guessing game. Clients connect over WebSockets, create or join a room by
//! its code, and take turns drawing a secret word while the others guess.
//!
//! ## Core Responsibilities
//!
//! ### Room Registry
//! Owns every room and its participants. All structural changes (creating a
//! room, joining, renaming, leaving, assigning the drawer) are serialized by
//! a single lock, so a room can never point at a drawer that has already
//! left.
//!
//! ### Turn Rotation
//! A room is either idle or running a round. The first drawer is picked at
//! random; after that the turn passes to whoever guessed the word, or to the
//! next participant in join order when the drawer leaves.
//!
//! ### Broadcasting
//! Messages fan out to a snapshot of a room's connections taken under the
//! lock and sent after it is released. A connection whose send fails is
//! closed and evicted without interrupting delivery to the rest.
//!
//! ## Module Organization
//!
//! ### Connection (`connection`)
//! Handle to one client: a bounded outbound queue plus a close signal.
//!
//! ### Room and Registry (`room`, `registry`)
//! The room entity with insertion-ordered participants, and the registry
//! holding all rooms behind the lock.
//!
//! ### Turn Engine (`turn`, `words`)
//! Drawer selection and secret word assignment over a fixed dictionary.
//!
//! ### Dispatcher (`broadcast`)
//! Broadcast to all, to all but one, and unicast, with eviction on failure.
//!
//! ### Sessions (`session`)
//! One handler per connection, translating inbound messages into registry
//! operations and notifications.
//!
//! ### Network (`network`, `config`)
//! The WebSocket listener and the reader/writer tasks per client.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::registry::RoomRegistry;
//! use server::session::SessionContext;
//! use server::turn::TurnEngine;
//! use server::words::WordList;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let registry = Arc::new(RoomRegistry::new());
//!     let ctx = SessionContext::new(registry, TurnEngine::new(WordList::builtin()));
//!
//!     // Queue up to 64 outbound messages per client before evicting it
//!     let server = Server::bind("127.0.0.1:12345", ctx, 64).await?;
//!     server.run().await
//! }
//! ```
//!
//! ## Scalability
//!
//! The registry lock is global, so unrelated rooms are serialized against
//! each other. Critical sections are short and never include network I/O,
//! which is enough for the expected number of rooms. Rooms are kept in
//! memory only and are not removed when they empty.

pub mod broadcast;
pub mod config;
pub mod connection;
pub mod error;
pub mod network;
pub mod registry;
pub mod room;
pub mod session;
pub mod turn;
pub mod words;
