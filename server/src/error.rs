//! Error types for the room session core.
//!
//! Nothing here is fatal to the process. A `RoomError` is answered with an
//! `error` message to the requester, a `SendError` evicts the connection it
//! happened on.

use crate::connection::ConnectionId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound(String),
    #[error("no free room code after {0} attempts")]
    RoomCodesExhausted(usize),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("outbound queue of connection {0} is full")]
    QueueFull(ConnectionId),
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_not_found_is_user_readable() {
        let err = RoomError::RoomNotFound("1234".to_string());
        assert_eq!(err.to_string(), "Room not found");
    }

    #[test]
    fn test_send_error_names_connection() {
        let err = SendError::Closed(ConnectionId(7));
        assert_eq!(err.to_string(), "connection #7 is closed");
    }
}
