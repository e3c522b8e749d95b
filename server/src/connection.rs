//! Handle to one participant's duplex channel.
//!
//! A `Connection` is cheap to clone; every clone feeds the same bounded
//! outbound queue, which the transport drains into the socket. Sends never
//! block: a full queue counts as a failed send, the same as a peer that has
//! gone away.

use crate::error::SendError;
use shared::Message;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<Message>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Creates a connection and the receiving end of its outbound queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::next(),
            outbound,
            shutdown: CancellationToken::new(),
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a message for delivery without waiting.
    pub fn send(&self, message: Message) -> Result<(), SendError> {
        if self.shutdown.is_cancelled() {
            return Err(SendError::Closed(self.id));
        }
        self.outbound.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull(self.id),
            TrySendError::Closed(_) => SendError::Closed(self.id),
        })
    }

    /// Asks the transport to shut this connection down. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.outbound.is_closed()
    }

    /// Resolves once `close` has been called on any clone.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
