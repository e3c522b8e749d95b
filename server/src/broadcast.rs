//! Message fan-out to the connections of a room.

use crate::connection::{Connection, ConnectionId};
use crate::registry::{Departure, RoomRegistry};
use log::{debug, warn};
use shared::Message;
use std::sync::Arc;

/// Delivers messages to a room's participants.
///
/// Targets are snapshotted from the registry and the lock is released before
/// anything is sent. A failed send never stops delivery to the others: the
/// failing connection is closed and evicted afterwards, and the resulting
/// departures are handed back so the caller can settle the round.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    registry: Arc<RoomRegistry>,
}

impl BroadcastDispatcher {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Sends `message` to every participant of the room.
    pub async fn broadcast_all(&self, code: &str, message: &Message) -> Vec<Departure> {
        let targets = self.registry.connections(code).await;
        self.deliver(code, targets.into_iter().map(|c| (c, message.clone())))
            .await
    }

    /// Sends `message` to every participant but `excluded`.
    pub async fn broadcast_except(
        &self,
        code: &str,
        message: &Message,
        excluded: ConnectionId,
    ) -> Vec<Departure> {
        let targets = self.registry.connections(code).await;
        self.deliver(
            code,
            targets
                .into_iter()
                .filter(|c| c.id() != excluded)
                .map(|c| (c, message.clone())),
        )
        .await
    }

    /// Sends `message` to one connection, evicting it from its room on failure.
    pub async fn unicast(&self, connection: &Connection, message: Message) -> Option<Departure> {
        if Self::try_send(connection, message) {
            return None;
        }
        let code = self.registry.room_of(connection.id()).await?;
        self.registry.remove_connection(&code, connection.id()).await
    }

    /// Sends a prepared set of per-connection messages within one room.
    pub async fn deliver<I>(&self, code: &str, notifications: I) -> Vec<Departure>
    where
        I: IntoIterator<Item = (Connection, Message)>,
    {
        let mut failed = Vec::new();
        let mut delivered = 0usize;
        for (connection, message) in notifications {
            if Self::try_send(&connection, message) {
                delivered += 1;
            } else {
                failed.push(connection.id());
            }
        }
        debug!(
            "Room {}: delivered {} message(s), {} failed",
            code,
            delivered,
            failed.len()
        );

        let mut departures = Vec::new();
        for id in failed {
            if let Some(departure) = self.registry.remove_connection(code, id).await {
                departures.push(departure);
            }
        }
        departures
    }

    /// Returns false, after closing the connection, if the send failed.
    fn try_send(connection: &Connection, message: Message) -> bool {
        match connection.send(message) {
            Ok(()) => true,
            Err(e) => {
                warn!("Evicting connection {}: {}", connection.id(), e);
                connection.close();
                false
            }
        }
    }
}
