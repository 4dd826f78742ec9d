//! Room broadcast router for Parlor.
//!
//! The router owns one outbound queue per live connection and fans events
//! out to the members of a room. Delivery is fire-and-forget: an event for a
//! connection whose queue is gone is dropped without error.

use crate::connection::ConnectionId;
use crate::presence::PresenceStore;
use dashmap::DashMap;
use parlor_protocol::ServerEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Events queued for a single connection.
pub type EventReceiver = mpsc::UnboundedReceiver<Arc<ServerEvent>>;

type EventSender = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Per-connection delivery registry.
#[derive(Debug, Default)]
pub struct BroadcastRouter {
    /// Outbound queues indexed by connection.
    outboxes: DashMap<ConnectionId, EventSender>,
}

impl BroadcastRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the receiving end of its queue.
    ///
    /// Registering an ID again replaces the previous queue.
    pub fn register(&self, connection_id: &ConnectionId) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.outboxes.insert(connection_id.clone(), tx).is_some() {
            debug!(connection = %connection_id, "Replaced existing outbox");
        }
        rx
    }

    /// Drop a connection's queue.
    ///
    /// Returns `true` if the connection was registered.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        self.outboxes.remove(connection_id).is_some()
    }

    /// Check if a connection has a queue.
    #[must_use]
    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.outboxes.contains_key(connection_id)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    /// Deliver an event to a single connection.
    ///
    /// Returns `true` if the event was queued.
    pub fn send_to_connection(
        &self,
        connection_id: &ConnectionId,
        event: impl Into<Arc<ServerEvent>>,
    ) -> bool {
        self.deliver(std::iter::once(connection_id), event.into()) == 1
    }

    /// Deliver an event to every member of a room, including the sender.
    ///
    /// Returns the number of connections the event was queued for.
    pub fn broadcast_to_room(
        &self,
        presence: &PresenceStore,
        room: &str,
        event: impl Into<Arc<ServerEvent>>,
    ) -> usize {
        let event = event.into();
        let count = self.deliver(presence.members(room), Arc::clone(&event));
        trace!(room = %room, event = %event.kind(), recipients = count, "Broadcast to room");
        count
    }

    /// Deliver an event to every member of a room except `sender`.
    ///
    /// Returns the number of connections the event was queued for.
    pub fn broadcast_to_room_except_sender(
        &self,
        presence: &PresenceStore,
        room: &str,
        sender: &ConnectionId,
        event: impl Into<Arc<ServerEvent>>,
    ) -> usize {
        let event = event.into();
        let count = self.deliver(
            presence.members(room).filter(|id| *id != sender),
            Arc::clone(&event),
        );
        trace!(
            room = %room,
            sender = %sender,
            event = %event.kind(),
            recipients = count,
            "Broadcast to room except sender"
        );
        count
    }

    fn deliver<'a>(
        &self,
        recipients: impl Iterator<Item = &'a ConnectionId>,
        event: Arc<ServerEvent>,
    ) -> usize {
        let mut delivered = 0;
        for id in recipients {
            match self.outboxes.get(id) {
                Some(tx) if tx.send(Arc::clone(&event)).is_ok() => delivered += 1,
                Some(_) => trace!(connection = %id, "Outbox closed, dropping event"),
                None => trace!(connection = %id, "No outbox, dropping event"),
            }
        }
        delivered
    }
}
