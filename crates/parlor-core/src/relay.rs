//! Connection lifecycle handling for Parlor.
//!
//! The relay reacts to inbound client events, mutates the presence store and
//! fans the results out through the broadcast router. Each event is handled
//! under a single lock covering both, so every member list sent out is a
//! consistent snapshot and events for one room are queued in mutation order.

use crate::connection::ConnectionId;
use crate::message::{ChatMessage, DEFAULT_TIME_FORMAT};
use crate::presence::{PresenceStore, RoomListing, RoomSummary, User};
use crate::router::{BroadcastRouter, EventReceiver};
use parking_lot::Mutex;
use parlor_protocol::{ClientEvent, RoomMember, ServerEvent};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

/// Maximum room name length.
pub const MAX_ROOM_NAME_LENGTH: usize = 256;

/// Maximum username length.
pub const MAX_USERNAME_LENGTH: usize = 64;

/// Maximum chat message length in bytes.
pub const MAX_CHAT_LENGTH: usize = 4096;

/// Reasons an inbound event is dropped.
///
/// None of these are reported to the client; the caller logs and counts them.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Username failed validation.
    #[error("Invalid username: {0}")]
    InvalidUsername(&'static str),

    /// Room name failed validation.
    #[error("Invalid room name: {0}")]
    InvalidRoom(&'static str),

    /// Chat text failed validation.
    #[error("Invalid message: {0}")]
    InvalidMessage(&'static str),

    /// Event requires a joined connection.
    #[error("Connection has not joined a room: {0}")]
    NotJoined(ConnectionId),
}

impl RelayError {
    /// Short label for metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            RelayError::InvalidUsername(_) => "invalid_username",
            RelayError::InvalidRoom(_) => "invalid_room",
            RelayError::InvalidMessage(_) => "invalid_message",
            RelayError::NotJoined(_) => "not_joined",
        }
    }
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum username length in characters.
    pub max_username_length: usize,
    /// Maximum room name length in bytes.
    pub max_room_name_length: usize,
    /// Maximum chat message length in bytes.
    pub max_chat_length: usize,
    /// chrono format string for message times.
    pub time_format: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_username_length: MAX_USERNAME_LENGTH,
            max_room_name_length: MAX_ROOM_NAME_LENGTH,
            max_chat_length: MAX_CHAT_LENGTH,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
        }
    }
}

/// Validate a room name.
///
/// # Errors
///
/// Returns an error message if the room name is invalid.
pub fn validate_room_name(name: &str, max_len: usize) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Room name cannot be empty");
    }
    if name.len() > max_len {
        return Err("Room name too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Room name contains control characters");
    }
    Ok(())
}

/// Validate a username.
///
/// # Errors
///
/// Returns an error message if the username is invalid.
pub fn validate_username(name: &str, max_len: usize) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Username cannot be empty");
    }
    if name.chars().count() > max_len {
        return Err("Username too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Username contains control characters");
    }
    Ok(())
}

/// Monitoring snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    /// Joined users across all rooms.
    pub total_users: usize,
    /// Live rooms.
    pub total_rooms: usize,
    /// Size of each live room.
    pub rooms: Vec<RoomSummary>,
}

/// The connection lifecycle handler.
pub struct Relay {
    /// Presence store; the lock also serializes fan-out.
    presence: Mutex<PresenceStore>,
    /// Outbound queues.
    router: BroadcastRouter,
    /// Configuration.
    config: RelayConfig,
}

impl Relay {
    /// Create a relay with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Create a relay with custom configuration.
    #[must_use]
    pub fn with_config(config: RelayConfig) -> Self {
        info!("Creating relay with config: {:?}", config);
        Self {
            presence: Mutex::new(PresenceStore::new()),
            router: BroadcastRouter::new(),
            config,
        }
    }

    /// Get the relay configuration.
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Register a new connection in the Unjoined state.
    ///
    /// Returns the queue of events destined for it.
    pub fn connect(&self, connection_id: &ConnectionId) -> EventReceiver {
        debug!(connection = %connection_id, "Connection registered");
        self.router.register(connection_id)
    }

    /// Tear down a connection: leave its room and drop its queue.
    ///
    /// Returns the user record if the connection was joined.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> Option<User> {
        let user = self.leave(connection_id);
        self.router.unregister(connection_id);
        debug!(connection = %connection_id, "Connection unregistered");
        user
    }

    /// Handle one inbound event from a connection.
    ///
    /// # Errors
    ///
    /// Returns the reason the event was dropped. Nothing is sent to the
    /// client in that case.
    pub fn handle(&self, connection_id: &ConnectionId, event: ClientEvent) -> Result<(), RelayError> {
        match event {
            ClientEvent::JoinRoom { username, room } => self.join(connection_id, &username, &room),
            ClientEvent::ChatMessage { message } => self.chat(connection_id, message),
            ClientEvent::Typing => self.typing(connection_id, true),
            ClientEvent::StopTyping => self.typing(connection_id, false),
            ClientEvent::LeaveRoom => self
                .leave(connection_id)
                .map(|_| ())
                .ok_or_else(|| RelayError::NotJoined(connection_id.clone())),
        }
    }

    fn join(&self, connection_id: &ConnectionId, username: &str, room: &str) -> Result<(), RelayError> {
        let username = username.trim();
        let room = room.trim();
        validate_username(username, self.config.max_username_length)
            .map_err(RelayError::InvalidUsername)?;
        validate_room_name(room, self.config.max_room_name_length)
            .map_err(RelayError::InvalidRoom)?;

        let mut presence = self.presence.lock();

        if let Some(previous) = presence.join(connection_id, username, room) {
            if previous.room != room {
                self.announce_departure(&presence, connection_id, &previous);
            }
        }

        let users = presence.list_room(room);

        self.router.send_to_connection(
            connection_id,
            ServerEvent::from(ChatMessage::welcome(room, username, &self.config.time_format)),
        );
        self.router.broadcast_to_room_except_sender(
            &presence,
            room,
            connection_id,
            ServerEvent::UserJoined {
                username: username.to_string(),
                users: users.clone(),
            },
        );
        self.router.broadcast_to_room(&presence, room, room_users(room, users));

        info!(connection = %connection_id, "{} joined room: {}", username, room);
        Ok(())
    }

    fn chat(&self, connection_id: &ConnectionId, text: String) -> Result<(), RelayError> {
        if text.trim().is_empty() {
            return Err(RelayError::InvalidMessage("Message cannot be empty"));
        }
        if text.len() > self.config.max_chat_length {
            return Err(RelayError::InvalidMessage("Message too long"));
        }

        let presence = self.presence.lock();
        let user = presence
            .user(connection_id)
            .ok_or_else(|| RelayError::NotJoined(connection_id.clone()))?;

        debug!(
            connection = %connection_id,
            room = %user.room,
            "Message from {}: {}", user.username, text
        );
        let message = ChatMessage::new(user.username.clone(), text, &self.config.time_format);
        self.router
            .broadcast_to_room(&presence, &user.room, ServerEvent::from(message));
        Ok(())
    }

    fn typing(&self, connection_id: &ConnectionId, started: bool) -> Result<(), RelayError> {
        let presence = self.presence.lock();
        let user = presence
            .user(connection_id)
            .ok_or_else(|| RelayError::NotJoined(connection_id.clone()))?;

        let event = if started {
            ServerEvent::Typing {
                username: user.username.clone(),
            }
        } else {
            ServerEvent::StopTyping
        };
        self.router
            .broadcast_to_room_except_sender(&presence, &user.room, connection_id, event);
        Ok(())
    }

    fn leave(&self, connection_id: &ConnectionId) -> Option<User> {
        let mut presence = self.presence.lock();
        let user = presence.leave(connection_id)?;
        self.announce_departure(&presence, connection_id, &user);
        info!(connection = %connection_id, "{} left room: {}", user.username, user.room);
        Some(user)
    }

    /// Tell the remaining members of `user.room` that `user` is gone.
    fn announce_departure(&self, presence: &PresenceStore, connection_id: &ConnectionId, user: &User) {
        let users = presence.list_room(&user.room);
        self.router.broadcast_to_room_except_sender(
            presence,
            &user.room,
            connection_id,
            ServerEvent::UserLeft {
                username: user.username.clone(),
                users: users.clone(),
            },
        );
        self.router
            .broadcast_to_room(presence, &user.room, room_users(&user.room, users));
    }

    /// List the members of a room.
    #[must_use]
    pub fn list_room(&self, room: &str) -> Vec<RoomMember> {
        self.presence.lock().list_room(room)
    }

    /// Room currently joined by a connection.
    #[must_use]
    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<String> {
        self.presence.lock().user(connection_id).map(|u| u.room.clone())
    }

    /// Number of live rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.presence.lock().room_count()
    }

    /// Number of joined users.
    #[must_use]
    pub fn total_users(&self) -> usize {
        self.presence.lock().total_users()
    }

    /// Number of registered connections, joined or not.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.router.connection_count()
    }

    /// Monitoring snapshot.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        let presence = self.presence.lock();
        RelayStats {
            total_users: presence.total_users(),
            total_rooms: presence.room_count(),
            rooms: presence.room_summaries(),
        }
    }

    /// Member list of every live room.
    #[must_use]
    pub fn room_listings(&self) -> Vec<RoomListing> {
        self.presence.lock().room_listings()
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

fn room_users(room: &str, users: Vec<RoomMember>) -> ServerEvent {
    ServerEvent::RoomUsers {
        room: room.to_string(),
        users,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ConnectionId {
        ConnectionId::new(s)
    }

    fn drain(rx: &mut EventReceiver) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push((*event).clone());
        }
        events
    }

    #[test]
    fn test_join_sequence() {
        let relay = Relay::new();
        let mut rx_a = relay.connect(&id("A"));
        let mut rx_b = relay.connect(&id("B"));

        relay.handle(&id("A"), ClientEvent::join_room("alice", "general")).unwrap();
        let events = drain(&mut rx_a);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            ServerEvent::Message { username, message, .. }
                if username == "System" && message == "Welcome to general, alice!"
        ));
        assert_eq!(
            events[1],
            ServerEvent::RoomUsers {
                room: "general".into(),
                users: vec![RoomMember::new("A", "alice")],
            }
        );

        relay.handle(&id("B"), ClientEvent::join_room("bob", "general")).unwrap();
        let both = vec![RoomMember::new("A", "alice"), RoomMember::new("B", "bob")];

        assert_eq!(
            drain(&mut rx_a),
            vec![
                ServerEvent::UserJoined {
                    username: "bob".into(),
                    users: both.clone(),
                },
                ServerEvent::RoomUsers {
                    room: "general".into(),
                    users: both.clone(),
                },
            ]
        );

        let events = drain(&mut rx_b);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ServerEvent::Message { username, .. } if username == "System"));
        assert!(matches!(&events[1], ServerEvent::RoomUsers { users, .. } if *users == both));
    }

    #[test]
    fn test_chat_reaches_whole_room() {
        let relay = Relay::new();
        let mut rx_a = relay.connect(&id("A"));
        let mut rx_b = relay.connect(&id("B"));
        relay.handle(&id("A"), ClientEvent::join_room("alice", "general")).unwrap();
        relay.handle(&id("B"), ClientEvent::join_room("bob", "general")).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        relay.handle(&id("A"), ClientEvent::chat_message("hi")).unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            assert!(matches!(
                &events[0],
                ServerEvent::Message { username, message, time }
                    if username == "alice" && message == "hi" && !time.is_empty()
            ));
        }
    }

    #[test]
    fn test_rooms_are_isolated() {
        let relay = Relay::new();
        let mut rx_a = relay.connect(&id("A"));
        let mut rx_c = relay.connect(&id("C"));
        relay.handle(&id("A"), ClientEvent::join_room("alice", "general")).unwrap();
        relay.handle(&id("C"), ClientEvent::join_room("carol", "tech")).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_c);

        relay.handle(&id("A"), ClientEvent::chat_message("hi")).unwrap();
        assert_eq!(drain(&mut rx_a).len(), 1);
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn test_events_from_unjoined_connection_dropped() {
        let relay = Relay::new();
        let mut rx_a = relay.connect(&id("A"));
        let mut rx_b = relay.connect(&id("B"));
        relay.handle(&id("A"), ClientEvent::join_room("alice", "general")).unwrap();
        drain(&mut rx_a);

        for event in [
            ClientEvent::chat_message("hi"),
            ClientEvent::Typing,
            ClientEvent::StopTyping,
            ClientEvent::LeaveRoom,
        ] {
            assert!(matches!(
                relay.handle(&id("B"), event),
                Err(RelayError::NotJoined(_))
            ));
        }

        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(relay.total_users(), 1);
    }

    #[test]
    fn test_unknown_connection_does_not_panic() {
        let relay = Relay::new();
        assert!(relay.handle(&id("ghost"), ClientEvent::chat_message("boo")).is_err());
        assert!(relay.disconnect(&id("ghost")).is_none());
    }

    #[test]
    fn test_typing_skips_sender() {
        let relay = Relay::new();
        let mut rx_a = relay.connect(&id("A"));
        let mut rx_b = relay.connect(&id("B"));
        relay.handle(&id("A"), ClientEvent::join_room("alice", "general")).unwrap();
        relay.handle(&id("B"), ClientEvent::join_room("bob", "general")).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        relay.handle(&id("B"), ClientEvent::Typing).unwrap();
        relay.handle(&id("B"), ClientEvent::StopTyping).unwrap();

        assert_eq!(
            drain(&mut rx_a),
            vec![
                ServerEvent::Typing {
                    username: "bob".into()
                },
                ServerEvent::StopTyping,
            ]
        );
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_disconnect_cleans_up() {
        let relay = Relay::new();
        let mut rx_a = relay.connect(&id("A"));
        let mut rx_b = relay.connect(&id("B"));
        relay.handle(&id("A"), ClientEvent::join_room("alice", "general")).unwrap();
        relay.handle(&id("B"), ClientEvent::join_room("bob", "general")).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);
        assert_eq!(relay.total_users(), 2);

        let user = relay.disconnect(&id("B")).unwrap();
        assert_eq!(user.username, "bob");
        assert_eq!(relay.total_users(), 1);
        assert_eq!(relay.connection_count(), 1);

        let alone = vec![RoomMember::new("A", "alice")];
        assert_eq!(
            drain(&mut rx_a),
            vec![
                ServerEvent::UserLeft {
                    username: "bob".into(),
                    users: alone.clone(),
                },
                ServerEvent::RoomUsers {
                    room: "general".into(),
                    users: alone,
                },
            ]
        );

        relay.disconnect(&id("A"));
        assert_eq!(relay.room_count(), 0);
        assert!(relay.room_listings().is_empty());
    }

    #[test]
    fn test_leave_then_disconnect_is_idempotent() {
        let relay = Relay::new();
        let _rx = relay.connect(&id("A"));
        relay.handle(&id("A"), ClientEvent::join_room("alice", "general")).unwrap();

        relay.handle(&id("A"), ClientEvent::LeaveRoom).unwrap();
        assert!(relay.disconnect(&id("A")).is_none());
        assert_eq!(relay.total_users(), 0);
    }

    #[test]
    fn test_rejoin_other_room_announces_departure() {
        let relay = Relay::new();
        let mut rx_a = relay.connect(&id("A"));
        let mut rx_b = relay.connect(&id("B"));
        relay.handle(&id("A"), ClientEvent::join_room("alice", "general")).unwrap();
        relay.handle(&id("B"), ClientEvent::join_room("bob", "general")).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        relay.handle(&id("B"), ClientEvent::join_room("bob", "tech")).unwrap();

        let events = drain(&mut rx_a);
        assert!(matches!(&events[0], ServerEvent::UserLeft { username, .. } if username == "bob"));
        assert_eq!(relay.room_of(&id("B")).as_deref(), Some("tech"));
        assert_eq!(relay.list_room("general"), vec![RoomMember::new("A", "alice")]);
        assert_eq!(relay.room_count(), 2);
    }

    #[test]
    fn test_invalid_input_dropped() {
        let relay = Relay::new();
        let mut rx = relay.connect(&id("A"));

        assert!(matches!(
            relay.handle(&id("A"), ClientEvent::join_room("   ", "general")),
            Err(RelayError::InvalidUsername(_))
        ));
        assert!(matches!(
            relay.handle(&id("A"), ClientEvent::join_room("alice", "")),
            Err(RelayError::InvalidRoom(_))
        ));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(relay.total_users(), 0);

        relay.handle(&id("A"), ClientEvent::join_room(" alice ", "general")).unwrap();
        drain(&mut rx);
        assert_eq!(relay.list_room("general"), vec![RoomMember::new("A", "alice")]);

        let err = relay
            .handle(&id("A"), ClientEvent::chat_message("  "))
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_message");
        let long = "x".repeat(MAX_CHAT_LENGTH + 1);
        assert!(relay.handle(&id("A"), ClientEvent::chat_message(long)).is_err());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_stats() {
        let relay = Relay::new();
        let _rx_a = relay.connect(&id("A"));
        let _rx_b = relay.connect(&id("B"));
        relay.handle(&id("A"), ClientEvent::join_room("alice", "general")).unwrap();
        relay.handle(&id("B"), ClientEvent::join_room("bob", "tech")).unwrap();

        let stats = relay.stats();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.total_rooms, 2);
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            serde_json::json!({
                "totalUsers": 2,
                "totalRooms": 2,
                "rooms": [
                    {"name": "general", "userCount": 1},
                    {"name": "tech", "userCount": 1}
                ]
            })
        );
    }

    #[test]
    fn test_validation_helpers() {
        assert!(validate_room_name("general", MAX_ROOM_NAME_LENGTH).is_ok());
        assert!(validate_room_name("", MAX_ROOM_NAME_LENGTH).is_err());
        assert!(validate_room_name("a\nb", MAX_ROOM_NAME_LENGTH).is_err());
        let long_name = "a".repeat(MAX_ROOM_NAME_LENGTH + 1);
        assert!(validate_room_name(&long_name, MAX_ROOM_NAME_LENGTH).is_err());

        assert!(validate_username("Zoë", MAX_USERNAME_LENGTH).is_ok());
        assert!(validate_username("", MAX_USERNAME_LENGTH).is_err());
    }
}
