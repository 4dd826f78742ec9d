//! Event types for the Parlor protocol.
//!
//! Events are the fundamental unit of communication between chat clients
//! and the relay. Each event is a map tagged by an `event` field carrying the
//! camelCase event name, with the event's fields flattened beside it.

use serde::{Deserialize, Serialize};

/// Username used for relay-generated chat lines.
pub const SYSTEM_USERNAME: &str = "System";

/// Default display format for message times, e.g. `3:04:05 PM`.
pub const DEFAULT_TIME_FORMAT: &str = "%-I:%M:%S %p";

/// A member entry in a room's user list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    /// Connection identifier of the member.
    pub id: String,
    /// Display name chosen on join.
    pub username: String,
}

impl RoomMember {
    /// Create a new member entry.
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

/// Event kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JoinRoom,
    ChatMessage,
    Typing,
    StopTyping,
    LeaveRoom,
    Message,
    UserJoined,
    UserLeft,
    RoomUsers,
}

impl EventKind {
    /// The wire name of this event kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            EventKind::JoinRoom => "joinRoom",
            EventKind::ChatMessage => "chatMessage",
            EventKind::Typing => "typing",
            EventKind::StopTyping => "stopTyping",
            EventKind::LeaveRoom => "leaveRoom",
            EventKind::Message => "message",
            EventKind::UserJoined => "userJoined",
            EventKind::UserLeft => "userLeft",
            EventKind::RoomUsers => "roomUsers",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An event sent from a client to the relay.
///
/// Extra fields on the wire are ignored, so clients that attach their own
/// bookkeeping (room, timestamps) to an event still decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Join (or re-join) a room under a display name.
    JoinRoom {
        /// Display name.
        username: String,
        /// Room to join.
        room: String,
    },

    /// Send a chat line to the current room.
    ChatMessage {
        /// Message text.
        message: String,
    },

    /// The user started typing.
    Typing,

    /// The user stopped typing.
    StopTyping,

    /// Leave the current room without disconnecting.
    LeaveRoom,
}

impl ClientEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::JoinRoom { .. } => EventKind::JoinRoom,
            ClientEvent::ChatMessage { .. } => EventKind::ChatMessage,
            ClientEvent::Typing => EventKind::Typing,
            ClientEvent::StopTyping => EventKind::StopTyping,
            ClientEvent::LeaveRoom => EventKind::LeaveRoom,
        }
    }

    /// Create a new JoinRoom event.
    #[must_use]
    pub fn join_room(username: impl Into<String>, room: impl Into<String>) -> Self {
        ClientEvent::JoinRoom {
            username: username.into(),
            room: room.into(),
        }
    }

    /// Create a new ChatMessage event.
    #[must_use]
    pub fn chat_message(message: impl Into<String>) -> Self {
        ClientEvent::ChatMessage {
            message: message.into(),
        }
    }
}

/// An event sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A chat line, either from a member or from the relay itself.
    Message {
        /// Author display name.
        username: String,
        /// Message text.
        message: String,
        /// Display-formatted time the relay stamped the message with.
        time: String,
    },

    /// Someone joined the room.
    UserJoined {
        /// Display name of the new member.
        username: String,
        /// Member list after the join.
        users: Vec<RoomMember>,
    },

    /// Someone left the room.
    UserLeft {
        /// Display name of the departed member.
        username: String,
        /// Member list after the departure.
        users: Vec<RoomMember>,
    },

    /// Full member list of a room.
    RoomUsers {
        /// Room name.
        room: String,
        /// Current members.
        users: Vec<RoomMember>,
    },

    /// A member started typing.
    Typing {
        /// Display name of the typist.
        username: String,
    },

    /// A member stopped typing.
    StopTyping,
}

impl ServerEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Message { .. } => EventKind::Message,
            ServerEvent::UserJoined { .. } => EventKind::UserJoined,
            ServerEvent::UserLeft { .. } => EventKind::UserLeft,
            ServerEvent::RoomUsers { .. } => EventKind::RoomUsers,
            ServerEvent::Typing { .. } => EventKind::Typing,
            ServerEvent::StopTyping => EventKind::StopTyping,
        }
    }

    /// Create a new Message event.
    #[must_use]
    pub fn message(
        username: impl Into<String>,
        message: impl Into<String>,
        time: impl Into<String>,
    ) -> Self {
        ServerEvent::Message {
            username: username.into(),
            message: message.into(),
            time: time.into(),
        }
    }

    /// Create a Message event authored by the relay.
    #[must_use]
    pub fn system(message: impl Into<String>, time: impl Into<String>) -> Self {
        Self::message(SYSTEM_USERNAME, message, time)
    }
}
