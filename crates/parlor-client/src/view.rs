//! Rendered chat state.
//!
//! The view is append-only: entries are never de-duplicated or paged.

use parlor_protocol::{RoomMember, ServerEvent};
use std::fmt;

/// Connection indicator shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Live connection to the relay.
    Connected,
    /// The live connection was lost.
    Disconnected,
    /// No relay was reachable at startup.
    Demo,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Demo => "Demo Mode",
        })
    }
}

/// One line in the message list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEntry {
    /// A chat line.
    Chat {
        /// Author.
        username: String,
        /// Message body.
        text: String,
        /// Display time.
        time: String,
        /// Written by this session's user.
        own: bool,
    },
    /// A notice such as a join or leave.
    System(String),
}

impl fmt::Display for ViewEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewEntry::Chat {
                username,
                text,
                time,
                own,
            } => {
                let marker = if *own { ">" } else { " " };
                write!(f, "{marker}[{time}] {username}: {text}")
            }
            ViewEntry::System(text) => write!(f, " * {text}"),
        }
    }
}

/// Everything a chat UI needs to draw.
#[derive(Debug, Clone)]
pub struct ChatView {
    entries: Vec<ViewEntry>,
    users: Vec<RoomMember>,
    user_count: String,
    typing: Option<String>,
    status: ConnectionStatus,
}

impl ChatView {
    /// Create an empty view with the given status.
    #[must_use]
    pub fn new(status: ConnectionStatus) -> Self {
        Self {
            entries: Vec::new(),
            users: Vec::new(),
            user_count: String::new(),
            typing: None,
            status,
        }
    }

    /// Render an event from the relay.
    pub fn apply(&mut self, event: &ServerEvent, own_username: &str) {
        match event {
            ServerEvent::Message {
                username,
                message,
                time,
            } => self.push_chat(username, message, time, username == own_username),
            ServerEvent::UserJoined { username, users } => {
                self.push_system(format!("{username} joined the chat"));
                self.set_users(users.clone());
            }
            ServerEvent::UserLeft { username, users } => {
                self.push_system(format!("{username} left the chat"));
                self.set_users(users.clone());
            }
            ServerEvent::RoomUsers { users, .. } => {
                self.set_users(users.clone());
                self.user_count = format!("{} users online", users.len());
            }
            ServerEvent::Typing { username } => {
                self.typing = Some(format!("{username} is typing..."));
            }
            ServerEvent::StopTyping => self.typing = None,
        }
    }

    /// Append a chat line.
    pub fn push_chat(&mut self, username: &str, text: &str, time: &str, own: bool) {
        self.entries.push(ViewEntry::Chat {
            username: username.to_string(),
            text: text.to_string(),
            time: time.to_string(),
            own,
        });
    }

    /// Append a notice.
    pub fn push_system(&mut self, text: impl Into<String>) {
        self.entries.push(ViewEntry::System(text.into()));
    }

    /// Replace the member list.
    pub fn set_users(&mut self, users: Vec<RoomMember>) {
        self.users = users;
    }

    /// Replace the member count label.
    pub fn set_user_count(&mut self, label: impl Into<String>) {
        self.user_count = label.into();
    }

    /// Update the connection indicator.
    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    /// Forget the room: messages, members and typing indicator.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.users.clear();
        self.user_count.clear();
        self.typing = None;
    }

    /// Message list in arrival order.
    #[must_use]
    pub fn entries(&self) -> &[ViewEntry] {
        &self.entries
    }

    /// Current member list.
    #[must_use]
    pub fn users(&self) -> &[RoomMember] {
        &self.users
    }

    /// Member count label, e.g. `3 users online`.
    #[must_use]
    pub fn user_count(&self) -> &str {
        &self.user_count
    }

    /// Typing indicator text, if someone is typing.
    #[must_use]
    pub fn typing_indicator(&self) -> Option<&str> {
        self.typing.as_deref()
    }

    /// Connection indicator.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }
}
