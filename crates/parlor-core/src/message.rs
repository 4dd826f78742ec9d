//! Chat message stamping.
//!
//! Messages are transient: they exist only while being fanned out.

use chrono::Local;
use parlor_protocol::{ServerEvent, SYSTEM_USERNAME};

pub use parlor_protocol::DEFAULT_TIME_FORMAT;

/// Format the current local time for display.
#[must_use]
pub fn display_time(format: &str) -> String {
    Local::now().format(format).to_string()
}

/// A chat line about to be broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Author display name.
    pub username: String,
    /// Message text.
    pub text: String,
    /// Display-formatted timestamp. Not sortable.
    pub time: String,
}

impl ChatMessage {
    /// Create a message stamped with the current local time.
    #[must_use]
    pub fn new(username: impl Into<String>, text: impl Into<String>, time_format: &str) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
            time: display_time(time_format),
        }
    }

    /// Create a message authored by the relay.
    #[must_use]
    pub fn system(text: impl Into<String>, time_format: &str) -> Self {
        Self::new(SYSTEM_USERNAME, text, time_format)
    }

    /// Create the greeting sent to a connection that just joined.
    #[must_use]
    pub fn welcome(room: &str, username: &str, time_format: &str) -> Self {
        Self::system(format!("Welcome to {room}, {username}!"), time_format)
    }
}

impl From<ChatMessage> for ServerEvent {
    fn from(msg: ChatMessage) -> Self {
        ServerEvent::Message {
            username: msg.username,
            message: msg.text,
            time: msg.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_welcome_message() {
        let msg = ChatMessage::welcome("general", "alice", DEFAULT_TIME_FORMAT);
        assert_eq!(msg.username, "System");
        assert_eq!(msg.text, "Welcome to general, alice!");
        assert!(!msg.time.is_empty());
    }

    #[test]
    fn test_display_time_shape() {
        let time = display_time(DEFAULT_TIME_FORMAT);
        assert!(time.ends_with("AM") || time.ends_with("PM"), "{time}");
        assert_eq!(time.matches(':').count(), 2);
    }

    #[test]
    fn test_into_event() {
        let event: ServerEvent = ChatMessage::new("bob", "hi", "%H:%M").into();
        assert!(matches!(
            event,
            ServerEvent::Message { ref username, ref message, .. }
                if username == "bob" && message == "hi"
        ));
    }
}
