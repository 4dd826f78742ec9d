//! # parlor-protocol
//!
//! Wire protocol definitions for the Parlor chat relay.
//!
//! This crate defines the events exchanged between chat clients and the
//! relay, plus the codecs that put them on the wire.
//!
//! ## Events
//!
//! - `joinRoom` / `leaveRoom` - Room membership
//! - `chatMessage` / `message` - Chat lines
//! - `typing` / `stopTyping` - Typing indicators
//! - `userJoined` / `userLeft` / `roomUsers` - Presence updates
//!
//! ## Example
//!
//! ```rust
//! use parlor_protocol::{codec, ClientEvent};
//!
//! let event = ClientEvent::join_room("alice", "general");
//!
//! let text = codec::encode_json(&event).unwrap();
//! let decoded: ClientEvent = codec::decode_json(&text).unwrap();
//! assert_eq!(event, decoded);
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, decode_json, encode, encode_json, Encoded, Encoding, ProtocolError};
pub use events::{
    ClientEvent, EventKind, RoomMember, ServerEvent, DEFAULT_TIME_FORMAT, SYSTEM_USERNAME,
};
