//! # parlor-core
//!
//! Presence tracking, room fan-out, and connection lifecycle for the Parlor
//! chat relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **PresenceStore** - Which connection is in which room, under what name
//! - **BroadcastRouter** - Per-connection outbound queues and room fan-out
//! - **Relay** - Reacts to client events, mutates presence, triggers fan-out
//! - **ChatMessage** - Transient, time-stamped chat lines
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐
//! │  Connection │────▶│    Relay    │────▶│ BroadcastRouter │
//! └─────────────┘     └─────────────┘     └─────────────────┘
//!                            │
//!                            ▼
//!                     ┌───────────────┐
//!                     │ PresenceStore │
//!                     └───────────────┘
//! ```

pub mod connection;
pub mod message;
pub mod presence;
pub mod relay;
pub mod router;

pub use connection::ConnectionId;
pub use message::ChatMessage;
pub use presence::{PresenceStore, RoomListing, RoomSummary, User};
pub use relay::{Relay, RelayConfig, RelayError, RelayStats};
pub use router::{BroadcastRouter, EventReceiver};
