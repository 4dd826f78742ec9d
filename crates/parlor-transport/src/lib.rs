//! # parlor-transport
//!
//! Client-side transport layer for the Parlor chat relay.
//!
//! A client session talks to the relay through an [`EventSink`], which
//! queues outbound [`ClientEvent`](parlor_protocol::ClientEvent)s, and reads
//! what the relay sends back as a stream of [`TransportEvent`]s.
//!
//! ```rust,ignore
//! use parlor_transport::{EventSink, TransportEvent, WebSocketClient, WebSocketConfig};
//!
//! let (client, mut events) = WebSocketClient::connect(WebSocketConfig::new(url)).await?;
//! client.emit(ClientEvent::join_room("alice", "general"))?;
//! while let Some(TransportEvent::Event(event)) = events.recv().await {
//!     // Render event
//! }
//! ```

pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{EventSink, TransportError, TransportEvent};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketClient, WebSocketConfig};
