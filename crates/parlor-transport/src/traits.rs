//! Transport abstraction traits for Parlor clients.
//!
//! These traits define what a chat session needs from a live connection,
//! allowing the session controller to be transport-agnostic.

use async_trait::async_trait;
use parlor_protocol::{ClientEvent, ServerEvent};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection attempt timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Failed to establish the connection.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] parlor_protocol::ProtocolError),
}

/// Something observed on a client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established.
    Connected,
    /// The relay sent an event.
    Event(ServerEvent),
    /// The connection is gone and will not come back.
    Disconnected,
}

/// The outbound half of a live connection to the relay.
///
/// `emit` only queues the event, so callers can use it from synchronous
/// code and rely on events leaving in the order they were emitted.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Queue an event for delivery to the relay.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionClosed`] if the connection is gone.
    fn emit(&self, event: ClientEvent) -> Result<(), TransportError>;

    /// Check if the connection is still open.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;

    /// Get the transport name (e.g., "websocket").
    fn name(&self) -> &'static str {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NullSink {
        open: AtomicBool,
    }

    #[async_trait]
    impl EventSink for NullSink {
        fn emit(&self, _event: ClientEvent) -> Result<(), TransportError> {
            if self.is_connected() {
                Ok(())
            } else {
                Err(TransportError::ConnectionClosed)
            }
        }

        fn is_connected(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.open.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_as_trait_object() {
        let sink: Box<dyn EventSink> = Box::new(NullSink {
            open: AtomicBool::new(true),
        });
        assert_eq!(sink.name(), "unknown");
        assert!(sink.emit(ClientEvent::Typing).is_ok());

        sink.close().await.unwrap();
        assert!(matches!(
            sink.emit(ClientEvent::Typing),
            Err(TransportError::ConnectionClosed)
        ));
    }
}
