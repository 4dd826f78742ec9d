//! WebSocket transport implementation.
//!
//! This module provides a WebSocket client connection using tokio-tungstenite.
//! One task drains the outbound queue into the socket; another decodes
//! inbound frames and forwards them as [`TransportEvent`]s.

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use parlor_protocol::{codec, ClientEvent, Encoded, Encoding, ServerEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::traits::{EventSink, TransportError, TransportEvent};

/// WebSocket client configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Relay endpoint, e.g. `ws://127.0.0.1:3000/ws`.
    pub url: String,
    /// Encoding for outbound events.
    pub encoding: Encoding,
    /// How long to wait for the handshake.
    pub connect_timeout: Duration,
}

impl WebSocketConfig {
    /// Create a configuration for the given endpoint.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Use a different encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Use a different handshake timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3000/ws".to_string(),
            encoding: Encoding::Json,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

enum Outbound {
    Event(ClientEvent),
    Close,
}

/// A live WebSocket connection to the relay.
pub struct WebSocketClient {
    outbound: mpsc::UnboundedSender<Outbound>,
    connected: Arc<AtomicBool>,
}

impl WebSocketClient {
    /// Connect to the relay.
    ///
    /// Returns the client handle and the stream of inbound transport events.
    /// The stream starts with [`TransportEvent::Connected`] and ends with
    /// [`TransportEvent::Disconnected`].
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails or times out.
    pub async fn connect(
        config: WebSocketConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
        let (stream, _response) =
            tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str()))
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        info!("Connected to {}", config.url);

        let (mut sink, mut source) = stream.split();
        let connected = Arc::new(AtomicBool::new(true));
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let _ = events_tx.send(TransportEvent::Connected);

        let encoding = config.encoding;
        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                let event = match outbound {
                    Outbound::Event(event) => event,
                    Outbound::Close => {
                        let _ = sink.close().await;
                        break;
                    }
                };
                let message = match encoding.encode(&event) {
                    Ok(Encoded::Text(text)) => Message::Text(text),
                    Ok(Encoded::Binary(data)) => Message::Binary(data.to_vec()),
                    Err(e) => {
                        warn!(event = %event.kind(), error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            debug!("Writer task finished");
        });

        let reader_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            let mut read_buffer = BytesMut::with_capacity(4096);
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match codec::decode_json::<ServerEvent>(&text) {
                        Ok(event) => {
                            let _ = events_tx.send(TransportEvent::Event(event));
                        }
                        Err(e) => warn!(error = %e, "Ignoring undecodable text frame"),
                    },
                    Ok(Message::Binary(data)) => {
                        read_buffer.extend_from_slice(&data);
                        loop {
                            match codec::decode_from::<ServerEvent>(&mut read_buffer) {
                                Ok(Some(event)) => {
                                    let _ = events_tx.send(TransportEvent::Event(event));
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(error = %e, "Discarding undecodable binary data");
                                    read_buffer.clear();
                                    break;
                                }
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("Received close frame");
                        break;
                    }
                    Ok(_) => {
                        // Ping/pong are answered by tungstenite
                    }
                    Err(e) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            let _ = events_tx.send(TransportEvent::Disconnected);
            info!("Disconnected from relay");
        });

        Ok((
            Self {
                outbound: outbound_tx,
                connected,
            },
            events_rx,
        ))
    }
}

#[async_trait]
impl EventSink for WebSocketClient {
    fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(Outbound::Event(event))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already closed
        }
        self.outbound
            .send(Outbound::Close)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_protocol::RoomMember;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::WebSocketStream;

    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(stream).await.unwrap()
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for transport event")
            .expect("event stream ended")
    }

    #[tokio::test]
    async fn test_json_exchange_and_remote_close() {
        let (listener, url) = listen().await;
        let reply = ServerEvent::message("alice", "hi", "1:00:00 PM");
        let server_reply = reply.clone();

        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            let received = match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => codec::decode_json::<ClientEvent>(&text).unwrap(),
                other => panic!("expected text frame, got {other:?}"),
            };
            let text = codec::encode_json(&server_reply).unwrap();
            ws.send(Message::Text(text)).await.unwrap();
            ws.close(None).await.unwrap();
            received
        });

        let (client, mut events) = WebSocketClient::connect(WebSocketConfig::new(url))
            .await
            .unwrap();
        assert!(client.is_connected());
        assert_eq!(client.name(), "websocket");
        client.emit(ClientEvent::join_room("alice", "general")).unwrap();

        assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
        assert_eq!(next_event(&mut events).await, TransportEvent::Event(reply));
        assert_eq!(next_event(&mut events).await, TransportEvent::Disconnected);

        assert!(!client.is_connected());
        assert!(matches!(
            client.emit(ClientEvent::Typing),
            Err(TransportError::ConnectionClosed)
        ));
        assert_eq!(
            server.await.unwrap(),
            ClientEvent::join_room("alice", "general")
        );
    }

    #[tokio::test]
    async fn test_messagepack_exchange() {
        let (listener, url) = listen().await;
        let reply = ServerEvent::RoomUsers {
            room: "general".into(),
            users: vec![RoomMember::new("c1", "alice")],
        };
        let server_reply = reply.clone();

        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            let received = match ws.next().await.unwrap().unwrap() {
                Message::Binary(data) => codec::decode::<ClientEvent>(&data).unwrap(),
                other => panic!("expected binary frame, got {other:?}"),
            };
            let data = codec::encode(&server_reply).unwrap();
            ws.send(Message::Binary(data.to_vec())).await.unwrap();
            // Hold the socket open until the client hangs up
            while let Some(Ok(_)) = ws.next().await {}
            received
        });

        let config = WebSocketConfig::new(url).with_encoding(Encoding::MessagePack);
        let (client, mut events) = WebSocketClient::connect(config).await.unwrap();
        client.emit(ClientEvent::chat_message("hi")).unwrap();

        assert_eq!(next_event(&mut events).await, TransportEvent::Connected);
        assert_eq!(next_event(&mut events).await, TransportEvent::Event(reply));

        client.close().await.unwrap();
        assert_eq!(next_event(&mut events).await, TransportEvent::Disconnected);
        assert_eq!(server.await.unwrap(), ClientEvent::chat_message("hi"));
    }

    #[tokio::test]
    async fn test_local_close_sends_close_frame() {
        let (listener, url) = listen().await;

        let server = tokio::spawn(async move {
            let mut ws = accept(&listener).await;
            matches!(ws.next().await, Some(Ok(Message::Close(_))))
        });

        let (client, mut events) = WebSocketClient::connect(WebSocketConfig::new(url))
            .await
            .unwrap();
        assert_eq!(next_event(&mut events).await, TransportEvent::Connected);

        client.close().await.unwrap();
        assert!(!client.is_connected());
        // Closing twice is a no-op
        client.close().await.unwrap();
        assert!(matches!(
            client.emit(ClientEvent::LeaveRoom),
            Err(TransportError::ConnectionClosed)
        ));

        assert!(server.await.unwrap());
        assert_eq!(next_event(&mut events).await, TransportEvent::Disconnected);
    }

    #[test]
    fn test_websocket_config_default() {
        let config = WebSocketConfig::default();
        assert_eq!(config.url, "ws://127.0.0.1:3000/ws");
        assert_eq!(config.encoding, Encoding::Json);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_websocket_config_builder() {
        let config = WebSocketConfig::new("ws://example.test/ws")
            .with_encoding(Encoding::MessagePack)
            .with_connect_timeout(Duration::from_millis(250));
        assert_eq!(config.url, "ws://example.test/ws");
        assert_eq!(config.encoding, Encoding::MessagePack);
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = WebSocketConfig::new(format!("ws://{addr}/ws"))
            .with_connect_timeout(Duration::from_secs(2));
        assert!(WebSocketClient::connect(config).await.is_err());
    }
}
