//! Connection handlers for Parlor server.
//!
//! This module serves the HTTP surface and drives each WebSocket through the
//! relay: inbound frames are decoded and handed to [`Relay::handle`], and the
//! connection's outbound queue is drained back into the socket.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, Direction};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parlor_core::{ConnectionId, Relay, RelayStats, RoomListing};
use parlor_protocol::{codec, ClientEvent, Encoded, Encoding, EventKind, ServerEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{Instant, MissedTickBehavior};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, trace, warn};

/// Shared server state.
pub struct AppState {
    /// The chat relay.
    pub relay: Relay,
    /// Server configuration.
    pub config: Config,
    connections: AtomicUsize,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            relay: Relay::with_config(config.relay_config()),
            config,
            connections: AtomicUsize::new(0),
        }
    }

    /// Number of open WebSocket connections.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn try_acquire_slot(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let max = self.config.limits.max_connections;
        self.connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(ConnectionSlot {
            state: Arc::clone(self),
        })
    }
}

/// One unit of the connection limit, released on drop.
struct ConnectionSlot {
    state: Arc<AppState>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.state.connections.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    let ws_path = state.config.transport.websocket_path.clone();
    let static_files = ServeDir::new(&state.config.transport.static_dir);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/rooms", get(rooms_handler))
        .route(&ws_path, get(ws_handler))
        .fallback_service(static_files)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let ws_path = config.transport.websocket_path.clone();
    let app = router(Arc::new(AppState::new(config)));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Parlor server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, ws_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "OK",
        "message": "Chat server is running"
    }))
}

/// Room and user counts.
async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<RelayStats> {
    Json(state.relay.stats())
}

/// Member list of every live room.
async fn rooms_handler(State(state): State<Arc<AppState>>) -> Json<Vec<RoomListing>> {
    Json(state.relay.room_listings())
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let Some(slot) = state.try_acquire_slot() else {
        warn!(
            max = state.config.limits.max_connections,
            "Connection limit reached, rejecting upgrade"
        );
        metrics::record_error("connection_limit");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, slot))
}

/// Handle a WebSocket connection from upgrade to close.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, _slot: ConnectionSlot) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    let mut outbox = state.relay.connect(&connection_id);
    debug!(
        connection = %connection_id,
        active = state.active_connections(),
        "WebSocket connected"
    );

    let (mut sender, mut receiver) = socket.split();

    // MessagePack from the first binary frame on
    let mut encoding = Encoding::Json;
    let mut read_buffer = BytesMut::with_capacity(4096);

    let interval = state.config.heartbeat.interval();
    let idle_limit = state.config.heartbeat.idle_limit();
    let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            biased;

            // Events the relay queued for this connection
            Some(event) = outbox.recv() => {
                if let Err(e) = send_event(&mut sender, encoding, &event).await {
                    debug!(connection = %connection_id, error = %e, "Send failed");
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                last_seen = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match codec::decode_json::<ClientEvent>(&text) {
                            Ok(event) => dispatch(&state, &connection_id, event, text.len()),
                            Err(e) => {
                                debug!(connection = %connection_id, error = %e, "Dropping malformed text frame");
                                metrics::record_dropped("malformed");
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if encoding != Encoding::MessagePack {
                            debug!(connection = %connection_id, "Switching to MessagePack");
                            encoding = Encoding::MessagePack;
                        }
                        read_buffer.extend_from_slice(&data);

                        loop {
                            let before = read_buffer.len();
                            match codec::decode_from::<ClientEvent>(&mut read_buffer) {
                                Ok(Some(event)) => {
                                    let size = before - read_buffer.len();
                                    dispatch(&state, &connection_id, event, size);
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    debug!(connection = %connection_id, error = %e, "Discarding malformed binary data");
                                    metrics::record_dropped("malformed");
                                    read_buffer.clear();
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if last_seen.elapsed() > idle_limit {
                    info!(connection = %connection_id, "Heartbeat timed out, closing connection");
                    metrics::record_error("heartbeat_timeout");
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Every exit path goes through disconnect so presence never goes stale
    state.relay.disconnect(&connection_id);
    metrics::set_presence(state.relay.room_count(), state.relay.total_users());
    let _ = sender.close().await;

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Hand a decoded event to the relay.
fn dispatch(state: &AppState, connection_id: &ConnectionId, event: ClientEvent, size: usize) {
    let kind = event.kind();
    metrics::record_event(Direction::Inbound, kind, size);

    let start = Instant::now();
    match state.relay.handle(connection_id, event) {
        Ok(()) => trace!(connection = %connection_id, event = %kind, "Event handled"),
        Err(e) => {
            debug!(connection = %connection_id, event = %kind, error = %e, "Event dropped");
            metrics::record_dropped(e.reason());
        }
    }
    metrics::record_latency(start.elapsed().as_secs_f64());

    if matches!(kind, EventKind::JoinRoom | EventKind::LeaveRoom) {
        metrics::set_presence(state.relay.room_count(), state.relay.total_users());
    }
}

/// Encode an event for this connection and send it.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    encoding: Encoding,
    event: &ServerEvent,
) -> Result<()> {
    let encoded = encoding.encode(event)?;
    metrics::record_event(Direction::Outbound, event.kind(), encoded.len());

    let message = match encoded {
        Encoded::Text(text) => Message::Text(text),
        Encoded::Binary(data) => Message::Binary(data.to_vec()),
    };
    sender.send(message).await?;
    Ok(())
}
