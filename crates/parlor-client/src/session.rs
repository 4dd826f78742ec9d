//! Client session controller.
//!
//! A session holds one user's view of one room. With a live connection it
//! emits events and renders what the relay echoes back; without one it runs
//! in demo mode and renders everything locally.

use crate::typing::{TypingNotifier, DEFAULT_TYPING_IDLE};
use crate::view::{ChatView, ConnectionStatus};
use chrono::Local;
use parlor_protocol::{ClientEvent, RoomMember, ServerEvent, DEFAULT_TIME_FORMAT};
use parlor_transport::{EventSink, TransportError, TransportEvent, WebSocketClient, WebSocketConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Author name of the canned demo-mode message.
const DEMO_BOT: &str = "Demo Bot";

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Join attempted without a name.
    #[error("Please enter your name")]
    EmptyUsername,

    /// Action requires a joined room.
    #[error("Not in a room")]
    NotJoined,

    /// The live connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Whether the session has a relay to talk to.
#[derive(Clone)]
pub enum ConnectionState {
    /// No relay; the session renders locally.
    Disconnected,
    /// Live connection.
    Connected(Arc<dyn EventSink>),
}

impl ConnectionState {
    fn sink(&self) -> Option<&Arc<dyn EventSink>> {
        match self {
            ConnectionState::Connected(sink) => Some(sink),
            ConnectionState::Disconnected => None,
        }
    }
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("Disconnected"),
            ConnectionState::Connected(sink) => write!(f, "Connected({})", sink.name()),
        }
    }
}

/// Where the user is in the join flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No room yet.
    Unjoined,
    /// In a room.
    Joined {
        /// Display name.
        username: String,
        /// Room name.
        room: String,
    },
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time before `stopTyping` is sent.
    pub typing_idle: Duration,
    /// chrono format string for locally rendered message times.
    pub time_format: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typing_idle: DEFAULT_TYPING_IDLE,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
        }
    }
}

/// One logical chat session.
pub struct ClientSession {
    connection: ConnectionState,
    state: SessionState,
    view: ChatView,
    typing: Option<TypingNotifier>,
    config: SessionConfig,
}

impl ClientSession {
    /// Create a session over the given connection.
    ///
    /// A [`ConnectionState::Disconnected`] session starts in demo mode.
    #[must_use]
    pub fn new(connection: ConnectionState, config: SessionConfig) -> Self {
        let mut session = Self {
            typing: connection
                .sink()
                .map(|sink| TypingNotifier::new(Arc::clone(sink), config.typing_idle)),
            view: ChatView::new(ConnectionStatus::Connected),
            state: SessionState::Unjoined,
            connection,
            config,
        };
        if session.is_demo() {
            session.enter_demo_mode();
        }
        session
    }

    /// Create a demo-mode session.
    #[must_use]
    pub fn demo(config: SessionConfig) -> Self {
        Self::new(ConnectionState::Disconnected, config)
    }

    /// Connect to a relay, falling back to demo mode if it is unreachable.
    ///
    /// Returns the session and, when connected, the stream of transport
    /// events to feed into [`ClientSession::apply_transport`]. There is no
    /// retry: a session that starts in demo mode stays there.
    pub async fn connect(
        ws_config: WebSocketConfig,
        config: SessionConfig,
    ) -> (Self, Option<mpsc::UnboundedReceiver<TransportEvent>>) {
        let url = ws_config.url.clone();
        match WebSocketClient::connect(ws_config).await {
            Ok((client, events)) => {
                let sink: Arc<dyn EventSink> = Arc::new(client);
                (Self::new(ConnectionState::Connected(sink), config), Some(events))
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Relay not available, using demo mode");
                (Self::demo(config), None)
            }
        }
    }

    fn enter_demo_mode(&mut self) {
        self.view.set_status(ConnectionStatus::Demo);
        self.view.push_system("Welcome to the chat demo!");
        let time = self.now();
        self.view.push_chat(
            DEMO_BOT,
            "This is a demo message. Start the relay server to enable real-time chat!",
            &time,
            false,
        );
    }

    /// Whether there is no live connection.
    #[must_use]
    pub fn is_demo(&self) -> bool {
        matches!(self.connection, ConnectionState::Disconnected)
    }

    /// Current connection.
    #[must_use]
    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    /// Current join state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Rendered chat.
    #[must_use]
    pub fn view(&self) -> &ChatView {
        &self.view
    }

    fn username(&self) -> Option<&str> {
        match &self.state {
            SessionState::Joined { username, .. } => Some(username),
            SessionState::Unjoined => None,
        }
    }

    fn now(&self) -> String {
        Local::now().format(&self.config.time_format).to_string()
    }

    /// Join a room.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyUsername`] for a blank name, before any
    /// network activity, or a transport error if the event cannot be queued.
    pub fn join(&mut self, username: &str, room: &str) -> Result<(), SessionError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SessionError::EmptyUsername);
        }

        match self.connection.sink() {
            Some(sink) => sink.emit(ClientEvent::join_room(username, room))?,
            None => {
                self.view
                    .push_system(format!("You joined {room} as {username}"));
                self.view.set_user_count("1 user online (demo mode)");
                self.view.set_users(vec![RoomMember::new("demo", username)]);
            }
        }

        debug!(username = %username, room = %room, "Joined");
        self.state = SessionState::Joined {
            username: username.to_string(),
            room: room.to_string(),
        };
        Ok(())
    }

    /// Send a chat line.
    ///
    /// Returns `Ok(false)` if the trimmed text is empty and nothing was sent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotJoined`] outside a room, or a transport
    /// error if the event cannot be queued.
    pub fn send_message(&mut self, text: &str) -> Result<bool, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }
        let username = self.username().ok_or(SessionError::NotJoined)?.to_string();

        match self.connection.sink() {
            Some(sink) => sink.emit(ClientEvent::chat_message(text))?,
            None => {
                let time = self.now();
                self.view.push_chat(&username, text, &time, true);
            }
        }

        if let Some(typing) = &self.typing {
            typing.stop();
        }
        Ok(true)
    }

    /// Record a keystroke in the message input.
    ///
    /// Must be called from within a tokio runtime. Does nothing in demo mode
    /// or outside a room.
    pub fn keystroke(&self) {
        if self.username().is_none() {
            return;
        }
        if let Some(typing) = &self.typing {
            typing.keystroke();
        }
    }

    /// Leave the current room and reset the view.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the event cannot be queued; the local
    /// state is reset regardless.
    pub fn leave(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Unjoined {
            return Ok(());
        }
        if let Some(typing) = &self.typing {
            typing.stop();
        }

        let result = match self.connection.sink() {
            Some(sink) => sink.emit(ClientEvent::LeaveRoom).map_err(SessionError::from),
            None => Ok(()),
        };

        self.view.clear();
        self.state = SessionState::Unjoined;
        debug!("Left room");
        result
    }

    /// Render an event from the relay.
    pub fn apply(&mut self, event: &ServerEvent) {
        let own = self.username().unwrap_or_default().to_string();
        self.view.apply(event, &own);
    }

    /// React to a transport event.
    pub fn apply_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.view.set_status(ConnectionStatus::Connected),
            TransportEvent::Event(event) => self.apply(&event),
            TransportEvent::Disconnected => {
                info!("Connection to relay lost");
                self.view.set_status(ConnectionStatus::Disconnected);
                self.typing = None;
                self.connection = ConnectionState::Disconnected;
            }
        }
    }

    /// Close the live connection, if any.
    pub async fn close(&mut self) {
        self.typing = None;
        if let ConnectionState::Connected(sink) = &self.connection {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "Close failed");
            }
        }
        self.connection = ConnectionState::Disconnected;
    }
}
