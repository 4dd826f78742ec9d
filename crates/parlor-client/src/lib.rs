//! # Parlor Client
//!
//! Chat session controller for the Parlor relay.
//!
//! A [`ClientSession`] joins one room, sends chat lines, debounces typing
//! notifications and renders relay events into a [`ChatView`]. When the
//! relay cannot be reached at startup the session runs in demo mode and
//! renders everything locally.
//!
//! ## Example
//!
//! ```rust,no_run
//! use parlor_client::{ClientSession, SessionConfig};
//! use parlor_transport::WebSocketConfig;
//!
//! # async fn example() -> Result<(), parlor_client::SessionError> {
//! let (mut session, events) =
//!     ClientSession::connect(WebSocketConfig::default(), SessionConfig::default()).await;
//! session.join("alice", "general")?;
//! session.send_message("hello")?;
//! # drop(events);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod session;
pub mod typing;
pub mod view;

pub use session::{ClientSession, ConnectionState, SessionConfig, SessionError, SessionState};
pub use typing::{TypingNotifier, DEFAULT_TYPING_IDLE};
pub use view::{ChatView, ConnectionStatus, ViewEntry};
