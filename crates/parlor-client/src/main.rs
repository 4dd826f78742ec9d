//! # Parlor Chat
//!
//! Terminal client for the Parlor relay.
//!
//! ## Usage
//!
//! ```bash
//! # Join the default relay
//! parlor-chat --username alice --room general
//!
//! # Point at another relay
//! PARLOR_URL=ws://chat.example.com/ws parlor-chat -u bob
//! ```
//!
//! Lines typed on stdin are sent as chat messages. `/join <name> [room]`
//! joins or switches rooms, `/leave` leaves the current one and `/quit` exits.

use anyhow::Result;
use clap::Parser;
use parlor_client::{ChatView, ClientSession, SessionConfig, SessionError, SessionState};
use parlor_transport::WebSocketConfig;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "parlor-chat", version, about = "Terminal client for the Parlor chat relay")]
struct Args {
    /// Relay WebSocket endpoint
    #[arg(long, env = "PARLOR_URL", default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    /// Display name
    #[arg(short, long)]
    username: Option<String>,

    /// Room to join
    #[arg(short, long, default_value = "general")]
    room: String,

    /// Seconds to wait for the relay before falling back to demo mode
    #[arg(long, default_value_t = 5)]
    connect_timeout: u64,
}

/// Prints what changed in the view since the last call.
#[derive(Default)]
struct Printer {
    printed: usize,
    typing: Option<String>,
    user_count: String,
}

impl Printer {
    fn flush(&mut self, view: &ChatView) {
        let entries = view.entries();
        if entries.len() < self.printed {
            self.printed = 0;
        }
        for entry in &entries[self.printed..] {
            println!("{entry}");
        }
        self.printed = entries.len();

        if view.user_count() != self.user_count {
            self.user_count = view.user_count().to_string();
            if !self.user_count.is_empty() {
                let names: Vec<&str> = view.users().iter().map(|u| u.username.as_str()).collect();
                println!(" * {} ({})", self.user_count, names.join(", "));
            }
        }

        let typing = view.typing_indicator().map(str::to_string);
        if typing != self.typing {
            if let Some(text) = &typing {
                println!(" * {text}");
            }
            self.typing = typing;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let ws_config = WebSocketConfig::new(args.url)
        .with_connect_timeout(Duration::from_secs(args.connect_timeout));

    let (mut session, mut events) =
        ClientSession::connect(ws_config, SessionConfig::default()).await;
    let mut printer = Printer::default();
    println!(" * {}", session.view().status());
    printer.flush(session.view());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut room = args.room;

    match args.username {
        Some(username) => join(&mut session, &username, &room),
        None => println!(" * Enter your name:"),
    }
    printer.flush(session.view());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();

                if session.state() == &SessionState::Unjoined
                    && !line.starts_with('/')
                {
                    join(&mut session, line, &room);
                } else if line == "/quit" {
                    break;
                } else if line == "/leave" {
                    if let Err(e) = session.leave() {
                        warn!(error = %e, "Leave failed");
                    }
                    println!(" * Left {room}. Enter your name to rejoin:");
                } else if let Some(rest) = line.strip_prefix("/join ") {
                    let mut parts = rest.split_whitespace();
                    let Some(username) = parts.next() else {
                        println!(" * Usage: /join <name> [room]");
                        continue;
                    };
                    if let Some(next) = parts.next() {
                        room = next.to_string();
                    }
                    join(&mut session, username, &room);
                } else if let Err(e) = session.send_message(line) {
                    println!(" * {e}");
                }
            }
            Some(event) = async {
                match events.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                session.apply_transport(event);
                if session.is_demo() {
                    println!(" * {}", session.view().status());
                    events = None;
                }
            }
        }
        printer.flush(session.view());
    }

    session.close().await;
    Ok(())
}

fn join(session: &mut ClientSession, username: &str, room: &str) {
    match session.join(username, room) {
        Ok(()) => {}
        Err(SessionError::EmptyUsername) => println!(" * {}", SessionError::EmptyUsername),
        Err(e) => println!(" * Failed to join: {e}"),
    }
}
