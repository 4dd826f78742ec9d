//! # Parlor Server
//!
//! Real-time chat relay: rooms, presence and typing indicators over
//! WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! parlor
//!
//! # Run with custom config
//! parlor --config /path/to/parlor.toml
//!
//! # Run with environment variables
//! PORT=8080 PARLOR_HOST=127.0.0.1 parlor
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "parlor", version, about = "Real-time chat relay server")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long, env = "PARLOR_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = config::Config::load(args.config.as_deref())?;

    tracing::info!("Starting Parlor server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
