//! Server configuration.
//!
//! Configuration can be loaded from:
//! - An explicit file (`--config` / `PARLOR_CONFIG`)
//! - A TOML file on the default search path
//! - Environment variables (`PORT`, `PARLOR_HOST`) for the bind address

use anyhow::{Context, Result};
use parlor_core::RelayConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Files tried, in order, when no path is given.
const CONFIG_SEARCH_PATH: [&str; 3] = [
    "parlor.toml",
    "/etc/parlor/parlor.toml",
    "~/.config/parlor/parlor.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Relay behavior.
    #[serde(default)]
    pub relay: RelaySettings,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Directory of static client files served at `/`.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent WebSocket connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum WebSocket message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum username length in characters.
    #[serde(default = "default_max_username_length")]
    pub max_username_length: usize,

    /// Maximum room name length in bytes.
    #[serde(default = "default_max_room_name_length")]
    pub max_room_name_length: usize,

    /// Maximum chat message length in bytes.
    #[serde(default = "default_max_chat_length")]
    pub max_chat_length: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Ping interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// Extra silence tolerated after a missed ping, in milliseconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Relay behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// chrono format string for message times.
    #[serde(default = "default_time_format")]
    pub time_format: String,
}

// Default value functions
fn default_host() -> String {
    std::env::var("PARLOR_HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_max_username_length() -> usize {
    parlor_core::relay::MAX_USERNAME_LENGTH
}

fn default_max_room_name_length() -> usize {
    parlor_core::relay::MAX_ROOM_NAME_LENGTH
}

fn default_max_chat_length() -> usize {
    parlor_core::relay::MAX_CHAT_LENGTH
}

fn default_heartbeat_interval() -> u64 {
    25_000
}

fn default_heartbeat_timeout() -> u64 {
    20_000
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_time_format() -> String {
    parlor_core::message::DEFAULT_TIME_FORMAT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
            relay: RelaySettings::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            static_dir: default_static_dir(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            max_username_length: default_max_username_length(),
            max_room_name_length: default_max_room_name_length(),
            max_chat_length: default_max_chat_length(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            time_format: default_time_format(),
        }
    }
}

impl HeartbeatConfig {
    /// Time between pings.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Silence after which a connection is considered dead.
    #[must_use]
    pub fn idle_limit(&self) -> Duration {
        self.interval() + Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from `path`, the default search path, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path cannot be read, or if a found
    /// config file cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        for path in &CONFIG_SEARCH_PATH {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address: {}:{}", self.host, self.port))
    }

    /// Relay settings derived from the limits and relay sections.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            max_username_length: self.limits.max_username_length,
            max_room_name_length: self.limits.max_room_name_length,
            max_chat_length: self.limits.max_chat_length,
            time_format: self.relay.time_format.clone(),
        }
    }
}
