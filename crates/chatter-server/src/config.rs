//! Server configuration.
//!
//! Configuration is loaded from:
//! - A TOML file (`--config <path>` or the first of the default paths)
//! - Environment variables (`CHATTER_*`, nested keys separated by `__`,
//!   e.g. `CHATTER_AUTH__JWT_SECRET`)
//!
//! Environment variables override the file.

use anyhow::{bail, Context, Result};
use chatter_core::HubConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Default configuration file locations, in lookup order.
const CONFIG_PATHS: [&str; 3] = [
    "chatter.toml",
    "/etc/chatter/chatter.toml",
    "~/.config/chatter/chatter.toml",
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

    /// Token verification.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Chat behaviour.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Token verification configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret. Falls back to `JWT_SECRET`.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Tolerated clock skew on token expiry, in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of admitted connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Per-connection outbound queue capacity.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

/// Chat behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum message length in characters.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Send "joined"/"left" notifications.
    #[serde(default = "default_true")]
    pub announce_presence: bool,

    /// Messages retained by the in-memory store.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
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

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_default()
}

fn default_leeway() -> u64 {
    30
}

fn default_max_connections() -> usize {
    10_000
}

fn default_outbox_capacity() -> usize {
    256
}

fn default_max_content_length() -> usize {
    4096
}

fn default_history_limit() -> usize {
    chatter_core::DEFAULT_HISTORY_LIMIT
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            auth: AuthConfig::default(),
            limits: LimitsConfig::default(),
            chat: ChatConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            leeway_secs: default_leeway(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_content_length: default_max_content_length(),
            announce_presence: true,
            history_limit: default_history_limit(),
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

impl Config {
    /// Load configuration from the default paths (or defaults), then apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// the result is invalid.
    pub fn load() -> Result<Self> {
        for path in &CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Self::default().with_env_overrides()?.validated()
    }

    /// Load configuration from a specific file, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// result is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.with_env_overrides()?.validated()
    }

    /// Layer `CHATTER_*` environment variables over this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be converted to its field type.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(Self::environment())
    }

    fn environment() -> ::config::Environment {
        ::config::Environment::with_prefix("CHATTER")
            .prefix_separator("_")
            .separator("__")
    }

    fn with_overrides(self, environment: ::config::Environment) -> Result<Self> {
        let layered = ::config::Config::builder()
            .add_source(::config::Config::try_from(&self).context("Failed to layer config")?)
            .add_source(environment)
            .build()
            .context("Failed to read environment overrides")?;

        layered
            .try_deserialize()
            .context("Invalid environment override")
    }

    /// Check the configuration for values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first problem found.
    pub fn validated(self) -> Result<Self> {
        if self.auth.jwt_secret.is_empty() {
            bail!("auth.jwt_secret is not set (use CHATTER_AUTH__JWT_SECRET or JWT_SECRET)");
        }
        if !self.transport.websocket_path.starts_with('/') {
            bail!(
                "transport.websocket_path must start with '/': {}",
                self.transport.websocket_path
            );
        }
        if self.limits.outbox_capacity == 0 {
            bail!("limits.outbox_capacity must be at least 1");
        }
        Ok(self)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }

    /// Hub settings derived from this configuration.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            outbox_capacity: self.limits.outbox_capacity,
            max_content_length: self.chat.max_content_length,
            announce_presence: self.chat.announce_presence,
        }
    }
}
