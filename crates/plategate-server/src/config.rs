//! Server configuration loading from file and environment variables.

use plategate_dispatch::FailurePolicy;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level plugin configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Event bus settings.
    #[serde(default)]
    pub bus: BusConfig,

    /// Outbox publisher settings.
    #[serde(default)]
    pub outbox: OutboxConfig,

    /// Inbound dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Broker self-registration settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Camera webhook settings.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Route prefix the plugin API is served under.
    #[serde(default = "default_base_api_route")]
    pub base_api_route: String,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "plategate_outbox=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Whether the bus (and with it the publisher and listener) runs at
    /// all. Disabled, the plugin still records scans and accumulates outbox
    /// rows for a later deployment with the bus enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-channel message buffer size.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

/// Outbox publisher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    /// Seconds between drain ticks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum pending events fetched per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Publish attempts before an event is parked as a dead letter.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Inbound dispatch configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Bus channel the listener subscribes to.
    #[serde(default = "default_events_channel")]
    pub channel: String,

    /// Maximum handlers running concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// What to do with a message whose handler failed.
    #[serde(default)]
    pub on_handler_failure: FailurePolicy,
}

/// Broker self-registration configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Whether to register with the broker on startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Broker base URL.
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// Bearer token sent with the registration request.
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// Camera webhook configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    /// Bearer token cameras must present. Left unset, a well-known insecure
    /// default is used and a warning is logged at startup.
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    9002
}

fn default_base_api_route() -> String {
    "/api/licenseplate".to_string()
}

fn default_db_path() -> String {
    "plategate.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    256
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_batch_size() -> u32 {
    50
}

fn default_max_attempts() -> u32 {
    10
}

fn default_events_channel() -> String {
    "events".to_string()
}

fn default_max_concurrency() -> usize {
    16
}

fn default_broker_url() -> String {
    "http://localhost:8081".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_api_route: default_base_api_route(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            channel: default_events_channel(),
            max_concurrency: default_max_concurrency(),
            on_handler_failure: FailurePolicy::default(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_broker_url(),
            auth_token: None,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PLATEGATE_HOST` overrides `server.host`
/// - `PLATEGATE_PORT` overrides `server.port`
/// - `PLATEGATE_BASE_API_ROUTE` overrides `server.base_api_route`
/// - `PLATEGATE_DB_PATH` overrides `database.path`
/// - `PLATEGATE_LOG_LEVEL` overrides `logging.level`
/// - `PLATEGATE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `PLATEGATE_BROKER_URL` overrides `broker.url`
/// - `PLATEGATE_BROKER_AUTH_TOKEN` overrides `broker.auth_token`
/// - `PLATEGATE_WEBHOOK_API_KEY` overrides `webhook.api_key`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("PLATEGATE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("PLATEGATE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(route) = std::env::var("PLATEGATE_BASE_API_ROUTE") {
        config.server.base_api_route = route;
    }
    if let Ok(db_path) = std::env::var("PLATEGATE_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("PLATEGATE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("PLATEGATE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(url) = std::env::var("PLATEGATE_BROKER_URL") {
        config.broker.url = url;
    }
    if let Ok(token) = std::env::var("PLATEGATE_BROKER_AUTH_TOKEN") {
        config.broker.auth_token = Some(token);
    }
    if let Ok(key) = std::env::var("PLATEGATE_WEBHOOK_API_KEY") {
        config.webhook.api_key = Some(key);
    }

    Ok(config)
}
