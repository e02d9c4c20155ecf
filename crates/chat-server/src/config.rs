//! Server configuration, loaded from environment variables.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream generation gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Message store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Credit ledger and pricing
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Chunk buffer retention
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Run execution configuration
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Gateway base URL
    #[serde(default = "default_gateway_url")]
    pub base_url: String,

    /// Gateway API key
    #[serde(default)]
    pub api_key: String,

    /// Default model when the request names none
    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout
    #[serde(default = "default_gateway_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Messages kept per conversation before trimming
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Conversation idle expiration
    #[serde(default = "default_store_ttl", with = "humantime_serde")]
    pub ttl: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Lowest balance a debit may leave behind
    #[serde(default)]
    pub balance_floor_microcents: i64,

    /// Markup applied on top of provider-reported cost
    #[serde(default = "default_markup_rate")]
    pub markup_rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    /// Soft cap on tracked runs
    #[serde(default = "default_max_runs")]
    pub max_runs: usize,

    /// Replay window for finished runs
    #[serde(default = "default_terminal_ttl", with = "humantime_serde")]
    pub terminal_ttl: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Directory for per-run journals
    #[serde(default = "default_journal_dir")]
    pub journal_dir: PathBuf,

    /// Upper bound on tool-driven generation iterations
    #[serde(default = "default_max_tool_steps")]
    pub max_tool_steps: usize,

    /// Attempts for the usage persistence step
    #[serde(default = "default_usage_persist_attempts")]
    pub usage_persist_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Resolve the bind address; a malformed `listen_addr` is a
    /// configuration error, not something to paper over.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid listen address: {}", self.listen_addr))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            api_key: String::new(),
            model: default_model(),
            timeout: default_gateway_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            ttl: default_store_ttl(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            balance_floor_microcents: 0,
            markup_rate: default_markup_rate(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_runs: default_max_runs(),
            terminal_ttl: default_terminal_ttl(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            journal_dir: default_journal_dir(),
            max_tool_steps: default_max_tool_steps(),
            usage_persist_attempts: default_usage_persist_attempts(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_gateway_url() -> String {
    "https://gateway.example.com".into()
}

fn default_model() -> String {
    "default-model".into()
}

fn default_gateway_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_messages() -> usize {
    200
}

fn default_store_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_markup_rate() -> f64 {
    0.15
}

fn default_max_runs() -> usize {
    1000
}

fn default_terminal_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_journal_dir() -> PathBuf {
    PathBuf::from("/data/journals")
}

fn default_max_tool_steps() -> usize {
    5
}

fn default_usage_persist_attempts() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(false),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
