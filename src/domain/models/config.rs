//! Typed application configuration with defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for Docaudit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Pipeline execution configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Client-side stream reconnection policy
    #[serde(default)]
    pub stream: StreamRetryConfig,

    /// Schema capability negotiation
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Insights aggregation
    #[serde(default)]
    pub insights: InsightsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// SSE keep-alive comment interval in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    9200
}

const fn default_true() -> bool {
    true
}

const fn default_keep_alive_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: default_true(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".docaudit/docaudit.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// SQLite connection URL for the configured path.
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated JSON log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation policy: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Pipeline execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Ceiling for one whole run, streaming path included
    #[serde(default = "default_overall_timeout_secs")]
    pub overall_timeout_secs: u64,

    /// Ceiling for the blocking fallback invocation; must be shorter than
    /// the overall ceiling
    #[serde(default = "default_fallback_timeout_secs")]
    pub fallback_timeout_secs: u64,

    /// Base URL of the remote stage worker
    #[serde(default)]
    pub stage_worker_url: Option<String>,

    /// Per-stage HTTP request timeout
    #[serde(default = "default_stage_request_timeout_secs")]
    pub stage_request_timeout_secs: u64,

    /// Independent judges polled by the noise stage
    #[serde(default = "default_noise_panel_size")]
    pub noise_panel_size: usize,
}

const fn default_overall_timeout_secs() -> u64 {
    280
}

const fn default_fallback_timeout_secs() -> u64 {
    200
}

const fn default_stage_request_timeout_secs() -> u64 {
    60
}

const fn default_noise_panel_size() -> usize {
    3
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            overall_timeout_secs: default_overall_timeout_secs(),
            fallback_timeout_secs: default_fallback_timeout_secs(),
            stage_worker_url: None,
            stage_request_timeout_secs: default_stage_request_timeout_secs(),
            noise_panel_size: default_noise_panel_size(),
        }
    }
}

/// Stream reconnection policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StreamRetryConfig {
    /// Maximum reconnection attempts after a transport failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for StreamRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Schema capability negotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchemaConfig {
    /// Seconds before a cached "core only" verdict is probed again
    #[serde(default = "default_reprobe_interval_secs")]
    pub reprobe_interval_secs: u64,
}

const fn default_reprobe_interval_secs() -> u64 {
    300
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            reprobe_interval_secs: default_reprobe_interval_secs(),
        }
    }
}

/// Insights aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InsightsConfig {
    /// Entries kept in every frequency table
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Days covered by the weekly trend
    #[serde(default = "default_trend_window_days")]
    pub trend_window_days: i64,
}

const fn default_top_n() -> usize {
    5
}

const fn default_trend_window_days() -> i64 {
    56
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            trend_window_days: default_trend_window_days(),
        }
    }
}
