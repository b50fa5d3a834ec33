//! Layered config loading: defaults, project YAML, then `DOCAUDIT_` environment variables.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid max_retries: {0}. Cannot be 0")]
    InvalidMaxRetries(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error(
        "Invalid backoff configuration: {0} retries starting at {1}ms would exceed max_backoff_ms ({2}) and stop growing"
    )]
    BackoffPlateau(u32, u64, u64),

    #[error("Invalid overall_timeout_secs: must be positive")]
    ZeroOverallTimeout,

    #[error(
        "Invalid pipeline timeouts: fallback_timeout_secs ({0}) must be less than overall_timeout_secs ({1})"
    )]
    FallbackNotShorter(u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Project-local config file, created by `docaudit init`.
pub const PROJECT_CONFIG_PATH: &str = ".docaudit/config.yaml";
/// Optional local overrides.
pub const LOCAL_CONFIG_PATH: &str = ".docaudit/local.yaml";
/// Prefix for environment overrides, nested keys split on `__`.
pub const ENV_PREFIX: &str = "DOCAUDIT_";

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .docaudit/config.yaml
    /// 3. .docaudit/local.yaml
    /// 4. Environment variables (DOCAUDIT_* prefix, `__` between nested keys)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(PROJECT_CONFIG_PATH))
            .merge(Yaml::file(LOCAL_CONFIG_PATH))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        if config.stream.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries(config.stream.max_retries));
        }

        if config.stream.initial_backoff_ms >= config.stream.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.stream.initial_backoff_ms,
                config.stream.max_backoff_ms,
            ));
        }

        // Every reconnect must wait longer than the one before it.
        let stream = &config.stream;
        let last_delay = 1u64
            .checked_shl(stream.max_retries - 1)
            .and_then(|factor| stream.initial_backoff_ms.checked_mul(factor));
        if last_delay.is_none_or(|delay| delay > stream.max_backoff_ms) {
            return Err(ConfigError::BackoffPlateau(
                stream.max_retries,
                stream.initial_backoff_ms,
                stream.max_backoff_ms,
            ));
        }

        let pipeline = &config.pipeline;
        if pipeline.overall_timeout_secs == 0 {
            return Err(ConfigError::ZeroOverallTimeout);
        }

        // A blocking retry must never outlive the request.
        if pipeline.fallback_timeout_secs >= pipeline.overall_timeout_secs {
            return Err(ConfigError::FallbackNotShorter(
                pipeline.fallback_timeout_secs,
                pipeline.overall_timeout_secs,
            ));
        }

        if pipeline.noise_panel_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pipeline.noise_panel_size must be at least 1".to_string(),
            ));
        }

        if config.insights.trend_window_days <= 0 {
            return Err(ConfigError::ValidationFailed(
                "insights.trend_window_days must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 9200);
        assert_eq!(config.database.path, ".docaudit/docaudit.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.pipeline.overall_timeout_secs, 280);
        assert_eq!(config.pipeline.fallback_timeout_secs, 200);
        assert_eq!(config.stream.max_retries, 3);
        assert_eq!(config.insights.top_n, 5);
        assert_eq!(config.insights.trend_window_days, 56);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
server:
  port: 8088
database:
  path: /custom/path.db
  max_connections: 5
logging:
  level: debug
  format: pretty
pipeline:
  stage_worker_url: http://worker:9300
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.server.port, 8088);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.pipeline.stage_worker_url.as_deref(), Some("http://worker:9300"));
        assert_eq!(config.pipeline.overall_timeout_secs, 280);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyDatabasePath)));
    }

    #[test]
    fn test_validate_zero_max_connections() {
        let mut config = Config::default();
        config.database.max_connections = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConnections(0))
        ));
    }

    #[test]
    fn test_validate_stream_retry_policy() {
        let mut config = Config::default();
        config.stream.max_retries = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxRetries(0))
        ));

        let mut config = Config::default();
        config.stream.initial_backoff_ms = 5000;
        config.stream.max_backoff_ms = 5000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(5000, 5000))
        ));
    }

    #[test]
    fn test_validate_backoff_keeps_growing() {
        let mut config = Config::default();
        config.stream.max_retries = 5;
        config.stream.initial_backoff_ms = 1000;
        config.stream.max_backoff_ms = 16_000;
        ConfigLoader::validate(&config).expect("1s doubling four times reaches exactly 16s");

        config.stream.max_retries = 6;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::BackoffPlateau(6, 1000, 16_000))
        ));

        config.stream.max_retries = 200;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::BackoffPlateau(200, _, _))
        ));
    }

    #[test]
    fn test_validate_fallback_must_be_shorter() {
        let mut config = Config::default();
        config.pipeline.fallback_timeout_secs = config.pipeline.overall_timeout_secs;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::FallbackNotShorter(280, 280))
        ));

        config.pipeline.overall_timeout_secs = 0;
        config.pipeline.fallback_timeout_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroOverallTimeout)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "pipeline:\n  overall_timeout_secs: 60\n  fallback_timeout_secs: 45").unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.pipeline.overall_timeout_secs, 60);
        assert_eq!(config.pipeline.fallback_timeout_secs, 45);
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "pipeline:\n  overall_timeout_secs: 60\n  fallback_timeout_secs: 90").unwrap();
        file.flush().unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("fallback_timeout_secs"));
    }

    #[test]
    fn test_env_override() {
        temp_env::with_vars(
            [
                ("DOCAUDIT_SERVER__PORT", Some("9999")),
                ("DOCAUDIT_LOGGING__LEVEL", Some("debug")),
                ("DOCAUDIT_PIPELINE__STAGE_WORKER_URL", Some("http://worker:9300")),
            ],
            || {
                let config = ConfigLoader::load().expect("env overrides should load");
                assert_eq!(config.server.port, 9999);
                assert_eq!(config.logging.level, "debug");
                assert_eq!(config.pipeline.stage_worker_url.as_deref(), Some("http://worker:9300"));
            },
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(base_file, "insights:\n  top_n: 3\nlogging:\n  level: info\n  format: pretty").unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "insights:\n  top_n: 8\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.insights.top_n, 8, "Override should win");
        assert_eq!(config.logging.level, "debug", "Override should win for nested fields");
        assert_eq!(config.logging.format, "pretty", "Base value should persist when not overridden");
        assert_eq!(config.insights.trend_window_days, 56);
    }
}
