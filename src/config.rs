//! Configuration parsing for Tether.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Fail-fast validation of malformed values

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::backoff::ReconnectPolicy;
use crate::cache::CacheOptions;

/// Error type for configuration values clap cannot reject on its own.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cache host must not be empty")]
    EmptyCacheHost,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("retry ceiling ({ceiling_ms}ms) is below retry step ({step_ms}ms)")]
    CeilingBelowStep { step_ms: u64, ceiling_ms: u64 },

    #[error("unsupported database url '{0}': expected file:<path> or a filesystem path")]
    UnsupportedDatabaseUrl(String),
}

/// Tether: database and cache clients with reconnect backoff.
#[derive(Parser, Debug, Clone)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Cache server host
    #[arg(long, env = "REDIS_HOST", default_value = "cache")]
    pub cache_host: String,

    /// Cache server port
    #[arg(long, env = "REDIS_PORT", default_value_t = 6379)]
    pub cache_port: u16,

    /// Timeout for a single cache connect attempt, in milliseconds
    #[arg(long, env = "CACHE_CONNECT_TIMEOUT_MS", default_value_t = 10_000)]
    pub cache_connect_timeout_ms: u64,

    /// Timeout for a single cache command, in milliseconds
    #[arg(long, env = "CACHE_COMMAND_TIMEOUT_MS", default_value_t = 5_000)]
    pub cache_command_timeout_ms: u64,

    /// Reconnect delay added per consecutive failure, in milliseconds
    #[arg(long, env = "CACHE_RETRY_STEP_MS", default_value_t = 50)]
    pub cache_retry_step_ms: u64,

    /// Maximum reconnect delay, in milliseconds
    #[arg(long, env = "CACHE_RETRY_CEILING_MS", default_value_t = 2000)]
    pub cache_retry_ceiling_ms: u64,

    /// Commands buffered while the cache is unreachable
    #[arg(long, env = "CACHE_QUEUE_SIZE", default_value_t = 256)]
    pub cache_queue_size: usize,

    /// Database location (file:<path> or a plain path)
    #[arg(long, env = "DATABASE_URL", default_value = "file:./data/app.db")]
    pub database_url: String,

    /// Size of the database connection pool
    #[arg(long, env = "DATABASE_POOL_SIZE", default_value_t = 10)]
    pub database_pool_size: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,

    /// Run a one-shot health check, print it as JSON and exit
    #[arg(long)]
    pub check: bool,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check invariants that clap's type parsing does not cover.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_host.trim().is_empty() {
            return Err(ConfigError::EmptyCacheHost);
        }
        if self.cache_connect_timeout_ms == 0 {
            return Err(ConfigError::Zero("cache connect timeout"));
        }
        if self.cache_command_timeout_ms == 0 {
            return Err(ConfigError::Zero("cache command timeout"));
        }
        if self.cache_queue_size == 0 {
            return Err(ConfigError::Zero("cache queue size"));
        }
        if self.database_pool_size == 0 {
            return Err(ConfigError::Zero("database pool size"));
        }
        if self.cache_retry_ceiling_ms < self.cache_retry_step_ms {
            return Err(ConfigError::CeilingBelowStep {
                step_ms: self.cache_retry_step_ms,
                ceiling_ms: self.cache_retry_ceiling_ms,
            });
        }
        self.database_path()?;
        Ok(())
    }

    /// Resolve the database URL to a filesystem path.
    ///
    /// Accepts `file:<path>` and bare paths. Any other `scheme://` is rejected.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        let url = self.database_url.trim();
        let path = match url.strip_prefix("file:") {
            Some(rest) => rest.strip_prefix("//").unwrap_or(rest),
            None if url.contains("://") => {
                return Err(ConfigError::UnsupportedDatabaseUrl(url.to_string()))
            }
            None => url,
        };
        if path.is_empty() {
            return Err(ConfigError::UnsupportedDatabaseUrl(url.to_string()));
        }
        Ok(PathBuf::from(path))
    }

    /// Reconnect policy for the cache client.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.cache_retry_step_ms),
            Duration::from_millis(self.cache_retry_ceiling_ms),
        )
    }

    /// Connection options for the cache client.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            host: self.cache_host.clone(),
            port: self.cache_port,
            connect_timeout: Duration::from_millis(self.cache_connect_timeout_ms),
            command_timeout: Duration::from_millis(self.cache_command_timeout_ms),
            queue_size: self.cache_queue_size,
            policy: self.reconnect_policy(),
        }
    }

    /// Create a configuration pointing at local test services.
    pub fn test_config(data_dir: PathBuf, cache_port: u16) -> Self {
        Self {
            cache_host: "127.0.0.1".into(),
            cache_port,
            cache_connect_timeout_ms: 500,
            cache_command_timeout_ms: 1_000,
            cache_retry_step_ms: 10,
            cache_retry_ceiling_ms: 50,
            cache_queue_size: 16,
            database_url: format!("file:{}", data_dir.join("test.db").display()),
            database_pool_size: 2,
            log_level: "debug".into(),
            otel_endpoint: None,
            check: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_host: "cache".into(),
            cache_port: 6379,
            cache_connect_timeout_ms: 10_000,
            cache_command_timeout_ms: 5_000,
            cache_retry_step_ms: 50,
            cache_retry_ceiling_ms: 2000,
            cache_queue_size: 256,
            database_url: "file:./data/app.db".into(),
            database_pool_size: 10,
            log_level: "info".into(),
            otel_endpoint: None,
            check: false,
        }
    }
}
