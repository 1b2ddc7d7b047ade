//! Runtime configuration for Spectro.
//!
//! Defaults live as plain functions, `from_env` overlays environment
//! variables on top of them, and only the database URL has no default.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Spectro's runtime configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpectroConfig {
    /// Already-assembled Postgres DSN. No default — a missing value is a
    /// startup-time configuration error, not a silently empty string.
    pub database_url: String,

    /// Pool bound per event loop, realised here as `sqlx::PgPool`'s single
    /// process-wide bound (§6: `max_connections_per_event_loop`).
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,

    /// How long to wait for a pooled connection before failing with
    /// `ConnectionPoolExhausted`.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Per-statement timeout; expiry surfaces as `ConnectionTimeout`.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,

    /// Directory the migration runner scans for `<version>_<name>.sql` files.
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,

    /// Log level for the `tracing` subscriber the CLI installs.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SpectroConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: default_max_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            statement_timeout_ms: default_statement_timeout_ms(),
            migrations_dir: default_migrations_dir(),
            log_level: default_log_level(),
        }
    }
}

impl SpectroConfig {
    /// Load configuration from environment variables. `DATABASE_URL` is
    /// required; everything else falls back to its default.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::MissingEnvironmentVariable("DATABASE_URL".to_string()))?;

        let mut config = Self {
            database_url,
            ..Self::default()
        };

        if let Ok(size) = std::env::var("SPECTRO_POOL_SIZE") {
            config.max_pool_size = size
                .parse()
                .map_err(|_| Error::ConfigurationError(format!("invalid SPECTRO_POOL_SIZE: {size}")))?;
        }
        if let Ok(timeout) = std::env::var("SPECTRO_ACQUIRE_TIMEOUT_MS") {
            config.acquire_timeout_ms = timeout.parse().map_err(|_| {
                Error::ConfigurationError(format!("invalid SPECTRO_ACQUIRE_TIMEOUT_MS: {timeout}"))
            })?;
        }
        if let Ok(timeout) = std::env::var("SPECTRO_STATEMENT_TIMEOUT_MS") {
            config.statement_timeout_ms = timeout.parse().map_err(|_| {
                Error::ConfigurationError(format!(
                    "invalid SPECTRO_STATEMENT_TIMEOUT_MS: {timeout}"
                ))
            })?;
        }
        if let Ok(dir) = std::env::var("SPECTRO_MIGRATIONS_DIR") {
            config.migrations_dir = dir;
        }
        if let Ok(level) = std::env::var("SPECTRO_LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }
}

fn default_max_pool_size() -> u32 {
    10
}

fn default_acquire_timeout_ms() -> u64 {
    5000
}

fn default_statement_timeout_ms() -> u64 {
    30000
}

fn default_migrations_dir() -> String {
    "migrations".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
