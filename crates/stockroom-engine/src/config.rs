//! # Engine Configuration
//!
//! Configuration for the database, retries, locks and pricing tolerance.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKROOM_DB_PATH=/var/lib/stockroom/stockroom.db                  │
//! │     STOCKROOM_RETRY_MAX_ATTEMPTS=5                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/stockroom/stockroom.toml (Linux)                         │
//! │     ~/Library/Application Support/com.stockroom.stockroom/... (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # stockroom.toml
//! [database]
//! path = "./stockroom.db"
//! max_connections = 5
//!
//! [retry]
//! max_attempts = 3
//! initial_backoff_ms = 20
//! max_backoff_ms = 500
//!
//! [locks]
//! acquire_timeout_ms = 2000
//!
//! [pricing]
//! total_tolerance_cents = 1
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use stockroom_core::{Money, PricingCalculator};
use stockroom_db::DbConfig;

use crate::retry::RetryPolicy;

// =============================================================================
// Config Error
// =============================================================================

/// Errors while loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("No config path available")]
    NoPath,
}

/// Result type for config operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

/// SQLite connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Maximum pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connections kept open while idle.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "stockroom", "stockroom")
        .map(|dirs| dirs.data_dir().join("stockroom.db"))
        .unwrap_or_else(|| PathBuf::from("stockroom.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Whole-operation retry on transient storage failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts per operation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single delay (milliseconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    20
}

fn default_max_backoff() -> u64 {
    500
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

// =============================================================================
// Lock Settings
// =============================================================================

/// Per-variant lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    /// How long an operation waits for all of its variant locks
    /// (milliseconds) before giving up with a retryable error.
    #[serde(default = "default_lock_timeout")]
    pub acquire_timeout_ms: u64,
}

fn default_lock_timeout() -> u64 {
    2000
}

impl Default for LockSettings {
    fn default() -> Self {
        LockSettings {
            acquire_timeout_ms: default_lock_timeout(),
        }
    }
}

// =============================================================================
// Pricing Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Largest accepted difference between a declared and a computed total.
    #[serde(default = "default_tolerance")]
    pub total_tolerance_cents: i64,
}

fn default_tolerance() -> i64 {
    1
}

impl Default for PricingSettings {
    fn default() -> Self {
        PricingSettings {
            total_tolerance_cents: default_tolerance(),
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub locks: LockSettings,

    #[serde(default)]
    pub pricing: PricingSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (stockroom.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }

        if self.locks.acquire_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "locks.acquire_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.pricing.total_tolerance_cents < 0 {
            return Err(ConfigError::Invalid(
                "pricing.total_tolerance_cents must not be negative".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("STOCKROOM_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("STOCKROOM_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid STOCKROOM_DB_MAX_CONNECTIONS"),
            }
        }

        if let Ok(attempts) = std::env::var("STOCKROOM_RETRY_MAX_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => self.retry.max_attempts = n,
                Err(_) => warn!(value = %attempts, "Ignoring invalid STOCKROOM_RETRY_MAX_ATTEMPTS"),
            }
        }

        if let Ok(timeout) = std::env::var("STOCKROOM_LOCK_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => self.locks.acquire_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring invalid STOCKROOM_LOCK_TIMEOUT_MS"),
            }
        }

        if let Ok(tolerance) = std::env::var("STOCKROOM_TOTAL_TOLERANCE_CENTS") {
            match tolerance.parse::<i64>() {
                Ok(cents) => self.pricing.total_tolerance_cents = cents,
                Err(_) => {
                    warn!(value = %tolerance, "Ignoring invalid STOCKROOM_TOTAL_TOLERANCE_CENTS")
                }
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockroom", "stockroom")
            .map(|dirs| dirs.config_dir().join("stockroom.toml"))
    }

    // =========================================================================
    // Derived Settings
    // =========================================================================

    /// Pool configuration for [`stockroom_db::Database::new`].
    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .min_connections(self.database.min_connections)
            .connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.locks.acquire_timeout_ms)
    }

    pub fn pricing(&self) -> PricingCalculator {
        PricingCalculator::new(Money::from_cents(self.pricing.total_tolerance_cents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.locks.acquire_timeout_ms, 2000);
        assert_eq!(config.pricing.total_tolerance_cents, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [database]
            path = "/tmp/shop.db"

            [retry]
            max_attempts = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.initial_backoff_ms, 20);
        assert_eq!(config.locks.acquire_timeout_ms, 2000);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
        config.retry.max_attempts = 3;

        config.database.min_connections = 10;
        assert!(config.validate().is_err());
        config.database.min_connections = 1;

        config.pricing.total_tolerance_cents = -1;
        assert!(config.validate().is_err());
        config.pricing.total_tolerance_cents = 0;

        config.retry.initial_backoff_ms = 1000;
        assert!(config.validate().is_err());
        config.retry.initial_backoff_ms = 10;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_derived_settings() {
        let mut config = EngineConfig::default();
        config.database.path = PathBuf::from("/tmp/x.db");
        config.database.max_connections = 8;
        config.pricing.total_tolerance_cents = 5;

        let db = config.to_db_config();
        assert_eq!(db.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(db.max_connections, 8);

        assert_eq!(config.pricing().tolerance(), Money::from_cents(5));
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.lock_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stockroom.toml");

        let mut config = EngineConfig::default();
        config.database.path = dir.path().join("shop.db");
        config.locks.acquire_timeout_ms = 750;
        config.save(Some(path.clone())).unwrap();

        let loaded = EngineConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.locks.acquire_timeout_ms, 750);
        assert_eq!(loaded.database.path, dir.path().join("shop.db"));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&EngineConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[retry]"));
        assert!(toml_str.contains("[locks]"));
        assert!(toml_str.contains("[pricing]"));
    }
}
