//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `driverhub.toml` in the working directory (or the file named by
//! `DRIVERHUB_CONFIG`). Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::time::Duration;

use driverhub_app::config::{ContextConfig, ExecutorConfig};
use serde::Deserialize;

/// Config file read when `DRIVERHUB_CONFIG` is not set.
pub const DEFAULT_PATH: &str = "driverhub.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-device executor queue settings.
    pub executor: ExecutorConfig,
    /// Per-device context settings.
    pub drivers: ContextConfig,
    /// Platform bus settings.
    pub bus: BusConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Integration toggles.
    pub integrations: IntegrationsConfig,
}

/// In-process platform bus configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Messages buffered per subscriber before it starts lagging.
    pub capacity: usize,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Per-integration toggles.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Enable the virtual/demo integration.
    pub virtual_enabled: bool,
    /// Interval between two virtual sensor readings.
    pub poll_interval_ms: u64,
}

impl IntegrationsConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Load configuration from the config file (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("DRIVERHUB_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("DRIVERHUB_MAX_BACKLOG") {
            if val.eq_ignore_ascii_case("unbounded") {
                self.executor.max_backlog = None;
            } else if let Ok(max) = val.parse() {
                self.executor.max_backlog = Some(max);
            }
        }
        if let Some(val) = var("DRIVERHUB_REQUEST_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                self.drivers.request_timeout_ms = timeout;
            }
        }
        if let Some(val) = var("DRIVERHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.max_backlog == Some(0) {
            return Err(ConfigError::Validation(
                "executor.max_backlog must be non-zero".to_string(),
            ));
        }
        if self.drivers.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "drivers.request_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.bus.capacity == 0 {
            return Err(ConfigError::Validation(
                "bus.capacity must be non-zero".to_string(),
            ));
        }
        if self.integrations.virtual_enabled && self.integrations.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "integrations.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "driverhubd=info,driverhub_app=info,driverhub_adapter_virtual=info".to_string(),
        }
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            virtual_enabled: true,
            poll_interval_ms: 30_000,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
