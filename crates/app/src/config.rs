//! Tunables for executors and device contexts.
//!
//! Both structs deserialize from a TOML section with every field optional.

use std::time::Duration;

use serde::Deserialize;

/// Per-executor queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Initial queue capacity hint.
    pub queue_backlog: usize,
    /// Hard limit on queued events; `None` means unbounded.
    ///
    /// Start, upgrade and stop events are always accepted.
    pub max_backlog: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            queue_backlog: 16,
            max_backlog: Some(10_000),
        }
    }
}

/// Per-device context settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// How long a platform request may stay in flight when the message
    /// carries no time-to-live of its own.
    pub request_timeout_ms: u64,
}

impl ContextConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_bound_backlog_by_default() {
        assert_eq!(ExecutorConfig::default().max_backlog, Some(10_000));
    }

    #[test]
    fn should_fill_missing_fields_with_defaults() {
        let config: ExecutorConfig = toml::from_str("max_backlog = 5").unwrap();
        assert_eq!(config.max_backlog, Some(5));
        assert_eq!(config.queue_backlog, 16);
    }

    #[test]
    fn should_convert_request_timeout() {
        let config: ContextConfig = toml::from_str("request_timeout_ms = 1500").unwrap();
        assert_eq!(config.request_timeout(), Duration::from_millis(1_500));
    }
}
