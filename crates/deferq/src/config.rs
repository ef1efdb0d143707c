//! Submission configuration
//!
//! Resolved once at process startup and shared read-only afterwards.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Default number of submission attempts before a transient failure is fatal
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default linear backoff unit (attempt `n` sleeps `n * unit`)
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Default delivery URL prefix for durable tasks
pub const DEFAULT_URL_PREFIX: &str = "/_ah/queue/deferred";

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Process-wide defaults for the router and the retrying submitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferConfig {
    /// Queue used when the caller does not pick one (env: DEFERQ_DEFAULT_QUEUE)
    pub default_queue: Option<String>,
    /// Target module used when the caller does not pick one (env: DEFERQ_DEFAULT_TARGET)
    pub default_target_module: Option<String>,
    /// Maximum submission attempts (env: DEFERQ_MAX_ATTEMPTS)
    pub max_attempts: u32,
    /// Base backoff unit (env: DEFERQ_BACKOFF_MS)
    #[serde(with = "duration_ms")]
    pub backoff_base: Duration,
    /// Prefix of the durable delivery URL (env: DEFERQ_URL_PREFIX)
    pub url_prefix: String,
}

impl Default for DeferConfig {
    fn default() -> Self {
        Self {
            default_queue: None,
            default_target_module: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
        }
    }
}

impl DeferConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            default_queue: env::var("DEFERQ_DEFAULT_QUEUE").ok(),
            default_target_module: env::var("DEFERQ_DEFAULT_TARGET").ok(),
            max_attempts: env::var("DEFERQ_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            backoff_base: env::var("DEFERQ_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_BACKOFF_BASE),
            url_prefix: env::var("DEFERQ_URL_PREFIX")
                .unwrap_or_else(|_| DEFAULT_URL_PREFIX.to_string()),
        }
    }

    pub fn with_default_queue(mut self, queue: impl Into<String>) -> Self {
        self.default_queue = Some(queue.into());
        self
    }

    pub fn with_default_target_module(mut self, module: impl Into<String>) -> Self {
        self.default_target_module = Some(module.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.url_prefix = prefix.into();
        self
    }

    /// Reject settings the submitter or router cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.url_prefix.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "url_prefix must start with '/', got '{}'",
                self.url_prefix
            )));
        }
        Ok(())
    }

    /// Delivery URL for a durable task identifier
    pub fn delivery_url(&self, identifier: &str) -> String {
        format!("{}/{}", self.url_prefix.trim_end_matches('/'), identifier)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
