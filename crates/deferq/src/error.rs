//! Submission error types

use crate::backend::BackendError;
use crate::config::ConfigError;

/// Result alias for submission operations
pub type Result<T> = std::result::Result<T, DeferError>;

/// Errors surfaced to callers of the submission API
#[derive(Debug, thiserror::Error)]
pub enum DeferError {
    /// Every attempt hit a transient backend failure
    #[error("Submission failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: BackendError,
    },

    /// The backend rejected the submission outright
    #[error("Backend error: {0}")]
    Backend(#[source] BackendError),

    #[error("Invalid option '{key}': expected {expected}")]
    InvalidOption { key: String, expected: &'static str },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DeferError {
    /// Whether the failure came from a backend that stayed unavailable
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}
