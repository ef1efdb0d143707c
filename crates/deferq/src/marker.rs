//! Durable-queue capability markers
//!
//! A task path marked here is routed through the durable backend and
//! delivered to `<url_prefix>/<identifier>`; anything unmarked goes to the
//! immediate backend.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkerError {
    #[error("Invalid delivery identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("Path '{path}' is already marked as '{existing}'")]
    Conflict { path: String, existing: String },
}

/// Path -> delivery identifier, filled at startup
#[derive(Debug, Clone, Default)]
pub struct DurableMarkers {
    identifiers: HashMap<String, String>,
}

impl DurableMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the task at `path` as durable, delivered under `identifier`.
    ///
    /// The identifier becomes a URL segment, so it must be non-empty and
    /// free of `/`, `?` and `#`. Re-marking with the same identifier is a no-op.
    pub fn mark(
        &mut self,
        path: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Result<(), MarkerError> {
        let path = path.into();
        let identifier = identifier.into();

        if identifier.is_empty()
            || identifier
                .chars()
                .any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace())
        {
            return Err(MarkerError::InvalidIdentifier(identifier));
        }

        match self.identifiers.get(&path) {
            Some(existing) if *existing != identifier => Err(MarkerError::Conflict {
                path,
                existing: existing.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                self.identifiers.insert(path, identifier);
                Ok(())
            }
        }
    }

    pub fn identifier_for(&self, path: &str) -> Option<&str> {
        self.identifiers.get(path).map(String::as_str)
    }

    pub fn is_durable(&self, path: &str) -> bool {
        self.identifiers.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}
