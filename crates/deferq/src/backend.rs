//! Queue backend interfaces
//!
//! Both backends report the result of an enqueue as an [`EnqueueOutcome`]
//! instead of raising, so the retrying submitter can switch on it.

use async_trait::async_trait;
use serde_json::Value;

use crate::options::BackendOptions;
use crate::task::{Args, Kwargs, TaskTarget};

/// HTTP method used for durable deliveries
pub const DELIVERY_METHOD: &str = "POST";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),
    #[error("Backend error: {0}")]
    Other(String),
}

/// Result of a single enqueue attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Stored by the backend
    Accepted,
    /// A task with the same name is already queued
    Duplicate,
    /// A task with the same name was already delivered
    AlreadyDelivered,
    /// The serialized task exceeds the backend's size limit
    TooLarge,
    /// Temporary failure, the same call may succeed later
    Transient(BackendError),
    /// Permanent failure, retrying will not help
    Fatal(BackendError),
}

/// Submission to the immediate backend: the callable itself plus arguments.
///
/// `kwargs` holds the call arguments merged with the submission options,
/// the latter under their `_`-prefixed keys.
#[derive(Debug, Clone)]
pub struct ImmediateRequest {
    pub target: TaskTarget,
    pub args: Args,
    pub kwargs: Kwargs,
}

impl ImmediateRequest {
    /// Task name the backend should deduplicate on, if any
    pub fn task_name(&self) -> Option<&str> {
        self.kwargs.get("_name").and_then(Value::as_str)
    }
}

/// Submission to the durable backend: an addressed, serialized payload
#[derive(Debug, Clone)]
pub struct DurableRequest {
    pub url: String,
    pub method: &'static str,
    pub body: Vec<u8>,
    pub options: BackendOptions,
}

#[async_trait]
pub trait ImmediateBackend: Send + Sync {
    /// Schedule a callable for execution
    async fn enqueue(&self, request: &ImmediateRequest) -> EnqueueOutcome;
}

#[async_trait]
pub trait DurableBackend: Send + Sync {
    /// Store a payload for later delivery to `request.url`
    async fn enqueue(&self, request: &DurableRequest) -> EnqueueOutcome;
}
