//! Delivery-time dispatch
//!
//! Decodes a durable payload, resolves its path and invokes the task.
//! Bad payloads and unknown paths are client errors (not worth redelivering);
//! a failing task is a server error so the delivering backend can retry.

use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::payload::Payload;
use crate::resolver::{InvalidPath, PathResolver};
use crate::task::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// Task ran to completion
    Accepted,
    /// Task failed permanently; reported as handled so it is not redelivered
    PermanentFailure,
}

impl DispatchStatus {
    pub fn status_code(&self) -> u16 {
        200
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("Payload has no task path")]
    MissingPath,

    #[error("Invalid task path: {0}")]
    InvalidPath(#[from] InvalidPath),

    #[error("Task '{path}' failed: {message}")]
    TaskFailed { path: String, message: String },
}

impl DispatchError {
    /// HTTP status reported back to the delivering backend
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedPayload(_) | Self::MissingPath | Self::InvalidPath(_) => 400,
            Self::TaskFailed { .. } => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Whether redelivering the same payload could succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::TaskFailed { .. })
    }
}

/// Delivery target of the durable backend
#[derive(Debug, Clone)]
pub struct DispatchHandler {
    resolver: Arc<PathResolver>,
}

impl DispatchHandler {
    pub fn new(resolver: Arc<PathResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Run the task described by a delivered request body
    pub async fn handle(&self, body: &[u8]) -> Result<DispatchStatus, DispatchError> {
        let payload = Payload::from_bytes(body).map_err(|e| {
            warn!(error = %e, body_len = body.len(), "Could not decode deferred payload");
            e
        })?;

        if payload.path.is_empty() {
            warn!("Deferred payload has no path");
            return Err(DispatchError::MissingPath);
        }

        let func = self.resolver.resolve(&payload.path).map_err(|e| {
            warn!(path = %payload.path, error = %e, "Could not resolve deferred task");
            e
        })?;

        let Payload { path, args, kwargs } = payload;
        debug!(path = %path, args = args.len(), kwargs = kwargs.len(), "Running deferred task");

        match func.call(args, kwargs).await {
            Ok(()) => Ok(DispatchStatus::Accepted),
            Err(TaskError::Permanent(message)) => {
                error!(path = %path, error = %message, "Permanent task failure, not retrying");
                Ok(DispatchStatus::PermanentFailure)
            }
            Err(TaskError::Failed(message)) => {
                warn!(path = %path, error = %message, "Deferred task failed");
                Err(DispatchError::TaskFailed { path, message })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Namespace;
    use crate::task::{task_fn, Args, Kwargs};
    use serde_json::json;
    use std::sync::Mutex;

    type Calls = Arc<Mutex<Vec<(Args, Kwargs)>>>;

    fn handler() -> (DispatchHandler, Calls) {
        let calls: Calls = Arc::default();
        let recorded = calls.clone();
        let record = task_fn(move |args, kwargs| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push((args, kwargs));
                Ok(())
            }
        });

        let mut resolver = PathResolver::new();
        resolver
            .register_module(
                "jobs",
                Namespace::new()
                    .task("record", record)
                    .task(
                        "flaky",
                        task_fn(|_, _| async { Err(TaskError::Failed("boom".into())) }),
                    )
                    .task(
                        "doomed",
                        task_fn(|_, _| async { Err(TaskError::Permanent("gone".into())) }),
                    ),
            )
            .unwrap();

        (DispatchHandler::new(Arc::new(resolver)), calls)
    }

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[tokio::test]
    async fn test_valid_payload_invokes_once() {
        let (handler, calls) = handler();
        let status = handler
            .handle(&body(json!({"path": "jobs.record", "args": [1, "a"], "kwargs": {"k": true}})))
            .await
            .unwrap();

        assert_eq!(status, DispatchStatus::Accepted);
        assert_eq!(status.status_code(), 200);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, vec![json!(1), json!("a")]);
        assert_eq!(calls[0].1.get("k"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_empty_path_is_client_error() {
        let (handler, calls) = handler();
        let err = handler
            .handle(&body(json!({"path": "", "args": [], "kwargs": {}})))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingPath));
        assert_eq!(err.status_code(), 400);

        let err = handler.handle(&body(json!({"args": []}))).await.unwrap_err();
        assert!(matches!(err, DispatchError::MissingPath));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_path_is_client_error() {
        let (handler, _) = handler();
        let err = handler
            .handle(&body(json!({"path": "jobs.missing"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidPath(_)));
        assert!(err.is_client_error());
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn test_malformed_body_is_client_error() {
        let (handler, _) = handler();
        let err = handler.handle(b"\x80\x04garbage").await.unwrap_err();
        assert!(matches!(err, DispatchError::MalformedPayload(_)));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_task_failure_is_server_error() {
        let (handler, _) = handler();
        let err = handler
            .handle(&body(json!({"path": "jobs.flaky"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::TaskFailed { ref path, .. } if path == "jobs.flaky"));
        assert_eq!(err.status_code(), 500);
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let (handler, _) = handler();
        let status = handler
            .handle(&body(json!({"path": "jobs.doomed"})))
            .await
            .unwrap();
        assert_eq!(status, DispatchStatus::PermanentFailure);
    }
}
