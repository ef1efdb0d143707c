//! # deferq
//!
//! Reliable submission of deferred tasks to a task queue.
//!
//! Features:
//! - Retrying submitter with linear backoff; duplicate and already-delivered
//!   submissions count as success
//! - Content-addressed task names (SHA-256 over canonical JSON arguments)
//! - Routing between an immediate backend and a durable, URL-addressed one
//!   based on explicit capability markers
//! - Registry-based dotted-path resolution and a delivery-time dispatcher
//! - In-memory backends for tests and local development
//! - Optional axum delivery endpoint (`http` feature)
//!
//! ## Quick Start
//!
//! ```ignore
//! use deferq::{task_fn, DeferConfig, DurableMarkers, Namespace, PathResolver, Router};
//!
//! let mut resolver = PathResolver::new();
//! resolver.register_module("billing.tasks", Namespace::new().task("send", send_fn))?;
//!
//! let mut markers = DurableMarkers::new();
//! markers.mark("billing.tasks.send", "send-invoice")?;
//!
//! let router = Router::new(DeferConfig::from_env(), markers, immediate, durable)?;
//! router.defer(resolver.target("billing.tasks.send")?, vec![json!(42)], Kwargs::new()).await?;
//! ```

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod key;
pub mod marker;
pub mod memory;
pub mod options;
pub mod payload;
pub mod resolver;
pub mod router;
pub mod submit;
pub mod task;

#[cfg(feature = "http")]
pub mod http;

pub use backend::{
    BackendError, DurableBackend, DurableRequest, EnqueueOutcome, ImmediateBackend,
    ImmediateRequest,
};
pub use config::{ConfigError, DeferConfig};
pub use dispatch::{DispatchError, DispatchHandler, DispatchStatus};
pub use error::{DeferError, Result};
pub use marker::{DurableMarkers, MarkerError};
pub use memory::{MemoryDurableQueue, MemoryImmediateQueue};
pub use options::{BackendOptions, SubmissionOptions};
pub use payload::Payload;
pub use resolver::{InvalidPath, Namespace, PathResolver, RegistryError};
pub use router::{Router, TaskRequest};
pub use submit::{RetryingSubmitter, Sleeper, SubmitStatus, TokioSleeper};
pub use task::{task_fn, Args, Kwargs, TaskError, TaskFn, TaskTarget};

#[cfg(feature = "http")]
pub use http::delivery_routes;
