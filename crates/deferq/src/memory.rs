//! In-memory backends for tests and local development
//!
//! Both queues deduplicate on the task name: a name that is still queued is
//! reported as [`EnqueueOutcome::Duplicate`], a name that was already run is
//! tombstoned and reported as [`EnqueueOutcome::AlreadyDelivered`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::{
    BackendError, DurableBackend, DurableRequest, EnqueueOutcome, ImmediateBackend,
    ImmediateRequest,
};
use crate::dispatch::{DispatchError, DispatchHandler, DispatchStatus};
use crate::options::BackendOptions;
use crate::task::{Args, Kwargs, TaskError, TaskTarget};

/// Largest body the durable queue stores (100 KiB)
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 100 * 1024;

#[derive(Debug, Default)]
struct Names {
    queued: HashSet<String>,
    tombstoned: HashSet<String>,
}

impl Names {
    fn admit(&mut self, name: Option<&str>) -> Option<EnqueueOutcome> {
        let name = name?;
        if self.tombstoned.contains(name) {
            return Some(EnqueueOutcome::AlreadyDelivered);
        }
        if !self.queued.insert(name.to_string()) {
            return Some(EnqueueOutcome::Duplicate);
        }
        None
    }

    fn finish(&mut self, name: Option<&str>) {
        if let Some(name) = name {
            self.queued.remove(name);
            self.tombstoned.insert(name.to_string());
        }
    }
}

/// Fails the next `n` enqueues with a transient error
#[derive(Debug, Default)]
struct FailureInjector {
    remaining: AtomicU32,
}

impl FailureInjector {
    fn set(&self, n: u32) {
        self.remaining.store(n, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A callable accepted by [`MemoryImmediateQueue`]
#[derive(Debug, Clone)]
pub struct QueuedCall {
    pub id: Uuid,
    pub name: Option<String>,
    pub target: TaskTarget,
    pub args: Args,
    pub kwargs: Kwargs,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ImmediateState {
    calls: VecDeque<QueuedCall>,
    names: Names,
}

#[derive(Debug, Default)]
pub struct MemoryImmediateQueue {
    state: Arc<RwLock<ImmediateState>>,
    failures: FailureInjector,
}

impl MemoryImmediateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` enqueues report the backend as unavailable
    pub fn fail_next(&self, n: u32) {
        self.failures.set(n);
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.calls.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn pending(&self) -> Vec<QueuedCall> {
        self.state.read().await.calls.iter().cloned().collect()
    }

    /// Pop the oldest call and run it.
    ///
    /// Keyword arguments reach the task without their `_` options.
    pub async fn run_next(&self) -> Option<Result<(), TaskError>> {
        let call = self.state.write().await.calls.pop_front()?;
        let kwargs: Kwargs = call
            .kwargs
            .into_iter()
            .filter(|(key, _)| !key.starts_with(crate::options::OPTION_PREFIX))
            .collect();

        let result = call.target.call(call.args, kwargs).await;
        self.state.write().await.names.finish(call.name.as_deref());
        Some(result)
    }
}

#[async_trait]
impl ImmediateBackend for MemoryImmediateQueue {
    async fn enqueue(&self, request: &ImmediateRequest) -> EnqueueOutcome {
        if self.failures.take() {
            return EnqueueOutcome::Transient(BackendError::Unavailable(
                "injected failure".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if let Some(outcome) = state.names.admit(request.task_name()) {
            return outcome;
        }
        state.calls.push_back(QueuedCall {
            id: Uuid::new_v4(),
            name: request.task_name().map(str::to_string),
            target: request.target.clone(),
            args: request.args.clone(),
            kwargs: request.kwargs.clone(),
            enqueued_at: Utc::now(),
        });
        EnqueueOutcome::Accepted
    }
}

/// A payload stored by [`MemoryDurableQueue`]
#[derive(Debug, Clone)]
pub struct StoredTask {
    pub id: Uuid,
    pub url: String,
    pub method: &'static str,
    pub body: Vec<u8>,
    pub options: BackendOptions,
    pub enqueued_at: DateTime<Utc>,
    pub eta: DateTime<Utc>,
    pub attempts: u32,
}

impl StoredTask {
    pub fn name(&self) -> Option<&str> {
        self.options.task_name()
    }

    pub fn queue_name(&self) -> Option<&str> {
        self.options.queue_name()
    }
}

#[derive(Debug, Default)]
struct DurableState {
    tasks: VecDeque<StoredTask>,
    names: Names,
}

#[derive(Debug)]
pub struct MemoryDurableQueue {
    state: Arc<RwLock<DurableState>>,
    failures: FailureInjector,
    max_payload_bytes: usize,
}

impl Default for MemoryDurableQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDurableQueue {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_BYTES)
    }

    pub fn with_max_payload(max_payload_bytes: usize) -> Self {
        Self {
            state: Arc::default(),
            failures: FailureInjector::default(),
            max_payload_bytes,
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.failures.set(n);
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn tasks(&self) -> Vec<StoredTask> {
        self.state.read().await.tasks.iter().cloned().collect()
    }

    /// Take the oldest task whose ETA has passed
    async fn take_ready(&self) -> Option<StoredTask> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let index = state.tasks.iter().position(|task| task.eta <= now)?;
        state.tasks.remove(index)
    }

    /// Deliver the next ready task to `handler`.
    ///
    /// Success and client errors retire the task (its name is tombstoned);
    /// server errors put it back at the end of the queue.
    pub async fn deliver_next(
        &self,
        handler: &DispatchHandler,
    ) -> Option<Result<DispatchStatus, DispatchError>> {
        let mut task = self.take_ready().await?;
        task.attempts += 1;

        let result = handler.handle(&task.body).await;
        let mut state = self.state.write().await;
        match &result {
            Err(e) if e.is_retriable() => {
                tracing::debug!(
                    task_id = %task.id,
                    attempts = task.attempts,
                    "Re-queuing task after server error"
                );
                state.tasks.push_back(task);
            }
            _ => state.names.finish(task.name()),
        }
        Some(result)
    }
}

#[async_trait]
impl DurableBackend for MemoryDurableQueue {
    async fn enqueue(&self, request: &DurableRequest) -> EnqueueOutcome {
        if self.failures.take() {
            return EnqueueOutcome::Transient(BackendError::DeadlineExceeded(
                "injected failure".to_string(),
            ));
        }
        if request.body.len() > self.max_payload_bytes {
            return EnqueueOutcome::TooLarge;
        }

        let now = Utc::now();
        let countdown = request.options.countdown().unwrap_or(0);
        let Some(eta) = eta_after(now, countdown) else {
            return EnqueueOutcome::Fatal(BackendError::Other(format!(
                "countdown of {countdown}s is out of range"
            )));
        };

        let mut state = self.state.write().await;
        if let Some(outcome) = state.names.admit(request.options.task_name()) {
            return outcome;
        }

        state.tasks.push_back(StoredTask {
            id: Uuid::new_v4(),
            url: request.url.clone(),
            method: request.method,
            body: request.body.clone(),
            options: request.options.clone(),
            enqueued_at: now,
            eta,
            attempts: 0,
        });
        EnqueueOutcome::Accepted
    }
}

fn eta_after(now: DateTime<Utc>, countdown: u64) -> Option<DateTime<Utc>> {
    let delay = Duration::try_seconds(i64::try_from(countdown).ok()?)?;
    now.checked_add_signed(delay)
}
