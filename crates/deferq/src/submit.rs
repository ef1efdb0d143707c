//! Retrying submission
//!
//! Wraps a single enqueue call. Transient failures are retried with a
//! linear backoff (`base * attempt`), duplicate and already-delivered
//! outcomes count as success, and oversized tasks are dropped after an
//! error log. Anything fatal returns immediately.

use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::backend::EnqueueOutcome;
use crate::config::DeferConfig;
use crate::error::{DeferError, Result};

/// How a submission ended, when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Accepted by the backend
    Accepted,
    /// Already queued under the same name
    Deduplicated,
    /// Already delivered under the same name
    AlreadyDelivered,
    /// Too large to store, dropped
    Dropped,
}

impl SubmitStatus {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Waits out the backoff between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Clone)]
pub struct RetryingSubmitter {
    max_attempts: u32,
    backoff_base: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryingSubmitter {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn from_config(config: &DeferConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base)
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff after the `attempt`-th failure (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }

    /// Run `call` until it produces a terminal outcome.
    ///
    /// `diagnostics` is only rendered when the task is dropped as too large.
    pub async fn submit<F, Fut, D>(&self, diagnostics: &D, mut call: F) -> Result<SubmitStatus>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EnqueueOutcome>,
        D: Debug + ?Sized,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                EnqueueOutcome::Accepted => {
                    debug!(attempt = attempt, "Task submitted");
                    return Ok(SubmitStatus::Accepted);
                }
                EnqueueOutcome::Duplicate => {
                    warn!(attempt = attempt, "Task already exists");
                    return Ok(SubmitStatus::Deduplicated);
                }
                EnqueueOutcome::AlreadyDelivered => {
                    warn!(attempt = attempt, "Task already delivered (tombstoned)");
                    return Ok(SubmitStatus::AlreadyDelivered);
                }
                EnqueueOutcome::TooLarge => {
                    error!(arguments = ?diagnostics, "Task too large, dropping it");
                    return Ok(SubmitStatus::Dropped);
                }
                EnqueueOutcome::Transient(err) => {
                    if attempt >= self.max_attempts {
                        error!(
                            attempts = attempt,
                            error = %err,
                            "Backend still unavailable, giving up"
                        );
                        return Err(DeferError::RetriesExhausted {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    let delay = self.delay(attempt);
                    warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Backend unavailable, retrying submission"
                    );
                    self.sleeper.sleep(delay).await;
                }
                EnqueueOutcome::Fatal(err) => {
                    error!(attempt = attempt, error = %err, "Submission rejected");
                    return Err(DeferError::Backend(err));
                }
            }
        }
    }
}

impl Default for RetryingSubmitter {
    fn default() -> Self {
        Self::from_config(&DeferConfig::default())
    }
}

impl Debug for RetryingSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingSubmitter")
            .field("max_attempts", &self.max_attempts)
            .field("backoff_base", &self.backoff_base)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSleeper;
    use super::*;
    use crate::backend::BackendError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed list of outcomes, then accepts
    struct Script {
        outcomes: Mutex<VecDeque<EnqueueOutcome>>,
        calls: Mutex<u32>,
    }

    impl Script {
        fn new(outcomes: Vec<EnqueueOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            }
        }

        async fn call(&self) -> EnqueueOutcome {
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(EnqueueOutcome::Accepted)
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    fn transient(n: usize) -> Vec<EnqueueOutcome> {
        vec![EnqueueOutcome::Transient(BackendError::DeadlineExceeded("slow".into())); n]
    }

    fn submitter() -> (RetryingSubmitter, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let submitter = RetryingSubmitter::new(5, Duration::from_millis(500))
            .with_sleeper(sleeper.clone());
        (submitter, sleeper)
    }

    #[tokio::test]
    async fn test_ok() {
        let (submitter, sleeper) = submitter();
        let script = Script::new(vec![]);

        let status = submitter.submit("args", || script.call()).await.unwrap();
        assert_eq!(status, SubmitStatus::Accepted);
        assert_eq!(script.calls(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[tokio::test]
    async fn test_retry() {
        let (submitter, sleeper) = submitter();
        let script = Script::new(transient(3));

        let status = submitter.submit("args", || script.call()).await.unwrap();
        assert_eq!(status, SubmitStatus::Accepted);
        assert_eq!(script.calls(), 4);
        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(1500),
            ]
        );
    }

    #[tokio::test]
    async fn test_retry_raise() {
        let (submitter, sleeper) = submitter();
        let script = Script::new(transient(6));

        let err = submitter.submit("args", || script.call()).await.unwrap_err();
        assert!(matches!(
            err,
            DeferError::RetriesExhausted {
                attempts: 5,
                source: BackendError::DeadlineExceeded(_)
            }
        ));
        assert!(err.is_transient());
        assert_eq!(script.calls(), 5);
        assert_eq!(sleeper.delays().len(), 4);
    }

    #[tokio::test]
    async fn test_retry_raise_at_attempt_limit() {
        let (submitter, sleeper) = submitter();
        let mut outcomes = transient(5);
        outcomes.push(EnqueueOutcome::Accepted);
        let script = Script::new(outcomes);

        let err = submitter.submit("args", || script.call()).await.unwrap_err();
        assert!(matches!(err, DeferError::RetriesExhausted { attempts: 5, .. }));
        assert_eq!(script.calls(), 5);
        assert_eq!(
            sleeper.delays(),
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(1500),
                Duration::from_millis(2000),
            ]
        );
    }

    #[tokio::test]
    async fn test_already_exists() {
        let (submitter, _) = submitter();
        let mut outcomes = transient(3);
        outcomes.push(EnqueueOutcome::Duplicate);
        let script = Script::new(outcomes);

        let status = submitter.submit("args", || script.call()).await.unwrap();
        assert_eq!(status, SubmitStatus::Deduplicated);
        assert_eq!(script.calls(), 4);
    }

    #[tokio::test]
    async fn test_tombstoned() {
        let (submitter, _) = submitter();
        let mut outcomes = transient(3);
        outcomes.push(EnqueueOutcome::AlreadyDelivered);
        let script = Script::new(outcomes);

        let status = submitter.submit("args", || script.call()).await.unwrap();
        assert_eq!(status, SubmitStatus::AlreadyDelivered);
        assert_eq!(script.calls(), 4);
    }

    #[tokio::test]
    async fn test_too_large() {
        let (submitter, _) = submitter();
        let mut outcomes = transient(3);
        outcomes.push(EnqueueOutcome::TooLarge);
        let script = Script::new(outcomes);

        let status = submitter.submit("args", || script.call()).await.unwrap();
        assert_eq!(status, SubmitStatus::Dropped);
        assert_eq!(script.calls(), 4);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let (submitter, sleeper) = submitter();
        let script = Script::new(vec![EnqueueOutcome::Fatal(BackendError::Other(
            "bad request".into(),
        ))]);

        let err = submitter.submit("args", || script.call()).await.unwrap_err();
        assert!(matches!(err, DeferError::Backend(_)));
        assert_eq!(script.calls(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let submitter = RetryingSubmitter::new(0, Duration::from_millis(1));
        assert_eq!(submitter.max_attempts(), 1);
    }
}
