//! Deferred task callables

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Positional call arguments
pub type Args = Vec<Value>;

/// Named call arguments, kept sorted by key
pub type Kwargs = BTreeMap<String, Value>;

/// Failure reported by a task body
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// Failed, the delivering backend may retry
    #[error("Task failed: {0}")]
    Failed(String),
    /// Failed in a way retrying cannot fix
    #[error("Permanent task failure: {0}")]
    Permanent(String),
}

/// A function that can be run later with stored arguments
#[async_trait]
pub trait TaskFn: Send + Sync {
    async fn call(&self, args: Args, kwargs: Kwargs) -> Result<(), TaskError>;
}

/// Adapter turning an async closure into a [`TaskFn`]
pub struct FnTask<F> {
    func: F,
}

#[async_trait]
impl<F, Fut> TaskFn for FnTask<F>
where
    F: Fn(Args, Kwargs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskError>> + Send,
{
    async fn call(&self, args: Args, kwargs: Kwargs) -> Result<(), TaskError> {
        (self.func)(args, kwargs).await
    }
}

/// Wrap an async closure as a shareable task function
pub fn task_fn<F, Fut>(func: F) -> Arc<dyn TaskFn>
where
    F: Fn(Args, Kwargs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    Arc::new(FnTask { func })
}

/// A callable together with the dotted path it is registered under.
///
/// `module` is the registered module name, `qualname` the attribute chain
/// inside it (`Class.method` or `function`).
#[derive(Clone)]
pub struct TaskTarget {
    module: String,
    qualname: String,
    func: Arc<dyn TaskFn>,
}

impl TaskTarget {
    pub fn new(
        module: impl Into<String>,
        qualname: impl Into<String>,
        func: Arc<dyn TaskFn>,
    ) -> Self {
        Self {
            module: module.into(),
            qualname: qualname.into(),
            func,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// Full dotted path, `module.qualname`
    pub fn path(&self) -> String {
        format!("{}.{}", self.module, self.qualname)
    }

    /// Declared name of the function (last segment of the qualified name)
    pub fn name(&self) -> &str {
        self.qualname.rsplit('.').next().unwrap_or(&self.qualname)
    }

    pub fn func(&self) -> &Arc<dyn TaskFn> {
        &self.func
    }

    pub async fn call(&self, args: Args, kwargs: Kwargs) -> Result<(), TaskError> {
        self.func.call(args, kwargs).await
    }
}

impl fmt::Debug for TaskTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskTarget")
            .field("module", &self.module)
            .field("qualname", &self.qualname)
            .finish_non_exhaustive()
    }
}
