//! Backend routing for deferred tasks
//!
//! Tasks whose path carries a durable marker are serialized and handed to
//! the durable backend, addressed at `<url_prefix>/<identifier>`. All other
//! tasks go to the immediate backend as a callable plus arguments.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::backend::{
    DurableBackend, DurableRequest, ImmediateBackend, ImmediateRequest, DELIVERY_METHOD,
};
use crate::config::DeferConfig;
use crate::error::Result;
use crate::key;
use crate::marker::DurableMarkers;
use crate::options::SubmissionOptions;
use crate::payload;
use crate::submit::{RetryingSubmitter, Sleeper, SubmitStatus};
use crate::task::{Args, Kwargs, TaskTarget};

/// One deferred call: what to run, with what, and how to submit it
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub target: TaskTarget,
    pub args: Args,
    pub kwargs: Kwargs,
    pub options: SubmissionOptions,
}

impl TaskRequest {
    pub fn new(target: TaskTarget) -> Self {
        Self {
            target,
            args: Args::new(),
            kwargs: Kwargs::new(),
            options: SubmissionOptions::default(),
        }
    }

    /// Build from a raw call, moving `_`-prefixed keyword arguments into options
    pub fn from_call(target: TaskTarget, args: Args, kwargs: Kwargs) -> Result<Self> {
        let (kwargs, options) = SubmissionOptions::split(kwargs)?;
        Ok(Self {
            target,
            args,
            kwargs,
            options,
        })
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Keyword argument; `_`-prefixed keys are treated as options when routed
    pub fn kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.options.queue = Some(queue.into());
        self
    }

    pub fn target_module(mut self, module: impl Into<String>) -> Self {
        self.options.target_module = Some(module.into());
        self
    }

    pub fn countdown(mut self, secs: u64) -> Self {
        self.options.countdown = Some(secs);
        self
    }

    /// Backend passthrough option; the key is prefixed with `_` if needed
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Self> {
        self.options.set(key, value.into())?;
        Ok(self)
    }
}

/// Picks a backend for each deferred call and submits it with retries
pub struct Router {
    config: Arc<DeferConfig>,
    markers: Arc<DurableMarkers>,
    immediate: Arc<dyn ImmediateBackend>,
    durable: Arc<dyn DurableBackend>,
    submitter: RetryingSubmitter,
}

impl Router {
    pub fn new(
        config: DeferConfig,
        markers: DurableMarkers,
        immediate: Arc<dyn ImmediateBackend>,
        durable: Arc<dyn DurableBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let submitter = RetryingSubmitter::from_config(&config);
        Ok(Self {
            config: Arc::new(config),
            markers: Arc::new(markers),
            immediate,
            durable,
            submitter,
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.submitter = self.submitter.with_sleeper(sleeper);
        self
    }

    pub fn config(&self) -> &DeferConfig {
        &self.config
    }

    pub fn markers(&self) -> &DurableMarkers {
        &self.markers
    }

    /// Defer `target` using the raw calling convention (options inline as `_` kwargs)
    pub async fn defer(&self, target: TaskTarget, args: Args, kwargs: Kwargs) -> Result<SubmitStatus> {
        self.route(TaskRequest::from_call(target, args, kwargs)?).await
    }

    /// Submit one request to the backend its target was declared for
    pub async fn route(&self, request: TaskRequest) -> Result<SubmitStatus> {
        let TaskRequest {
            target,
            args,
            kwargs,
            mut options,
        } = request;
        let kwargs = options.absorb(kwargs)?;

        if options.name.is_none() {
            options.name = Some(key::task_name(target.name(), &args, &kwargs)?);
        }
        if options.queue.is_none() {
            options.queue = self.config.default_queue.clone();
        }
        if options.target_module.is_none() {
            options.target_module = self.config.default_target_module.clone();
        }

        let path = target.path();
        match self.markers.identifier_for(&path) {
            Some(identifier) => {
                let url = self.config.delivery_url(identifier);
                let (payload, backend_options) = payload::prepare(path, args, kwargs, &options);
                let request = DurableRequest {
                    url,
                    method: DELIVERY_METHOD,
                    body: payload.to_bytes()?,
                    options: backend_options,
                };
                info!(
                    path = %payload.path,
                    url = %request.url,
                    task_name = ?options.name,
                    "Deferring task to durable queue"
                );
                self.submitter
                    .submit(&payload, || self.durable.enqueue(&request))
                    .await
            }
            None => {
                let mut merged = kwargs;
                merged.extend(options.to_kwargs());
                let request = ImmediateRequest {
                    target,
                    args,
                    kwargs: merged,
                };
                debug!(
                    path = %path,
                    task_name = ?options.name,
                    "Deferring task to immediate queue"
                );
                self.submitter
                    .submit(&request, || self.immediate.enqueue(&request))
                    .await
            }
        }
    }
}
