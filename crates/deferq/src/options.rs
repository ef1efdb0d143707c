//! Submission options and their extraction from call arguments
//!
//! Callers pass queue-level options alongside call arguments, marked with a
//! leading `_`. They are pulled out before the call arguments are stored so
//! the task function only ever receives its own arguments.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{DeferError, Result};
use crate::task::Kwargs;

/// Marks a named argument as a submission option
pub const OPTION_PREFIX: char = '_';

pub const NAME_OPTION: &str = "_name";
pub const QUEUE_OPTION: &str = "_queue";
pub const TARGET_OPTION: &str = "_target";
pub const COUNTDOWN_OPTION: &str = "_countdown";

/// Durable backend field that selects the destination queue
pub const QUEUE_FIELD: &str = "queue_name";

/// Options controlling how (not what) a task is submitted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionOptions {
    /// Idempotency name; derived from the arguments when absent
    pub name: Option<String>,
    pub queue: Option<String>,
    pub target_module: Option<String>,
    /// Delay before the task becomes eligible to run, in seconds
    pub countdown: Option<u64>,
    /// Backend-specific options, keyed with their `_` prefix
    pub passthrough: BTreeMap<String, Value>,
}

impl SubmissionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_option_key(key: &str) -> bool {
        key.starts_with(OPTION_PREFIX)
    }

    /// Split raw keyword arguments into call arguments and options
    pub fn split(kwargs: Kwargs) -> Result<(Kwargs, SubmissionOptions)> {
        let mut call_kwargs = Kwargs::new();
        let mut options = SubmissionOptions::new();

        for (key, value) in kwargs {
            if Self::is_option_key(&key) {
                options.set(key, value)?;
            } else {
                call_kwargs.insert(key, value);
            }
        }

        Ok((call_kwargs, options))
    }

    /// Move the `_`-prefixed entries of `kwargs` into these options and
    /// return the remaining call arguments.
    ///
    /// Options already set take precedence over inline ones.
    pub fn absorb(&mut self, kwargs: Kwargs) -> Result<Kwargs> {
        let (call_kwargs, inline) = Self::split(kwargs)?;

        self.name = self.name.take().or(inline.name);
        self.queue = self.queue.take().or(inline.queue);
        self.target_module = self.target_module.take().or(inline.target_module);
        self.countdown = self.countdown.or(inline.countdown);
        for (key, value) in inline.passthrough {
            self.passthrough.entry(key).or_insert(value);
        }

        Ok(call_kwargs)
    }

    /// Set an option by its prefixed key; unknown keys become passthrough
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        let key = if Self::is_option_key(&key) {
            key
        } else {
            format!("{}{}", OPTION_PREFIX, key)
        };

        match key.as_str() {
            NAME_OPTION => self.name = Some(expect_string(&key, value)?),
            QUEUE_OPTION => self.queue = Some(expect_string(&key, value)?),
            TARGET_OPTION => self.target_module = Some(expect_string(&key, value)?),
            COUNTDOWN_OPTION => {
                self.countdown = Some(value.as_u64().ok_or(DeferError::InvalidOption {
                    key: key.clone(),
                    expected: "a non-negative integer",
                })?)
            }
            _ => {
                self.passthrough.insert(key, value);
            }
        }
        Ok(())
    }

    /// Options as the durable backend expects them.
    ///
    /// The queue option is renamed to [`QUEUE_FIELD`]; everything else keeps
    /// its prefixed key.
    pub fn to_backend_options(&self) -> BackendOptions {
        let mut fields = self.passthrough.clone();
        if let Some(name) = &self.name {
            fields.insert(NAME_OPTION.to_string(), Value::from(name.as_str()));
        }
        if let Some(queue) = &self.queue {
            fields.insert(QUEUE_FIELD.to_string(), Value::from(queue.as_str()));
        }
        if let Some(target) = &self.target_module {
            fields.insert(TARGET_OPTION.to_string(), Value::from(target.as_str()));
        }
        if let Some(countdown) = self.countdown {
            fields.insert(COUNTDOWN_OPTION.to_string(), Value::from(countdown));
        }
        BackendOptions(fields)
    }

    /// Options as prefixed keyword arguments, for the immediate backend
    pub fn to_kwargs(&self) -> Kwargs {
        let mut kwargs = self.passthrough.clone();
        if let Some(name) = &self.name {
            kwargs.insert(NAME_OPTION.to_string(), Value::from(name.as_str()));
        }
        if let Some(queue) = &self.queue {
            kwargs.insert(QUEUE_OPTION.to_string(), Value::from(queue.as_str()));
        }
        if let Some(target) = &self.target_module {
            kwargs.insert(TARGET_OPTION.to_string(), Value::from(target.as_str()));
        }
        if let Some(countdown) = self.countdown {
            kwargs.insert(COUNTDOWN_OPTION.to_string(), Value::from(countdown));
        }
        kwargs
    }
}

fn expect_string(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(DeferError::InvalidOption {
            key: key.to_string(),
            expected: "a string",
        }),
    }
}

/// Field map handed to the durable backend alongside the payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendOptions(BTreeMap<String, Value>);

impl BackendOptions {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn task_name(&self) -> Option<&str> {
        self.get(NAME_OPTION).and_then(Value::as_str)
    }

    pub fn queue_name(&self) -> Option<&str> {
        self.get(QUEUE_FIELD).and_then(Value::as_str)
    }

    pub fn countdown(&self) -> Option<u64> {
        self.get(COUNTDOWN_OPTION).and_then(Value::as_u64)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for BackendOptions {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self(fields)
    }
}
