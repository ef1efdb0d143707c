//! Dotted-path resolution for deferred tasks
//!
//! Tasks are looked up through an explicit registry rather than reflection.
//! A module is registered under its (possibly dotted) name together with a
//! [`Namespace`] tree: leaves are callables, inner nodes play the role of
//! classes and nested classes. Resolution mirrors an import system:
//!
//! 1. Split the path on `.`.
//! 2. Find the longest prefix that names a registered module.
//! 3. Walk the remaining segments as nested attribute lookups.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::task::{TaskFn, TaskTarget};

/// Path segment separator
pub const SEPARATOR: char = '.';

/// A path that does not name a registered callable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPath {
    #[error("Empty task path")]
    Empty,
    #[error("Malformed task path '{0}'")]
    Malformed(String),
    #[error("No registered module for path '{0}'")]
    NoModule(String),
    #[error("Module '{module}' has no attribute '{attribute}'")]
    MissingAttribute { module: String, attribute: String },
    #[error("'{owner}' has no attribute '{attribute}'")]
    MissingNested { owner: String, attribute: String },
    #[error("'{0}' is not callable")]
    NotCallable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Module '{0}' is already registered")]
    DuplicateModule(String),
    #[error("Invalid module name '{0}'")]
    InvalidName(String),
}

enum Entry {
    Task(Arc<dyn TaskFn>),
    Namespace(Namespace),
}

/// Attribute tree of a registered module or class
#[derive(Default)]
pub struct Namespace {
    entries: HashMap<String, Entry>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callable attribute
    pub fn task(mut self, name: impl Into<String>, func: Arc<dyn TaskFn>) -> Self {
        self.entries.insert(name.into(), Entry::Task(func));
        self
    }

    /// Add a nested namespace (a class, or a class inside a class)
    pub fn namespace(mut self, name: impl Into<String>, namespace: Namespace) -> Self {
        self.entries.insert(name.into(), Entry::Namespace(namespace));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("Namespace").field("entries", &names).finish()
    }
}

/// Registry of modules that may be targeted by deferred tasks.
///
/// Built during startup, then shared read-only (typically in an `Arc`).
#[derive(Debug, Default)]
pub struct PathResolver {
    modules: HashMap<String, Namespace>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under a dotted name such as `billing.tasks`
    pub fn register_module(
        &mut self,
        name: impl Into<String>,
        namespace: Namespace,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() || name.split(SEPARATOR).any(str::is_empty) {
            return Err(RegistryError::InvalidName(name));
        }
        if self.modules.contains_key(&name) {
            return Err(RegistryError::DuplicateModule(name));
        }
        self.modules.insert(name, namespace);
        Ok(())
    }

    pub fn modules(&self) -> Vec<&str> {
        self.modules.keys().map(String::as_str).collect()
    }

    /// Resolve a dotted path to its callable
    pub fn resolve(&self, path: &str) -> Result<Arc<dyn TaskFn>, InvalidPath> {
        self.target(path).map(|target| target.func().clone())
    }

    /// Resolve a dotted path to a [`TaskTarget`] carrying its module split
    pub fn target(&self, path: &str) -> Result<TaskTarget, InvalidPath> {
        if path.is_empty() {
            return Err(InvalidPath::Empty);
        }
        let segments: Vec<&str> = path.split(SEPARATOR).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(InvalidPath::Malformed(path.to_string()));
        }

        // Longest module prefix wins; attribute misses do not fall back.
        for arity in (1..=segments.len()).rev() {
            let module = segments[..arity].join(".");
            if let Some(namespace) = self.modules.get(&module) {
                let func = walk(&module, namespace, &segments[arity..])?;
                let qualname = segments[arity..].join(".");
                return Ok(TaskTarget::new(module, qualname, func));
            }
        }

        Err(InvalidPath::NoModule(path.to_string()))
    }
}

fn walk(
    module: &str,
    namespace: &Namespace,
    attributes: &[&str],
) -> Result<Arc<dyn TaskFn>, InvalidPath> {
    let Some((first, rest)) = attributes.split_first() else {
        return Err(InvalidPath::NotCallable(module.to_string()));
    };

    let mut owner = format!("{}.{}", module, first);
    let mut current = namespace.get(first).ok_or_else(|| InvalidPath::MissingAttribute {
        module: module.to_string(),
        attribute: first.to_string(),
    })?;

    for attribute in rest {
        let next = match current {
            Entry::Namespace(namespace) => namespace.get(attribute),
            Entry::Task(_) => None,
        };
        current = next.ok_or_else(|| InvalidPath::MissingNested {
            owner: owner.clone(),
            attribute: attribute.to_string(),
        })?;
        owner.push(SEPARATOR);
        owner.push_str(attribute);
    }

    match current {
        Entry::Task(func) => Ok(func.clone()),
        Entry::Namespace(_) => Err(InvalidPath::NotCallable(owner)),
    }
}
