//! Fragments: the declarative building blocks of a service
//!
//! A fragment is plain data. Concrete services and reusable traits are both
//! fragments; a service lists the traits it mixes in by name and the
//! [`ServiceRegistry`](crate::registry::ServiceRegistry) flattens them.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deps::{Args, Dep};

/// Suffix marking a callback that only runs after an external commit
pub const AFTER_COMMIT_SUFFIX: &str = ":after_commit";

pub type LoaderFn = dyn Fn(&Args) -> Loaded + Send + Sync;
pub type CallbackFn = dyn Fn(&Args, &mut Value) + Send + Sync;

/// What a loader produced for its key
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// A plain value
    Value(Value),
    /// One nested service, attached as a child named after the key
    Service(ServiceDescriptor),
    /// Several nested services, attached as `key.0`, `key.1`, …
    Batch(Vec<ServiceDescriptor>),
}

impl Loaded {
    pub fn value(value: impl Into<Value>) -> Self {
        Loaded::Value(value.into())
    }
}

impl From<Value> for Loaded {
    fn from(value: Value) -> Self {
        Loaded::Value(value)
    }
}

impl From<ServiceDescriptor> for Loaded {
    fn from(descriptor: ServiceDescriptor) -> Self {
        Loaded::Service(descriptor)
    }
}

impl From<Vec<ServiceDescriptor>> for Loaded {
    fn from(descriptors: Vec<ServiceDescriptor>) -> Self {
        Loaded::Batch(descriptors)
    }
}

/// Reference to a registered service plus the inputs and labels to build it with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service: String,
    #[serde(default)]
    pub inputs: IndexMap<String, Value>,
    #[serde(default)]
    pub names: IndexMap<String, String>,
}

impl ServiceDescriptor {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Default::default()
        }
    }

    pub fn input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }

    pub fn name(mut self, key: impl Into<String>, label: impl Into<String>) -> Self {
        self.names.insert(key.into(), label.into());
        self
    }
}

/// A loader closure with its declared dependencies
#[derive(Clone)]
pub struct Loader {
    deps: Vec<Dep>,
    func: Arc<LoaderFn>,
}

impl Loader {
    pub fn new<D, F, R>(deps: impl IntoIterator<Item = D>, func: F) -> Self
    where
        D: Into<Dep>,
        F: Fn(&Args) -> R + Send + Sync + 'static,
        R: Into<Loaded>,
    {
        Self {
            deps: deps.into_iter().map(Into::into).collect(),
            func: Arc::new(move |args| func(args).into()),
        }
    }

    /// Loader without dependencies
    pub fn from_fn<F, R>(func: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Into<Loaded>,
    {
        Self {
            deps: Vec::new(),
            func: Arc::new(move |_| func().into()),
        }
    }

    /// Loader that always yields the same value
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::from_fn(move || value.clone())
    }

    #[inline]
    pub fn deps(&self) -> &[Dep] {
        &self.deps
    }

    pub fn call(&self, args: &Args) -> Loaded {
        (self.func)(args)
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader").field("deps", &self.deps).finish()
    }
}

/// A callback with its declared dependencies
///
/// Callbacks fire right after their data key commits, before anything
/// downstream reads it, and may adjust that key's value in place.
#[derive(Clone)]
pub struct Callback {
    deps: Vec<Dep>,
    func: Arc<CallbackFn>,
}

impl Callback {
    /// Callback that only observes its dependencies
    pub fn new<D, F>(deps: impl IntoIterator<Item = D>, func: F) -> Self
    where
        D: Into<Dep>,
        F: Fn(&Args) + Send + Sync + 'static,
    {
        Self::on_value(deps, move |args: &Args, _: &mut Value| func(args))
    }

    /// Callback that receives the committed value of its data key
    pub fn on_value<D, F>(deps: impl IntoIterator<Item = D>, func: F) -> Self
    where
        D: Into<Dep>,
        F: Fn(&Args, &mut Value) + Send + Sync + 'static,
    {
        Self {
            deps: deps.into_iter().map(Into::into).collect(),
            func: Arc::new(func),
        }
    }

    #[inline]
    pub fn deps(&self) -> &[Dep] {
        &self.deps
    }

    pub fn call(&self, args: &Args, value: &mut Value) {
        (self.func)(args, value)
    }
}

/// Data key a callback key is attached to: `filter` for `filter.order`
#[inline]
pub fn callback_data_key(callback_key: &str) -> &str {
    callback_key.split_once('.').map_or(callback_key, |(key, _)| key)
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback").field("deps", &self.deps).finish()
    }
}

/// Whether a callback key is deferred until after commit
#[inline]
pub fn is_after_commit(callback_key: &str) -> bool {
    callback_key.ends_with(AFTER_COMMIT_SUFFIX)
}

/// Declarations of one service type or reusable trait
#[derive(Debug, Clone, Default)]
pub struct Fragment {
    name: String,
    loaders: IndexMap<String, Loader>,
    rule_lists: IndexMap<String, Vec<String>>,
    callbacks: IndexMap<String, Callback>,
    promise_lists: IndexMap<String, Vec<String>>,
    bind_names: IndexMap<String, String>,
    traits: Vec<String>,
}

impl Fragment {
    pub fn builder(name: impl Into<String>) -> FragmentBuilder {
        FragmentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn loaders(&self) -> &IndexMap<String, Loader> {
        &self.loaders
    }

    pub fn rule_lists(&self) -> &IndexMap<String, Vec<String>> {
        &self.rule_lists
    }

    pub fn callbacks(&self) -> &IndexMap<String, Callback> {
        &self.callbacks
    }

    pub fn promise_lists(&self) -> &IndexMap<String, Vec<String>> {
        &self.promise_lists
    }

    pub fn bind_names(&self) -> &IndexMap<String, String> {
        &self.bind_names
    }

    pub fn traits(&self) -> &[String] {
        &self.traits
    }
}

/// Fluent builder for fragments
pub struct FragmentBuilder {
    fragment: Fragment,
}

impl FragmentBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            fragment: Fragment {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Add (or replace) the loader for a key
    pub fn loader(mut self, key: impl Into<String>, loader: Loader) -> Self {
        self.fragment.loaders.insert(key.into(), loader);
        self
    }

    /// Shorthand for a constant loader
    pub fn value(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.loader(key, Loader::constant(value))
    }

    /// Append rules to a key's rule list
    pub fn rules<S: Into<String>>(
        mut self,
        key: impl Into<String>,
        rules: impl IntoIterator<Item = S>,
    ) -> Self {
        self.fragment
            .rule_lists
            .entry(key.into())
            .or_default()
            .extend(rules.into_iter().map(Into::into));
        self
    }

    /// Add (or replace) a callback; the key is `<data key>.<name>`
    pub fn callback(mut self, key: impl Into<String>, callback: Callback) -> Self {
        self.fragment.callbacks.insert(key.into(), callback);
        self
    }

    /// Append keys that must be settled before `key`
    pub fn promise<S: Into<String>>(
        mut self,
        key: impl Into<String>,
        before: impl IntoIterator<Item = S>,
    ) -> Self {
        self.fragment
            .promise_lists
            .entry(key.into())
            .or_default()
            .extend(before.into_iter().map(Into::into));
        self
    }

    pub fn bind_name(mut self, key: impl Into<String>, label: impl Into<String>) -> Self {
        self.fragment.bind_names.insert(key.into(), label.into());
        self
    }

    /// Mix in another registered fragment by name
    pub fn with_trait(mut self, name: impl Into<String>) -> Self {
        self.fragment.traits.push(name.into());
        self
    }

    pub fn build(self) -> Fragment {
        self.fragment
    }
}
