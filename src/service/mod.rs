//! Service instances
//!
//! A [`Service`] is one evaluation of a flattened [`Blueprint`] over a set of
//! inputs. Keys are resolved on demand and memoized (see [`kernel`]); loaders
//! that return descriptors grow a tree of child services (see [`children`]);
//! callbacks run in promise order once their key settles (see [`callbacks`]).
//!
//! ```text
//! run()
//!  ├─ validate(input keys)
//!  ├─ validate(rule keys)
//!  ├─ validate(loader keys)
//!  └─ errors anywhere in the tree ? Errors(total_errors) : Result(data.result)
//! ```

mod callbacks;
mod children;
mod kernel;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::bind_name::BindNameResolver;
use crate::context::Context;
use crate::deps::{Args, Dep};
use crate::error::{Result, ServiceError};
use crate::event_log::EventKind;
use crate::fragment::ServiceDescriptor;
use crate::outcome::Outcome;
use crate::registry::Blueprint;

/// Key whose value is the outcome of a successful run
pub const RESULT_KEY: &str = "result";

pub struct Service {
    blueprint: Arc<Blueprint>,
    ctx: Context,
    /// Position in the service tree, for logs and events
    path: Arc<str>,
    inputs: IndexMap<String, Value>,
    /// Committed values (append-only)
    data: Map<String, Value>,
    validations: IndexMap<String, bool>,
    errors: IndexMap<String, Vec<String>>,
    names: IndexMap<String, String>,
    children: IndexMap<String, Service>,
    /// Keys currently being resolved, innermost last
    resolving: Vec<String>,
    /// Callback keys already invoked
    executed: FxHashSet<String>,
    processed: bool,
}

impl Service {
    /// Root instance for a descriptor
    pub fn new(ctx: Context, descriptor: &ServiceDescriptor) -> Result<Self> {
        Self::spawn(
            ctx,
            &descriptor.service,
            descriptor.inputs.clone(),
            descriptor.names.clone(),
            Arc::from("root"),
        )
    }

    pub(crate) fn spawn(
        ctx: Context,
        service: &str,
        inputs: IndexMap<String, Value>,
        names: IndexMap<String, String>,
        path: Arc<str>,
    ) -> Result<Self> {
        let blueprint = ctx.registry().blueprint(service)?;

        // empty strings count as "not supplied"
        let inputs = inputs
            .into_iter()
            .filter(|(_, value)| value.as_str() != Some(""))
            .collect();

        Ok(Self {
            blueprint,
            ctx,
            path,
            inputs,
            data: Map::new(),
            validations: IndexMap::new(),
            errors: IndexMap::new(),
            names,
            children: IndexMap::new(),
            resolving: Vec::new(),
            executed: FxHashSet::default(),
            processed: false,
        })
    }

    pub fn name(&self) -> &str {
        self.blueprint.name()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn blueprint(&self) -> &Blueprint {
        &self.blueprint
    }

    pub fn inputs(&self) -> &IndexMap<String, Value> {
        &self.inputs
    }

    /// Committed data, sorted by key
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Validation results, sorted by key
    pub fn validations(&self) -> BTreeMap<String, bool> {
        self.validations
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Messages per rule-key, sorted by key
    pub fn errors(&self) -> BTreeMap<String, Vec<String>> {
        self.errors
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn names(&self) -> &IndexMap<String, String> {
        &self.names
    }

    pub fn children(&self) -> &IndexMap<String, Service> {
        &self.children
    }

    pub fn child(&self, key: &str) -> Option<&Service> {
        self.children.get(key)
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// Own messages in the order they were recorded, then every child's
    pub fn total_errors(&self) -> Vec<String> {
        let mut errors: Vec<String> = self.errors.values().flatten().cloned().collect();
        for child in self.children.values() {
            errors.extend(child.total_errors());
        }
        errors
    }

    /// Resolve every input, rule and loader key once, then report
    #[instrument(skip(self), fields(service = %self.blueprint.name(), path = %self.path))]
    pub fn run(&mut self) -> Result<Outcome> {
        if !self.processed {
            self.ctx.emit(|| EventKind::ServiceStarted {
                path: Arc::clone(&self.path),
                service: self.blueprint.name().to_string(),
                inputs: self.inputs.keys().cloned().collect(),
            });

            let blueprint = Arc::clone(&self.blueprint);
            let keys: Vec<String> = self
                .inputs
                .keys()
                .map(String::as_str)
                // `key.*` rules are checked together with `key`
                .chain(blueprint.rule_keys().filter(|k| !k.ends_with(".*")))
                .chain(blueprint.loader_keys())
                .map(String::from)
                .collect();

            for key in &keys {
                self.validate(key)?;
            }
            self.processed = true;

            let error_count = self.total_errors().len();
            debug!(errors = error_count, "service resolved");
            self.ctx.emit(|| EventKind::ServiceCompleted {
                path: Arc::clone(&self.path),
                service: self.blueprint.name().to_string(),
                error_count,
            });
        }

        let errors = self.total_errors();
        if !errors.is_empty() {
            return Ok(Outcome::Errors(errors));
        }

        match self.data.get(RESULT_KEY) {
            Some(result) => Ok(Outcome::Result(result.clone())),
            None => Err(ServiceError::MissingResult {
                service: self.blueprint.name().to_string(),
            }),
        }
    }

    /// Expand `{{key}}` tokens against instance names, then declared names
    pub fn resolve_bind_name(&self, template: &str) -> Result<String> {
        BindNameResolver::new(self.blueprint.name(), self.blueprint.bind_names(), &self.names)
            .resolve(template)
    }

    /// Values for a closure's dependencies; `None` when one has neither data
    /// nor a default
    fn resolve_args(&self, deps: &[Dep]) -> Option<Args> {
        let mut args = Args::new();
        for dep in deps {
            let value = self
                .data
                .get(dep.key())
                .or_else(|| dep.default())
                .cloned()?;
            args.push(dep.key(), value);
        }
        Some(args)
    }

    fn invalidate(&mut self, key: &str) {
        self.validations.insert(key.to_string(), false);
    }

    fn is_invalid(&self, key: &str) -> bool {
        self.validations.get(key) == Some(&false)
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("service", &self.blueprint.name())
            .field("path", &self.path)
            .field("inputs", &self.inputs)
            .field("data", &self.data)
            .field("validations", &self.validations)
            .field("errors", &self.errors)
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .field("processed", &self.processed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;
    use crate::registry::ServiceRegistry;
    use serde_json::json;

    fn ctx(fragments: Vec<Fragment>) -> Context {
        let mut registry = ServiceRegistry::new();
        for fragment in fragments {
            registry.register(fragment).unwrap();
        }
        Context::builder(registry).locale("en").build()
    }

    #[test]
    fn constant_result() {
        let ctx = ctx(vec![Fragment::builder("answer").value("result", 42).build()]);
        let mut service = ctx.service(&ServiceDescriptor::new("answer")).unwrap();

        assert_eq!(service.run().unwrap(), Outcome::Result(json!(42)));
        assert!(service.is_processed());
    }

    #[test]
    fn empty_string_inputs_are_dropped() {
        let ctx = ctx(vec![Fragment::builder("echo").build()]);
        let service = ctx
            .service(
                &ServiceDescriptor::new("echo")
                    .input("words", "")
                    .input("limit", 3),
            )
            .unwrap();

        assert_eq!(service.inputs().keys().collect::<Vec<_>>(), ["limit"]);
    }

    #[test]
    fn missing_result_is_a_configuration_error() {
        let ctx = ctx(vec![Fragment::builder("empty").value("other", 1).build()]);
        let mut service = ctx.service(&ServiceDescriptor::new("empty")).unwrap();

        assert!(matches!(
            service.run(),
            Err(ServiceError::MissingResult { ref service }) if service == "empty"
        ));
    }

    #[test]
    fn rerun_reuses_memoized_state() {
        let ctx = ctx(vec![Fragment::builder("answer").value("result", 1).build()]);
        let mut service = ctx.service(&ServiceDescriptor::new("answer")).unwrap();

        let first = service.run().unwrap();
        assert_eq!(service.run().unwrap(), first);
        assert_eq!(service.validations().len(), 1);
    }

    #[test]
    fn snapshots_are_key_sorted() {
        let ctx = ctx(vec![Fragment::builder("s")
            .value("zeta", 1)
            .value("alpha", 2)
            .value("result", 3)
            .build()]);
        let mut service = ctx.service(&ServiceDescriptor::new("s")).unwrap();
        service.run().unwrap();

        assert_eq!(
            service.validations().keys().collect::<Vec<_>>(),
            ["alpha", "result", "zeta"]
        );
        assert_eq!(
            service.data().keys().collect::<Vec<_>>(),
            ["alpha", "result", "zeta"]
        );
    }

    #[test]
    fn args_fall_back_to_defaults() {
        let ctx = ctx(vec![Fragment::builder("s").value("limit", 5).build()]);
        let mut service = ctx.service(&ServiceDescriptor::new("s")).unwrap();
        service.validate("limit").unwrap();

        let args = service
            .resolve_args(&[Dep::new("limit"), Dep::with_default("page", 1)])
            .unwrap();
        assert_eq!(args.i64("limit"), Some(5));
        assert_eq!(args.i64("page"), Some(1));

        assert!(service.resolve_args(&[Dep::new("page")]).is_none());
    }
}
