//! Callback ordering and execution
//!
//! Callback keys are `<data key>.<name>` and fire once their data key has
//! settled. Promise lists order them: `{"result.b": ["result.a"]}` runs
//! `result.a` before `result.b`. Keys ending in `:after_commit` are held back
//! until [`Service::run_after_commit_callbacks`].

use std::sync::Arc;

use indexmap::IndexSet;
use serde_json::Value;
use tracing::debug;

use super::Service;
use crate::error::{Result, ServiceError};
use crate::event_log::EventKind;
use crate::fragment::{callback_data_key, is_after_commit, Callback};
use crate::registry::Blueprint;

impl Service {
    /// Callback keys of `key`, prerequisites first
    ///
    /// Promise-list entries under `key.` are expanded depth-first; callbacks
    /// not mentioned there follow in declaration order.
    pub fn ordered_callback_keys(&self, key: &str) -> Result<Vec<String>> {
        let prefix = format!("{}.", key);
        let blueprint = &self.blueprint;

        let mut ordered = IndexSet::new();
        let mut stack = Vec::new();
        for promise_key in blueprint.promise_keys().filter(|k| k.starts_with(&prefix)) {
            self.expand_promises(blueprint, promise_key, &mut stack, &mut ordered)?;
        }

        ordered.extend(
            blueprint
                .callback_keys()
                .filter(|k| k.starts_with(&prefix))
                .map(String::from),
        );

        Ok(ordered.into_iter().collect())
    }

    fn expand_promises(
        &self,
        blueprint: &Blueprint,
        key: &str,
        stack: &mut Vec<String>,
        ordered: &mut IndexSet<String>,
    ) -> Result<()> {
        if ordered.contains(key) {
            return Ok(());
        }

        if let Some(pos) = stack.iter().position(|k| k == key) {
            let mut cycle: Vec<&str> = stack[pos..].iter().map(String::as_str).collect();
            cycle.push(key);
            return Err(ServiceError::DependencyCycle {
                service: self.name().to_string(),
                cycle: cycle.join(" → "),
            });
        }

        stack.push(key.to_string());
        for before in blueprint.promises(key) {
            self.expand_promises(blueprint, before, stack, ordered)?;
        }
        stack.pop();

        ordered.insert(key.to_string());
        Ok(())
    }

    /// Validate callback dependencies and fire the real-time callbacks of `key`
    ///
    /// A dependency that fails marks `key` invalid after the fact; callbacks
    /// that already ran stay run.
    pub(super) fn run_callbacks(&mut self, key: &str) -> Result<()> {
        let blueprint = Arc::clone(&self.blueprint);

        for callback_key in self.ordered_callback_keys(key)? {
            let Some(callback) = blueprint.callback(&callback_key) else {
                continue;
            };

            for dep in callback.deps() {
                if !self.validate(dep.key())? {
                    self.invalidate(key);
                }
            }

            if !is_after_commit(&callback_key) {
                self.invoke(&callback_key, callback);
            }
        }

        Ok(())
    }

    /// Fire deferred callbacks, children first
    ///
    /// Callbacks run in declaration order, only for keys that validated, and
    /// only when the instance's error tree is empty.
    pub fn run_after_commit_callbacks(&mut self) -> Result<()> {
        for child in self.children.values_mut() {
            child.run_after_commit_callbacks()?;
        }

        if !self.total_errors().is_empty() {
            debug!(path = %self.path, "skipping after-commit callbacks");
            return Ok(());
        }

        let blueprint = Arc::clone(&self.blueprint);
        for callback_key in blueprint.callback_keys().filter(|k| is_after_commit(k)) {
            let validated = self.validations.get(callback_data_key(callback_key)) == Some(&true);
            if !validated {
                continue;
            }
            if let Some(callback) = blueprint.callback(callback_key) {
                self.invoke(callback_key, callback);
            }
        }

        Ok(())
    }

    /// Call a callback at most once; skipped when a dependency has no value
    ///
    /// The callback gets the committed value of its data key and may change it.
    fn invoke(&mut self, callback_key: &str, callback: &Callback) {
        if !self.executed.insert(callback_key.to_string()) {
            return;
        }

        let Some(args) = self.resolve_args(callback.deps()) else {
            debug!(path = %self.path, callback = callback_key, "callback dependencies unavailable");
            return;
        };

        let key = callback_data_key(callback_key);
        match self.data.get_mut(key) {
            Some(value) => callback.call(&args, value),
            None => {
                let mut value = Value::Null;
                callback.call(&args, &mut value);
                if !value.is_null() {
                    self.data.insert(key.to_string(), value);
                }
            }
        }
        debug!(path = %self.path, callback = callback_key, "callback run");
        self.ctx.emit(|| EventKind::CallbackRun {
            path: Arc::clone(&self.path),
            key: callback_key.to_string(),
            after_commit: is_after_commit(callback_key),
        });
    }
}
