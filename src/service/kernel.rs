//! Memoized key resolution
//!
//! `validate(key)` settles one key: its promises, its loader dependencies,
//! the rules that apply to it, and its value. The first settled result is
//! final for the lifetime of the instance.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::Service;
use crate::bind_name::{bind_keys, strip_tokens, token};
use crate::error::{Result, ServiceError};
use crate::event_log::EventKind;
use crate::fragment::Loaded;
use crate::rules::{is_required_rule, RuleSet};

/// Promise entries may carry a `:strict` marker; it has no effect
fn promise_key(promise: &str) -> &str {
    promise.split_once(':').map_or(promise, |(key, _)| key)
}

impl Service {
    /// Resolve and validate a top-level key (memoized)
    pub fn validate(&mut self, key: &str) -> Result<bool> {
        if key.contains('.') {
            return Err(ServiceError::CompoundKey {
                key: key.to_string(),
                service: self.name().to_string(),
            });
        }

        if let Some(&valid) = self.validations.get(key) {
            return Ok(valid);
        }

        if let Some(pos) = self.resolving.iter().position(|k| k == key) {
            let mut cycle: Vec<&str> = self.resolving[pos..].iter().map(String::as_str).collect();
            cycle.push(key);
            return Err(ServiceError::DependencyCycle {
                service: self.name().to_string(),
                cycle: cycle.join(" → "),
            });
        }

        self.resolving.push(key.to_string());
        let settled = self.settle(key);
        self.resolving.pop();

        let valid = settled?;
        debug!(path = %self.path, key, valid, "key validated");
        self.ctx.emit(|| EventKind::KeyValidated {
            path: Arc::clone(&self.path),
            key: key.to_string(),
            valid,
            value: self.data.get(key).cloned(),
        });
        Ok(valid)
    }

    fn settle(&mut self, key: &str) -> Result<bool> {
        let blueprint = Arc::clone(&self.blueprint);

        // every promise is attempted, even after one fails
        let mut promised = true;
        for promise in blueprint.promises(key) {
            if !self.validate(promise_key(promise))? {
                promised = false;
            }
        }
        if !promised {
            self.invalidate(key);
            return Ok(false);
        }

        if let Some(loader) = blueprint.loader(key) {
            for dep in loader.deps() {
                if !self.validate(dep.key())? {
                    self.invalidate(key);
                }
            }
        }
        if self.is_invalid(key) {
            return Ok(false);
        }

        let rule_sets = self.available_rules(key)?;
        let candidate = self.available_data(key)?;

        if self.is_invalid(key) || !self.apply_rules(key, &rule_sets, candidate.as_ref())? {
            return Ok(false);
        }

        if let Some(value) = candidate {
            self.data.insert(key.to_string(), value);
        }
        self.validations.insert(key.to_string(), true);

        self.run_callbacks(key)?;

        Ok(!self.is_invalid(key))
    }

    /// Rules that apply to `key`, grouped by rule-key, tokens stripped
    ///
    /// Keys with neither a loader nor an input only get their required rules.
    /// Each `{{dep}}` token is validated first; a rule whose dependency fails
    /// is dropped and `key` is marked invalid.
    fn available_rules(&mut self, key: &str) -> Result<Vec<(String, Vec<String>)>> {
        let blueprint = Arc::clone(&self.blueprint);
        let has_source = blueprint.has_loader(key) || self.inputs.contains_key(key);

        let own: Vec<String> = blueprint
            .rules(key)
            .filter(|rule| has_source || is_required_rule(rule))
            .map(String::from)
            .collect();
        if own.is_empty() {
            return Ok(Vec::new());
        }

        let mut rule_sets = vec![(key.to_string(), own)];
        let wildcard = format!("{}.*", key);
        if blueprint.has_rules(&wildcard) {
            let items = blueprint.rules(&wildcard).map(String::from).collect();
            rule_sets.push((wildcard, items));
        }

        let label = self.resolve_bind_name(&token(key))?;
        self.names.insert(key.to_string(), label);

        for (_, rules) in rule_sets.iter_mut() {
            let mut kept = Vec::with_capacity(rules.len());

            for rule in rules.drain(..) {
                let mut satisfied = true;

                for dep in bind_keys(&rule) {
                    let label = self.resolve_bind_name(&token(dep))?;
                    self.names.insert(dep.to_string(), label);

                    if !self.validate(dep)? {
                        self.invalidate(key);
                        satisfied = false;
                        continue;
                    }

                    if !is_required_rule(&rule) && !self.data.contains_key(dep) {
                        return Err(ServiceError::UnresolvedRuleDependency {
                            service: self.name().to_string(),
                            key: key.to_string(),
                            rule: rule.clone(),
                            dependency: dep.to_string(),
                        });
                    }
                }

                if satisfied {
                    kept.push(strip_tokens(&rule).into_owned());
                }
            }

            *rules = kept;
        }

        Ok(rule_sets)
    }

    /// Value for `key`: committed data, else the input, else the loader
    fn available_data(&mut self, key: &str) -> Result<Option<Value>> {
        if let Some(value) = self.data.get(key) {
            return Ok(Some(value.clone()));
        }

        if let Some(value) = self.inputs.get(key) {
            return Ok(Some(value.clone()));
        }

        let blueprint = Arc::clone(&self.blueprint);
        let Some(loader) = blueprint.loader(key) else {
            return Ok(None);
        };

        let Some(args) = self.resolve_args(loader.deps()) else {
            debug!(path = %self.path, key, "loader dependencies unavailable");
            return Ok(None);
        };

        self.ctx.emit(|| EventKind::LoaderInvoked {
            path: Arc::clone(&self.path),
            key: key.to_string(),
        });

        match loader.call(&args) {
            Loaded::Value(value) => Ok(Some(value)),
            Loaded::Batch(descriptors) if descriptors.is_empty() => Ok(Some(Value::Array(Vec::new()))),
            Loaded::Service(descriptor) => self.attach_children(key, vec![descriptor], false),
            Loaded::Batch(descriptors) => self.attach_children(key, descriptors, true),
        }
    }

    /// Evaluate each rule-key against committed data plus the candidate
    ///
    /// Stops at the first rule-key with messages.
    fn apply_rules(
        &mut self,
        key: &str,
        rule_sets: &[(String, Vec<String>)],
        candidate: Option<&Value>,
    ) -> Result<bool> {
        if rule_sets.iter().all(|(_, rules)| rules.is_empty()) {
            return Ok(true);
        }

        let mut snapshot = self.data.clone();
        if let Some(value) = candidate {
            snapshot.insert(key.to_string(), value.clone());
        }
        let locale = self.ctx.locale()?;

        for (rule_key, rules) in rule_sets {
            if rules.is_empty() {
                continue;
            }

            let mut set = RuleSet::new();
            set.insert(rule_key.clone(), rules.clone());
            let messages = self
                .ctx
                .rule_engine()
                .evaluate(&locale, &snapshot, &set, &self.names)?;

            let count: usize = messages.values().map(Vec::len).sum();
            debug!(path = %self.path, rule_key = %rule_key, rules = rules.len(), messages = count, "rules evaluated");
            self.ctx.emit(|| EventKind::RulesEvaluated {
                path: Arc::clone(&self.path),
                key: rule_key.clone(),
                rules: rules.len(),
                messages: count,
            });

            if count > 0 {
                self.invalidate(rule_key);
                self.errors
                    .entry(rule_key.clone())
                    .or_default()
                    .extend(messages.into_values().flatten());
                self.invalidate(key);
                return Ok(false);
            }
        }

        Ok(true)
    }
}
