//! Service registry and trait flattening
//!
//! The registry maps symbolic names to fragments. Flattening a service merges
//! its declarations with every trait it (transitively) mixes in, producing a
//! [`Blueprint`]. Blueprints are cached per service name.

use std::sync::Arc;

use dashmap::DashMap;
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::error::{Result, ServiceError};
use crate::fragment::{Callback, Fragment, Loader};

/// Flattened declarations of a service type
#[derive(Debug, Clone, Default)]
pub struct Blueprint {
    name: String,
    traits: Vec<String>,
    loaders: IndexMap<String, Loader>,
    /// key → rule → name of the fragment that declared it
    rule_lists: IndexMap<String, IndexMap<String, String>>,
    callbacks: IndexMap<String, Callback>,
    promise_lists: IndexMap<String, Vec<String>>,
    bind_names: IndexMap<String, String>,
}

impl Blueprint {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every trait merged into this blueprint, in merge order
    pub fn traits(&self) -> &[String] {
        &self.traits
    }

    pub fn loader(&self, key: &str) -> Option<&Loader> {
        self.loaders.get(key)
    }

    pub fn has_loader(&self, key: &str) -> bool {
        self.loaders.contains_key(key)
    }

    pub fn loader_keys(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }

    /// Rules declared for a key, in declaration order
    pub fn rules(&self, key: &str) -> impl Iterator<Item = &str> {
        self.rule_lists
            .get(key)
            .into_iter()
            .flat_map(|rules| rules.keys().map(String::as_str))
    }

    pub fn has_rules(&self, key: &str) -> bool {
        self.rule_lists.get(key).is_some_and(|rules| !rules.is_empty())
    }

    /// Fragment that declared a rule
    pub fn rule_origin(&self, key: &str, rule: &str) -> Option<&str> {
        self.rule_lists
            .get(key)
            .and_then(|rules| rules.get(rule))
            .map(String::as_str)
    }

    pub fn rule_keys(&self) -> impl Iterator<Item = &str> {
        self.rule_lists.keys().map(String::as_str)
    }

    pub fn callback(&self, key: &str) -> Option<&Callback> {
        self.callbacks.get(key)
    }

    pub fn callback_keys(&self) -> impl Iterator<Item = &str> {
        self.callbacks.keys().map(String::as_str)
    }

    /// Keys that must be settled before `key`
    pub fn promises(&self, key: &str) -> &[String] {
        static EMPTY: &[String] = &[];
        self.promise_lists
            .get(key)
            .map(|v| v.as_slice())
            .unwrap_or(EMPTY)
    }

    pub fn promise_keys(&self) -> impl Iterator<Item = &str> {
        self.promise_lists.keys().map(String::as_str)
    }

    pub fn bind_names(&self) -> &IndexMap<String, String> {
        &self.bind_names
    }

    /// Merge one fragment on top of what is already flattened
    fn merge(&mut self, fragment: &Fragment) -> Result<()> {
        for (key, loader) in fragment.loaders() {
            self.loaders.insert(key.clone(), loader.clone());
        }

        for (key, callback) in fragment.callbacks() {
            self.callbacks.insert(key.clone(), callback.clone());
        }

        for (key, label) in fragment.bind_names() {
            self.bind_names.insert(key.clone(), label.clone());
        }

        for (key, promises) in fragment.promise_lists() {
            let merged = self.promise_lists.entry(key.clone()).or_default();
            for promise in promises {
                if !merged.contains(promise) {
                    merged.push(promise.clone());
                }
            }
        }

        for (key, rules) in fragment.rule_lists() {
            let merged = self.rule_lists.entry(key.clone()).or_default();
            for rule in rules {
                if let Some(first) = merged.get(rule) {
                    return Err(ServiceError::DuplicateRule {
                        service: self.name.clone(),
                        key: key.clone(),
                        rule: rule.clone(),
                        first: first.clone(),
                        second: fragment.name().to_string(),
                    });
                }
                merged.insert(rule.clone(), fragment.name().to_string());
            }
        }

        Ok(())
    }
}

/// Registry of named fragments (services and traits alike)
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    fragments: IndexMap<String, Arc<Fragment>>,
    /// Cache of flattened blueprints
    blueprints: DashMap<String, Arc<Blueprint>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment under its name
    pub fn register(&mut self, fragment: Fragment) -> Result<()> {
        let name = fragment.name().to_string();
        if self.fragments.contains_key(&name) {
            return Err(ServiceError::DuplicateService { service: name });
        }
        self.blueprints.clear();
        self.fragments.insert(name, Arc::new(fragment));
        Ok(())
    }

    /// Chained form of [`register`](Self::register)
    pub fn with(mut self, fragment: Fragment) -> Result<Self> {
        self.register(fragment)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Fragment>> {
        self.fragments.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    fn fragment(&self, name: &str) -> Result<&Arc<Fragment>> {
        self.fragments
            .get(name)
            .ok_or_else(|| ServiceError::UnknownService {
                service: name.to_string(),
            })
    }

    /// All traits of a fragment, transitively, in merge order.
    ///
    /// Each trait's own traits come before the trait itself; duplicates keep
    /// their first position.
    pub fn all_traits(&self, name: &str) -> Result<Vec<String>> {
        let mut stack = vec![name.to_string()];
        let traits = self.collect_traits(name, &mut stack)?;
        Ok(traits.into_iter().collect())
    }

    fn collect_traits(&self, name: &str, stack: &mut Vec<String>) -> Result<IndexSet<String>> {
        let fragment = self.fragment(name)?;
        let mut traits = IndexSet::new();

        for trait_name in fragment.traits() {
            if let Some(pos) = stack.iter().position(|n| n == trait_name) {
                let mut cycle: Vec<&str> = stack[pos..].iter().map(String::as_str).collect();
                cycle.push(trait_name);
                return Err(ServiceError::TraitCycle {
                    cycle: cycle.join(" → "),
                });
            }

            stack.push(trait_name.clone());
            let nested = self.collect_traits(trait_name, stack)?;
            stack.pop();

            traits.extend(nested);
        }

        traits.extend(fragment.traits().iter().cloned());
        Ok(traits)
    }

    /// Flattened blueprint of a service (cached)
    pub fn blueprint(&self, name: &str) -> Result<Arc<Blueprint>> {
        if let Some(cached) = self.blueprints.get(name) {
            return Ok(Arc::clone(&cached));
        }

        let traits = self.all_traits(name)?;
        let mut blueprint = Blueprint {
            name: name.to_string(),
            traits: traits.clone(),
            ..Default::default()
        };

        for trait_name in &traits {
            blueprint.merge(self.fragment(trait_name)?)?;
        }
        blueprint.merge(self.fragment(name)?)?;

        debug!(
            service = name,
            traits = traits.len(),
            loaders = blueprint.loaders.len(),
            "flattened blueprint"
        );

        let blueprint = Arc::new(blueprint);
        self.blueprints
            .insert(name.to_string(), Arc::clone(&blueprint));
        Ok(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Loader;
    use serde_json::json;

    fn registry(fragments: Vec<Fragment>) -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        for fragment in fragments {
            registry.register(fragment).unwrap();
        }
        registry
    }

    #[test]
    fn traits_are_flattened_depth_first() {
        let registry = registry(vec![
            Fragment::builder("base").build(),
            Fragment::builder("paging").with_trait("base").build(),
            Fragment::builder("sorting").with_trait("base").build(),
            Fragment::builder("list")
                .with_trait("paging")
                .with_trait("sorting")
                .build(),
        ]);

        assert_eq!(
            registry.all_traits("list").unwrap(),
            ["base", "paging", "sorting"]
        );
    }

    #[test]
    fn concrete_service_wins_for_loaders() {
        let registry = registry(vec![
            Fragment::builder("defaults").value("limit", 10).value("page", 1).build(),
            Fragment::builder("list")
                .with_trait("defaults")
                .value("limit", 50)
                .build(),
        ]);

        let blueprint = registry.blueprint("list").unwrap();
        let limit = blueprint.loader("limit").unwrap().call(&Default::default());
        assert_eq!(limit, crate::fragment::Loaded::Value(json!(50)));
        // first declaration keeps its position
        assert_eq!(blueprint.loader_keys().collect::<Vec<_>>(), ["limit", "page"]);
    }

    #[test]
    fn rules_are_unioned() {
        let registry = registry(vec![
            Fragment::builder("typed").rules("limit", ["integer"]).build(),
            Fragment::builder("list")
                .with_trait("typed")
                .rules("limit", ["min:1"])
                .build(),
        ]);

        let blueprint = registry.blueprint("list").unwrap();
        assert_eq!(blueprint.rules("limit").collect::<Vec<_>>(), ["integer", "min:1"]);
        assert_eq!(blueprint.rule_origin("limit", "integer"), Some("typed"));
        assert_eq!(blueprint.rule_origin("limit", "min:1"), Some("list"));
    }

    #[test]
    fn duplicate_rule_across_fragments_is_rejected() {
        let registry = registry(vec![
            Fragment::builder("typed").rules("limit", ["integer"]).build(),
            Fragment::builder("list")
                .with_trait("typed")
                .rules("limit", ["integer"])
                .build(),
        ]);

        match registry.blueprint("list").unwrap_err() {
            ServiceError::DuplicateRule { key, rule, first, second, .. } => {
                assert_eq!(key, "limit");
                assert_eq!(rule, "integer");
                assert_eq!(first, "typed");
                assert_eq!(second, "list");
            }
            other => panic!("Expected DuplicateRule, got {other}"),
        }
    }

    #[test]
    fn duplicate_rule_within_fragment_is_rejected() {
        let registry = registry(vec![Fragment::builder("list")
            .rules("limit", ["integer", "integer"])
            .build()]);

        assert!(matches!(
            registry.blueprint("list"),
            Err(ServiceError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn promise_lists_are_concatenated() {
        let registry = registry(vec![
            Fragment::builder("audit").promise("result", ["token"]).build(),
            Fragment::builder("list")
                .with_trait("audit")
                .promise("result", ["limit", "token"])
                .build(),
        ]);

        let blueprint = registry.blueprint("list").unwrap();
        assert_eq!(blueprint.promises("result"), ["token", "limit"]);
        assert!(blueprint.promises("other").is_empty());
    }

    #[test]
    fn trait_cycle_is_detected() {
        let registry = registry(vec![
            Fragment::builder("a").with_trait("b").build(),
            Fragment::builder("b").with_trait("a").build(),
        ]);

        match registry.blueprint("a").unwrap_err() {
            ServiceError::TraitCycle { cycle } => assert_eq!(cycle, "a → b → a"),
            other => panic!("Expected TraitCycle, got {other}"),
        }
    }

    #[test]
    fn unknown_trait_is_reported() {
        let registry = registry(vec![Fragment::builder("list").with_trait("ghost").build()]);

        assert!(matches!(
            registry.blueprint("list"),
            Err(ServiceError::UnknownService { ref service }) if service == "ghost"
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ServiceRegistry::new();
        registry.register(Fragment::builder("list").build()).unwrap();
        assert!(matches!(
            registry.register(Fragment::builder("list").build()),
            Err(ServiceError::DuplicateService { .. })
        ));
    }

    #[test]
    fn blueprints_are_cached() {
        let registry = registry(vec![Fragment::builder("list")
            .loader("result", Loader::constant(1))
            .build()]);

        let first = registry.blueprint("list").unwrap();
        let second = registry.blueprint("list").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
