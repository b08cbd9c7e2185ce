//! Rule engine seam
//!
//! The resolution kernel decides *which* rules apply to a key and which data
//! they see; a [`RuleEngine`] decides whether the data satisfies them and
//! phrases the messages. [`BasicRules`] is the engine shipped with the crate.

mod basic;
mod messages;

pub use basic::BasicRules;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::Result;

/// Rule-key → rule strings (tokens already stripped)
pub type RuleSet = IndexMap<String, Vec<String>>;

/// Key → human-readable label
pub type Labels = IndexMap<String, String>;

/// Key → messages; empty means no violations
pub type Messages = IndexMap<String, Vec<String>>;

/// Turns rules plus bound data into human-readable messages
pub trait RuleEngine: Send + Sync {
    fn evaluate(
        &self,
        locale: &str,
        data: &Map<String, Value>,
        rules: &RuleSet,
        names: &Labels,
    ) -> Result<Messages>;
}

/// Rules starting with `required` run even when a key has no input and no loader
#[inline]
pub fn is_required_rule(rule: &str) -> bool {
    rule.starts_with("required")
}

/// Split `name:params` into the rule name and its parameter string
pub fn parse_rule(rule: &str) -> (&str, Option<&str>) {
    match rule.split_once(':') {
        Some((name, params)) => (name, Some(params)),
        None => (rule, None),
    }
}
