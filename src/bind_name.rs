//! Bind names - `{{key}}` label templates
//!
//! Labels are human-readable names for keys, used in error messages. A label
//! may itself reference other labels (`"{{order_by}} options"`), so resolution
//! expands tokens recursively. Rule strings use the same token syntax to
//! declare a data dependency (`same:{{password}}`).

use std::borrow::Cow;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ServiceError};

/// Pattern for {{key}} tokens (lowercase keys, `.` and `*` allowed)
static BIND_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([a-z0-9_.*]+)\}\}").unwrap());

/// Keys referenced by `{{key}}` tokens, in order of appearance
pub fn bind_keys(template: &str) -> Vec<&str> {
    BIND_NAME_RE
        .captures_iter(template)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Replace every `{{key}}` token with the bare key
///
/// Returns `Cow::Borrowed` when there are no tokens.
pub fn strip_tokens(template: &str) -> Cow<'_, str> {
    BIND_NAME_RE.replace_all(template, "$1")
}

/// Wrap a key in a token: `key` → `{{key}}`
pub fn token(key: &str) -> String {
    format!("{{{{{}}}}}", key)
}

/// Resolves label templates against declared and instance-level names
///
/// Instance names (handed down by a parent, or filled in during validation)
/// take precedence over the names declared by the service's fragments.
pub struct BindNameResolver<'a> {
    service: &'a str,
    declared: &'a IndexMap<String, String>,
    dynamic: &'a IndexMap<String, String>,
}

impl<'a> BindNameResolver<'a> {
    pub fn new(
        service: &'a str,
        declared: &'a IndexMap<String, String>,
        dynamic: &'a IndexMap<String, String>,
    ) -> Self {
        Self {
            service,
            declared,
            dynamic,
        }
    }

    /// Expand all tokens in `template`
    pub fn resolve(&self, template: &str) -> Result<String> {
        let mut stack = Vec::new();
        self.expand(template, &mut stack)
    }

    /// Resolved label of a single key
    pub fn label(&self, key: &str) -> Result<String> {
        self.resolve(&token(key))
    }

    fn lookup(&self, key: &str) -> Option<&'a str> {
        self.dynamic
            .get(key)
            .or_else(|| self.declared.get(key))
            .map(String::as_str)
    }

    fn expand(&self, template: &str, stack: &mut Vec<String>) -> Result<String> {
        let mut name = template.to_string();

        while let Some(key) = bind_keys(&name).first().map(|k| k.to_string()) {
            if let Some(pos) = stack.iter().position(|k| *k == key) {
                let mut cycle: Vec<&str> = stack[pos..].iter().map(String::as_str).collect();
                cycle.push(&key);
                return Err(ServiceError::BindNameCycle {
                    service: self.service.to_string(),
                    cycle: cycle.join(" → "),
                });
            }

            let label = self.lookup(&key).ok_or_else(|| ServiceError::MissingBindName {
                key: key.clone(),
                service: self.service.to_string(),
            })?;

            stack.push(key.clone());
            let replacement = self.expand(label, stack)?;
            stack.pop();

            name = name.replacen(&token(&key), &replacement, 1);
        }

        Ok(name)
    }
}
