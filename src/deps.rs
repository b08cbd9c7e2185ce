//! Dependency declarations for loaders and callbacks
//!
//! Every closure declares the keys it reads, in parameter order. Names may be
//! written camelCase (`orderBy`) or snake_case (`order_by`); both map to the
//! engine's snake_case key convention. A dependency may carry a default that
//! stands in when the key has no data.

use serde_json::Value;

/// A single declared dependency: the key it reads and an optional default
#[derive(Debug, Clone, PartialEq)]
pub struct Dep {
    key: String,
    default: Option<Value>,
}

impl Dep {
    /// Dependency without a default
    pub fn new(param: &str) -> Self {
        Self {
            key: param_to_key(param),
            default: None,
        }
    }

    /// Dependency that falls back to `default` when the key has no data
    pub fn with_default(param: &str, default: impl Into<Value>) -> Self {
        Self {
            key: param_to_key(param),
            default: Some(default.into()),
        }
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    #[inline]
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

impl From<&str> for Dep {
    fn from(param: &str) -> Self {
        Dep::new(param)
    }
}

impl From<String> for Dep {
    fn from(param: String) -> Self {
        Dep::new(&param)
    }
}

/// Convert a parameter name into a data key.
///
/// All-lowercase names are kept. Anything else has each word capitalized,
/// its whitespace removed, `_` put before every uppercase letter but the
/// first, and is lowercased: `orderBy` → `order_by`, `order by` → `order_by`.
pub fn param_to_key(param: &str) -> String {
    if !param.is_empty() && param.chars().all(|c| c.is_lowercase()) {
        return param.to_string();
    }

    let mut key = String::with_capacity(param.len() + 4);
    let mut word_start = true;
    let mut first = true;
    for ch in param.chars() {
        if ch.is_whitespace() {
            word_start = true;
            continue;
        }
        let upper = ch.is_uppercase() || (word_start && ch.is_lowercase());
        if upper && !first {
            key.push('_');
        }
        key.extend(ch.to_lowercase());
        word_start = false;
        first = false;
    }
    key
}

/// Resolved dependency values handed to a closure, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    entries: Vec<(String, Value)>,
}

static NULL: Value = Value::Null;

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, key: impl Into<String>, value: Value) {
        self.entries.push((key.into(), value));
    }

    /// Value for a key, if declared
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Value for a key, `Null` when not declared
    pub fn value(&self, key: &str) -> &Value {
        self.get(key).unwrap_or(&NULL)
    }

    /// Value at a parameter position
    pub fn at(&self, index: usize) -> Option<&Value> {
        self.entries.get(index).map(|(_, v)| v)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
