//! Basic rule engine
//!
//! Laravel-style rule strings: `required`, `string`, `in:a,b`, `min:3`,
//! `same:other`, … Implicit rules (`required*`) always run; every other rule
//! skips keys that are absent from the data, and `nullable` keys skip nulls.
//! A rule-key ending in `.*` applies its rules to each element of the array
//! stored under the parent key.

use dashmap::DashMap;
use regex::Regex;
use serde_json::{Map, Value};

use super::messages::{render, MessageKind};
use super::{parse_rule, Labels, Messages, RuleEngine, RuleSet};
use crate::error::{Result, ServiceError};

/// Rule engine shipped with the crate
#[derive(Debug, Default)]
pub struct BasicRules {
    /// Compiled `regex:` patterns
    regex_cache: DashMap<String, Regex>,
}

/// Everything a single key check needs besides the rules
struct Subject<'a> {
    locale: &'a str,
    key: &'a str,
    label: String,
    value: Option<&'a Value>,
    data: &'a Map<String, Value>,
    names: &'a Labels,
}

/// A failed rule: message kind plus placeholder values
struct Failure {
    kind: MessageKind,
    replacements: Vec<(&'static str, String)>,
}

impl Failure {
    fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            replacements: Vec::new(),
        }
    }

    fn with(mut self, placeholder: &'static str, value: impl Into<String>) -> Self {
        self.replacements.push((placeholder, value.into()));
        self
    }
}

impl BasicRules {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self, subject: &Subject<'_>, rules: &[String]) -> Result<Vec<String>> {
        let nullable = rules.iter().any(|r| r == "nullable");
        let numeric = rules
            .iter()
            .any(|r| r == "integer" || r == "numeric");
        let mut messages = Vec::new();

        for rule in rules {
            if let Some(failure) = self.apply(subject, rule, nullable, numeric)? {
                let mut replacements: Vec<(&str, &str)> =
                    vec![(":attribute", subject.label.as_str())];
                replacements.extend(failure.replacements.iter().map(|(p, v)| (*p, v.as_str())));
                messages.push(render(subject.locale, failure.kind, &replacements));
            }
        }

        Ok(messages)
    }

    fn apply(
        &self,
        subject: &Subject<'_>,
        rule: &str,
        nullable: bool,
        numeric: bool,
    ) -> Result<Option<Failure>> {
        let (name, params) = parse_rule(rule);
        let value = subject.value;

        // Implicit rules
        match name {
            "nullable" => return Ok(None),
            "required" => {
                return Ok(is_empty(value).then(|| Failure::new(MessageKind::Required)));
            }
            "required_with" => {
                let others = list_param(subject, rule, params)?;
                let triggered = others.iter().any(|k| !is_empty(subject.data.get(*k)));
                return Ok((triggered && is_empty(value)).then(|| Failure::new(MessageKind::Required)));
            }
            "required_without" => {
                let others = list_param(subject, rule, params)?;
                let triggered = others.iter().any(|k| is_empty(subject.data.get(*k)));
                return Ok((triggered && is_empty(value)).then(|| Failure::new(MessageKind::Required)));
            }
            _ => {}
        }

        let Some(value) = value else {
            return Ok(None);
        };
        if value.is_null() && nullable {
            return Ok(None);
        }

        let failure = match name {
            "string" => (!value.is_string()).then(|| Failure::new(MessageKind::String)),
            "integer" => (!is_integer(value)).then(|| Failure::new(MessageKind::Integer)),
            "numeric" => as_number(value)
                .is_none()
                .then(|| Failure::new(MessageKind::Numeric)),
            "boolean" => (!is_boolean(value)).then(|| Failure::new(MessageKind::Boolean)),
            "array" => (!value.is_array()).then(|| Failure::new(MessageKind::Array)),
            "in" => {
                let allowed = list_param(subject, rule, params)?;
                let found = scalar_str(value).is_some_and(|s| allowed.contains(&s.as_str()));
                (!found).then(|| Failure::new(MessageKind::In))
            }
            "not_in" => {
                let denied = list_param(subject, rule, params)?;
                let found = scalar_str(value).is_some_and(|s| denied.contains(&s.as_str()));
                found.then(|| Failure::new(MessageKind::In))
            }
            "in_array" => {
                let other = single_param(subject, rule, params)?;
                let other = other.strip_suffix(".*").unwrap_or(other);
                let found = subject
                    .data
                    .get(other)
                    .and_then(Value::as_array)
                    .is_some_and(|items| items.contains(value));
                (!found).then(|| {
                    Failure::new(MessageKind::InArray).with(":other", other_label(subject, other))
                })
            }
            "min" | "max" => {
                let bound = number_param(subject, rule, params)?;
                match size(value, numeric) {
                    Some((size, unit)) => {
                        let violated = if name == "min" { size < bound } else { size > bound };
                        violated.then(|| {
                            let (kind, placeholder) = size_message(name, unit);
                            Failure::new(kind).with(placeholder, format_number(bound))
                        })
                    }
                    None => None,
                }
            }
            "same" => {
                let other = single_param(subject, rule, params)?;
                (subject.data.get(other) != Some(value)).then(|| {
                    Failure::new(MessageKind::Same).with(":other", other_label(subject, other))
                })
            }
            "different" => {
                let other = single_param(subject, rule, params)?;
                (subject.data.get(other) == Some(value)).then(|| {
                    Failure::new(MessageKind::Different).with(":other", other_label(subject, other))
                })
            }
            "regex" => {
                let pattern = single_param(subject, rule, params)?;
                let matched = match value.as_str() {
                    Some(s) => self.regex(subject, rule, pattern)?.is_match(s),
                    None => false,
                };
                (!matched).then(|| Failure::new(MessageKind::Regex))
            }
            _ => {
                return Err(ServiceError::UnknownRule {
                    key: subject.key.to_string(),
                    rule: rule.to_string(),
                })
            }
        };

        Ok(failure)
    }

    /// Compile (or reuse) a `regex:` pattern; `/…/` delimiters are optional
    fn regex(&self, subject: &Subject<'_>, rule: &str, pattern: &str) -> Result<Regex> {
        if let Some(cached) = self.regex_cache.get(pattern) {
            return Ok(cached.clone());
        }

        let body = pattern
            .strip_prefix('/')
            .and_then(|p| p.strip_suffix('/'))
            .unwrap_or(pattern);
        let regex = Regex::new(body).map_err(|e| ServiceError::InvalidRuleParameter {
            key: subject.key.to_string(),
            rule: rule.to_string(),
            details: e.to_string(),
        })?;

        self.regex_cache.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

impl RuleEngine for BasicRules {
    fn evaluate(
        &self,
        locale: &str,
        data: &Map<String, Value>,
        rules: &RuleSet,
        names: &Labels,
    ) -> Result<Messages> {
        let mut messages = Messages::new();

        for (rule_key, list) in rules {
            if list.is_empty() {
                continue;
            }

            if let Some(parent) = rule_key.strip_suffix(".*") {
                let Some(items) = data.get(parent).and_then(Value::as_array) else {
                    continue;
                };
                for (i, item) in items.iter().enumerate() {
                    let item_key = format!("{}.{}", parent, i);
                    let label = names
                        .get(&item_key)
                        .or_else(|| names.get(rule_key))
                        .cloned()
                        .unwrap_or_else(|| humanize(&item_key));
                    let subject = Subject {
                        locale,
                        key: &item_key,
                        label,
                        value: Some(item),
                        data,
                        names,
                    };
                    let found = self.check(&subject, list)?;
                    if !found.is_empty() {
                        messages.insert(item_key.clone(), found);
                    }
                }
            } else {
                let subject = Subject {
                    locale,
                    key: rule_key,
                    label: names
                        .get(rule_key)
                        .cloned()
                        .unwrap_or_else(|| humanize(rule_key)),
                    value: data.get(rule_key),
                    data,
                    names,
                };
                let found = self.check(&subject, list)?;
                if !found.is_empty() {
                    messages.insert(rule_key.clone(), found);
                }
            }
        }

        Ok(messages)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeUnit {
    Number,
    Characters,
    Items,
}

fn size_message(rule: &str, unit: SizeUnit) -> (MessageKind, &'static str) {
    match (rule, unit) {
        ("min", SizeUnit::Number) => (MessageKind::MinNumeric, ":min"),
        ("min", SizeUnit::Characters) => (MessageKind::MinString, ":min"),
        ("min", SizeUnit::Items) => (MessageKind::MinArray, ":min"),
        (_, SizeUnit::Number) => (MessageKind::MaxNumeric, ":max"),
        (_, SizeUnit::Characters) => (MessageKind::MaxString, ":max"),
        (_, SizeUnit::Items) => (MessageKind::MaxArray, ":max"),
    }
}

/// Size of a value for min/max; numeric strings count as numbers when the
/// key also carries an `integer` or `numeric` rule
fn size(value: &Value, numeric: bool) -> Option<(f64, SizeUnit)> {
    match value {
        Value::Number(n) => n.as_f64().map(|n| (n, SizeUnit::Number)),
        Value::String(s) if numeric => match s.trim().parse::<f64>() {
            Ok(n) => Some((n, SizeUnit::Number)),
            Err(_) => Some((s.chars().count() as f64, SizeUnit::Characters)),
        },
        Value::String(s) => Some((s.chars().count() as f64, SizeUnit::Characters)),
        Value::Array(items) => Some((items.len() as f64, SizeUnit::Items)),
        _ => None,
    }
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn is_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::Number(n) => matches!(n.as_i64(), Some(0 | 1)),
        Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
        _ => false,
    }
}

fn scalar_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn humanize(key: &str) -> String {
    key.replace('_', " ")
}

fn other_label(subject: &Subject<'_>, other: &str) -> String {
    subject
        .names
        .get(other)
        .cloned()
        .unwrap_or_else(|| humanize(other))
}

fn missing_param(subject: &Subject<'_>, rule: &str) -> ServiceError {
    ServiceError::InvalidRuleParameter {
        key: subject.key.to_string(),
        rule: rule.to_string(),
        details: "missing parameter".to_string(),
    }
}

fn single_param<'r>(subject: &Subject<'_>, rule: &str, params: Option<&'r str>) -> Result<&'r str> {
    params
        .filter(|p| !p.is_empty())
        .ok_or_else(|| missing_param(subject, rule))
}

fn list_param<'r>(subject: &Subject<'_>, rule: &str, params: Option<&'r str>) -> Result<Vec<&'r str>> {
    Ok(single_param(subject, rule, params)?.split(',').collect())
}

fn number_param(subject: &Subject<'_>, rule: &str, params: Option<&str>) -> Result<f64> {
    let raw = single_param(subject, rule, params)?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ServiceError::InvalidRuleParameter {
            key: subject.key.to_string(),
            rule: rule.to_string(),
            details: format!("'{}' is not a number", raw),
        })
}
