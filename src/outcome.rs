//! Final shape of a run

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What `run()` hands back: the `result` value or the flattened error list
///
/// Serializes as `{"result": ...}` or `{"errors": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Result(Value),
    Errors(Vec<String>),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Result(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Outcome::Result(value) => Some(value),
            Outcome::Errors(_) => None,
        }
    }

    pub fn errors(&self) -> &[String] {
        match self {
            Outcome::Result(_) => &[],
            Outcome::Errors(errors) => errors,
        }
    }

    pub fn into_result(self) -> Option<Value> {
        match self {
            Outcome::Result(value) => Some(value),
            Outcome::Errors(_) => None,
        }
    }
}
