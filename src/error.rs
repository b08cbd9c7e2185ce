//! Error types with fix suggestions
//!
//! Error code ranges:
//! - SVC-010-019: Registry / composition errors
//! - SVC-020-029: Bind-name errors
//! - SVC-030-039: Resolution kernel errors
//! - SVC-040-049: Context errors
//! - SVC-050-059: Rule engine errors
//! - SVC-060-069: Request errors
//!
//! Every variant is a configuration mistake. Validation failures are never
//! errors: they are collected into the service's error tree instead.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Registry errors (SVC-010 to SVC-019)
    // ─────────────────────────────────────────────────────────────
    #[error("SVC-010: Service '{service}' is not registered")]
    UnknownService { service: String },

    #[error("SVC-011: Service '{service}' is already registered")]
    DuplicateService { service: String },

    #[error(
        "SVC-012: Duplicate rule '{rule}' on key '{key}' in '{service}' (declared by '{first}' and '{second}')"
    )]
    DuplicateRule {
        service: String,
        key: String,
        rule: String,
        first: String,
        second: String,
    },

    #[error("SVC-013: Trait cycle detected: {cycle}")]
    TraitCycle { cycle: String },

    // ─────────────────────────────────────────────────────────────
    // Bind-name errors (SVC-020 to SVC-029)
    // ─────────────────────────────────────────────────────────────
    #[error("SVC-020: Bind name '{key}' is not declared in '{service}'")]
    MissingBindName { key: String, service: String },

    #[error("SVC-021: Bind name cycle in '{service}': {cycle}")]
    BindNameCycle { service: String, cycle: String },

    // ─────────────────────────────────────────────────────────────
    // Kernel errors (SVC-030 to SVC-039)
    // ─────────────────────────────────────────────────────────────
    #[error("SVC-030: Compound key '{key}' cannot be validated directly in '{service}'")]
    CompoundKey { key: String, service: String },

    #[error("SVC-031: Dependency cycle in '{service}': {cycle}")]
    DependencyCycle { service: String, cycle: String },

    #[error(
        "SVC-032: Rule '{rule}' on '{key}' depends on '{dependency}', which has no data in '{service}'"
    )]
    UnresolvedRuleDependency {
        service: String,
        key: String,
        rule: String,
        dependency: String,
    },

    #[error("SVC-033: Service '{service}' finished without errors but produced no 'result'")]
    MissingResult { service: String },

    // ─────────────────────────────────────────────────────────────
    // Context errors (SVC-040 to SVC-049)
    // ─────────────────────────────────────────────────────────────
    #[error("SVC-040: Locale resolver is not configured")]
    LocaleNotConfigured,

    // ─────────────────────────────────────────────────────────────
    // Rule engine errors (SVC-050 to SVC-059)
    // ─────────────────────────────────────────────────────────────
    #[error("SVC-050: Unknown rule '{rule}' on '{key}'")]
    UnknownRule { key: String, rule: String },

    #[error("SVC-051: Invalid parameter for rule '{rule}' on '{key}': {details}")]
    InvalidRuleParameter {
        key: String,
        rule: String,
        details: String,
    },

    // ─────────────────────────────────────────────────────────────
    // Request errors (SVC-060 to SVC-069)
    // ─────────────────────────────────────────────────────────────
    #[error("SVC-060: Invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl ServiceError {
    /// Stable error code (e.g. "SVC-031"), if the variant has one
    pub fn code(&self) -> Option<&'static str> {
        let code = match self {
            ServiceError::Io(_) | ServiceError::YamlParse(_) | ServiceError::Json(_) => return None,
            ServiceError::UnknownService { .. } => "SVC-010",
            ServiceError::DuplicateService { .. } => "SVC-011",
            ServiceError::DuplicateRule { .. } => "SVC-012",
            ServiceError::TraitCycle { .. } => "SVC-013",
            ServiceError::MissingBindName { .. } => "SVC-020",
            ServiceError::BindNameCycle { .. } => "SVC-021",
            ServiceError::CompoundKey { .. } => "SVC-030",
            ServiceError::DependencyCycle { .. } => "SVC-031",
            ServiceError::UnresolvedRuleDependency { .. } => "SVC-032",
            ServiceError::MissingResult { .. } => "SVC-033",
            ServiceError::LocaleNotConfigured => "SVC-040",
            ServiceError::UnknownRule { .. } => "SVC-050",
            ServiceError::InvalidRuleParameter { .. } => "SVC-051",
            ServiceError::InvalidRequest { .. } => "SVC-060",
        };
        Some(code)
    }
}

impl FixSuggestion for ServiceError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ServiceError::Io(_) => Some("Check file path and permissions"),
            ServiceError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            ServiceError::Json(_) => None,
            ServiceError::UnknownService { .. } => {
                Some("Register the service (and every trait it names) before running it")
            }
            ServiceError::DuplicateService { .. } => Some("Give each fragment a unique name"),
            ServiceError::DuplicateRule { .. } => {
                Some("Declare each rule once per key across a service and its traits")
            }
            ServiceError::TraitCycle { .. } => {
                Some("Remove the circular trait reference - traits cannot include themselves")
            }
            ServiceError::MissingBindName { .. } => {
                Some("Add a bind name for the key to the service or one of its traits")
            }
            ServiceError::BindNameCycle { .. } => {
                Some("A bind name must not refer back to itself through {{tokens}}")
            }
            ServiceError::CompoundKey { .. } => {
                Some("Validate the top-level key; nested data is reached through child services")
            }
            ServiceError::DependencyCycle { .. } => {
                Some("Break the cycle between loaders, promise lists and rule tokens")
            }
            ServiceError::UnresolvedRuleDependency { .. } => {
                Some("Add a loader for the referenced key or make the rule a required rule")
            }
            ServiceError::MissingResult { .. } => Some("Declare a loader for the 'result' key"),
            ServiceError::LocaleNotConfigured => {
                Some("Configure a locale with Context::builder(..).locale(..)")
            }
            ServiceError::UnknownRule { .. } => Some("Use a rule the configured rule engine supports"),
            ServiceError::InvalidRuleParameter { .. } => {
                Some("Check the rule parameter after ':' (numbers for min/max, a valid regex)")
            }
            ServiceError::InvalidRequest { .. } => {
                Some("A request needs 'service' and optional 'inputs', 'names', 'locale'")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_appear_in_messages() {
        let err = ServiceError::DependencyCycle {
            service: "orders".into(),
            cycle: "a → b → a".into(),
        };
        let code = err.code().unwrap();
        assert!(err.to_string().starts_with(code));
        assert!(err.to_string().contains("a → b → a"));
    }

    #[test]
    fn every_config_error_has_a_fix() {
        let errors = [
            ServiceError::UnknownService { service: "x".into() },
            ServiceError::MissingResult { service: "x".into() },
            ServiceError::LocaleNotConfigured,
            ServiceError::CompoundKey {
                key: "a.b".into(),
                service: "x".into(),
            },
        ];
        for err in errors {
            assert!(err.fix_suggestion().is_some(), "missing fix for {err}");
        }
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ServiceError = io.into();
        assert!(err.code().is_none());
        assert!(err.to_string().contains("gone"));
    }
}
