//! Request files
//!
//! ```yaml
//! service: note_list
//! locale: ko          # optional
//! commit: true        # run after-commit callbacks on success
//! inputs:
//!   token: secret-token
//!   words: rust
//! names:
//!   words: keywords
//! ```

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ServiceError};
use crate::fragment::ServiceDescriptor;

/// Environment variable consulted when neither flag nor file names a locale
pub const LOCALE_ENV: &str = "FSERVICE_LOCALE";

pub const DEFAULT_LOCALE: &str = "en";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub service: String,
    #[serde(default)]
    pub inputs: IndexMap<String, Value>,
    #[serde(default)]
    pub names: IndexMap<String, String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub commit: bool,
}

impl Request {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let request: Request = serde_yaml::from_str(yaml)?;
        if request.service.trim().is_empty() {
            return Err(ServiceError::InvalidRequest {
                reason: "'service' must not be empty".to_string(),
            });
        }
        Ok(request)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            service: self.service.clone(),
            inputs: self.inputs.clone(),
            names: self.names.clone(),
        }
    }

    /// Flag, then request file, then `FSERVICE_LOCALE`, then `en`
    pub fn locale(&self, flag: Option<&str>) -> String {
        self.locale_with_env(flag, std::env::var(LOCALE_ENV).ok())
    }

    fn locale_with_env(&self, flag: Option<&str>, env: Option<String>) -> String {
        flag.map(str::to_string)
            .or_else(|| self.locale.clone())
            .or(env)
            .filter(|locale| !locale.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const YAML: &str = r#"
service: note_list
locale: ko
inputs:
  token: secret-token
  limit: 2
names:
  words: keywords
"#;

    #[test]
    fn parses_full_request() {
        let request = Request::from_yaml(YAML).unwrap();
        assert_eq!(request.service, "note_list");
        assert_eq!(request.inputs["limit"], json!(2));
        assert_eq!(request.names["words"], "keywords");
        assert!(!request.commit);

        let descriptor = request.descriptor();
        assert_eq!(descriptor.service, "note_list");
        assert_eq!(descriptor.inputs.len(), 2);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            Request::from_yaml("service: x\nparent: y\n"),
            Err(ServiceError::YamlParse(_))
        ));
    }

    #[test]
    fn empty_service_is_rejected() {
        assert!(matches!(
            Request::from_yaml("service: ''\n"),
            Err(ServiceError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn locale_layering() {
        let mut request = Request::from_yaml("service: x\n").unwrap();
        assert_eq!(request.locale_with_env(None, None), "en");
        assert_eq!(request.locale_with_env(None, Some("ko".into())), "ko");

        request.locale = Some("ko_KR".into());
        assert_eq!(request.locale_with_env(None, Some("fr".into())), "ko_KR");
        assert_eq!(request.locale_with_env(Some("en"), Some("fr".into())), "en");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let request = Request::load(file.path()).unwrap();
        assert_eq!(request.locale.as_deref(), Some("ko"));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            Request::load("/nonexistent/request.yaml"),
            Err(ServiceError::Io(_))
        ));
    }
}
