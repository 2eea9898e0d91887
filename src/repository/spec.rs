//! Repository specifications: which rule materializes a repository and with
//! which attributes. A spec is everything needed to reproduce a repository
//! without re-running the extension that declared it.

use crate::checksum;
use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Rule attributes, keyed by attribute name
pub type Attributes = BTreeMap<String, Value>;

/// A repository rule invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSpec {
    /// Name of the repository rule in the rule registry
    pub rule: String,

    /// Attributes passed to the rule
    #[serde(default)]
    pub attributes: Attributes,
}

impl RepoSpec {
    /// Create a spec for `rule` with the given attributes
    pub fn new(rule: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            rule: rule.into(),
            attributes,
        }
    }

    /// Content fingerprint, used by readiness markers
    pub fn fingerprint(&self) -> Result<String, FetchError> {
        checksum::canonical_json_checksum(self).map_err(|e| {
            FetchError::rule(format!("fingerprinting '{}' spec: {}", self.rule, e))
        })
    }

    /// Required string attribute
    pub fn str_attr(&self, key: &str) -> Result<&str, FetchError> {
        str_attr(&self.attributes, key)
    }
}

/// Look up a required string attribute
pub fn str_attr<'a>(attrs: &'a Attributes, key: &str) -> Result<&'a str, FetchError> {
    match attrs.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(FetchError::rule(format!(
            "attribute '{}' must be a string, got {}",
            key, other
        ))),
        None => Err(FetchError::rule(format!("missing required attribute '{}'", key))),
    }
}

/// Look up an optional string attribute
pub fn opt_str_attr<'a>(attrs: &'a Attributes, key: &str) -> Result<Option<&'a str>, FetchError> {
    match attrs.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => str_attr(attrs, key).map(Some),
    }
}

/// Validate that a repository name is safe to use as a directory name.
///
/// Allowed: ASCII alphanumerics, `_`, `-`, `.`; must not start with `.`.
pub fn validate_repo_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("repository name cannot be empty".to_string());
    }
    if name.starts_with('.') {
        return Err("repository name must not start with '.'".to_string());
    }
    if name.contains("..") {
        return Err("repository name must not contain '..'".to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(
            "repository name must contain only alphanumeric characters, '-', '_' or '.'"
                .to_string(),
        );
    }
    Ok(())
}
