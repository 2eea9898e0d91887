//! Inputs consulted by an extension outside its tag arguments
//!
//! Each consulted input is recorded under a key (`definition`,
//! `env:NAME`) together with the value observed during evaluation. A
//! later fetch compares the recorded values with the current ones; any
//! difference makes the extension stale.

use std::collections::BTreeMap;

/// Key of the extension definition fingerprint
pub const DEFINITION_KEY: &str = "definition";

const ENV_PREFIX: &str = "env:";

/// Recorded input values; `None` means the input was absent
pub type RecordedInputs = BTreeMap<String, Option<String>>;

/// Key under which an environment variable is recorded
pub fn env_key(name: &str) -> String {
    format!("{}{}", ENV_PREFIX, name)
}

/// Source of current input values
pub trait InputSource: Send + Sync {
    /// Current value of an environment variable
    fn env(&self, name: &str) -> Option<String>;
}

/// Reads inputs from the running process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInputs;

impl InputSource for ProcessInputs {
    fn env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed input values, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticInputs {
    env: BTreeMap<String, String>,
}

impl StaticInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }
}

impl InputSource for StaticInputs {
    fn env(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }
}

/// Find the first recorded input whose current value differs.
///
/// Keys this version does not understand count as changed, so an entry
/// written by a newer tool is re-evaluated rather than trusted.
pub fn first_changed_input(
    recorded: &RecordedInputs,
    definition: &str,
    source: &dyn InputSource,
) -> Option<String> {
    if recorded.get(DEFINITION_KEY).map(|v| v.as_deref()) != Some(Some(definition)) {
        return Some(DEFINITION_KEY.to_string());
    }

    recorded
        .iter()
        .filter(|(key, _)| key.as_str() != DEFINITION_KEY)
        .find(|(key, value)| match key.strip_prefix(ENV_PREFIX) {
            Some(name) => source.env(name) != **value,
            None => true,
        })
        .map(|(key, _)| key.clone())
}
