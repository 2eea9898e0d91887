//! Repository rule abstraction

use crate::error::FetchError;
use crate::repository::context::RepositoryContext;
use crate::repository::rules::{FileRule, HttpFileRule, LocalPathRule, ShellRule};
use crate::repository::spec::Attributes;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A callback that populates one repository directory
///
/// Rules only act through the [`RepositoryContext`]; they never touch
/// paths outside the repository they were invoked for.
#[async_trait]
pub trait RepositoryRule: Send + Sync {
    async fn fetch(&self, ctx: &mut RepositoryContext, attrs: &Attributes) -> Result<(), FetchError>;
}

/// Rule names to rule implementations
#[derive(Clone)]
pub struct RuleRegistry {
    rules: BTreeMap<String, Arc<dyn RepositoryRule>>,
}

impl RuleRegistry {
    /// Registry without any rules
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Registry with the built-in rules
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("file", FileRule);
        registry.register("local_path", LocalPathRule);
        registry.register("http_file", HttpFileRule);
        registry.register("shell", ShellRule);
        registry
    }

    /// Register or replace a rule
    pub fn register(&mut self, name: impl Into<String>, rule: impl RepositoryRule + 'static) {
        self.rules.insert(name.into(), Arc::new(rule));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RepositoryRule>> {
        self.rules.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_registered() {
        let registry = RuleRegistry::with_builtins();
        for name in ["file", "local_path", "http_file", "shell"] {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert!(registry.get("git_repository").is_none());
    }

    #[test]
    fn register_replaces() {
        let mut registry = RuleRegistry::empty();
        registry.register("file", FileRule);
        registry.register("file", ShellRule);
        assert!(registry.contains("file"));
        assert!(format!("{:?}", registry).contains("file"));
    }
}
