//! Override directives
//!
//! Overrides always win over cached results: an extension whose module is
//! overridden, or which owns an overridden repository, is stale on every
//! fetch that touches it.

use crate::extension::ExtensionId;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// What an override directive targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideTarget {
    /// `local_path_override` for a module
    Module(String),
    /// Repository override (`--override-repository name=path`)
    Repository(String),
}

impl fmt::Display for OverrideTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(name) => write!(f, "module '{}'", name),
            Self::Repository(name) => write!(f, "repository '@{}'", name),
        }
    }
}

/// Active override directives, with paths resolved against the workspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    modules: BTreeMap<String, PathBuf>,
    repos: BTreeMap<String, PathBuf>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module local-path override
    pub fn override_module(&mut self, name: impl Into<String>, path: PathBuf) {
        self.modules.insert(name.into(), path);
    }

    /// Add a repository override
    pub fn override_repository(&mut self, name: impl Into<String>, path: PathBuf) {
        self.repos.insert(name.into(), path);
    }

    /// Override path for a module, if any
    pub fn module(&self, name: &str) -> Option<&Path> {
        self.modules.get(name).map(PathBuf::as_path)
    }

    /// Override path for a repository, if any
    pub fn repository(&self, name: &str) -> Option<&Path> {
        self.repos.get(name).map(PathBuf::as_path)
    }

    /// All repository overrides, ordered by name
    pub fn repositories(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.repos.iter().map(|(name, path)| (name.as_str(), path.as_path()))
    }

    /// First override directive that targets `id` or a repository it owns
    pub fn targeting<'a, I>(&self, id: &ExtensionId, owned_repos: I) -> Option<OverrideTarget>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if !id.is_root() && self.modules.contains_key(id.module()) {
            return Some(OverrideTarget::Module(id.module().to_string()));
        }
        owned_repos
            .into_iter()
            .find(|name| self.repos.contains_key(*name))
            .map(|name| OverrideTarget::Repository(name.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.repos.is_empty()
    }
}
