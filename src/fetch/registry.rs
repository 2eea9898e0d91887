//! Per-fetch repository name registry
//!
//! Built fresh for each top-level fetch and shared by reference with the
//! extension evaluator. A repository name belongs to at most one owner.

use crate::error::ExtensionError;
use crate::extension::ExtensionId;
use crate::module::ModuleKey;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

/// Who declared a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOwner {
    /// Declared directly in a module file
    Module(ModuleKey),
    /// Generated by a module extension
    Extension(ExtensionId),
}

impl fmt::Display for RepoOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(key) => write!(f, "module '{}'", key),
            Self::Extension(id) => write!(f, "{}", id),
        }
    }
}

/// Names claimed so far during one fetch
#[derive(Debug, Default)]
pub struct RepositoryRegistry {
    names: Mutex<BTreeMap<String, RepoOwner>>,
}

impl RepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for `owner`.
    ///
    /// Claiming a name twice for the same owner is a no-op; a different
    /// owner is a collision.
    pub fn claim(&self, name: &str, owner: &RepoOwner) -> Result<(), ExtensionError> {
        let mut names = self
            .names
            .lock()
            .map_err(|_| ExtensionError::evaluation("repository registry poisoned"))?;

        match names.get(name) {
            Some(existing) if existing == owner => Ok(()),
            Some(existing) => Err(ExtensionError::RepositoryNameCollision {
                name: name.to_string(),
                owner: existing.to_string(),
                claimant: owner.to_string(),
            }),
            None => {
                names.insert(name.to_string(), owner.clone());
                Ok(())
            }
        }
    }

    /// Current owner of a name
    pub fn owner(&self, name: &str) -> Option<RepoOwner> {
        self.names.lock().ok().and_then(|names| names.get(name).cloned())
    }

    pub fn len(&self) -> usize {
        self.names.lock().map(|names| names.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
