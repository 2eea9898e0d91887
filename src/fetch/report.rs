//! Outcome of one fetch
//!
//! Failures are isolated per extension: the report carries a result for
//! every extension and repository the request touched, and callers decide
//! what to do with partial success.

use crate::error::{ExtensionError, FetchError, ModexError, ModexResult};
use crate::extension::ExtensionId;
use crate::fetch::state::ExtensionState;
use crate::lockfile::Staleness;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What happened to one extension
#[derive(Debug)]
pub enum ExtensionOutcome {
    /// Recorded result reused; the extension did not run
    CacheHit,
    /// The extension ran and its result was recorded
    Evaluated,
    /// The extension could not be made fresh
    Failed(ModexError),
    /// Not needed by the request, or cancelled after another failure
    Skipped,
}

impl ExtensionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::CacheHit => "cached",
            Self::Evaluated => "evaluated",
            Self::Failed(_) => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Per-extension entry of a report
#[derive(Debug)]
pub struct ExtensionReport {
    pub outcome: ExtensionOutcome,
    pub state: ExtensionState,
    /// Why the extension was considered stale, when it was
    pub staleness: Option<Staleness>,
}

/// Why a repository is not available
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoFailure {
    /// Fetching was disabled and the repository is not ready
    Disallowed,
    /// Its own rule failed
    Fetch(FetchError),
    /// The extension that owns it failed
    OwnerFailed(String),
    /// Cancelled after another failure
    Cancelled,
    /// The owning extension no longer generates it
    NotGenerated(String),
}

/// What happened to one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOutcome {
    Ready(PathBuf),
    Failed(RepoFailure),
}

/// Result of [`crate::fetch::Orchestrator::fetch`]
#[derive(Debug, Default)]
pub struct FetchReport {
    pub(crate) extensions: BTreeMap<ExtensionId, ExtensionReport>,
    pub(crate) repositories: BTreeMap<String, RepoOutcome>,
}

impl FetchReport {
    /// Entry for one extension
    pub fn extension(&self, id: &ExtensionId) -> Option<&ExtensionReport> {
        self.extensions.get(id)
    }

    /// All extension entries, ordered by identity
    pub fn extensions(&self) -> impl Iterator<Item = (&ExtensionId, &ExtensionReport)> {
        self.extensions.iter()
    }

    /// All repository outcomes, ordered by name
    pub fn repositories(&self) -> impl Iterator<Item = (&str, &RepoOutcome)> {
        self.repositories.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Path of a repository the request covered.
    ///
    /// A repository whose owning extension failed is reported as a
    /// dependency on a failed fetch, never served from partial data.
    pub fn repository(&self, name: &str) -> ModexResult<&Path> {
        match self.repositories.get(name) {
            Some(RepoOutcome::Ready(path)) => Ok(path),
            Some(RepoOutcome::Failed(failure)) => Err(repo_error(name, failure)),
            None => Err(ModexError::UnknownRepository(name.to_string())),
        }
    }

    pub fn evaluated(&self) -> usize {
        self.count(|o| matches!(o, ExtensionOutcome::Evaluated))
    }

    pub fn cache_hits(&self) -> usize {
        self.count(|o| matches!(o, ExtensionOutcome::CacheHit))
    }

    pub fn failed(&self) -> usize {
        self.count(ExtensionOutcome::is_failed)
    }

    fn count(&self, pred: impl Fn(&ExtensionOutcome) -> bool) -> usize {
        self.extensions.values().filter(|r| pred(&r.outcome)).count()
    }

    /// Extension failures, in identity order
    pub fn failures(&self) -> impl Iterator<Item = (&ExtensionId, &ModexError)> {
        self.extensions.iter().filter_map(|(id, r)| match &r.outcome {
            ExtensionOutcome::Failed(e) => Some((id, e)),
            _ => None,
        })
    }

    /// Repository failures, in name order
    pub fn repository_failures(&self) -> impl Iterator<Item = (&str, ModexError)> {
        self.repositories.iter().filter_map(|(name, outcome)| match outcome {
            RepoOutcome::Failed(f) => Some((name.as_str(), repo_error(name, f))),
            RepoOutcome::Ready(_) => None,
        })
    }

    /// True when nothing failed
    pub fn is_success(&self) -> bool {
        self.failed() == 0
            && self
                .repositories
                .values()
                .all(|o| matches!(o, RepoOutcome::Ready(_)))
    }

    /// Turn partial failure into an error
    pub fn into_result(self) -> ModexResult<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let failed_repos = self
            .repositories
            .values()
            .filter(|o| matches!(o, RepoOutcome::Failed(_)))
            .count();
        Err(ModexError::FetchFailed {
            failed: self.failed().max(usize::from(failed_repos > 0)),
            total: self.extensions.len().max(1),
        })
    }
}

fn repo_error(name: &str, failure: &RepoFailure) -> ModexError {
    match failure {
        RepoFailure::Disallowed => ModexError::FetchDisallowed {
            what: format!("repository '@{}'", name),
        },
        RepoFailure::Fetch(source) => ModexError::Repository {
            repo: name.to_string(),
            source: source.clone(),
        },
        RepoFailure::OwnerFailed(owner) => ModexError::DependencyOnFailedFetch {
            repo: name.to_string(),
            owner: owner.clone(),
        },
        RepoFailure::Cancelled => ModexError::DependencyOnFailedFetch {
            repo: name.to_string(),
            owner: "a cancelled fetch".to_string(),
        },
        RepoFailure::NotGenerated(owner) => ModexError::extension(
            owner,
            ExtensionError::evaluation(format!("repository '{}' is not generated", name)),
        ),
    }
}
