//! Repository rule executor
//!
//! Materializes one repository by running its rule inside
//! `<output_base>/external/<name>/`.
//!
//! # Readiness
//!
//! | State | Description |
//! |-------|-------------|
//! | Missing | No repository directory |
//! | Incomplete | Directory exists without a marker matching the spec |
//! | Ready | Rule completed and the marker records the spec's fingerprint |
//!
//! The marker `external/@<name>.marker` is removed before the rule starts
//! and written atomically only after it succeeded, so a failed or cancelled
//! fetch can never leave a repository looking ready.

use crate::error::FetchError;
use crate::io::write_atomic;
use crate::repository::context::RepositoryContext;
use crate::repository::download::Downloader;
use crate::repository::rule::RuleRegistry;
use crate::repository::spec::{validate_repo_name, RepoSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Materialization state of a repository directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoState {
    /// No directory exists
    Missing,
    /// Directory exists but was not completed for the current spec
    Incomplete,
    /// Finalized for the current spec
    Ready,
}

impl RepoState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for RepoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Incomplete => write!(f, "incomplete"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Contents of a readiness marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyMarker {
    pub rule: String,
    pub fingerprint: String,
    pub fetched_at: DateTime<Utc>,
}

/// Runs repository rules with capability-scoped contexts
#[derive(Clone)]
pub struct RuleExecutor {
    external_dir: PathBuf,
    workspace: PathBuf,
    rules: RuleRegistry,
    downloader: Arc<dyn Downloader>,
}

impl RuleExecutor {
    pub fn new(
        output_base: &Path,
        workspace: &Path,
        rules: RuleRegistry,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        Self {
            external_dir: output_base.join("external"),
            workspace: workspace.to_path_buf(),
            rules,
            downloader,
        }
    }

    /// Directory holding all repositories
    pub fn external_dir(&self) -> &Path {
        &self.external_dir
    }

    /// Directory of one repository
    pub fn repo_dir(&self, name: &str) -> PathBuf {
        self.external_dir.join(name)
    }

    /// Readiness marker of one repository
    pub fn marker_path(&self, name: &str) -> PathBuf {
        self.external_dir.join(format!("@{}.marker", name))
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Current state of a repository with respect to `spec`
    pub fn state(&self, name: &str, spec: &RepoSpec) -> RepoState {
        if !self.repo_dir(name).is_dir() {
            return RepoState::Missing;
        }

        let marker = std::fs::read(self.marker_path(name))
            .ok()
            .and_then(|bytes| serde_json::from_slice::<ReadyMarker>(&bytes).ok());
        match (marker, spec.fingerprint()) {
            (Some(m), Ok(fingerprint)) if m.fingerprint == fingerprint => RepoState::Ready,
            _ => RepoState::Incomplete,
        }
    }

    /// Run the rule for `spec` and mark the repository ready.
    ///
    /// Any previous content of the directory is discarded first. On failure
    /// the partial directory is left without a marker.
    pub async fn materialize(&self, name: &str, spec: &RepoSpec) -> Result<PathBuf, FetchError> {
        validate_repo_name(name).map_err(FetchError::RuleExecution)?;
        let fingerprint = spec.fingerprint()?;
        let rule = self
            .rules
            .get(&spec.rule)
            .ok_or_else(|| FetchError::rule(format!("unknown repository rule '{}'", spec.rule)))?;

        let dir = self.repo_dir(name);
        let marker = self.marker_path(name);

        remove_if_exists(&marker, false).await?;
        remove_if_exists(&dir, true).await?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| FetchError::rule(format!("creating {}: {}", dir.display(), e)))?;

        debug!("Running rule '{}' for @{}", spec.rule, name);
        let mut ctx = RepositoryContext::new(
            name,
            dir.clone(),
            self.workspace.clone(),
            Arc::clone(&self.downloader),
        );
        rule.fetch(&mut ctx, &spec.attributes).await?;

        let ready = ReadyMarker {
            rule: spec.rule.clone(),
            fingerprint,
            fetched_at: Utc::now(),
        };
        let bytes = serde_json::to_vec_pretty(&ready)
            .map_err(|e| FetchError::rule(format!("encoding marker: {}", e)))?;
        write_atomic(&marker, &bytes).map_err(|e| FetchError::rule(e.to_string()))?;

        info!("Materialized @{}", name);
        Ok(dir)
    }
}

impl fmt::Debug for RuleExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleExecutor")
            .field("external_dir", &self.external_dir)
            .field("rules", &self.rules)
            .finish()
    }
}

async fn remove_if_exists(path: &Path, dir: bool) -> Result<(), FetchError> {
    let result = if dir {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FetchError::rule(format!("removing {}: {}", path.display(), e))),
    }
}
