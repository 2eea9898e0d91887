//! Repository materialization with override directives applied
//!
//! A repository override replaces whatever spec declared the repository
//! with a `local_path` copy of the override directory.
//!
//! Rules for one name never run concurrently: the override job and the
//! extension declaring the same name may both reach [`Materializer::ensure`]
//! in one fetch, and the second caller waits for the first and reuses its
//! directory.

use crate::error::FetchError;
use crate::module::Overrides;
use crate::repository::executor::{RepoState, RuleExecutor};
use crate::repository::spec::{Attributes, RepoSpec};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Whether a repository can be served without running its rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Ready(PathBuf),
    NeedsFetch(RepoState),
}

/// A repository on disk after [`Materializer::ensure`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ensured {
    pub path: PathBuf,
    /// Whether the rule ran during this call
    pub fetched: bool,
}

/// Per-name gate; `true` once the rule ran through this materializer
type Gate = Arc<tokio::sync::Mutex<bool>>;

/// Applies overrides and the force flag on top of a [`RuleExecutor`]
#[derive(Debug, Clone)]
pub struct Materializer {
    executor: Arc<RuleExecutor>,
    overrides: Overrides,
    force: bool,
    /// Shared by clones
    gates: Arc<Mutex<BTreeMap<String, Gate>>>,
}

impl Materializer {
    pub fn new(executor: Arc<RuleExecutor>, overrides: Overrides, force: bool) -> Self {
        Self {
            executor,
            overrides,
            force,
            gates: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn executor(&self) -> &RuleExecutor {
        &self.executor
    }

    /// Spec actually used for `name`, after overrides
    pub fn effective_spec(&self, name: &str, spec: &RepoSpec) -> RepoSpec {
        match self.overrides.repository(name) {
            Some(path) => local_path_spec(path),
            None => spec.clone(),
        }
    }

    /// Check readiness without side effects
    pub fn lookup(&self, name: &str, spec: &RepoSpec) -> Availability {
        let effective = self.effective_spec(name, spec);
        match self.executor.state(name, &effective) {
            RepoState::Ready if !self.force => Availability::Ready(self.executor.repo_dir(name)),
            RepoState::Ready => Availability::NeedsFetch(RepoState::Ready),
            other => Availability::NeedsFetch(other),
        }
    }

    /// Serve the repository if ready, otherwise run its rule
    pub async fn ensure(&self, name: &str, spec: &RepoSpec) -> Result<Ensured, FetchError> {
        let gate = self.gate(name)?;
        let mut ran = gate.lock().await;

        // Force applies once per name, not once per caller
        if *ran && self.executor.state(name, &self.effective_spec(name, spec)) == RepoState::Ready {
            debug!("@{} was fetched by another job", name);
            return Ok(Ensured {
                path: self.executor.repo_dir(name),
                fetched: false,
            });
        }

        match self.lookup(name, spec) {
            Availability::Ready(path) => {
                debug!("@{} is ready", name);
                Ok(Ensured {
                    path,
                    fetched: false,
                })
            }
            Availability::NeedsFetch(state) => {
                debug!("@{} is {}, fetching", name, state);
                let path = self.run_rule(name, spec).await?;
                *ran = true;
                Ok(Ensured {
                    path,
                    fetched: true,
                })
            }
        }
    }

    async fn run_rule(&self, name: &str, spec: &RepoSpec) -> Result<PathBuf, FetchError> {
        let effective = self.effective_spec(name, spec);
        self.executor.materialize(name, &effective).await
    }

    fn gate(&self, name: &str) -> Result<Gate, FetchError> {
        let mut gates = self
            .gates
            .lock()
            .map_err(|_| FetchError::rule("materializer gates poisoned"))?;
        Ok(Arc::clone(gates.entry(name.to_string()).or_default()))
    }
}

/// `local_path` spec copying `path`
pub fn local_path_spec(path: &Path) -> RepoSpec {
    let mut attrs = Attributes::new();
    attrs.insert(
        "path".to_string(),
        Value::String(path.to_string_lossy().into_owned()),
    );
    RepoSpec::new("local_path", attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::download::OfflineDownloader;
    use crate::repository::rule::RuleRegistry;
    use serde_json::json;
    use tempfile::TempDir;

    fn materializer(dir: &TempDir, overrides: Overrides, force: bool) -> Materializer {
        let executor = RuleExecutor::new(
            &dir.path().join(".modex"),
            dir.path(),
            RuleRegistry::with_builtins(),
            Arc::new(OfflineDownloader),
        );
        Materializer::new(Arc::new(executor), overrides, force)
    }

    fn spec() -> RepoSpec {
        let attrs: Attributes = serde_json::from_value(json!({"files": {"BUILD": "x"}})).unwrap();
        RepoSpec::new("file", attrs)
    }

    #[tokio::test]
    async fn ensure_reuses_ready_repository() {
        let dir = TempDir::new().unwrap();
        let m = materializer(&dir, Overrides::new(), false);

        assert_eq!(m.lookup("hello", &spec()), Availability::NeedsFetch(RepoState::Missing));
        let first = m.ensure("hello", &spec()).await.unwrap();
        assert!(first.fetched);
        std::fs::write(first.path.join("touched"), "").unwrap();

        // Second ensure serves the existing directory untouched
        let second = m.ensure("hello", &spec()).await.unwrap();
        assert!(!second.fetched);
        assert!(first.path.join("touched").exists());
    }

    #[tokio::test]
    async fn force_rematerializes() {
        let dir = TempDir::new().unwrap();
        let path = materializer(&dir, Overrides::new(), false)
            .ensure("hello", &spec())
            .await
            .unwrap()
            .path;
        std::fs::write(path.join("touched"), "").unwrap();

        let forced = materializer(&dir, Overrides::new(), true);
        assert!(matches!(forced.lookup("hello", &spec()), Availability::NeedsFetch(_)));
        forced.ensure("hello", &spec()).await.unwrap();
        assert!(!path.join("touched").exists());
    }

    #[tokio::test]
    async fn override_replaces_spec() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("local_hello");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("BUILD"), "local").unwrap();

        let mut overrides = Overrides::new();
        overrides.override_repository("hello", local);
        let m = materializer(&dir, overrides, false);

        let path = m.ensure("hello", &spec()).await.unwrap().path;
        assert_eq!(std::fs::read_to_string(path.join("BUILD")).unwrap(), "local");
        assert_eq!(m.effective_spec("hello", &spec()).rule, "local_path");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ensure_runs_rule_once() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("local_internal");
        std::fs::create_dir_all(local.join("pkg")).unwrap();
        for i in 0..64 {
            std::fs::write(local.join("pkg").join(format!("f{}.txt", i)), "x".repeat(4096)).unwrap();
        }

        let mut overrides = Overrides::new();
        overrides.override_repository("internal", local);
        // Force makes every caller want the rule; only the first may run it
        let m = materializer(&dir, overrides, true);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let m = m.clone();
                tokio::spawn(async move { m.ensure("internal", &spec()).await })
            })
            .collect();

        let mut fetched = 0;
        for task in tasks {
            let ensured = task.await.unwrap().unwrap();
            assert_eq!(std::fs::read_dir(ensured.path.join("pkg")).unwrap().count(), 64);
            if ensured.fetched {
                fetched += 1;
            }
        }
        assert_eq!(fetched, 1);
    }
}
