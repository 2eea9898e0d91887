//! Fetch orchestrator
//!
//! Decides, per extension identity, whether the recorded lockfile entry can
//! be reused or the extension must run again, then materializes the
//! repositories the request needs. One call to [`Orchestrator::fetch`] is
//! one top-level fetch: it owns a fresh [`RepositoryRegistry`] and drops it
//! on return.
//!
//! Planning happens up front on an immutable lockfile snapshot. Every used
//! extension with a lockfile entry claims its recorded repository names
//! before any extension runs, whether or not the request needs it, so an
//! evaluation can never steal a name another entry already owns.

use crate::digest::{usage_digest, UsageDigest};
use crate::error::{ExtensionError, FetchError, ModexError, ModexResult};
use crate::extension::{
    Demand, DiagnosticSink, ExtensionEvaluator, ExtensionId, ExtensionResolver, InputSource,
    ModuleExtension, ProcessInputs, StderrSink,
};
use crate::fetch::registry::{RepoOwner, RepositoryRegistry};
use crate::fetch::report::{
    ExtensionOutcome, ExtensionReport, FetchReport, RepoFailure, RepoOutcome,
};
use crate::fetch::state::{ExtensionState, StateTracker};
use crate::journal::{events, Journal};
use crate::lockfile::{staleness, LockEntry, LockfileMode, LockfileStore, Staleness};
use crate::module::{ExtensionUsage, ModuleGraph};
use crate::repository::{local_path_spec, Availability, Materializer, RepoSpec, RuleExecutor};
use futures_util::future::join_all;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default number of concurrent fetch tasks
pub const DEFAULT_JOBS: usize = 4;

/// Which repositories a fetch must produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchScope {
    /// Every extension and repository in the graph, needed or not
    All,
    /// Only what the named repositories require
    Repos(BTreeSet<String>),
}

/// One top-level fetch request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub scope: FetchScope,
    /// When false, nothing may be evaluated or downloaded
    pub fetch_enabled: bool,
    /// Treat every relevant extension as stale and re-materialize
    pub force: bool,
}

impl FetchRequest {
    /// "Fetch everything"
    pub fn all() -> Self {
        Self {
            scope: FetchScope::All,
            fetch_enabled: true,
            force: false,
        }
    }

    /// Fetch only what `names` need
    pub fn repos<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scope: FetchScope::Repos(names.into_iter().map(Into::into).collect()),
            fetch_enabled: true,
            force: false,
        }
    }

    pub fn with_fetch(mut self, enabled: bool) -> Self {
        self.fetch_enabled = enabled;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    fn wants(&self, name: &str) -> bool {
        match &self.scope {
            FetchScope::All => true,
            FetchScope::Repos(names) => names.contains(name),
        }
    }
}

/// Who makes a repository visible to the module graph
#[derive(Debug)]
enum Visible {
    Direct(RepoSpec),
    Extension(usize),
    Override(RepoSpec),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum JobKey {
    Extension(ExtensionId),
    Repository(String),
}

enum Job {
    Evaluate {
        id: ExtensionId,
        extension: Arc<dyn ModuleExtension>,
        usages: Vec<ExtensionUsage>,
        digest: UsageDigest,
        demand: Demand,
        previous: Option<LockEntry>,
    },
    Reuse {
        id: ExtensionId,
        repos: BTreeMap<String, RepoSpec>,
    },
    Repository {
        name: String,
        spec: RepoSpec,
    },
}

impl Job {
    fn key(&self) -> JobKey {
        match self {
            Self::Evaluate { id, .. } | Self::Reuse { id, .. } => JobKey::Extension(id.clone()),
            Self::Repository { name, .. } => JobKey::Repository(name.clone()),
        }
    }
}

enum Completion {
    Extension {
        id: ExtensionId,
        outcome: ExtensionOutcome,
        repos: Vec<(String, RepoOutcome)>,
    },
    Repository {
        name: String,
        outcome: RepoOutcome,
    },
}

impl Completion {
    fn key(&self) -> JobKey {
        match self {
            Self::Extension { id, .. } => JobKey::Extension(id.clone()),
            Self::Repository { name, .. } => JobKey::Repository(name.clone()),
        }
    }

    fn is_failure(&self) -> bool {
        let failed = |o: &RepoOutcome| matches!(o, RepoOutcome::Failed(_));
        match self {
            Self::Extension { outcome, repos, .. } => {
                outcome.is_failed() || repos.iter().any(|(_, o)| failed(o))
            }
            Self::Repository { outcome, .. } => failed(outcome),
        }
    }
}

/// Everything a spawned fetch task needs
struct Worker {
    evaluator: ExtensionEvaluator,
    materializer: Materializer,
    lockfile: Arc<LockfileStore>,
    journal: Arc<Journal>,
    fetch_enabled: bool,
}

impl Worker {
    async fn run(&self, job: Job) -> Completion {
        match job {
            Job::Evaluate {
                id,
                extension,
                usages,
                digest,
                demand,
                previous,
            } => {
                self.evaluate(id, extension.as_ref(), &usages, digest, &demand, previous)
                    .await
            }
            Job::Reuse { id, repos } => {
                let outcomes = join_all(repos.iter().map(|(name, spec)| async move {
                    (name.clone(), self.repository(name, spec).await)
                }))
                .await;
                self.journal
                    .log(
                        events::EXTENSION_CACHED,
                        &json!({ "extension": id.to_string(), "repositories": repos.len() }),
                    )
                    .await;
                Completion::Extension {
                    id,
                    outcome: ExtensionOutcome::CacheHit,
                    repos: outcomes,
                }
            }
            Job::Repository { name, spec } => {
                let outcome = self.repository(&name, &spec).await;
                Completion::Repository { name, outcome }
            }
        }
    }

    async fn evaluate(
        &self,
        id: ExtensionId,
        extension: &dyn ModuleExtension,
        usages: &[ExtensionUsage],
        digest: UsageDigest,
        demand: &Demand,
        previous: Option<LockEntry>,
    ) -> Completion {
        let output = match self.evaluator.evaluate(&id, extension, usages, demand).await {
            Ok(output) => output,
            Err(err) => return self.evaluation_failed(id, err).await,
        };

        for (name, ensured) in &output.materialized {
            if ensured.fetched {
                self.log_materialized(name, &ensured.path.display().to_string())
                    .await;
            }
        }

        let entry = LockEntry::new(
            digest,
            output.inputs,
            output.repos.clone(),
            output.reproducible,
        )
        .preserving_extra(previous.as_ref());

        if let Err(e) = self.lockfile.write(&id, entry).await {
            warn!(extension = %id, "Failed to record evaluation: {}", e);
            self.journal
                .log(
                    events::EXTENSION_FAILED,
                    &json!({ "extension": id.to_string(), "error": e.to_string() }),
                )
                .await;
            return Completion::Extension {
                id,
                outcome: ExtensionOutcome::Failed(e),
                repos: Vec::new(),
            };
        }

        self.journal
            .log(
                events::EXTENSION_EVALUATED,
                &json!({
                    "extension": id.to_string(),
                    "repositories": output.repos.keys().collect::<Vec<_>>(),
                }),
            )
            .await;

        let repos = output
            .materialized
            .into_iter()
            .map(|(name, ensured)| (name, RepoOutcome::Ready(ensured.path)))
            .collect();
        Completion::Extension {
            id,
            outcome: ExtensionOutcome::Evaluated,
            repos,
        }
    }

    async fn evaluation_failed(&self, id: ExtensionId, err: ExtensionError) -> Completion {
        warn!(extension = %id, "Evaluation failed: {}", err);

        let mut repos = Vec::new();
        if let ExtensionError::Fetch { repo, source } = &err {
            self.log_repo_failure(repo, source).await;
            repos.push((repo.clone(), RepoOutcome::Failed(RepoFailure::Fetch(source.clone()))));
        }

        self.journal
            .log(
                events::EXTENSION_FAILED,
                &json!({ "extension": id.to_string(), "error": err.to_string() }),
            )
            .await;

        let outcome = ExtensionOutcome::Failed(ModexError::extension(&id, err));
        Completion::Extension { id, outcome, repos }
    }

    async fn repository(&self, name: &str, spec: &RepoSpec) -> RepoOutcome {
        if !self.fetch_enabled {
            return match self.materializer.lookup(name, spec) {
                Availability::Ready(path) => RepoOutcome::Ready(path),
                Availability::NeedsFetch(state) => {
                    debug!("@{} is {} and fetching is disabled", name, state);
                    RepoOutcome::Failed(RepoFailure::Disallowed)
                }
            };
        }

        match self.materializer.ensure(name, spec).await {
            Ok(ensured) => {
                if ensured.fetched {
                    self.log_materialized(name, &ensured.path.display().to_string())
                        .await;
                }
                RepoOutcome::Ready(ensured.path)
            }
            Err(e) => {
                warn!("Fetching @{} failed: {}", name, e);
                self.log_repo_failure(name, &e).await;
                RepoOutcome::Failed(RepoFailure::Fetch(e))
            }
        }
    }

    async fn log_materialized(&self, name: &str, path: &str) {
        self.journal
            .log(
                events::REPOSITORY_MATERIALIZED,
                &json!({ "repository": name, "path": path }),
            )
            .await;
    }

    async fn log_repo_failure(&self, name: &str, error: &FetchError) {
        self.journal
            .log(
                events::REPOSITORY_FAILED,
                &json!({
                    "repository": name,
                    "error": error.to_string(),
                    "retryable": error.is_retryable(),
                }),
            )
            .await;
    }
}

/// Top-level fetch decision maker
pub struct Orchestrator {
    graph: Arc<ModuleGraph>,
    lockfile: Arc<LockfileStore>,
    resolver: Arc<dyn ExtensionResolver>,
    executor: Arc<RuleExecutor>,
    sink: Arc<dyn DiagnosticSink>,
    inputs: Arc<dyn InputSource>,
    journal: Arc<Journal>,
    jobs: usize,
    fail_fast: bool,
}

impl Orchestrator {
    pub fn new(
        graph: Arc<ModuleGraph>,
        lockfile: Arc<LockfileStore>,
        resolver: Arc<dyn ExtensionResolver>,
        executor: Arc<RuleExecutor>,
    ) -> Self {
        Self {
            graph,
            lockfile,
            resolver,
            executor,
            sink: Arc::new(StderrSink),
            inputs: Arc::new(ProcessInputs),
            journal: Arc::new(Journal::disabled()),
            jobs: DEFAULT_JOBS,
            fail_fast: false,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_inputs(mut self, inputs: Arc<dyn InputSource>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = journal;
        self
    }

    /// Maximum number of concurrent fetch tasks (at least one)
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Cancel outstanding work after the first failure
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    pub fn lockfile(&self) -> &LockfileStore {
        &self.lockfile
    }

    /// Run one fetch.
    ///
    /// Per-extension failures are reported, not returned: the only errors
    /// are strict lockfile violations and internal faults.
    pub async fn fetch(&self, request: &FetchRequest) -> ModexResult<FetchReport> {
        let snapshot = self.lockfile.snapshot();
        let overrides = self.graph.overrides();
        let used = self.graph.extension_usages();
        let registry = Arc::new(RepositoryRegistry::new());
        let materializer =
            Materializer::new(Arc::clone(&self.executor), overrides.clone(), request.force);

        let mut report = FetchReport::default();
        let mut tracker = StateTracker::new();
        let mut reasons: BTreeMap<ExtensionId, Staleness> = BTreeMap::new();
        let mut expected: BTreeMap<ExtensionId, BTreeSet<String>> = BTreeMap::new();
        let mut inconsistent = Vec::new();
        let mut jobs = Vec::new();

        let mut visible: BTreeMap<String, Visible> = BTreeMap::new();
        for (key, repo) in self.graph.direct_repos() {
            registry
                .claim(&repo.name, &RepoOwner::Module(key.clone()))
                .map_err(|e| ModexError::Internal(e.to_string()))?;
            visible.insert(repo.name.clone(), Visible::Direct(repo.spec.clone()));
        }
        for (index, ext) in used.iter().enumerate() {
            for name in ext.imported_repos() {
                visible
                    .entry(name.to_string())
                    .or_insert(Visible::Extension(index));
            }
        }
        for (name, path) in overrides.repositories() {
            visible
                .entry(name.to_string())
                .or_insert_with(|| Visible::Override(local_path_spec(path)));
        }

        let mut recorded_collisions: BTreeMap<ExtensionId, ExtensionError> = BTreeMap::new();
        for ext in &used {
            let Some(entry) = snapshot.entry(&ext.id) else {
                continue;
            };
            let owner = RepoOwner::Extension(ext.id.clone());
            for name in entry.generated_repo_specs.keys() {
                if let Err(e) = registry.claim(name, &owner) {
                    recorded_collisions.entry(ext.id.clone()).or_insert(e);
                }
            }
        }

        for (index, ext) in used.iter().enumerate() {
            let id = &ext.id;
            let demand = match &request.scope {
                FetchScope::All => Demand::All,
                FetchScope::Repos(names) => Demand::Repos(
                    names
                        .iter()
                        .filter(|n| matches!(visible.get(*n), Some(Visible::Extension(i)) if *i == index))
                        .cloned()
                        .collect(),
                ),
            };
            if demand == Demand::none() {
                debug!(extension = %id, "Not needed by this request");
                report.extensions.insert(
                    id.clone(),
                    ExtensionReport {
                        outcome: ExtensionOutcome::Skipped,
                        state: ExtensionState::Unknown,
                        staleness: None,
                    },
                );
                continue;
            }

            let wanted: BTreeSet<String> = match &demand {
                Demand::All => ext.imported_repos().map(str::to_string).collect(),
                Demand::Repos(names) => names.clone(),
            };
            expected.insert(id.clone(), wanted.clone());

            let extension = match self.resolver.resolve(id) {
                Ok(extension) => extension,
                Err(e) => {
                    warn!(extension = %id, "{}", e);
                    tracker.transition(id, ExtensionState::Failed)?;
                    report.extensions.insert(
                        id.clone(),
                        ExtensionReport {
                            outcome: ExtensionOutcome::Failed(e),
                            state: ExtensionState::Failed,
                            staleness: None,
                        },
                    );
                    continue;
                }
            };

            let entry = snapshot.entry(id);
            let digest = usage_digest(id, &ext.usages)?;
            let mut reason = staleness(
                id,
                entry,
                &digest,
                &extension.fingerprint(),
                self.inputs.as_ref(),
                overrides,
            );
            if !reason.is_stale() && request.force {
                reason = Staleness::Forced;
            }

            if let (false, Some(entry)) = (reason.is_stale(), entry) {
                if !entry.reproducible {
                    let missing = entry
                        .generated_repo_specs
                        .iter()
                        .filter(|(name, _)| demand.covers(name))
                        .find(|(name, spec)| {
                            !matches!(materializer.lookup(name, spec), Availability::Ready(_))
                        });
                    if let Some((name, _)) = missing {
                        reason = Staleness::Unmaterialized(name.clone());
                    }
                }
            }

            match (reason.is_stale(), entry) {
                (false, Some(entry)) => {
                    if let Some(e) = recorded_collisions.remove(id) {
                        tracker.transition(id, ExtensionState::Failed)?;
                        report.extensions.insert(
                            id.clone(),
                            ExtensionReport {
                                outcome: ExtensionOutcome::Failed(ModexError::extension(id, e)),
                                state: ExtensionState::Failed,
                                staleness: Some(reason),
                            },
                        );
                        continue;
                    }

                    debug!(extension = %id, "Lockfile entry is up to date");
                    tracker.transition(id, ExtensionState::Fresh)?;
                    reasons.insert(id.clone(), reason);
                    let repos = entry
                        .generated_repo_specs
                        .iter()
                        .filter(|(name, _)| demand.covers(name))
                        .map(|(name, spec)| (name.clone(), spec.clone()))
                        .collect();
                    jobs.push(Job::Reuse {
                        id: id.clone(),
                        repos,
                    });
                }
                _ => {
                    if self.lockfile.mode() == LockfileMode::Error {
                        inconsistent.push(format!("{} ({})", id, reason));
                        continue;
                    }

                    info!(extension = %id, "Stale: {}", reason);
                    tracker.transition(id, ExtensionState::Stale)?;

                    if !request.fetch_enabled {
                        tracker.transition(id, ExtensionState::Failed)?;
                        let error = ModexError::FetchDisallowed {
                            what: format!("extension {} ({})", id, reason),
                        };
                        report.extensions.insert(
                            id.clone(),
                            ExtensionReport {
                                outcome: ExtensionOutcome::Failed(error),
                                state: ExtensionState::Failed,
                                staleness: Some(reason),
                            },
                        );
                        for name in wanted {
                            report
                                .repositories
                                .insert(name, RepoOutcome::Failed(RepoFailure::Disallowed));
                        }
                        continue;
                    }

                    tracker.transition(id, ExtensionState::Evaluating)?;
                    reasons.insert(id.clone(), reason);
                    jobs.push(Job::Evaluate {
                        id: id.clone(),
                        extension,
                        usages: ext.usages.clone(),
                        digest,
                        demand,
                        previous: entry.cloned(),
                    });
                }
            }
        }

        if !inconsistent.is_empty() {
            return Err(ModexError::LockfileInconsistent {
                path: self.lockfile.path().to_path_buf(),
                reason: format!("stale extension(s): {}", inconsistent.join(", ")),
            });
        }

        for (name, owner) in &visible {
            let spec = match owner {
                Visible::Direct(spec) | Visible::Override(spec) => spec.clone(),
                Visible::Extension(_) => continue,
            };
            if request.wants(name) {
                jobs.push(Job::Repository {
                    name: name.clone(),
                    spec,
                });
            }
        }

        let worker = Arc::new(Worker {
            evaluator: ExtensionEvaluator::new(
                materializer.clone(),
                Arc::clone(&registry),
                Arc::clone(&self.sink),
                Arc::clone(&self.inputs),
            ),
            materializer,
            lockfile: Arc::clone(&self.lockfile),
            journal: Arc::clone(&self.journal),
            fetch_enabled: request.fetch_enabled,
        });
        let cancelled = self
            .execute(worker, jobs, &mut report, &mut tracker, &mut reasons)
            .await?;

        for (id, names) in expected {
            let failure = match report.extensions.get(&id).map(|r| &r.outcome) {
                Some(ExtensionOutcome::Failed(_)) => RepoFailure::OwnerFailed(id.to_string()),
                Some(ExtensionOutcome::CacheHit) | Some(ExtensionOutcome::Evaluated) => {
                    RepoFailure::NotGenerated(id.to_string())
                }
                Some(ExtensionOutcome::Skipped) | None => RepoFailure::Cancelled,
            };
            for name in names {
                report
                    .repositories
                    .entry(name)
                    .or_insert_with(|| RepoOutcome::Failed(failure.clone()));
            }
        }

        if request.scope == FetchScope::All && self.lockfile.mode() == LockfileMode::Update {
            let used_ids: BTreeSet<&ExtensionId> = used.iter().map(|u| &u.id).collect();
            for id in snapshot.module_extensions.keys() {
                if !used_ids.contains(id) {
                    info!(extension = %id, "Pruning lockfile entry of unused extension");
                    self.lockfile.remove(id).await?;
                }
            }
        }

        info!(
            "Fetch finished: {} evaluated, {} cached, {} failed{}",
            report.evaluated(),
            report.cache_hits(),
            report.failed(),
            if cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    /// Run planned jobs concurrently; returns whether fail-fast cancelled
    /// outstanding work
    async fn execute(
        &self,
        worker: Arc<Worker>,
        jobs: Vec<Job>,
        report: &mut FetchReport,
        tracker: &mut StateTracker,
        reasons: &mut BTreeMap<ExtensionId, Staleness>,
    ) -> ModexResult<bool> {
        let permits = Arc::new(Semaphore::new(self.jobs));
        let mut pending = BTreeSet::new();
        let mut set = JoinSet::new();

        for job in jobs {
            pending.insert(job.key());
            let worker = Arc::clone(&worker);
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                // The semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                worker.run(job).await
            });
        }

        let mut cancelled = false;
        while let Some(joined) = set.join_next().await {
            let completion = match joined {
                Ok(completion) => completion,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    warn!("Fetch task panicked: {}", e);
                    continue;
                }
            };

            let failed = completion.is_failure();
            pending.remove(&completion.key());
            record(completion, report, tracker, reasons)?;

            if failed && self.fail_fast && !cancelled {
                info!("Cancelling outstanding fetches after the first failure");
                set.abort_all();
                cancelled = true;
            }
        }

        for key in pending {
            match key {
                JobKey::Extension(id) => {
                    let evaluating = tracker.get(&id) == ExtensionState::Evaluating;
                    let outcome = if cancelled {
                        if evaluating {
                            tracker.transition(&id, ExtensionState::Stale)?;
                        }
                        ExtensionOutcome::Skipped
                    } else {
                        if evaluating {
                            tracker.transition(&id, ExtensionState::Failed)?;
                        }
                        ExtensionOutcome::Failed(ModexError::Internal(format!(
                            "fetch task for {} did not complete",
                            id
                        )))
                    };
                    report.extensions.insert(
                        id.clone(),
                        ExtensionReport {
                            outcome,
                            state: tracker.get(&id),
                            staleness: reasons.remove(&id),
                        },
                    );
                }
                JobKey::Repository(name) => {
                    let failure = if cancelled {
                        RepoFailure::Cancelled
                    } else {
                        RepoFailure::Fetch(FetchError::rule("fetch task did not complete"))
                    };
                    report
                        .repositories
                        .insert(name, RepoOutcome::Failed(failure));
                }
            }
        }

        Ok(cancelled)
    }

    /// Staleness of every used extension, without evaluating anything
    pub fn check(&self) -> ModexResult<Vec<(ExtensionId, Staleness)>> {
        let snapshot = self.lockfile.snapshot();
        self.graph
            .extension_usages()
            .into_iter()
            .map(|ext| {
                let extension = self.resolver.resolve(&ext.id)?;
                let digest = usage_digest(&ext.id, &ext.usages)?;
                let reason = staleness(
                    &ext.id,
                    snapshot.entry(&ext.id),
                    &digest,
                    &extension.fingerprint(),
                    self.inputs.as_ref(),
                    self.graph.overrides(),
                );
                Ok((ext.id, reason))
            })
            .collect()
    }

    /// Lockfile entries of extensions the graph no longer uses
    pub fn unused_entries(&self) -> Vec<ExtensionId> {
        let used: BTreeSet<ExtensionId> = self
            .graph
            .extension_usages()
            .into_iter()
            .map(|u| u.id)
            .collect();
        self.lockfile
            .snapshot()
            .module_extensions
            .keys()
            .filter(|id| !used.contains(*id))
            .cloned()
            .collect()
    }
}

fn record(
    completion: Completion,
    report: &mut FetchReport,
    tracker: &mut StateTracker,
    reasons: &mut BTreeMap<ExtensionId, Staleness>,
) -> ModexResult<()> {
    match completion {
        Completion::Extension { id, outcome, repos } => {
            match &outcome {
                ExtensionOutcome::Evaluated => tracker.transition(&id, ExtensionState::Fresh)?,
                ExtensionOutcome::Failed(_) if tracker.get(&id) == ExtensionState::Evaluating => {
                    tracker.transition(&id, ExtensionState::Failed)?
                }
                _ => {}
            }
            report.repositories.extend(repos);
            report.extensions.insert(
                id.clone(),
                ExtensionReport {
                    outcome,
                    state: tracker.get(&id),
                    staleness: reasons.remove(&id),
                },
            );
        }
        Completion::Repository { name, outcome } => {
            report.repositories.insert(name, outcome);
        }
    }
    Ok(())
}
