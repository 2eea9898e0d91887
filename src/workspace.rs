//! Workspace wiring
//!
//! Resolves the on-disk layout of a workspace from the configuration and
//! builds a ready-to-run [`Orchestrator`] for it.

use crate::config::Config;
use crate::error::ModexResult;
use crate::extension::{ProcessInputs, StderrSink, TomlExtensionResolver};
use crate::fetch::Orchestrator;
use crate::journal::Journal;
use crate::lockfile::{LockfileMode, LockfileStore, LOCKFILE_NAME};
use crate::module::ModuleGraph;
use crate::repository::{HttpDownloader, RuleExecutor, RuleRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Default output base, relative to the workspace root
pub const OUTPUT_DIR: &str = ".modex";

/// Command-line settings that take precedence over the configuration
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub lockfile_mode: Option<LockfileMode>,
    /// `name=path` repository overrides
    pub repository_overrides: Vec<(String, PathBuf)>,
    pub jobs: Option<usize>,
    pub fail_fast: Option<bool>,
}

/// A workspace root together with its resolved paths
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    output_base: PathBuf,
    lockfile_path: PathBuf,
    config: Config,
}

impl Workspace {
    pub fn new(root: &Path, config: &Config) -> Self {
        let resolve = |path: &Path| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                root.join(path)
            }
        };

        let output_base = config
            .fetch
            .output_base
            .as_deref()
            .map(resolve)
            .unwrap_or_else(|| root.join(OUTPUT_DIR));
        let lockfile_path = config
            .lockfile
            .path
            .as_deref()
            .map(resolve)
            .unwrap_or_else(|| root.join(LOCKFILE_NAME));

        Self {
            root: root.to_path_buf(),
            output_base,
            lockfile_path,
            config: config.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `external/` and the fetch journal
    pub fn output_base(&self) -> &Path {
        &self.output_base
    }

    pub fn lockfile_path(&self) -> &Path {
        &self.lockfile_path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load the module graph with extra repository overrides
    pub fn load_graph(&self, overrides: &[(String, PathBuf)]) -> ModexResult<ModuleGraph> {
        Ok(ModuleGraph::load(&self.root)?.with_repository_overrides(overrides.iter().cloned()))
    }

    /// Open the lockfile; `mode` falls back to the configured one
    pub fn open_lockfile(&self, mode: Option<LockfileMode>) -> ModexResult<LockfileStore> {
        LockfileStore::open(&self.lockfile_path, mode.unwrap_or(self.config.lockfile.mode))
    }

    /// Build an orchestrator that prints extension diagnostics to stderr
    pub fn orchestrator(&self, options: &FetchOptions) -> ModexResult<Orchestrator> {
        let graph = Arc::new(self.load_graph(&options.repository_overrides)?);
        let lockfile = Arc::new(self.open_lockfile(options.lockfile_mode)?);

        let downloader = HttpDownloader::new(self.config.fetch.download_timeout());
        let executor = RuleExecutor::new(
            &self.output_base,
            &self.root,
            RuleRegistry::with_builtins(),
            Arc::new(downloader),
        );
        let journal = Journal::new(&self.output_base, self.config.general.journal);

        debug!(
            "Workspace {} (output base {}, lockfile {})",
            self.root.display(),
            self.output_base.display(),
            self.lockfile_path.display()
        );

        Ok(Orchestrator::new(
            Arc::clone(&graph),
            lockfile,
            Arc::new(TomlExtensionResolver::new(graph)),
            Arc::new(executor),
        )
        .with_sink(Arc::new(StderrSink))
        .with_inputs(Arc::new(ProcessInputs))
        .with_journal(Arc::new(journal))
        .with_jobs(options.jobs.unwrap_or(self.config.fetch.jobs))
        .with_fail_fast(options.fail_fast.unwrap_or(self.config.fetch.fail_fast)))
    }
}
