//! Extension evaluator
//!
//! Runs one extension exactly once, checks what it declared against the
//! usages that imported from it, then materializes the declared
//! repositories the current request needs.

use crate::error::ExtensionError;
use crate::extension::callable::ModuleExtension;
use crate::extension::context::ExtensionContext;
use crate::extension::inputs::{InputSource, RecordedInputs};
use crate::extension::sink::DiagnosticSink;
use crate::extension::ExtensionId;
use crate::fetch::registry::RepositoryRegistry;
use crate::module::ExtensionUsage;
use crate::repository::{Ensured, Materializer, RepoSpec};
use futures_util::future::try_join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Which generated repositories must be on disk after evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Demand {
    /// Every declared repository
    All,
    /// Only the named repositories
    Repos(BTreeSet<String>),
}

impl Demand {
    pub fn none() -> Self {
        Self::Repos(BTreeSet::new())
    }

    pub fn covers(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Repos(names) => names.contains(name),
        }
    }
}

/// Result of one successful evaluation
#[derive(Debug, Clone)]
pub struct EvaluationOutput {
    /// Every repository the extension declared
    pub repos: BTreeMap<String, RepoSpec>,
    /// Inputs consulted during evaluation
    pub inputs: RecordedInputs,
    pub reproducible: bool,
    /// Demanded repositories, now ready on disk
    pub materialized: BTreeMap<String, Ensured>,
}

/// Evaluates extensions within one fetch
pub struct ExtensionEvaluator {
    materializer: Materializer,
    registry: Arc<RepositoryRegistry>,
    sink: Arc<dyn DiagnosticSink>,
    inputs: Arc<dyn InputSource>,
}

impl ExtensionEvaluator {
    pub fn new(
        materializer: Materializer,
        registry: Arc<RepositoryRegistry>,
        sink: Arc<dyn DiagnosticSink>,
        inputs: Arc<dyn InputSource>,
    ) -> Self {
        Self {
            materializer,
            registry,
            sink,
            inputs,
        }
    }

    /// Run `extension` once over its merged usages.
    ///
    /// Fails with the first collision, evaluation error, missing `use_repo`
    /// import or failed materialization; on failure nothing is returned for
    /// recording.
    pub async fn evaluate(
        &self,
        id: &ExtensionId,
        extension: &dyn ModuleExtension,
        usages: &[ExtensionUsage],
        demand: &Demand,
    ) -> Result<EvaluationOutput, ExtensionError> {
        info!(extension = %id, "Evaluating extension");

        let mut ctx = ExtensionContext::new(
            id.clone(),
            usages.to_vec(),
            extension.fingerprint(),
            Arc::clone(&self.registry),
            Arc::clone(&self.sink),
            Arc::clone(&self.inputs),
        );
        extension.evaluate(&mut ctx).await?;
        let (repos, inputs) = ctx.finish();

        for usage in usages {
            if let Some(name) = usage.use_repo.iter().find(|n| !repos.contains_key(*n)) {
                return Err(ExtensionError::MissingRepository {
                    module: usage.module.to_string(),
                    name: name.clone(),
                });
            }
        }

        let wanted: Vec<(&String, &RepoSpec)> =
            repos.iter().filter(|(name, _)| demand.covers(name)).collect();
        debug!(
            extension = %id,
            "Declared {} repositories, materializing {}",
            repos.len(),
            wanted.len()
        );

        let paths = try_join_all(wanted.into_iter().map(|(name, spec)| async move {
            self.materializer
                .ensure(name, spec)
                .await
                .map(|ensured| (name.clone(), ensured))
                .map_err(|source| ExtensionError::Fetch {
                    repo: name.clone(),
                    source,
                })
        }))
        .await?;

        Ok(EvaluationOutput {
            repos,
            inputs,
            reproducible: extension.reproducible(),
            materialized: paths.into_iter().collect(),
        })
    }
}
