//! The only channel through which an extension acts
//!
//! Repository declarations are checked here against the per-fetch
//! registry, so the one-owner-per-name rule holds no matter what the
//! extension does.

use crate::error::ExtensionError;
use crate::extension::inputs::{env_key, InputSource, RecordedInputs, DEFINITION_KEY};
use crate::extension::sink::DiagnosticSink;
use crate::extension::ExtensionId;
use crate::fetch::registry::{RepoOwner, RepositoryRegistry};
use crate::module::{ExtensionUsage, ModuleKey, TagCall};
use crate::repository::{validate_repo_name, Attributes, RepoSpec};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Evaluation context of one extension run
pub struct ExtensionContext {
    id: ExtensionId,
    owner: RepoOwner,
    usages: Vec<ExtensionUsage>,
    registry: Arc<RepositoryRegistry>,
    sink: Arc<dyn DiagnosticSink>,
    inputs: Arc<dyn InputSource>,
    declared: BTreeMap<String, RepoSpec>,
    recorded: RecordedInputs,
}

impl ExtensionContext {
    pub(crate) fn new(
        id: ExtensionId,
        usages: Vec<ExtensionUsage>,
        definition: String,
        registry: Arc<RepositoryRegistry>,
        sink: Arc<dyn DiagnosticSink>,
        inputs: Arc<dyn InputSource>,
    ) -> Self {
        let mut recorded = RecordedInputs::new();
        recorded.insert(DEFINITION_KEY.to_string(), Some(definition));
        Self {
            owner: RepoOwner::Extension(id.clone()),
            id,
            usages,
            registry,
            sink,
            inputs,
            declared: BTreeMap::new(),
            recorded,
        }
    }

    /// Identity of the running extension
    pub fn id(&self) -> &ExtensionId {
        &self.id
    }

    /// Merged usages, in module traversal order
    pub fn usages(&self) -> &[ExtensionUsage] {
        &self.usages
    }

    /// All tag calls with their declaring module, in traversal order
    pub fn tags(&self) -> impl Iterator<Item = (&ModuleKey, &TagCall)> {
        self.usages
            .iter()
            .flat_map(|u| u.tags.iter().map(move |t| (&u.module, t)))
    }

    /// Forward a diagnostic line
    pub fn print(&self, message: &str) {
        self.sink.emit(&self.id, message);
    }

    /// Read an environment variable and record it as a consulted input
    pub fn getenv(&mut self, name: &str) -> Option<String> {
        let value = self.inputs.env(name);
        self.recorded.insert(env_key(name), value.clone());
        value
    }

    /// Declare a repository generated by this extension.
    ///
    /// Fails before anything is written to disk if the name is invalid,
    /// already declared by this extension, or owned by someone else.
    pub fn declare_repo(
        &mut self,
        name: &str,
        rule: &str,
        attrs: Attributes,
    ) -> Result<(), ExtensionError> {
        validate_repo_name(name).map_err(|reason| ExtensionError::InvalidRepositoryName {
            name: name.to_string(),
            reason,
        })?;

        if self.declared.contains_key(name) {
            return Err(ExtensionError::evaluation(format!(
                "repository '{}' is declared more than once",
                name
            )));
        }

        self.registry.claim(name, &self.owner)?;

        debug!(extension = %self.id, repo = name, rule, "Declared repository");
        self.declared
            .insert(name.to_string(), RepoSpec::new(rule, attrs));
        Ok(())
    }

    /// Repositories declared so far
    pub fn declared(&self) -> &BTreeMap<String, RepoSpec> {
        &self.declared
    }

    pub(crate) fn finish(self) -> (BTreeMap<String, RepoSpec>, RecordedInputs) {
        (self.declared, self.recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::inputs::StaticInputs;
    use crate::extension::sink::CollectingSink;

    fn context(registry: Arc<RepositoryRegistry>, sink: Arc<CollectingSink>) -> ExtensionContext {
        ExtensionContext::new(
            ExtensionId::parse("extension.toml%ext", "").unwrap(),
            Vec::new(),
            "sha256:def".to_string(),
            registry,
            sink,
            Arc::new(StaticInputs::new().with_env("GREETING", "hi")),
        )
    }

    #[test]
    fn declare_and_finish() {
        let registry = Arc::new(RepositoryRegistry::new());
        let mut ctx = context(Arc::clone(&registry), Arc::new(CollectingSink::new()));
        ctx.declare_repo("hello", "file", Attributes::new()).unwrap();

        let (repos, inputs) = ctx.finish();
        assert!(repos.contains_key("hello"));
        assert_eq!(inputs["definition"], Some("sha256:def".to_string()));
        assert!(registry.owner("hello").is_some());
    }

    #[test]
    fn getenv_is_recorded() {
        let mut ctx = context(Arc::new(RepositoryRegistry::new()), Arc::new(CollectingSink::new()));
        assert_eq!(ctx.getenv("GREETING"), Some("hi".to_string()));
        assert_eq!(ctx.getenv("UNSET_VAR"), None);

        let (_, inputs) = ctx.finish();
        assert_eq!(inputs["env:GREETING"], Some("hi".to_string()));
        assert_eq!(inputs["env:UNSET_VAR"], None);
    }

    #[test]
    fn print_goes_to_sink() {
        let sink = Arc::new(CollectingSink::new());
        let ctx = context(Arc::new(RepositoryRegistry::new()), Arc::clone(&sink));
        ctx.print("I was called!");
        assert_eq!(sink.count("I was called!"), 1);
    }

    #[test]
    fn collision_with_other_owner() {
        let registry = Arc::new(RepositoryRegistry::new());
        let other = RepoOwner::Extension(ExtensionId::parse("other.toml%ext", "").unwrap());
        registry.claim("hello", &other).unwrap();

        let mut ctx = context(registry, Arc::new(CollectingSink::new()));
        let err = ctx.declare_repo("hello", "file", Attributes::new()).unwrap_err();
        assert!(matches!(err, ExtensionError::RepositoryNameCollision { .. }));
        assert!(ctx.declared().is_empty());
    }

    #[test]
    fn duplicate_declaration_rejected() {
        let mut ctx = context(Arc::new(RepositoryRegistry::new()), Arc::new(CollectingSink::new()));
        ctx.declare_repo("hello", "file", Attributes::new()).unwrap();
        assert!(ctx.declare_repo("hello", "file", Attributes::new()).is_err());
    }

    #[test]
    fn invalid_name_rejected() {
        let mut ctx = context(Arc::new(RepositoryRegistry::new()), Arc::new(CollectingSink::new()));
        let err = ctx.declare_repo("../x", "file", Attributes::new()).unwrap_err();
        assert!(matches!(err, ExtensionError::InvalidRepositoryName { .. }));
    }
}
