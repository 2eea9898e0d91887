//! Resolved module graph and merged extension usages
//!
//! Modules are kept in traversal order (root first, then dependencies in
//! the order the resolver emitted them). Usages of one extension from all
//! modules are merged in that same order, which makes usage digests
//! reproducible.

use crate::error::{ModexError, ModexResult};
use crate::extension::ExtensionId;
use crate::module::manifest::{DepModule, ModuleFile, RepoDeclaration, UseExtension, MODULE_FILE};
use crate::module::overrides::Overrides;
use crate::repository::{validate_repo_name, Attributes, RepoSpec};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Module identity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ModuleKey {
    pub name: String,
    pub version: String,
}

impl ModuleKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.version)
        }
    }
}

/// A single tag call on an extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCall {
    pub name: String,
    pub attrs: Attributes,
}

/// One module's usage of one extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionUsage {
    pub module: ModuleKey,
    pub extension: ExtensionId,
    pub tags: Vec<TagCall>,
    pub use_repo: Vec<String>,
}

/// A repository declared directly by a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectRepo {
    pub name: String,
    pub spec: RepoSpec,
}

/// A resolved module
#[derive(Debug, Clone)]
pub struct Module {
    pub key: ModuleKey,
    /// Source root of the module, when known
    pub root: Option<PathBuf>,
    pub usages: Vec<ExtensionUsage>,
    pub repos: Vec<DirectRepo>,
}

/// All usages of one extension, merged across modules
#[derive(Debug, Clone)]
pub struct ExtensionUsages {
    pub id: ExtensionId,
    pub usages: Vec<ExtensionUsage>,
}

impl ExtensionUsages {
    /// Repository names imported via `use_repo` by any module
    pub fn imported_repos(&self) -> impl Iterator<Item = &str> {
        self.usages
            .iter()
            .flat_map(|u| u.use_repo.iter().map(String::as_str))
    }
}

/// The resolved module graph
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    workspace: PathBuf,
    modules: Vec<Module>,
    overrides: Overrides,
}

impl ModuleGraph {
    /// Load `MODULE.toml` from the workspace root
    pub fn load(workspace: &Path) -> ModexResult<Self> {
        let path = workspace.join(MODULE_FILE);
        let file = ModuleFile::from_file(&path)?;
        Self::from_file(workspace, file).map_err(|e| match e {
            ModexError::ManifestInvalid { reason, .. } => ModexError::ManifestInvalid { path, reason },
            other => other,
        })
    }

    /// Build the graph from an already parsed module file
    pub fn from_file(workspace: &Path, file: ModuleFile) -> ModexResult<Self> {
        let root_name = file.module.name.clone();

        let mut overrides = Overrides::new();
        for o in &file.local_path_override {
            overrides.override_module(o.module_name.clone(), workspace.join(&o.path));
        }

        let root_key = ModuleKey::new(file.module.name.clone(), file.module.version.clone());
        let mut modules = vec![build_module(
            root_key,
            Some(workspace.to_path_buf()),
            "",
            &root_name,
            &file.use_extension,
            &file.repo,
        )?];

        for DepModule {
            name,
            version,
            path,
            use_extension,
            repo,
        } in &file.dep
        {
            let key = ModuleKey::new(name.clone(), version.clone());
            let root = overrides
                .module(name)
                .map(Path::to_path_buf)
                .or_else(|| path.as_ref().map(|p| workspace.join(p)));
            modules.push(build_module(key, root, name, &root_name, use_extension, repo)?);
        }

        Self::from_modules(workspace, modules, overrides)
    }

    /// Build the graph from resolved modules; the first module is the root
    pub fn from_modules(
        workspace: &Path,
        modules: Vec<Module>,
        overrides: Overrides,
    ) -> ModexResult<Self> {
        let invalid = |reason: String| ModexError::ManifestInvalid {
            path: workspace.join(MODULE_FILE),
            reason,
        };

        if modules.is_empty() {
            return Err(invalid("module graph has no root module".to_string()));
        }

        let mut seen_modules = HashMap::new();
        let mut direct_owner: HashMap<&str, &str> = HashMap::new();
        for module in &modules {
            if seen_modules.insert(module.key.name.as_str(), ()).is_some() {
                return Err(invalid(format!(
                    "module '{}' appears more than once",
                    module.key.name
                )));
            }
            for repo in &module.repos {
                if let Some(owner) = direct_owner.insert(repo.name.as_str(), &module.key.name) {
                    return Err(invalid(format!(
                        "repository '{}' is declared by both module '{}' and module '{}'",
                        repo.name, owner, module.key.name
                    )));
                }
            }
        }

        debug!("Loaded module graph with {} module(s)", modules.len());
        Ok(Self {
            workspace: workspace.to_path_buf(),
            modules,
            overrides,
        })
    }

    /// Add repository overrides on top of the module file's directives
    pub fn with_repository_overrides<I>(mut self, repos: I) -> Self
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        for (name, path) in repos {
            let path = if path.is_absolute() {
                path
            } else {
                self.workspace.join(path)
            };
            self.overrides.override_repository(name, path);
        }
        self
    }

    /// Workspace root
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Root module
    pub fn root(&self) -> &Module {
        &self.modules[0]
    }

    /// All modules in traversal order
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Active override directives
    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    /// Source root of a module; the empty name denotes the root module
    pub fn module_root(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name == self.root().key.name {
            return Some(self.workspace.clone());
        }
        if let Some(path) = self.overrides.module(name) {
            return Some(path.to_path_buf());
        }
        self.modules
            .iter()
            .find(|m| m.key.name == name)
            .and_then(|m| m.root.clone())
    }

    /// Directly declared repositories with their declaring module
    pub fn direct_repos(&self) -> impl Iterator<Item = (&ModuleKey, &DirectRepo)> {
        self.modules
            .iter()
            .flat_map(|m| m.repos.iter().map(move |r| (&m.key, r)))
    }

    /// Merge usages per extension identity.
    ///
    /// Extensions appear in the order they are first used during traversal;
    /// an extension with no usages never appears.
    pub fn extension_usages(&self) -> Vec<ExtensionUsages> {
        let mut merged: Vec<ExtensionUsages> = Vec::new();
        let mut index: HashMap<&ExtensionId, usize> = HashMap::new();

        for usage in self.modules.iter().flat_map(|m| m.usages.iter()) {
            match index.get(&usage.extension) {
                Some(&i) => merged[i].usages.push(usage.clone()),
                None => {
                    index.insert(&usage.extension, merged.len());
                    merged.push(ExtensionUsages {
                        id: usage.extension.clone(),
                        usages: vec![usage.clone()],
                    });
                }
            }
        }

        merged
    }
}

fn build_module(
    key: ModuleKey,
    root: Option<PathBuf>,
    declaring: &str,
    root_name: &str,
    use_extension: &[UseExtension],
    repos: &[RepoDeclaration],
) -> ModexResult<Module> {
    let invalid = |reason: String| ModexError::ManifestInvalid {
        path: MODULE_FILE.into(),
        reason,
    };

    let mut usages = Vec::with_capacity(use_extension.len());
    for entry in use_extension {
        let extension = ExtensionId::parse(&entry.extension, declaring)?.normalize_root(root_name);
        for name in &entry.use_repo {
            validate_repo_name(name)
                .map_err(|reason| invalid(format!("module '{}': use_repo: {}", key, reason)))?;
        }
        usages.push(ExtensionUsage {
            module: key.clone(),
            extension,
            tags: entry
                .tag
                .iter()
                .map(|t| TagCall {
                    name: t.name.clone(),
                    attrs: t.attrs.clone(),
                })
                .collect(),
            use_repo: entry.use_repo.clone(),
        });
    }

    let mut direct = Vec::with_capacity(repos.len());
    let mut names = BTreeMap::new();
    for repo in repos {
        validate_repo_name(&repo.name)
            .map_err(|reason| invalid(format!("module '{}': {}", key, reason)))?;
        if names.insert(repo.name.clone(), ()).is_some() {
            return Err(invalid(format!(
                "module '{}' declares repository '{}' twice",
                key, repo.name
            )));
        }
        direct.push(DirectRepo {
            name: repo.name.clone(),
            spec: RepoSpec::new(repo.rule.clone(), repo.attrs.clone()),
        });
    }

    Ok(Module {
        key,
        root,
        usages,
        repos: direct,
    })
}
