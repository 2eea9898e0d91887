//! `MODULE.toml` parsing
//!
//! The file carries the resolver's output: the root module, its overrides
//! and the already-resolved dependency modules in traversal order.

use crate::error::{ModexError, ModexResult};
use crate::repository::Attributes;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the module file at the workspace root
pub const MODULE_FILE: &str = "MODULE.toml";

/// Parsed `MODULE.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleFile {
    /// Root module metadata
    pub module: ModuleHeader,

    /// Extension usages of the root module
    #[serde(default)]
    pub use_extension: Vec<UseExtension>,

    /// Repositories declared directly by the root module
    #[serde(default)]
    pub repo: Vec<RepoDeclaration>,

    /// Local path overrides for dependency modules
    #[serde(default)]
    pub local_path_override: Vec<LocalPathOverride>,

    /// Resolved dependency modules, in graph traversal order
    #[serde(default)]
    pub dep: Vec<DepModule>,
}

/// `[module]` section
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleHeader {
    pub name: String,

    #[serde(default)]
    pub version: String,
}

/// One `[[use_extension]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct UseExtension {
    /// Extension label (`file%symbol` or `@module//file%symbol`)
    pub extension: String,

    /// Repositories imported from the extension
    #[serde(default)]
    pub use_repo: Vec<String>,

    /// Tag calls, in declaration order
    #[serde(default)]
    pub tag: Vec<TagEntry>,
}

/// One `[[use_extension.tag]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub name: String,

    #[serde(default)]
    pub attrs: Attributes,
}

/// One `[[repo]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct RepoDeclaration {
    pub name: String,
    pub rule: String,

    #[serde(default)]
    pub attrs: Attributes,
}

/// One `[[local_path_override]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct LocalPathOverride {
    pub module_name: String,
    pub path: PathBuf,
}

/// One resolved `[[dep]]` module
#[derive(Debug, Clone, Deserialize)]
pub struct DepModule {
    pub name: String,

    #[serde(default)]
    pub version: String,

    /// Module source root, relative to the workspace
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub use_extension: Vec<UseExtension>,

    #[serde(default)]
    pub repo: Vec<RepoDeclaration>,
}

impl ModuleFile {
    /// Parse the module file from disk
    pub fn from_file(path: &Path) -> ModexResult<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModexError::ManifestNotFound(path.to_path_buf()))
            }
            Err(e) => {
                return Err(ModexError::io(
                    format!("reading module file {}", path.display()),
                    e,
                ))
            }
        };
        Self::parse(&content).map_err(|e| match e {
            ModexError::ManifestInvalid { reason, .. } => ModexError::ManifestInvalid {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parse the module file from a TOML string
    pub fn parse(content: &str) -> ModexResult<Self> {
        toml::from_str(content).map_err(|e| ModexError::ManifestInvalid {
            path: MODULE_FILE.into(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FETCH_ALL_MODULE: &str = r#"
[module]
name = "main"
version = "1.0.0"

[[use_extension]]
extension = "extension.toml%ext"
use_repo = ["hello"]

[[local_path_override]]
module_name = "bazel_tools"
path = "tools_mock"
"#;

    #[test]
    fn parse_root_module() {
        let file = ModuleFile::parse(FETCH_ALL_MODULE).unwrap();
        assert_eq!(file.module.name, "main");
        assert_eq!(file.use_extension.len(), 1);
        assert_eq!(file.use_extension[0].use_repo, vec!["hello"]);
        assert_eq!(file.local_path_override[0].module_name, "bazel_tools");
        assert!(file.dep.is_empty());
    }

    #[test]
    fn parse_tags_and_deps() {
        let content = r#"
[module]
name = "main"

[[use_extension]]
extension = "@lib//ext.toml%deps"
use_repo = ["a"]
[[use_extension.tag]]
name = "install"
attrs = { name = "a", version = "1.2" }

[[dep]]
name = "lib"
version = "0.4.0"
path = "third_party/lib"
[[dep.repo]]
name = "lib_data"
rule = "file"
attrs = { files = { "data.txt" = "x" } }
"#;
        let file = ModuleFile::parse(content).unwrap();
        let tag = &file.use_extension[0].tag[0];
        assert_eq!(tag.name, "install");
        assert_eq!(tag.attrs["version"], "1.2");
        assert_eq!(file.dep[0].repo[0].rule, "file");
        assert_eq!(file.dep[0].path.as_deref(), Some(Path::new("third_party/lib")));
    }

    #[test]
    fn missing_module_section_errors() {
        let err = ModuleFile::parse("[[repo]]\nname = \"x\"\nrule = \"file\"\n").unwrap_err();
        assert!(matches!(err, ModexError::ManifestInvalid { .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = ModuleFile::from_file(&dir.path().join(MODULE_FILE)).unwrap_err();
        assert!(matches!(err, ModexError::ManifestNotFound(_)));
    }
}
