//! Extension identity: the module whose files hold the extension, the file
//! path inside that module and the exported symbol.
//!
//! Rendered as `@module//file%symbol`; the root module renders as
//! `@//file%symbol`.

use crate::error::{ModexError, ModexResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// Identity of a module extension
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExtensionId {
    /// Module providing the extension file; empty for the root module
    module: String,
    /// Path of the extension file, relative to the module root
    file: String,
    /// Exported symbol within the file
    symbol: String,
}

impl ExtensionId {
    /// Build an identity from its parts
    pub fn new(
        module: impl Into<String>,
        file: impl Into<String>,
        symbol: impl Into<String>,
    ) -> ModexResult<Self> {
        let id = Self {
            module: module.into(),
            file: file.into(),
            symbol: symbol.into(),
        };
        id.validate()?;
        Ok(id)
    }

    /// Parse a label as written in a module file.
    ///
    /// Labels without an `@module` prefix are relative to `declaring_module`
    /// (empty for the root module).
    pub fn parse(label: &str, declaring_module: &str) -> ModexResult<Self> {
        let invalid = |reason: &str| ModexError::InvalidExtensionLabel {
            label: label.to_string(),
            reason: reason.to_string(),
        };

        let (module, rest) = if let Some(stripped) = label.strip_prefix('@') {
            let (module, rest) = stripped
                .split_once("//")
                .ok_or_else(|| invalid("expected '@module//file%symbol'"))?;
            (module.to_string(), rest)
        } else if let Some(rest) = label.strip_prefix("//") {
            (declaring_module.to_string(), rest)
        } else {
            (declaring_module.to_string(), label)
        };

        let (file, symbol) = rest
            .rsplit_once('%')
            .ok_or_else(|| invalid("missing '%symbol' suffix"))?;

        Self::new(module, file, symbol).map_err(|e| match e {
            ModexError::InvalidExtensionLabel { reason, .. } => invalid(&reason),
            other => other,
        })
    }

    fn validate(&self) -> ModexResult<()> {
        let invalid = |reason: &str| ModexError::InvalidExtensionLabel {
            label: self.to_string(),
            reason: reason.to_string(),
        };

        if self.file.is_empty() {
            return Err(invalid("extension file path is empty"));
        }
        if self.symbol.is_empty() {
            return Err(invalid("extension symbol is empty"));
        }
        if !self
            .symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid("symbol must be alphanumeric, '_' or '-'"));
        }
        let escapes = Path::new(&self.file)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(invalid("extension file must be a relative path inside its module"));
        }
        Ok(())
    }

    /// Module providing the extension (empty for root)
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Whether the extension lives in the root module
    pub fn is_root(&self) -> bool {
        self.module.is_empty()
    }

    /// Extension file path relative to its module root
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Exported symbol name
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Re-home an identity that names the root module explicitly
    pub(crate) fn normalize_root(mut self, root_name: &str) -> Self {
        if self.module == root_name {
            self.module.clear();
        }
        self
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}//{}%{}", self.module, self.file, self.symbol)
    }
}

impl From<ExtensionId> for String {
    fn from(id: ExtensionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for ExtensionId {
    type Error = ModexError;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        if !label.starts_with('@') {
            return Err(ModexError::InvalidExtensionLabel {
                label,
                reason: "stored labels must be absolute".to_string(),
            });
        }
        Self::parse(&label, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_relative_label_in_root() {
        let id = ExtensionId::parse("extension.toml%ext", "").unwrap();
        assert!(id.is_root());
        assert_eq!(id.file(), "extension.toml");
        assert_eq!(id.symbol(), "ext");
        assert_eq!(id.to_string(), "@//extension.toml%ext");
    }

    #[test]
    fn parse_relative_label_in_dependency() {
        let id = ExtensionId::parse("//tools/ext.toml%go", "rules_go").unwrap();
        assert_eq!(id.module(), "rules_go");
        assert_eq!(id.to_string(), "@rules_go//tools/ext.toml%go");
    }

    #[test]
    fn parse_absolute_label() {
        let id = ExtensionId::parse("@lib_a//ext.toml%deps", "root").unwrap();
        assert_eq!(id.module(), "lib_a");
        assert_eq!(id.symbol(), "deps");
    }

    #[test]
    fn display_roundtrips_through_string() {
        let id = ExtensionId::parse("@lib_a//sub/ext.toml%deps", "").unwrap();
        let back = ExtensionId::try_from(id.to_string()).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn rejects_missing_symbol() {
        assert!(ExtensionId::parse("extension.toml", "").is_err());
        assert!(ExtensionId::parse("extension.toml%", "").is_err());
    }

    #[test]
    fn rejects_escaping_file() {
        let err = ExtensionId::parse("../outside.toml%ext", "").unwrap_err();
        assert!(err.to_string().contains("relative path"));
        assert!(ExtensionId::parse("/etc/ext.toml%ext", "").is_err());
    }

    #[test]
    fn normalize_root_clears_module() {
        let id = ExtensionId::parse("@main//ext.toml%ext", "")
            .unwrap()
            .normalize_root("main");
        assert!(id.is_root());
    }

    #[test]
    fn serializes_as_label_string() {
        let id = ExtensionId::parse("ext.toml%ext", "").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"@//ext.toml%ext\"");
        let parsed: ExtensionId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
