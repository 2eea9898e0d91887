//! Declarative extensions loaded from TOML
//!
//! Each top-level table of an extension file is one exported symbol:
//!
//! ```toml
//! [ext]
//! print = ["I was called!"]
//! env = ["GREETING"]
//!
//! [[ext.repo]]
//! name = "hello"
//! rule = "file"
//! attrs = { files = { "BUILD" = "filegroup(name='lala')" } }
//!
//! [ext.tag_class.install]
//! rule = "http_file"
//! ```
//!
//! String attributes may reference `${env:NAME}`; every referenced
//! variable is recorded as a consulted input.

use crate::checksum;
use crate::error::{ExtensionError, ModexError, ModexResult};
use crate::extension::callable::{ExtensionResolver, ModuleExtension};
use crate::extension::context::ExtensionContext;
use crate::extension::ExtensionId;
use crate::module::ModuleGraph;
use crate::repository::Attributes;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

fn default_reproducible() -> bool {
    true
}

/// One exported symbol of an extension file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Definition {
    #[serde(default = "default_reproducible")]
    reproducible: bool,

    /// Diagnostics emitted on every evaluation
    #[serde(default)]
    print: Vec<String>,

    /// Environment variables consulted up front
    #[serde(default)]
    env: Vec<String>,

    /// Unconditional repository declarations
    #[serde(default)]
    repo: Vec<RepoTemplate>,

    /// One repository per tag call of each class
    #[serde(default)]
    tag_class: BTreeMap<String, TagClass>,

    /// Make every evaluation fail with this message
    #[serde(default)]
    fail: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RepoTemplate {
    name: String,
    rule: String,
    #[serde(default)]
    attrs: Attributes,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct TagClass {
    rule: String,
    /// Defaults for attributes the tag call does not set
    #[serde(default)]
    attrs: Attributes,
}

/// Extension defined by a TOML table
#[derive(Debug, Clone)]
pub struct TomlExtension {
    definition: Definition,
    fingerprint: String,
}

impl TomlExtension {
    /// Parse the symbol `symbol` out of an extension file
    pub fn from_source(source: &str, symbol: &str) -> Result<Self, String> {
        let table: toml::Table = toml::from_str(source).map_err(|e| e.to_string())?;
        let raw = table
            .get(symbol)
            .ok_or_else(|| format!("symbol '{}' is not defined", symbol))?;

        let fingerprint = checksum::canonical_json_checksum(raw).map_err(|e| e.to_string())?;
        let definition = raw
            .clone()
            .try_into::<Definition>()
            .map_err(|e| format!("symbol '{}': {}", symbol, e))?;

        Ok(Self {
            definition,
            fingerprint,
        })
    }
}

#[async_trait]
impl ModuleExtension for TomlExtension {
    async fn evaluate(&self, ctx: &mut ExtensionContext) -> Result<(), ExtensionError> {
        let def = &self.definition;

        for name in &def.env {
            ctx.getenv(name);
        }

        for line in &def.print {
            let line = substitute_str(line, ctx);
            ctx.print(&line);
        }

        if let Some(message) = &def.fail {
            return Err(ExtensionError::evaluation(message.clone()));
        }

        for repo in &def.repo {
            let attrs = substitute_attrs(&repo.attrs, ctx);
            ctx.declare_repo(&repo.name, &repo.rule, attrs)?;
        }

        let tags: Vec<_> = ctx
            .tags()
            .map(|(module, tag)| (module.clone(), tag.clone()))
            .collect();
        for (module, tag) in tags {
            let class = def.tag_class.get(&tag.name).ok_or_else(|| {
                ExtensionError::evaluation(format!(
                    "module '{}' uses unknown tag class '{}'",
                    module, tag.name
                ))
            })?;

            let mut attrs = class.attrs.clone();
            attrs.extend(tag.attrs.clone());
            let name = match attrs.remove("name") {
                Some(Value::String(name)) => name,
                _ => {
                    return Err(ExtensionError::evaluation(format!(
                        "tag '{}' from module '{}' needs a string 'name' attribute",
                        tag.name, module
                    )))
                }
            };
            let attrs = substitute_attrs(&attrs, ctx);
            ctx.declare_repo(&name, &class.rule, attrs)?;
        }

        Ok(())
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn reproducible(&self) -> bool {
        self.definition.reproducible
    }
}

fn substitute_attrs(attrs: &Attributes, ctx: &mut ExtensionContext) -> Attributes {
    attrs
        .iter()
        .map(|(k, v)| (k.clone(), substitute_value(v, ctx)))
        .collect()
}

fn substitute_value(value: &Value, ctx: &mut ExtensionContext) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_str(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_value(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Replace `${env:NAME}` references; unset variables become empty
fn substitute_str(input: &str, ctx: &mut ExtensionContext) -> String {
    const OPEN: &str = "${env:";

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let name = &after[..end];
        out.push_str(&ctx.getenv(name).unwrap_or_default());
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Resolves identities to TOML files inside module source roots
#[derive(Debug, Clone)]
pub struct TomlExtensionResolver {
    graph: Arc<ModuleGraph>,
}

impl TomlExtensionResolver {
    pub fn new(graph: Arc<ModuleGraph>) -> Self {
        Self { graph }
    }
}

impl ExtensionResolver for TomlExtensionResolver {
    fn resolve(&self, id: &ExtensionId) -> ModexResult<Arc<dyn ModuleExtension>> {
        let not_found = |reason: String| ModexError::ExtensionNotFound {
            extension: id.to_string(),
            reason,
        };

        let root = self
            .graph
            .module_root(id.module())
            .ok_or_else(|| not_found(format!("module '{}' has no source root", id.module())))?;
        let path = root.join(id.file());
        debug!("Loading extension {} from {}", id, path.display());

        let source = std::fs::read_to_string(&path)
            .map_err(|e| not_found(format!("reading {}: {}", path.display(), e)))?;
        let extension = TomlExtension::from_source(&source, id.symbol())
            .map_err(|reason| not_found(format!("{}: {}", path.display(), reason)))?;
        Ok(Arc::new(extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::inputs::StaticInputs;
    use crate::extension::sink::CollectingSink;
    use crate::fetch::registry::RepositoryRegistry;
    use crate::module::{ExtensionUsage, ModuleFile, ModuleKey, TagCall};
    use serde_json::json;

    const EXTENSION: &str = r#"
[ext]
print = ["I was called!", "greeting is ${env:GREETING}"]

[[ext.repo]]
name = "hello"
rule = "file"
attrs = { files = { "BUILD" = "filegroup(name='lala')", "WORKSPACE" = "" } }

[ext.tag_class.install]
rule = "file"
attrs = { files = { "BUILD" = "" } }

[broken]
fail = "boom"
"#;

    fn id() -> ExtensionId {
        ExtensionId::parse("extension.toml%ext", "").unwrap()
    }

    fn context(usages: Vec<ExtensionUsage>, sink: Arc<CollectingSink>) -> ExtensionContext {
        ExtensionContext::new(
            id(),
            usages,
            "def".to_string(),
            Arc::new(RepositoryRegistry::new()),
            sink,
            Arc::new(StaticInputs::new().with_env("GREETING", "hi")),
        )
    }

    fn install(name: &str) -> ExtensionUsage {
        ExtensionUsage {
            module: ModuleKey::new("main", ""),
            extension: id(),
            tags: vec![TagCall {
                name: "install".to_string(),
                attrs: serde_json::from_value(json!({"name": name})).unwrap(),
            }],
            use_repo: vec![],
        }
    }

    #[tokio::test]
    async fn evaluates_prints_and_repos() {
        let ext = TomlExtension::from_source(EXTENSION, "ext").unwrap();
        let sink = Arc::new(CollectingSink::new());
        let mut ctx = context(vec![install("extra")], Arc::clone(&sink));

        ext.evaluate(&mut ctx).await.unwrap();

        assert_eq!(sink.count("I was called!"), 1);
        assert_eq!(sink.count("greeting is hi"), 1);
        let (repos, inputs) = ctx.finish();
        assert_eq!(repos.keys().collect::<Vec<_>>(), vec!["extra", "hello"]);
        assert!(!repos["extra"].attributes.contains_key("name"));
        assert_eq!(inputs["env:GREETING"], Some("hi".to_string()));
    }

    #[tokio::test]
    async fn fail_symbol_errors() {
        let ext = TomlExtension::from_source(EXTENSION, "broken").unwrap();
        let mut ctx = context(vec![], Arc::new(CollectingSink::new()));
        let err = ext.evaluate(&mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn unknown_tag_class_errors() {
        let ext = TomlExtension::from_source(EXTENSION, "ext").unwrap();
        let mut usage = install("x");
        usage.tags[0].name = "configure".to_string();
        let mut ctx = context(vec![usage], Arc::new(CollectingSink::new()));
        assert!(ext.evaluate(&mut ctx).await.is_err());
    }

    #[test]
    fn fingerprint_tracks_definition() {
        let a = TomlExtension::from_source(EXTENSION, "ext").unwrap();
        let edited = EXTENSION.replace("I was called!", "Called again");
        let b = TomlExtension::from_source(&edited, "ext").unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());

        // Other symbols in the same file do not affect this one
        let other = EXTENSION.replace("boom", "bang");
        let c = TomlExtension::from_source(&other, "ext").unwrap();
        assert_eq!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn missing_symbol_and_unknown_field() {
        assert!(TomlExtension::from_source(EXTENSION, "nope").is_err());
        assert!(TomlExtension::from_source("[ext]\nprnt = []\n", "ext").is_err());
    }

    #[test]
    fn reproducible_flag() {
        let ext = TomlExtension::from_source("[ext]\nreproducible = false\n", "ext").unwrap();
        assert!(!ext.reproducible());
    }

    #[test]
    fn resolver_reads_from_module_root() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("extension.toml"), EXTENSION).unwrap();
        let file = ModuleFile::parse("[module]\nname = \"main\"\n").unwrap();
        let graph = ModuleGraph::from_file(dir.path(), file).unwrap();

        let resolver = TomlExtensionResolver::new(Arc::new(graph));
        assert!(resolver.resolve(&id()).is_ok());

        let missing = ExtensionId::parse("missing.toml%ext", "").unwrap();
        assert!(resolver.resolve(&missing).is_err());
        let unknown_module = ExtensionId::parse("@nowhere//ext.toml%ext", "").unwrap();
        assert!(resolver.resolve(&unknown_module).is_err());
    }
}
