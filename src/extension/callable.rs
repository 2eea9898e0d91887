//! Module extension abstraction
//!
//! An extension is anything that, given its merged usages through an
//! [`ExtensionContext`], declares repositories. The engine never looks
//! inside it; it only observes what goes through the context.

use crate::error::{ExtensionError, ModexError, ModexResult};
use crate::extension::context::ExtensionContext;
use crate::extension::ExtensionId;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A module extension callable
#[async_trait]
pub trait ModuleExtension: Send + Sync {
    /// Run the extension once
    async fn evaluate(&self, ctx: &mut ExtensionContext) -> Result<(), ExtensionError>;

    /// Fingerprint of the extension's definition; a change invalidates
    /// every recorded result
    fn fingerprint(&self) -> String;

    /// Whether recorded repository specs may be re-materialized without
    /// running the extension again
    fn reproducible(&self) -> bool {
        true
    }
}

/// Locates extension implementations by identity
pub trait ExtensionResolver: Send + Sync {
    fn resolve(&self, id: &ExtensionId) -> ModexResult<Arc<dyn ModuleExtension>>;
}

/// In-memory resolver
#[derive(Default, Clone)]
pub struct StaticResolver {
    extensions: BTreeMap<ExtensionId, Arc<dyn ModuleExtension>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ExtensionId, extension: impl ModuleExtension + 'static) {
        self.extensions.insert(id, Arc::new(extension));
    }

    pub fn with(mut self, id: ExtensionId, extension: impl ModuleExtension + 'static) -> Self {
        self.register(id, extension);
        self
    }
}

impl ExtensionResolver for StaticResolver {
    fn resolve(&self, id: &ExtensionId) -> ModexResult<Arc<dyn ModuleExtension>> {
        self.extensions
            .get(id)
            .cloned()
            .ok_or_else(|| ModexError::ExtensionNotFound {
                extension: id.to_string(),
                reason: "no extension registered under this identity".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl ModuleExtension for Noop {
        async fn evaluate(&self, _ctx: &mut ExtensionContext) -> Result<(), ExtensionError> {
            Ok(())
        }

        fn fingerprint(&self) -> String {
            "noop".to_string()
        }
    }

    #[test]
    fn static_resolver_lookup() {
        let id = ExtensionId::parse("ext.toml%ext", "").unwrap();
        let resolver = StaticResolver::new().with(id.clone(), Noop);

        let ext = resolver.resolve(&id).unwrap();
        assert_eq!(ext.fingerprint(), "noop");
        assert!(ext.reproducible());

        let missing = ExtensionId::parse("ext.toml%other", "").unwrap();
        let err = resolver.resolve(&missing).err().unwrap();
        assert!(matches!(err, ModexError::ExtensionNotFound { .. }));
    }
}
