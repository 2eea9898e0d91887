//! Module graph input
//!
//! The module graph is produced by an external resolver and handed to the
//! engine through `MODULE.toml`. This module parses it, keeps traversal
//! order, and merges extension usages per extension identity.

pub mod graph;
pub mod manifest;
pub mod overrides;

pub use graph::{
    DirectRepo, ExtensionUsage, ExtensionUsages, Module, ModuleGraph, ModuleKey, TagCall,
};
pub use manifest::{ModuleFile, MODULE_FILE};
pub use overrides::{OverrideTarget, Overrides};
