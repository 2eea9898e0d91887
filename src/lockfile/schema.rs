//! `MODULE.lock` schema
//!
//! All maps are ordered, so serializing the same lockfile twice yields the
//! same bytes. Fields this version does not know are kept in `extra` and
//! written back untouched.

use crate::digest::UsageDigest;
use crate::extension::{ExtensionId, RecordedInputs};
use crate::repository::RepoSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Newest lockfile format this version reads and writes
pub const LOCKFILE_VERSION: u32 = 1;

/// Whole lockfile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lockfile {
    pub lock_file_version: u32,

    #[serde(default)]
    pub module_extensions: BTreeMap<ExtensionId, LockEntry>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for Lockfile {
    fn default() -> Self {
        Self {
            lock_file_version: LOCKFILE_VERSION,
            module_extensions: BTreeMap::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl Lockfile {
    /// Entry for an extension identity
    pub fn entry(&self, id: &ExtensionId) -> Option<&LockEntry> {
        self.module_extensions.get(id)
    }

    /// Serialize to the on-disk form: pretty JSON with a trailing newline
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Repository name to owning extension, over all entries
    pub fn repository_owners(&self) -> BTreeMap<&str, &ExtensionId> {
        self.module_extensions
            .iter()
            .flat_map(|(id, entry)| entry.generated_repo_specs.keys().map(move |n| (n.as_str(), id)))
            .collect()
    }
}

fn default_reproducible() -> bool {
    true
}

/// Recorded result of one extension evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub usages_digest: UsageDigest,

    #[serde(default)]
    pub recorded_inputs: RecordedInputs,

    #[serde(default)]
    pub generated_repo_specs: BTreeMap<String, RepoSpec>,

    /// Whether repositories may be re-materialized from the recorded specs
    #[serde(default = "default_reproducible")]
    pub reproducible: bool,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl LockEntry {
    pub fn new(
        usages_digest: UsageDigest,
        recorded_inputs: RecordedInputs,
        generated_repo_specs: BTreeMap<String, RepoSpec>,
        reproducible: bool,
    ) -> Self {
        Self {
            usages_digest,
            recorded_inputs,
            generated_repo_specs,
            reproducible,
            extra: BTreeMap::new(),
        }
    }

    /// Carry over fields written by other tools from a previous entry
    pub fn preserving_extra(mut self, previous: Option<&LockEntry>) -> Self {
        if let Some(prev) = previous {
            self.extra = prev.extra.clone();
        }
        self
    }
}
