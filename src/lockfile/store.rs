//! Lockfile store
//!
//! Holds the current lockfile in memory as an immutable [`Arc`] snapshot.
//! Writers are serialized by an async mutex: each clones the snapshot,
//! applies one entry change, persists the result atomically on the
//! blocking pool and only then publishes it. Readers never wait on disk IO.

use crate::digest::UsageDigest;
use crate::error::{ModexError, ModexResult};
use crate::extension::{first_changed_input, ExtensionId, InputSource};
use crate::io::write_atomic;
use crate::lockfile::schema::{LockEntry, Lockfile, LOCKFILE_VERSION};
use crate::module::{OverrideTarget, Overrides};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Default lockfile name, next to the module file
pub const LOCKFILE_NAME: &str = "MODULE.lock";

/// How the lockfile is used during a fetch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LockfileMode {
    /// Read entries, re-evaluate stale extensions and write results back
    #[default]
    Update,
    /// Fail if the lockfile is unreadable or any needed entry is stale
    Error,
    /// Neither read nor write the lockfile
    Off,
}

impl fmt::Display for LockfileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Update => "update",
            Self::Error => "error",
            Self::Off => "off",
        };
        f.write_str(name)
    }
}

/// Why an extension needs re-evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// Recorded entry is still valid
    Fresh,
    /// Never recorded, or the lockfile was unreadable
    NoEntry,
    /// Merged usages changed
    DigestChanged,
    /// A consulted input changed
    InputChanged(String),
    /// An override directive targets the extension or a repository it owns
    Overridden(OverrideTarget),
    /// Re-evaluation was requested explicitly
    Forced,
    /// A non-reproducible result whose repository is no longer on disk
    Unmaterialized(String),
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "up to date"),
            Self::NoEntry => write!(f, "no lockfile entry"),
            Self::DigestChanged => write!(f, "usages changed"),
            Self::InputChanged(key) => write!(f, "input '{}' changed", key),
            Self::Overridden(target) => write!(f, "{} is overridden", target),
            Self::Forced => write!(f, "re-evaluation forced"),
            Self::Unmaterialized(name) => {
                write!(f, "non-reproducible repository '@{}' is not on disk", name)
            }
        }
    }
}

/// Decide whether a recorded entry can be reused.
///
/// Precedence: missing entry, then override directives, then the usage
/// digest, then consulted inputs. Overrides win even when everything else
/// matches.
pub fn staleness(
    id: &ExtensionId,
    entry: Option<&LockEntry>,
    digest: &UsageDigest,
    definition: &str,
    inputs: &dyn InputSource,
    overrides: &Overrides,
) -> Staleness {
    let Some(entry) = entry else {
        return Staleness::NoEntry;
    };

    let owned = entry.generated_repo_specs.keys().map(String::as_str);
    if let Some(target) = overrides.targeting(id, owned) {
        return Staleness::Overridden(target);
    }

    if &entry.usages_digest != digest {
        return Staleness::DigestChanged;
    }

    match first_changed_input(&entry.recorded_inputs, definition, inputs) {
        Some(key) => Staleness::InputChanged(key),
        None => Staleness::Fresh,
    }
}

/// Persistent per-extension evaluation results
#[derive(Debug)]
pub struct LockfileStore {
    path: PathBuf,
    mode: LockfileMode,
    state: Mutex<Arc<Lockfile>>,
    writer: tokio::sync::Mutex<()>,
}

impl LockfileStore {
    /// Open the lockfile at `path`.
    ///
    /// A missing file is an empty lockfile. An unreadable, unparsable or
    /// too-new file is also treated as empty, except in `error` mode where
    /// it fails with `LockfileInconsistent`.
    pub fn open(path: &Path, mode: LockfileMode) -> ModexResult<Self> {
        let lockfile = match mode {
            LockfileMode::Off => Lockfile::default(),
            _ => Self::load(path, mode)?,
        };

        debug!(
            "Opened lockfile {} ({} entries, mode {})",
            path.display(),
            lockfile.module_extensions.len(),
            mode
        );

        Ok(Self {
            path: path.to_path_buf(),
            mode,
            state: Mutex::new(Arc::new(lockfile)),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    /// In-memory store that never touches disk
    pub fn in_memory(lockfile: Lockfile) -> Self {
        Self {
            path: PathBuf::from(LOCKFILE_NAME),
            mode: LockfileMode::Off,
            state: Mutex::new(Arc::new(lockfile)),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    fn load(path: &Path, mode: LockfileMode) -> ModexResult<Lockfile> {
        let content = match std::fs::read(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Lockfile::default()),
            Err(e) => {
                return Self::corrupt(path, mode, format!("unreadable: {}", e));
            }
        };

        match parse(&content) {
            Ok(lockfile) => Ok(lockfile),
            Err(reason) => Self::corrupt(path, mode, reason),
        }
    }

    fn corrupt(path: &Path, mode: LockfileMode, reason: String) -> ModexResult<Lockfile> {
        if mode == LockfileMode::Error {
            return Err(ModexError::LockfileInconsistent {
                path: path.to_path_buf(),
                reason,
            });
        }
        warn!(
            "Ignoring lockfile {}: {}; all extensions will be re-evaluated",
            path.display(),
            reason
        );
        Ok(Lockfile::default())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockfileMode {
        self.mode
    }

    /// Immutable view of the current contents
    pub fn snapshot(&self) -> Arc<Lockfile> {
        match self.state.lock() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Recorded entry for an extension, if any
    pub fn read(&self, id: &ExtensionId) -> Option<LockEntry> {
        self.snapshot().entry(id).cloned()
    }

    /// Staleness of an extension against the current snapshot
    pub fn is_stale(
        &self,
        id: &ExtensionId,
        digest: &UsageDigest,
        definition: &str,
        inputs: &dyn InputSource,
        overrides: &Overrides,
    ) -> Staleness {
        let snapshot = self.snapshot();
        staleness(id, snapshot.entry(id), digest, definition, inputs, overrides)
    }

    /// Replace the entry for `id` and persist the lockfile.
    ///
    /// Writes are serialized; the file is only rewritten when its content
    /// changes and only in `update` mode.
    pub async fn write(&self, id: &ExtensionId, entry: LockEntry) -> ModexResult<()> {
        self.modify(|lockfile| {
            lockfile.module_extensions.insert(id.clone(), entry);
        })
        .await
    }

    /// Drop the entries of extensions that are no longer used
    pub async fn remove(&self, id: &ExtensionId) -> ModexResult<()> {
        self.modify(|lockfile| {
            lockfile.module_extensions.remove(id);
        })
        .await
    }

    async fn modify<F>(&self, apply: F) -> ModexResult<()>
    where
        F: FnOnce(&mut Lockfile),
    {
        let _writer = self.writer.lock().await;

        let current = self.snapshot();
        let mut updated = Lockfile::clone(&current);
        apply(&mut updated);
        if updated == *current {
            return Ok(());
        }

        if self.mode == LockfileMode::Update {
            let bytes = updated.to_bytes()?;
            let path = self.path.clone();
            tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
                .await
                .map_err(|e| ModexError::Internal(format!("lockfile write task failed: {}", e)))??;
            info!("Updated lockfile {}", self.path.display());
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| ModexError::Internal("lockfile state poisoned".to_string()))?;
        *state = Arc::new(updated);
        Ok(())
    }
}

fn parse(content: &[u8]) -> Result<Lockfile, String> {
    let value: serde_json::Value =
        serde_json::from_slice(content).map_err(|e| format!("invalid JSON: {}", e))?;

    let version = value
        .get("lockFileVersion")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| "missing lockFileVersion".to_string())?;
    if version > u64::from(LOCKFILE_VERSION) {
        return Err(format!(
            "lockfile version {} is newer than supported version {}",
            version, LOCKFILE_VERSION
        ));
    }

    serde_json::from_value(value).map_err(|e| format!("invalid lockfile: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{RecordedInputs, StaticInputs};
    use crate::repository::{Attributes, RepoSpec};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn ext() -> ExtensionId {
        ExtensionId::parse("extension.toml%ext", "").unwrap()
    }

    fn digest(s: &str) -> UsageDigest {
        UsageDigest::from(s.to_string())
    }

    fn entry(d: &str) -> LockEntry {
        let mut inputs = RecordedInputs::new();
        inputs.insert("definition".to_string(), Some("def".to_string()));
        let mut repos = BTreeMap::new();
        repos.insert("hello".to_string(), RepoSpec::new("file", Attributes::new()));
        LockEntry::new(digest(d), inputs, repos, true)
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = LockfileStore::open(&dir.path().join(LOCKFILE_NAME), LockfileMode::Update).unwrap();
        assert!(store.read(&ext()).is_none());
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        let store = LockfileStore::open(&path, LockfileMode::Update).unwrap();
        store.write(&ext(), entry("sha256:aa")).await.unwrap();

        let reopened = LockfileStore::open(&path, LockfileMode::Update).unwrap();
        assert_eq!(reopened.read(&ext()), Some(entry("sha256:aa")));
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("}\n"));
    }

    #[tokio::test]
    async fn unchanged_write_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        let store = LockfileStore::open(&path, LockfileMode::Update).unwrap();
        store.write(&ext(), entry("sha256:aa")).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        // Same entry again: no rewrite, so the deleted file stays deleted
        store.write(&ext(), entry("sha256:aa")).await.unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_is_empty_in_update_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        let store = LockfileStore::open(&path, LockfileMode::Update).unwrap();
        assert!(store.snapshot().module_extensions.is_empty());
    }

    #[test]
    fn corrupt_file_fails_in_error_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        let err = LockfileStore::open(&path, LockfileMode::Error).unwrap_err();
        assert!(matches!(err, ModexError::LockfileInconsistent { .. }));
    }

    #[test]
    fn newer_version_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        std::fs::write(&path, r#"{"lockFileVersion": 99, "moduleExtensions": {}}"#).unwrap();

        let err = LockfileStore::open(&path, LockfileMode::Error).unwrap_err();
        assert!(err.to_string().contains("newer"));
        assert!(LockfileStore::open(&path, LockfileMode::Update).is_ok());
    }

    #[tokio::test]
    async fn off_mode_neither_reads_nor_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        let writer = LockfileStore::open(&path, LockfileMode::Update).unwrap();
        writer.write(&ext(), entry("sha256:aa")).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();

        let store = LockfileStore::open(&path, LockfileMode::Off).unwrap();
        assert!(store.read(&ext()).is_none());
        store.write(&ext(), entry("sha256:bb")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
    }

    #[tokio::test]
    async fn error_mode_does_not_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        let store = LockfileStore::open(&path, LockfileMode::Error).unwrap();
        store.write(&ext(), entry("sha256:aa")).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn remove_prunes_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        let store = LockfileStore::open(&path, LockfileMode::Update).unwrap();
        store.write(&ext(), entry("sha256:aa")).await.unwrap();
        store.remove(&ext()).await.unwrap();

        let reopened = LockfileStore::open(&path, LockfileMode::Update).unwrap();
        assert!(reopened.read(&ext()).is_none());
    }

    #[tokio::test]
    async fn snapshot_is_immutable() {
        let store = LockfileStore::in_memory(Lockfile::default());
        let before = store.snapshot();
        store.write(&ext(), entry("sha256:aa")).await.unwrap();
        assert!(before.module_extensions.is_empty());
        assert_eq!(store.snapshot().module_extensions.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_persist_off_the_runtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCKFILE_NAME);
        let store = Arc::new(LockfileStore::open(&path, LockfileMode::Update).unwrap());

        // Snapshots never wait for a writer
        {
            let _writer = store.writer.lock().await;
            assert!(store.snapshot().module_extensions.is_empty());
        }

        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    let id = ExtensionId::parse(&format!("extension.toml%ext{}", i), "").unwrap();
                    store.write(&id, entry("sha256:aa")).await.unwrap();
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(store.snapshot().module_extensions.len(), 16);
        let reopened = LockfileStore::open(&path, LockfileMode::Update).unwrap();
        assert_eq!(reopened.snapshot().module_extensions.len(), 16);
    }

    #[test]
    fn staleness_precedence() {
        let inputs = StaticInputs::new();
        let none = Overrides::new();
        let e = entry("sha256:aa");

        assert_eq!(
            staleness(&ext(), None, &digest("sha256:aa"), "def", &inputs, &none),
            Staleness::NoEntry
        );
        assert_eq!(
            staleness(&ext(), Some(&e), &digest("sha256:aa"), "def", &inputs, &none),
            Staleness::Fresh
        );
        assert_eq!(
            staleness(&ext(), Some(&e), &digest("sha256:bb"), "def", &inputs, &none),
            Staleness::DigestChanged
        );
        assert_eq!(
            staleness(&ext(), Some(&e), &digest("sha256:aa"), "other", &inputs, &none),
            Staleness::InputChanged("definition".to_string())
        );

        // Override beats a matching digest
        let mut overrides = Overrides::new();
        overrides.override_repository("hello", PathBuf::from("/ws/hello"));
        let result = staleness(&ext(), Some(&e), &digest("sha256:aa"), "def", &inputs, &overrides);
        assert_eq!(
            result,
            Staleness::Overridden(OverrideTarget::Repository("hello".to_string()))
        );
        assert!(result.is_stale());
    }

    #[test]
    fn lockfile_mode_parses_lowercase() {
        let mode: LockfileMode = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(mode, LockfileMode::Error);
        assert_eq!(LockfileMode::default().to_string(), "update");
    }
}
