//! Fetch journal
//!
//! Appends one JSON line per fetch event to `<output_base>/fetch.log`.
//! The journal is a record, not a dependency: IO failures are logged and
//! never fail a fetch.

use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Journal file name inside the output base
pub const JOURNAL_FILE: &str = "fetch.log";

/// Journal event names
pub mod events {
    pub const EXTENSION_EVALUATED: &str = "extension.evaluated";
    pub const EXTENSION_CACHED: &str = "extension.cached";
    pub const EXTENSION_FAILED: &str = "extension.failed";
    pub const REPOSITORY_MATERIALIZED: &str = "repository.materialized";
    pub const REPOSITORY_FAILED: &str = "repository.failed";
}

/// Append-only JSON-lines fetch journal
#[derive(Debug)]
pub struct Journal {
    enabled: bool,
    path: PathBuf,
    // Serializes appends from concurrent fetch tasks
    write_lock: Mutex<()>,
}

impl Journal {
    /// Journal inside `output_base`
    pub fn new(output_base: &Path, enabled: bool) -> Self {
        Self {
            enabled,
            path: output_base.join(JOURNAL_FILE),
            write_lock: Mutex::new(()),
        }
    }

    /// Journal that drops every event
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an event
    pub async fn log(&self, event: &str, data: &Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize journal event: {}", e);
                return;
            }
        };
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.append(&line).await {
            warn!("Failed to write fetch journal {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
