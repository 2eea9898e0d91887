//! Atomic file replacement with advisory locking
//!
//! Writers go through a temp file in the target's directory, hold an
//! exclusive `fs2` lock on a sidecar `.lck` file for the duration of the
//! write, `sync_all` the temp file and rename it over the target. The temp
//! file is removed on every failure path by [`TempFile`]'s `Drop`.

use crate::error::{ModexError, ModexResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Temp file that is deleted on drop unless committed
struct TempFile {
    path: PathBuf,
    committed: bool,
}

impl TempFile {
    fn next_to(target: &Path) -> Self {
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = target.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self, target: &Path) -> std::io::Result<()> {
        fs::rename(&self.path, target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Path of the advisory lock file guarding `target`
pub fn lock_path(target: &Path) -> PathBuf {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.lck", file_name))
}

/// Write content atomically to a file.
///
/// Readers observe either the previous content or the new content, never a
/// partial write.
pub fn write_atomic(path: &Path, content: &[u8]) -> ModexResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| ModexError::io(format!("creating directory {}", parent.display()), e))?;
    }

    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(path))
        .map_err(|e| ModexError::io(format!("opening lock for {}", path.display()), e))?;
    lock.lock_exclusive().map_err(|_| ModexError::LockFailed {
        path: path.to_path_buf(),
    })?;

    let result = write_locked(path, content);

    let _ = FileExt::unlock(&lock);
    result
}

fn write_locked(path: &Path, content: &[u8]) -> ModexResult<()> {
    let temp = TempFile::next_to(path);

    let mut file = File::create(&temp.path)
        .map_err(|e| ModexError::io(format!("creating {}", temp.path.display()), e))?;
    file.write_all(content)
        .map_err(|e| ModexError::io(format!("writing {}", temp.path.display()), e))?;
    file.sync_all()
        .map_err(|e| ModexError::io(format!("syncing {}", temp.path.display()), e))?;
    drop(file);

    temp.commit(path)
        .map_err(|e| ModexError::io(format!("replacing {}", path.display()), e))
}
