//! Capabilities handed to a repository rule
//!
//! A rule only sees its own repository directory. Every path it passes is
//! resolved relative to that directory and rejected if it would escape it.

use crate::checksum;
use crate::error::FetchError;
use crate::repository::download::Downloader;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

/// Max number of stderr lines kept in a failed command's error
const COMMAND_ERROR_TAIL_LINES: usize = 20;

/// Output of a successful command
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Execution context of one repository rule invocation
pub struct RepositoryContext {
    name: String,
    root: PathBuf,
    workspace: PathBuf,
    downloader: Arc<dyn Downloader>,
}

impl RepositoryContext {
    pub(crate) fn new(
        name: impl Into<String>,
        root: PathBuf,
        workspace: PathBuf,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        Self {
            name: name.into(),
            root,
            workspace,
            downloader,
        }
    }

    /// Name of the repository being materialized
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Repository directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a repository-relative path, rejecting escapes
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, FetchError> {
        let path = Path::new(relative);
        let mut resolved = self.root.clone();
        for component in path.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(FetchError::rule(format!(
                        "path '{}' escapes repository '{}'",
                        relative, self.name
                    )))
                }
            }
        }
        if resolved == self.root {
            return Err(FetchError::rule(format!(
                "path '{}' does not name a file inside repository '{}'",
                relative, self.name
            )));
        }
        Ok(resolved)
    }

    /// Write a file inside the repository, creating parent directories
    pub async fn write_file(&mut self, relative: &str, content: &[u8]) -> Result<(), FetchError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failure("creating", parent, e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| io_failure("writing", &path, e))
    }

    /// Read a file inside the repository
    pub async fn read_file(&self, relative: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve(relative)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| io_failure("reading", &path, e))
    }

    /// Download `url` into `output`, verifying an optional SHA-256.
    ///
    /// Returns the checksum of the downloaded content. A mismatch leaves
    /// nothing written.
    pub async fn download(
        &mut self,
        url: &str,
        output: &str,
        sha256: Option<&str>,
    ) -> Result<String, FetchError> {
        let target = self.resolve(output)?;
        let bytes = self.downloader.download(url).await?;

        let actual = checksum::sha256_hex(&bytes);
        if let Some(expected) = sha256 {
            let expected = checksum::normalize_hex(expected);
            if expected != actual {
                return Err(FetchError::ChecksumMismatch {
                    url: url.to_string(),
                    expected,
                    actual,
                });
            }
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failure("creating", parent, e))?;
        }
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| io_failure("writing", &target, e))?;

        debug!("Downloaded {} ({} bytes) into @{}", url, bytes.len(), self.name);
        Ok(format!("{}{}", checksum::PREFIX, actual))
    }

    /// Run a command with the repository directory as working directory.
    ///
    /// The child is killed if the rule is cancelled.
    pub async fn execute(&mut self, argv: &[String]) -> Result<ExecOutput, FetchError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| FetchError::rule("command must not be empty"))?;

        debug!("Running {:?} in @{}", argv, self.name);
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| FetchError::rule(format!("failed to run '{}': {}", program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(FetchError::rule(format!(
                "'{}' exited with {}:\n{}",
                program,
                output.status,
                error_tail(&stderr)
            )));
        }

        Ok(ExecOutput { stdout, stderr })
    }

    /// Copy a directory tree into the repository root.
    ///
    /// Relative sources are resolved against the workspace. Symlinks are
    /// skipped rather than followed.
    pub async fn copy_tree(&mut self, source: &Path) -> Result<(), FetchError> {
        let source = if source.is_absolute() {
            source.to_path_buf()
        } else {
            self.workspace.join(source)
        };
        let dest = self.root.clone();

        tokio::task::spawn_blocking(move || copy_dir(&source, &dest))
            .await
            .map_err(|e| FetchError::rule(format!("copy task failed: {}", e)))?
    }
}

fn copy_dir(source: &Path, dest: &Path) -> Result<(), FetchError> {
    let meta = std::fs::symlink_metadata(source).map_err(|e| io_failure("reading", source, e))?;
    if !meta.is_dir() {
        return Err(FetchError::rule(format!(
            "{} is not a directory",
            source.display()
        )));
    }

    std::fs::create_dir_all(dest).map_err(|e| io_failure("creating", dest, e))?;
    let entries = std::fs::read_dir(source).map_err(|e| io_failure("listing", source, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_failure("listing", source, e))?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| io_failure("reading", &from, e))?;

        if file_type.is_symlink() {
            warn!("Skipping symlink {}", from.display());
        } else if file_type.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).map_err(|e| io_failure("copying", &from, e))?;
        }
    }
    Ok(())
}

fn io_failure(action: &str, path: &Path, err: std::io::Error) -> FetchError {
    FetchError::rule(format!("{} {}: {}", action, path.display(), err))
}

fn error_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines.len().saturating_sub(COMMAND_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}
