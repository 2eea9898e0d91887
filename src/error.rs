//! Error types for modex
//!
//! All modules use `ModexResult<T>` as their return type. Repository rules
//! report [`FetchError`], extension callables report [`ExtensionError`];
//! both are wrapped into [`ModexError`] together with the identity of the
//! failing extension or repository.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for modex operations
pub type ModexResult<T> = Result<T, ModexError>;

/// Failure of a single repository rule invocation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport-level failure. Retryable by the caller, never by the executor.
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    /// Downloaded content does not match the declared checksum.
    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    /// The rule callback raised or aborted.
    #[error("{0}")]
    RuleExecution(String),
}

impl FetchError {
    /// Create a rule execution error
    pub fn rule(reason: impl Into<String>) -> Self {
        Self::RuleExecution(reason.into())
    }

    /// Create a network error
    pub fn network(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Only transport failures may be retried, and only upstream
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Failure raised while evaluating a module extension
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    #[error("repository '{name}' requested by {claimant} is already declared by {owner}")]
    RepositoryNameCollision {
        name: String,
        owner: String,
        claimant: String,
    },

    #[error("invalid repository name '{name}': {reason}")]
    InvalidRepositoryName { name: String, reason: String },

    #[error("module '{module}' imports repository '{name}' via use_repo, but the extension does not generate it")]
    MissingRepository { module: String, name: String },

    #[error("{0}")]
    Evaluation(String),

    #[error("fetching repository '{repo}' failed: {source}")]
    Fetch {
        repo: String,
        #[source]
        source: FetchError,
    },
}

impl ExtensionError {
    /// Create an evaluation error
    pub fn evaluation(reason: impl Into<String>) -> Self {
        Self::Evaluation(reason.into())
    }
}

/// All errors that can occur in modex
#[derive(Error, Debug)]
pub enum ModexError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Module graph errors
    #[error("Module file not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Invalid module file {path}: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Invalid extension label '{label}': {reason}")]
    InvalidExtensionLabel { label: String, reason: String },

    #[error("Extension {extension} could not be loaded: {reason}")]
    ExtensionNotFound { extension: String, reason: String },

    // Lockfile errors
    #[error("Lockfile {path} is inconsistent: {reason}")]
    LockfileInconsistent { path: PathBuf, reason: String },

    #[error("Failed to lock {path} for writing")]
    LockFailed { path: PathBuf },

    // Fetch errors
    #[error("Fetching is disabled, but {what} is not available locally")]
    FetchDisallowed { what: String },

    #[error("Extension {extension} failed: {source}")]
    Extension {
        extension: String,
        #[source]
        source: ExtensionError,
    },

    #[error("Failed to fetch repository '@{repo}': {source}")]
    Repository {
        repo: String,
        #[source]
        source: FetchError,
    },

    #[error("Repository '@{repo}' is unavailable because {owner} failed to fetch")]
    DependencyOnFailedFetch { repo: String, owner: String },

    #[error("No repository named '@{0}' is visible from the module graph")]
    UnknownRepository(String),

    #[error("{failed} of {total} extension(s) failed to fetch")]
    FetchFailed { failed: usize, total: usize },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl ModexError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Wrap an extension failure with the extension's label
    pub fn extension(extension: impl ToString, source: ExtensionError) -> Self {
        Self::Extension {
            extension: extension.to_string(),
            source,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repository { source, .. } => source.is_retryable(),
            Self::Extension {
                source: ExtensionError::Fetch { source, .. },
                ..
            } => source.is_retryable(),
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::FetchDisallowed { .. } => {
                Some("Re-run with --fetch=true, or run `modex fetch` first")
            }
            Self::LockfileInconsistent { .. } => {
                Some("Run: modex fetch --lockfile-mode=update to refresh MODULE.lock")
            }
            Self::ManifestNotFound(_) => Some("Run modex from a directory containing MODULE.toml"),
            Self::Repository {
                source: FetchError::Network { .. },
                ..
            } => Some("Check network connectivity and retry"),
            _ => None,
        }
    }
}
