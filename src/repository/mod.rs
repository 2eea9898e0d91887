//! Repository rules and their execution
//!
//! A repository is a named directory under `<output_base>/external/`,
//! produced by exactly one rule invocation described by a [`RepoSpec`].

pub mod context;
pub mod download;
pub mod executor;
pub mod materializer;
pub mod rule;
pub mod rules;
pub mod spec;

pub use context::{ExecOutput, RepositoryContext};
pub use download::{Downloader, HttpDownloader, OfflineDownloader};
pub use executor::{ReadyMarker, RepoState, RuleExecutor};
pub use materializer::{local_path_spec, Availability, Ensured, Materializer};
pub use rule::{RepositoryRule, RuleRegistry};
pub use spec::{opt_str_attr, str_attr, validate_repo_name, Attributes, RepoSpec};
