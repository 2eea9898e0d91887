//! Fetch orchestration
//!
//! The orchestrator plans one fetch against a lockfile snapshot, runs the
//! stale extensions and needed repository rules, and reports per-identity
//! results.

pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod state;

pub use orchestrator::{FetchRequest, FetchScope, Orchestrator, DEFAULT_JOBS};
pub use registry::{RepoOwner, RepositoryRegistry};
pub use report::{ExtensionOutcome, ExtensionReport, FetchReport, RepoFailure, RepoOutcome};
pub use state::{ExtensionState, StateTracker};
