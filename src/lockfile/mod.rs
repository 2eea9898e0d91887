//! Lockfile persistence
//!
//! `MODULE.lock` records, per extension identity, the usage digest of the
//! last successful evaluation, the inputs it consulted and the repositories
//! it generated. A matching entry lets a fetch skip the extension entirely.

pub mod schema;
pub mod store;

pub use schema::{LockEntry, Lockfile, LOCKFILE_VERSION};
pub use store::{staleness, LockfileMode, LockfileStore, Staleness, LOCKFILE_NAME};
