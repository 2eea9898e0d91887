//! Modex - lazy module extension evaluation
//!
//! Evaluates module extensions only when the repositories they generate are
//! needed, materializes those repositories with repository rules and
//! records every evaluation in a reproducible `MODULE.lock`.

pub mod checksum;
pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod extension;
pub mod fetch;
pub mod io;
pub mod journal;
pub mod lockfile;
pub mod module;
pub mod repository;
pub mod ui;
pub mod workspace;

pub use error::{ModexError, ModexResult};
