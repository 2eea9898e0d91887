//! CLI command implementations

pub mod build;
pub mod completions;
pub mod config;
pub mod fetch;
pub mod lock;

pub use build::execute as build;
pub use completions::execute as completions;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use lock::execute as lock;
