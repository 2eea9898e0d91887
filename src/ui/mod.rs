//! UI module for consistent CLI output
//!
//! Styled output through `console`, spinners through `indicatif`, with
//! automatic fallback to plain output in CI/non-interactive environments.
//!
//! # Example
//!
//! ```rust,ignore
//! use modex::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Fetching repositories...");
//! // ... do work ...
//! spinner.stop("Fetched 3 repositories");
//!
//! ui::step_ok_detail(&ctx, "@//extension.toml%ext", "cached");
//! ui::step_warn_hint(&ctx, "Lockfile is stale", "Run: modex fetch");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    key_value, outro_success, section, step_error_detail, step_info, step_ok, step_ok_detail,
    step_warn_hint,
};
pub use progress::TaskSpinner;
