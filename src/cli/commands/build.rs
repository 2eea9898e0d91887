//! Build command - resolve the repositories that build targets live in

use crate::cli::args::BuildArgs;
use crate::error::{ModexError, ModexResult};
use crate::fetch::FetchRequest;
use crate::repository::validate_repo_name;
use crate::ui::{self, UiContext};
use crate::workspace::{FetchOptions, Workspace};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Execute the build command
pub async fn execute(args: BuildArgs, workspace: &Workspace) -> ModexResult<()> {
    let ctx = UiContext::detect();

    let repos = args
        .targets
        .iter()
        .map(|t| target_repository(t))
        .collect::<ModexResult<BTreeSet<_>>>()?;
    debug!("Targets need repositories: {:?}", repos);

    let options = FetchOptions {
        lockfile_mode: args.graph.lockfile_mode,
        repository_overrides: args.graph.override_repository,
        ..FetchOptions::default()
    };
    let orchestrator = workspace.orchestrator(&options)?;
    let request = FetchRequest::repos(repos.iter().cloned()).with_fetch(args.fetch);
    let report = orchestrator.fetch(&request).await?;

    info!(
        "{} extension(s) evaluated, {} cached",
        report.evaluated(),
        report.cache_hits()
    );

    let mut first_error = None;
    for name in &repos {
        match report.repository(name) {
            Ok(path) => println!("@{} {}", name, path.display()),
            Err(e) => {
                ui::step_error_detail(&ctx, &format!("@{}", name), &e.to_string());
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Repository name of a `@repo` or `@repo//pkg:name` target
fn target_repository(target: &str) -> ModexResult<String> {
    let invalid = |reason: &str| ModexError::User(format!("invalid target '{}': {}", target, reason));

    let rest = target
        .strip_prefix('@')
        .ok_or_else(|| invalid("targets must start with '@'"))?;
    let rest = rest.strip_prefix('@').unwrap_or(rest);
    let name = match rest.split_once("//") {
        Some((name, _)) => name,
        None if rest.contains(':') => return Err(invalid("expected @repo//package:name")),
        None => rest,
    };
    if name.is_empty() {
        return Err(invalid("missing repository name"));
    }
    validate_repo_name(name).map_err(|reason| invalid(&reason))?;
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_repository_target() {
        assert_eq!(target_repository("@hello").unwrap(), "hello");
    }

    #[test]
    fn labelled_target() {
        assert_eq!(target_repository("@hello//pkg:bin").unwrap(), "hello");
        assert_eq!(target_repository("@hello//:all").unwrap(), "hello");
    }

    #[test]
    fn canonical_prefix_accepted() {
        assert_eq!(target_repository("@@hello//pkg").unwrap(), "hello");
    }

    #[test]
    fn invalid_targets_rejected() {
        assert!(target_repository("hello").is_err());
        assert!(target_repository("@").is_err());
        assert!(target_repository("@//pkg:bin").is_err());
        assert!(target_repository("@hello:bin").is_err());
    }
}
