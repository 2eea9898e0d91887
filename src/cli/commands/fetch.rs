//! Fetch command - evaluate extensions and materialize repositories

use crate::cli::args::FetchArgs;
use crate::error::ModexResult;
use crate::fetch::{ExtensionOutcome, FetchReport, FetchRequest};
use crate::ui::{self, TaskSpinner, UiContext};
use crate::workspace::{FetchOptions, Workspace};
use tracing::debug;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, workspace: &Workspace) -> ModexResult<()> {
    let ctx = UiContext::detect();

    let options = FetchOptions {
        lockfile_mode: args.graph.lockfile_mode,
        repository_overrides: args.graph.override_repository,
        jobs: args.jobs,
        fail_fast: args.fail_fast.then_some(true),
    };
    let orchestrator = workspace.orchestrator(&options)?;

    let request = if args.repo.is_empty() {
        FetchRequest::all()
    } else {
        FetchRequest::repos(args.repo.iter().cloned())
    }
    .with_force(args.force);
    debug!("Fetch request: {:?}", request);

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Fetching repositories...");
    let report = match orchestrator.fetch(&request).await {
        Ok(report) => report,
        Err(e) => {
            spinner.stop_error("Fetch aborted");
            return Err(e);
        }
    };
    spinner.clear();

    print_report(&ctx, &report);

    // Named repositories must exist even when nothing failed
    for name in &args.repo {
        report.repository(name)?;
    }

    let report = report.into_result()?;
    ui::outro_success(
        &ctx,
        &format!(
            "Fetched {} repositories ({} evaluated, {} cached)",
            report.repositories().count(),
            report.evaluated(),
            report.cache_hits()
        ),
    );
    Ok(())
}

fn print_report(ctx: &UiContext, report: &FetchReport) {
    let mut extensions = report.extensions().peekable();
    if extensions.peek().is_some() {
        ui::section(ctx, "Extensions");
    }
    for (id, entry) in extensions {
        let label = id.to_string();
        match (&entry.outcome, &entry.staleness) {
            (ExtensionOutcome::Failed(e), _) => {
                ui::step_error_detail(ctx, &label, &e.to_string());
            }
            (ExtensionOutcome::Evaluated, Some(reason)) => {
                ui::step_ok_detail(ctx, &label, &format!("evaluated, {}", reason));
            }
            (ExtensionOutcome::Skipped, _) => {
                ui::step_info(ctx, &format!("{} ({})", label, entry.outcome.label()));
            }
            (outcome, _) => ui::step_ok_detail(ctx, &label, outcome.label()),
        }
    }

    let failed: Vec<_> = report.repository_failures().collect();
    if !failed.is_empty() {
        ui::section(ctx, "Repositories");
        for (name, error) in failed {
            ui::step_error_detail(ctx, &format!("@{}", name), &error.to_string());
        }
    }
}
