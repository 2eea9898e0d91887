//! Lock command - inspect and verify MODULE.lock

use crate::cli::args::{LockAction, LockArgs};
use crate::error::{ModexError, ModexResult};
use crate::lockfile::{LockfileMode, Staleness};
use crate::ui::{self, UiContext};
use crate::workspace::{FetchOptions, Workspace};
use console::style;

/// Execute the lock command
pub async fn execute(args: LockArgs, workspace: &Workspace) -> ModexResult<()> {
    match args.action {
        LockAction::Show { json } => show(workspace, json),
        LockAction::Verify => verify(workspace),
    }
}

fn show(workspace: &Workspace, json: bool) -> ModexResult<()> {
    // Reading never writes, so update mode only decides how corruption is reported
    let store = workspace.open_lockfile(Some(LockfileMode::Update))?;
    let lockfile = store.snapshot();

    if json {
        let bytes = lockfile.to_bytes()?;
        print!("{}", String::from_utf8_lossy(&bytes));
        return Ok(());
    }

    let ctx = UiContext::detect();
    if lockfile.module_extensions.is_empty() {
        ui::step_info(
            &ctx,
            &format!("No extensions recorded in {}", store.path().display()),
        );
        return Ok(());
    }

    for (id, entry) in &lockfile.module_extensions {
        println!("{}", style(id).bold());
        ui::key_value(&ctx, "digest", entry.usages_digest.as_str());
        if !entry.reproducible {
            ui::key_value(&ctx, "reproducible", "false");
        }
        for (name, spec) in &entry.generated_repo_specs {
            ui::key_value(&ctx, &format!("@{}", name), &spec.rule);
        }
    }
    println!();
    println!(
        "{} extension(s) in {}",
        lockfile.module_extensions.len(),
        store.path().display()
    );
    Ok(())
}

fn verify(workspace: &Workspace) -> ModexResult<()> {
    let ctx = UiContext::detect();
    let orchestrator = workspace.orchestrator(&FetchOptions::default())?;

    let results = orchestrator.check()?;
    let stale: Vec<_> = results
        .iter()
        .filter(|(_, reason)| reason.is_stale())
        .collect();

    for (id, reason) in &results {
        match reason {
            Staleness::Fresh => ui::step_ok(&ctx, &id.to_string()),
            reason => ui::step_error_detail(&ctx, &id.to_string(), &reason.to_string()),
        }
    }
    for id in orchestrator.unused_entries() {
        ui::step_warn_hint(
            &ctx,
            &format!("{} is recorded but unused", id),
            "modex fetch --all removes it",
        );
    }

    if stale.is_empty() {
        ui::outro_success(&ctx, "Lockfile is up to date");
        return Ok(());
    }

    Err(ModexError::LockfileInconsistent {
        path: orchestrator.lockfile().path().to_path_buf(),
        reason: format!("{} of {} extension(s) stale", stale.len(), results.len()),
    })
}
