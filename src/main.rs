//! Modex - lazy module extension evaluation
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use modex::cli::{Cli, Commands};
use modex::config::{Config, ConfigManager};
use modex::error::{ModexError, ModexResult};
use modex::workspace::Workspace;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ModexResult<()> {
    let cli = Cli::parse();

    // Completions don't need config loading
    if let Commands::Completions { shell } = cli.command {
        return modex::cli::commands::completions(shell);
    }

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Using config {}", config_manager.path().display());

    let root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir()
            .map_err(|e| ModexError::io("getting current directory", e))?,
    };
    let workspace = Workspace::new(&root, &config);

    // Dispatch to command
    match cli.command {
        Commands::Completions { .. } => unreachable!("Completions handled above"),
        Commands::Fetch(args) => modex::cli::commands::fetch(args, &workspace).await,
        Commands::Build(args) => modex::cli::commands::build(args, &workspace).await,
        Commands::Lock(args) => modex::cli::commands::lock(args, &workspace).await,
        Commands::Config(args) => {
            modex::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("modex=warn"),
        1 => EnvFilter::new("modex=info"),
        _ => EnvFilter::new("modex=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
    }
}
