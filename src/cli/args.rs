//! CLI argument definitions using clap derive

use crate::lockfile::LockfileMode;
use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Modex - lazy module extension evaluation
///
/// Evaluates module extensions on demand, materializes the repositories
/// they generate and records the results in MODULE.lock.
#[derive(Parser, Debug)]
#[command(name = "modex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MODEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workspace root containing MODULE.toml (defaults to current directory)
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate extensions and materialize repositories
    Fetch(FetchArgs),

    /// Resolve the repositories of build targets
    Build(BuildArgs),

    /// Inspect MODULE.lock
    Lock(LockArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Lockfile and override flags shared by fetch and build
#[derive(Parser, Debug, Default)]
pub struct GraphArgs {
    /// How MODULE.lock is used (defaults to the configured mode)
    #[arg(long, value_enum)]
    pub lockfile_mode: Option<LockfileMode>,

    /// Serve a repository from a local directory (NAME=PATH)
    #[arg(long, value_parser = parse_override)]
    pub override_repository: Vec<(String, PathBuf)>,
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Fetch every repository in the graph (default without --repo)
    #[arg(long, conflicts_with = "repo")]
    pub all: bool,

    /// Fetch only the named repository and what it needs
    #[arg(long, value_name = "NAME")]
    pub repo: Vec<String>,

    /// Re-evaluate extensions and re-materialize repositories
    #[arg(long)]
    pub force: bool,

    /// Maximum concurrent fetch tasks (defaults to the configured value)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Cancel outstanding work after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    #[command(flatten)]
    pub graph: GraphArgs,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Allow evaluating extensions and downloading repositories
    #[arg(
        long,
        action = ArgAction::Set,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub fetch: bool,

    /// Targets: @repo or @repo//pkg:name
    #[arg(required = true)]
    pub targets: Vec<String>,

    #[command(flatten)]
    pub graph: GraphArgs,
}

/// Arguments for the lock command
#[derive(Parser, Debug)]
pub struct LockArgs {
    /// Subcommand for lock
    #[command(subcommand)]
    pub action: LockAction,
}

/// Lock subcommands
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// List recorded extensions and their repositories
    Show {
        /// Print the raw lockfile as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check recorded entries without evaluating anything
    Verify,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Parse a repository override in NAME=PATH format
fn parse_override(s: &str) -> Result<(String, PathBuf), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid NAME=PATH format: no '=' found in '{s}'"))?;
    let name = s[..pos].trim_start_matches('@');
    if name.is_empty() {
        return Err(format!("missing repository name in '{s}'"));
    }
    if pos + 1 == s.len() {
        return Err(format!("missing path in '{s}'"));
    }
    Ok((name.to_string(), PathBuf::from(&s[pos + 1..])))
}
