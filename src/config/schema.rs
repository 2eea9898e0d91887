//! Configuration schema for modex
//!
//! Configuration is stored at `~/.config/modex/config.toml`

use crate::lockfile::LockfileMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Fetch scheduling and repository output
    pub fetch: FetchConfig,

    /// Lockfile handling
    pub lockfile: LockfileConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Write the fetch journal to `<output_base>/fetch.log`
    pub journal: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            journal: true,
        }
    }
}

/// Fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum number of concurrent fetch tasks
    pub jobs: usize,

    /// Cancel outstanding work after the first failure
    pub fail_fast: bool,

    /// Where repositories are materialized (default: `<workspace>/.modex`)
    pub output_base: Option<PathBuf>,

    /// Timeout for a single download, in seconds
    pub download_timeout_secs: u64,
}

impl FetchConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            jobs: 4,
            fail_fast: false,
            output_base: None,
            download_timeout_secs: 60,
        }
    }
}

/// Lockfile configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockfileConfig {
    /// How the lockfile is used: update, error or off
    pub mode: LockfileMode,

    /// Lockfile location (default: `<workspace>/MODULE.lock`)
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[fetch]"));
        assert!(toml.contains("mode = \"update\""));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.fetch.jobs, 4);
        assert!(config.general.journal);
        assert_eq!(config.lockfile.mode, LockfileMode::Update);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [lockfile]
            mode = "error"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.lockfile.mode, LockfileMode::Error);
        assert_eq!(config.fetch.download_timeout(), Duration::from_secs(60)); // default preserved
    }

    #[test]
    fn unknown_lockfile_mode_rejected() {
        let result: Result<Config, _> = toml::from_str("[lockfile]\nmode = \"strict\"\n");
        assert!(result.is_err());
    }
}
