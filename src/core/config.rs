//! Application configuration management
//!
//! Handles loading and saving application settings including:
//! - Path of the GitHub CLI binary
//! - Poll cadences and log cache TTL

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, Result};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// GitHub CLI binary to invoke
    #[serde(default = "default_gh_path")]
    pub gh_path: String,

    /// Run watcher poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Log streamer poll interval in seconds
    #[serde(default = "default_stream_poll_interval")]
    pub stream_poll_interval_secs: u64,

    /// How long fetched logs stay cached, in seconds
    #[serde(default = "default_log_cache_ttl")]
    pub log_cache_ttl_secs: u64,

    /// How many history entries listings show
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_gh_path() -> String {
    "gh".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_stream_poll_interval() -> u64 {
    2
}

fn default_log_cache_ttl() -> u64 {
    30 * 60
}

fn default_history_limit() -> usize {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gh_path: default_gh_path(),
            poll_interval_secs: default_poll_interval(),
            stream_poll_interval_secs: default_stream_poll_interval(),
            log_cache_ttl_secs: default_log_cache_ttl(),
            history_limit: default_history_limit(),
        }
    }
}

impl Config {
    /// Load configuration from file, or create default if not exists
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(&config_path, contents)?;

        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "lazydispatch", "lazydispatch")
            .ok_or_else(|| DispatchError::Config("Could not determine config directory".into()))?;

        Ok(project_dirs.config_dir().join("config.toml"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn stream_poll_interval(&self) -> Duration {
        Duration::from_secs(self.stream_poll_interval_secs)
    }

    pub fn log_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.log_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gh_path, "gh");
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.stream_poll_interval_secs, 2);
        assert_eq!(config.log_cache_ttl_secs, 1800);
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let config: Config = toml::from_str("poll_interval_secs = 10\n").unwrap();
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.gh_path, "gh");
        assert_eq!(config.history_limit, 20);
    }
}
