//! Configuration and directory resolution for the logging core

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logging::format::DEFAULT_COMPONENT;
use crate::logging::rotation::RotationPolicy;

const MEGABYTE: u64 = 1024 * 1024;

/// Supplies the directory holding the active log, its backups and the crash file
pub trait DirectoryResolver {
    /// Absolute path of the log directory
    fn log_dir(&self) -> PathBuf;
}

impl DirectoryResolver for Path {
    fn log_dir(&self) -> PathBuf {
        self.to_path_buf()
    }
}

impl DirectoryResolver for PathBuf {
    fn log_dir(&self) -> PathBuf {
        self.clone()
    }
}

/// Resolves the log directory under the user's home (`~/.rotolog/logs`)
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDirs;

impl DirectoryResolver for DefaultDirs {
    fn log_dir(&self) -> PathBuf {
        logs_dir()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    /// Size in megabytes at which the active file is rotated, 0 means the default (default: 500)
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    /// Age in days after which rotated files are deleted, 0 disables (default: 3)
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,

    /// Number of rotated files kept, 0 keeps all (default: 0)
    #[serde(default)]
    pub max_backups: usize,

    /// Use local time in rotated file names instead of UTC (default: true)
    #[serde(default = "default_true")]
    pub local_time: bool,

    /// Redirect the process-global tracing/log output into the log file (default: true)
    #[serde(default = "default_true")]
    pub capture_global_logs: bool,

    /// Register the crash file with the panic hook (default: true)
    #[serde(default = "default_true")]
    pub crash_capture: bool,

    /// Component name written when a call carries none
    #[serde(default = "default_component")]
    pub default_component: String,
}

fn default_max_size_mb() -> u64 {
    500
}

fn default_max_age_days() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

fn default_component() -> String {
    DEFAULT_COMPONENT.to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_size_mb: default_max_size_mb(),
            max_age_days: default_max_age_days(),
            max_backups: 0,
            local_time: true,
            capture_global_logs: true,
            crash_capture: true,
            default_component: default_component(),
        }
    }
}

impl LogConfig {
    /// Load configuration from the default location, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `path`, or return defaults if not found
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Rotation limits derived from this configuration
    pub fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy {
            max_size_bytes: self.max_size_mb.saturating_mul(MEGABYTE),
            max_age_days: self.max_age_days,
            max_backups: self.max_backups,
            local_time: self.local_time,
        }
    }
}

/// Get the base configuration directory (~/.rotolog)
/// Falls back to ./.rotolog if home directory cannot be determined
pub fn config_dir() -> PathBuf {
    try_config_dir().unwrap_or_else(|| PathBuf::from(".rotolog"))
}

/// Try to get the base configuration directory, returning None if home dir is unavailable
pub fn try_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".rotolog"))
}

/// Get the path to the config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Get the path to the logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.max_size_mb, 500);
        assert_eq!(config.max_age_days, 3);
        assert!(config.local_time);
        assert_eq!(config.default_component, DEFAULT_COMPONENT);
    }

    #[test]
    fn test_rotation_policy() {
        let config = LogConfig {
            max_size_mb: 2,
            max_backups: 4,
            ..LogConfig::default()
        };
        let policy = config.rotation_policy();
        assert_eq!(policy.max_size_bytes, 2 * 1024 * 1024);
        assert_eq!(policy.max_age_days, 3);
        assert_eq!(policy.max_backups, 4);
        assert!(policy.local_time);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: LogConfig = toml::from_str("max_age_days = 7\ncrash_capture = false\n").unwrap();
        assert_eq!(parsed.max_age_days, 7);
        assert!(!parsed.crash_capture);
        assert_eq!(parsed.max_size_mb, 500);
        assert!(parsed.capture_global_logs);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let config = LogConfig {
            max_size_mb: 10,
            default_component: "Worker".to_string(),
            ..LogConfig::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(LogConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = LogConfig::load_from(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "max_size_mb = \"lots\"").unwrap();
        assert!(LogConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_logs_dir_under_config_dir() {
        assert!(logs_dir().ends_with(".rotolog/logs"));
        assert_eq!(DefaultDirs.log_dir(), logs_dir());
    }

    #[test]
    fn test_path_resolvers() {
        let path = PathBuf::from("/var/log/app");
        assert_eq!(path.log_dir(), path);
        assert_eq!(path.as_path().log_dir(), path);
    }
}
