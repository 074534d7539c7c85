//! Configuration for the later daemon.

use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level daemon configuration.
///
/// Every field has a sensible default, so an empty TOML file (or no file at
/// all) yields a working daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Unix socket the control protocol listens on.
    pub socket_path: PathBuf,
    /// Directory holding the two persisted task snapshots.
    pub state_dir: PathBuf,
    /// Directory execution artifacts are written under.
    pub artifact_dir: PathBuf,
    /// Seconds between scheduler wake-ups.
    pub tick_interval_secs: u64,
    /// Maximum number of completed tasks retained in history.
    pub history_limit: usize,
    /// Maximum number of commands executing concurrently; further due
    /// tasks queue until a slot frees up.
    pub max_concurrent_executions: usize,
    /// Seconds granted to in-flight executions during shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: paths::socket_path(),
            state_dir: paths::state_dir(),
            artifact_dir: paths::artifact_dir(),
            tick_interval_secs: 1,
            history_limit: 100,
            max_concurrent_executions: 8,
            shutdown_grace_secs: 5,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::LaterError::Config(e.to_string()))
    }

    /// Scheduler wake-up interval.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    /// Shutdown grace period for in-flight executions.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DaemonConfig::default();
        assert!(config.tick_interval_secs > 0);
        assert_eq!(config.history_limit, 100);
        assert!(config.max_concurrent_executions > 0);
        assert!(config.socket_path.ends_with(paths::SOCKET_FILE_NAME));
    }

    #[test]
    fn tick_interval_never_degenerates_to_zero() {
        let config = DaemonConfig {
            tick_interval_secs: 0,
            ..DaemonConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn from_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let mut config = DaemonConfig::default();
        config.history_limit = 25;
        config.max_concurrent_executions = 2;
        config.socket_path = PathBuf::from("/tmp/custom.sock");

        let content = toml::to_string_pretty(&config).expect("serialize in test");
        std::fs::write(&path, content).expect("write config");

        let loaded = DaemonConfig::from_file(&path).expect("load config");
        assert_eq!(loaded.history_limit, 25);
        assert_eq!(loaded.max_concurrent_executions, 2);
        assert_eq!(loaded.socket_path, PathBuf::from("/tmp/custom.sock"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "history_limit = 5\n").expect("write config");

        let loaded = DaemonConfig::from_file(&path).expect("load config");
        assert_eq!(loaded.history_limit, 5);
        assert_eq!(loaded.tick_interval_secs, 1);
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").expect("write config");
        assert!(DaemonConfig::from_file(&path).is_err());
    }

    #[test]
    fn from_file_nonexistent_returns_error() {
        let result = DaemonConfig::from_file(std::path::Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }
}
