//! Global configuration model for berth.
//!
//! Loaded from a YAML file. Every field has a default so a missing file or
//! a partial file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{BerthError, Result};
use crate::types::EndpointId;

/// Root configuration for berth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BerthConfig {
    /// Base URL of the orchestration API, e.g. `https://portainer.local:9443`.
    pub server_url: Option<String>,
    /// Base directory for berth state and data.
    pub data_dir: PathBuf,
    /// Seconds between background sync runs.
    pub sync_interval_secs: u64,
    /// Endpoint to select when the previous selection is gone.
    pub preferred_endpoint: Option<EndpointId>,
    /// Per-request timeout of the HTTP client, in seconds.
    pub request_timeout_secs: u64,
    /// Notification composition settings.
    pub notifications: NotificationConfig,
}

/// Change-count thresholds used when composing notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Largest change count that gets the detailed template.
    pub detailed_max: usize,
    /// Largest change count that gets the medium template.
    pub medium_max: usize,
}

impl Default for BerthConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            data_dir: constants::data_dir().clone(),
            sync_interval_secs: constants::DEFAULT_SYNC_INTERVAL_SECS,
            preferred_endpoint: None,
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT_SECS,
            notifications: NotificationConfig::default(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            detailed_max: constants::DEFAULT_DETAILED_MAX,
            medium_max: constants::DEFAULT_MEDIUM_MAX,
        }
    }
}

impl BerthConfig {
    /// Loads the configuration from a YAML file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| BerthError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parses and validates a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Config` if the text is not valid YAML or a value
    /// is out of range.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content).map_err(|e| BerthError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `BerthError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_secs == 0 {
            return Err(BerthError::Config {
                message: "sync_interval_secs must be greater than zero".into(),
            });
        }
        if self.sync_interval_secs > constants::MAX_SYNC_INTERVAL_SECS {
            return Err(BerthError::Config {
                message: format!(
                    "sync_interval_secs must be at most {}",
                    constants::MAX_SYNC_INTERVAL_SECS
                ),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(BerthError::Config {
                message: "request_timeout_secs must be greater than zero".into(),
            });
        }
        let n = self.notifications;
        if n.detailed_max == 0 {
            return Err(BerthError::Config {
                message: "notifications.detailed_max must be at least 1".into(),
            });
        }
        if n.medium_max < n.detailed_max {
            return Err(BerthError::Config {
                message: format!(
                    "notifications.medium_max ({}) must not be below detailed_max ({})",
                    n.medium_max, n.detailed_max
                ),
            });
        }
        Ok(())
    }

    /// Returns the directory holding persisted snapshots.
    #[must_use]
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join(constants::SNAPSHOT_DIR_NAME)
    }

    /// Returns the sync interval as a duration.
    #[must_use]
    pub const fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync_interval_secs)
    }

    /// Returns the request timeout as a duration.
    #[must_use]
    pub const fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = BerthConfig::from_yaml("").unwrap();
        assert_eq!(config, BerthConfig::default());
        assert_eq!(config.notifications.detailed_max, 1);
        assert_eq!(config.notifications.medium_max, 3);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = BerthConfig::from_yaml(
            "server_url: https://portainer.local:9443\npreferred_endpoint: 2\n",
        )
        .unwrap();
        assert_eq!(
            config.server_url.as_deref(),
            Some("https://portainer.local:9443")
        );
        assert_eq!(config.preferred_endpoint, Some(EndpointId::new(2)));
        assert_eq!(
            config.sync_interval_secs,
            constants::DEFAULT_SYNC_INTERVAL_SECS
        );
    }

    #[test]
    fn nested_notification_thresholds_parse() {
        let config =
            BerthConfig::from_yaml("notifications:\n  detailed_max: 2\n  medium_max: 5\n").unwrap();
        assert_eq!(config.notifications.detailed_max, 2);
        assert_eq!(config.notifications.medium_max, 5);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = BerthConfig::from_yaml("sync_interval_secs: 0\n").unwrap_err();
        assert!(matches!(err, BerthError::Config { .. }));
    }

    #[test]
    fn huge_interval_is_rejected() {
        let err = BerthConfig::from_yaml("sync_interval_secs: 18446744073709551615\n").unwrap_err();
        assert!(matches!(err, BerthError::Config { .. }));

        let longest = format!("sync_interval_secs: {}\n", constants::MAX_SYNC_INTERVAL_SECS);
        assert!(BerthConfig::from_yaml(&longest).is_ok());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let err = BerthConfig::from_yaml("notifications:\n  detailed_max: 4\n  medium_max: 2\n")
            .unwrap_err();
        assert!(err.to_string().contains("medium_max"));
    }

    #[test]
    fn malformed_yaml_is_config_error() {
        let err = BerthConfig::from_yaml("sync_interval_secs: [").unwrap_err();
        assert!(matches!(err, BerthError::Config { .. }));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BerthConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, BerthConfig::default());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sync_interval_secs: 60\n").unwrap();
        let config = BerthConfig::load(&path).unwrap();
        assert_eq!(config.sync_interval(), std::time::Duration::from_secs(60));
        assert_eq!(config.snapshot_dir(), config.data_dir.join("snapshots"));
    }
}
