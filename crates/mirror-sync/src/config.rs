//! # Mirror Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Connection string parameters (highest priority)                    │
//! │     adb://*/com.example.app?period=5000                                │
//! │                                                                         │
//! │  2. Environment Variables                                              │
//! │     DROID_MIRROR_ADB_HOST=10.0.0.2                                     │
//! │     DROID_MIRROR_PERIOD_MS=5000                                        │
//! │                                                                         │
//! │  3. TOML Config File                                                   │
//! │     ~/.config/droid-mirror/mirror.toml (Linux)                         │
//! │     ~/Library/Application Support/dev.droid-mirror.droid-mirror/...    │
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                   │
//! │     adb at 127.0.0.1:5037, poll every 60s, root /data/data/            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # mirror.toml
//! [adb]
//! host = "127.0.0.1"
//! port = 5037
//!
//! [polling]
//! initial_delay_ms = 0
//! period_ms = 60000
//!
//! [device]
//! application_data_root_path = "/data/data/"
//! show_all_files_in_package = true
//! scratch_dir = "/var/tmp/droid-mirror"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use mirror_core::DEFAULT_APPLICATION_DATA_ROOT;

// =============================================================================
// adb Settings
// =============================================================================

/// Where the local adb server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdbSettings {
    #[serde(default = "default_adb_host")]
    pub host: String,

    #[serde(default = "default_adb_port")]
    pub port: u16,
}

fn default_adb_host() -> String {
    "127.0.0.1".to_string()
}

fn default_adb_port() -> u16 {
    5037
}

impl Default for AdbSettings {
    fn default() -> Self {
        AdbSettings {
            host: default_adb_host(),
            port: default_adb_port(),
        }
    }
}

impl AdbSettings {
    /// Returns `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Polling Settings
// =============================================================================

/// Scheduler cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingSettings {
    /// Delay before the first cycle (milliseconds).
    #[serde(default)]
    pub initial_delay_ms: u64,

    /// Delay between the end of one cycle and the start of the next
    /// (milliseconds).
    #[serde(default = "default_period")]
    pub period_ms: u64,
}

fn default_period() -> u64 {
    60_000
}

impl Default for PollingSettings {
    fn default() -> Self {
        PollingSettings {
            initial_delay_ms: 0,
            period_ms: default_period(),
        }
    }
}

impl PollingSettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

// =============================================================================
// Device Settings
// =============================================================================

/// How the engine finds things on the device and where copies land locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Remote prefix the package name is appended to.
    #[serde(default = "default_data_root")]
    pub application_data_root_path: String,

    /// Whether the metadata crawl lists every file of each package.
    #[serde(default = "default_true")]
    pub show_all_files_in_package: bool,

    /// Directory for pulled copies. The system temp dir when absent.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_data_root() -> String {
    DEFAULT_APPLICATION_DATA_ROOT.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            application_data_root_path: default_data_root(),
            show_all_files_in_package: true,
            scratch_dir: None,
        }
    }
}

impl DeviceSettings {
    /// Directory pulled copies are written to.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

// =============================================================================
// Main Mirror Configuration
// =============================================================================

/// Complete mirror configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub adb: AdbSettings,

    #[serde(default)]
    pub polling: PollingSettings,

    #[serde(default)]
    pub device: DeviceSettings,
}

impl MirrorConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (mirror.toml)
    /// 3. Environment variables
    ///
    /// Connection string parameters are applied later, by
    /// [`MirrorConfig::apply_params`].
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading mirror config from file");
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    SyncError::ConfigLoadFailed(format!("{}: {}", path.display(), e))
                })?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load mirror config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.adb.host.trim().is_empty() {
            return Err(SyncError::InvalidConfig("adb host must not be empty".into()));
        }

        if self.polling.period_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "period must be greater than 0".into(),
            ));
        }

        if !self.device.application_data_root_path.starts_with('/') {
            return Err(SyncError::InvalidConfig(format!(
                "application data root must be absolute, got: {}",
                self.device.application_data_root_path
            )));
        }

        Ok(())
    }

    /// Applies `key=value` pairs from a connection string.
    ///
    /// Unknown keys are ignored. Malformed values are rejected.
    pub fn apply_params<'a, I>(&mut self, params: I) -> SyncResult<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in params {
            match key {
                "initialDelay" => self.polling.initial_delay_ms = parse_millis(key, value)?,
                "period" => self.polling.period_ms = parse_millis(key, value)?,
                "applicationDataRootPath" => {
                    self.device.application_data_root_path = value.to_string()
                }
                "showAllFilesInPackage" => {
                    self.device.show_all_files_in_package = value.eq_ignore_ascii_case("true")
                }
                "scratchDir" => self.device.scratch_dir = Some(PathBuf::from(value)),
                other => debug!(key = %other, "Ignoring unknown connection parameter"),
            }
        }

        self.validate()
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("DROID_MIRROR_ADB_HOST") {
            debug!(host = %host, "Overriding adb host from environment");
            self.adb.host = host;
        }

        if let Ok(port) = std::env::var("DROID_MIRROR_ADB_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.adb.port = p,
                Err(_) => warn!(port = %port, "Ignoring invalid adb port in environment"),
            }
        }

        if let Ok(period) = std::env::var("DROID_MIRROR_PERIOD_MS") {
            match period.parse::<u64>() {
                Ok(p) => self.polling.period_ms = p,
                Err(_) => warn!(period = %period, "Ignoring invalid period in environment"),
            }
        }

        if let Ok(delay) = std::env::var("DROID_MIRROR_INITIAL_DELAY_MS") {
            match delay.parse::<u64>() {
                Ok(d) => self.polling.initial_delay_ms = d,
                Err(_) => warn!(delay = %delay, "Ignoring invalid initial delay in environment"),
            }
        }

        if let Ok(root) = std::env::var("DROID_MIRROR_DATA_ROOT") {
            debug!(root = %root, "Overriding application data root from environment");
            self.device.application_data_root_path = root;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "droid-mirror", "droid-mirror")
            .map(|dirs| dirs.config_dir().join("mirror.toml"))
    }
}

fn parse_millis(key: &str, value: &str) -> SyncResult<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        SyncError::InvalidConfig(format!("{} must be a number of milliseconds, got: {}", key, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MirrorConfig::default();
        assert_eq!(config.adb.address(), "127.0.0.1:5037");
        assert_eq!(config.polling.initial_delay(), Duration::ZERO);
        assert_eq!(config.polling.period(), Duration::from_secs(60));
        assert_eq!(config.device.application_data_root_path, "/data/data/");
        assert!(config.device.show_all_files_in_package);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = MirrorConfig::default();

        config.polling.period_ms = 0;
        assert!(config.validate().is_err());

        config.polling.period_ms = 10;
        config.adb.host = "  ".into();
        assert!(config.validate().is_err());

        config.adb.host = "localhost".into();
        config.device.application_data_root_path = "data/data/".into();
        assert!(config.validate().is_err());

        config.device.application_data_root_path = "/sdcard/".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: MirrorConfig = toml::from_str(
            r#"
            [polling]
            period_ms = 1500

            [device]
            show_all_files_in_package = false
            "#,
        )
        .unwrap();

        assert_eq!(config.polling.period_ms, 1500);
        assert_eq!(config.polling.initial_delay_ms, 0);
        assert!(!config.device.show_all_files_in_package);
        assert_eq!(config.adb, AdbSettings::default());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.toml");
        std::fs::write(&path, "[adb]\nport = 6000\n").unwrap();

        let config = MirrorConfig::load(Some(path)).unwrap();
        assert_eq!(config.adb.port, 6000);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mirror.toml");
        std::fs::write(&path, "[adb\nport = ").unwrap();

        let err = MirrorConfig::load(Some(path)).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_apply_params() {
        let mut config = MirrorConfig::default();
        config
            .apply_params([
                ("initialDelay", "250"),
                ("period", "1000"),
                ("applicationDataRootPath", "/data/user/0/"),
                ("showAllFilesInPackage", "false"),
                ("somethingElse", "ignored"),
            ])
            .unwrap();

        assert_eq!(config.polling.initial_delay_ms, 250);
        assert_eq!(config.polling.period_ms, 1000);
        assert_eq!(config.device.application_data_root_path, "/data/user/0/");
        assert!(!config.device.show_all_files_in_package);
    }

    #[test]
    fn test_apply_params_rejects_bad_numbers() {
        let mut config = MirrorConfig::default();
        assert!(config.apply_params([("period", "soon")]).is_err());
        assert!(config.apply_params([("period", "0")]).is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&MirrorConfig::default()).unwrap();
        assert!(toml_str.contains("[adb]"));
        assert!(toml_str.contains("[polling]"));
        assert!(toml_str.contains("[device]"));
    }
}
