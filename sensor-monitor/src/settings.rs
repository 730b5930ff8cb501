//! Application settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use sensor_link::{
    DeviceAddress, RfcommBinding, SupervisorConfig, WorkerConfig, MAX_READING_AGE_MS,
};
use sensor_sim::VirtualHxmConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use track_dashboard::DashboardConfig;

/// Errors that can occur saving or loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Neither XDG_CONFIG_HOME nor a home directory is available
    #[error("could not determine settings path")]
    NoConfigDir,

    /// Reading or writing the file failed
    #[error("settings file {}: {}", .path.display(), .source)]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid settings JSON
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Sensor to connect to ("none" when no sensor is paired)
    pub device_address: DeviceAddress,
    /// RFCOMM tty bindings of paired sensors
    pub rfcomm_bindings: Vec<RfcommBinding>,
    /// Baud rate for RFCOMM ports
    pub baud_rate: u32,
    /// Readings older than this are stale (milliseconds)
    pub freshness_window_ms: u64,
    /// Drop the connection after this long without data (0 = never)
    pub read_timeout_ms: u64,
    /// Bound on waiting for the radio adapter (milliseconds)
    pub resolve_timeout_ms: u64,
    /// Companion dashboard preferences
    pub dashboard: DashboardConfig,
    /// Virtual straps offered in simulation mode
    pub simulated_devices: Vec<VirtualHxmConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_address: DeviceAddress::none(),
            rfcomm_bindings: Vec::new(),
            baud_rate: sensor_link::serial::DEFAULT_BAUD_RATE,
            freshness_window_ms: MAX_READING_AGE_MS,
            read_timeout_ms: 10_000,
            resolve_timeout_ms: 1_000,
            dashboard: DashboardConfig::default(),
            simulated_devices: Vec::new(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for sensor-monitor
    /// Uses $XDG_CONFIG_HOME/sensor-monitor, falls back to ~/.config/sensor-monitor
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("sensor-monitor"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("sensor-monitor"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                tracing::debug!("Using default settings: {}", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save settings to a specific file, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_error = |source: std::io::Error| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_error)?;
        Ok(())
    }

    /// Supervisor configuration derived from these settings
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            freshness_window: Duration::from_millis(self.freshness_window_ms),
            worker: WorkerConfig {
                read_timeout: (self.read_timeout_ms > 0)
                    .then(|| Duration::from_millis(self.read_timeout_ms)),
            },
            resolve_timeout: Duration::from_millis(self.resolve_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("sensor-monitor-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.device_address.is_none_sentinel());
        assert_eq!(settings.freshness_window_ms, 5000);

        let config = settings.supervisor_config();
        assert_eq!(config.freshness_window, Duration::from_secs(5));
        assert_eq!(config.worker.read_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.resolve_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_read_timeout_disables_it() {
        let settings = Settings {
            read_timeout_ms: 0,
            ..Settings::default()
        };
        assert_eq!(settings.supervisor_config().worker.read_timeout, None);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "device_address": "00:07:80:12:34:56" }"#).unwrap();

        assert_eq!(settings.device_address.as_str(), "00:07:80:12:34:56");
        assert_eq!(settings.baud_rate, 115_200);
        assert!(settings.rfcomm_bindings.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let path = scratch_file("roundtrip/settings.json");
        let settings = Settings {
            device_address: DeviceAddress::new("00:07:80:12:34:56"),
            rfcomm_bindings: vec![RfcommBinding {
                address: DeviceAddress::new("00:07:80:12:34:56"),
                port: "/dev/rfcomm0".to_string(),
                label: Some("HXM012345".to_string()),
            }],
            freshness_window_ms: 3000,
            ..Settings::default()
        };

        settings.save_to(&path).unwrap();
        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded, settings);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_errors() {
        let missing = scratch_file("missing/settings.json");
        assert!(matches!(
            Settings::load_from(&missing),
            Err(SettingsError::Io { .. })
        ));

        let broken = scratch_file("broken/settings.json");
        std::fs::create_dir_all(broken.parent().unwrap()).unwrap();
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            Settings::load_from(&broken),
            Err(SettingsError::Json(_))
        ));
        let _ = std::fs::remove_dir_all(broken.parent().unwrap());
    }
}
