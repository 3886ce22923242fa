//! Daemon configuration file

use crate::errors::{FanControlError, Result};
use crate::fan_control::WorkerSettings;
use crate::profile::{FanProfile, SharedProfile};
use crate::selector::InterfaceSelector;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the default configuration path
pub const CONFIG_PATH_ENV: &str = "FAN_CONTROL_DAEMON_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "/etc/fan-control-daemon/config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory scanned for hwmon devices
    pub hwmon_root: PathBuf,
    /// Content of the vendor hwmon device's `name` file
    pub hwmon_name: String,
    /// Vendor pwm-control device node
    pub pwm_device_path: PathBuf,
    pub poll_interval_ms: u64,
    pub same_speed: bool,
    pub control_enabled: bool,
    /// Serve the D-Bus interface
    pub dbus: bool,
    /// Initial active fan profile
    pub profile: FanProfile,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            hwmon_root: PathBuf::from("/sys/class/hwmon"),
            hwmon_name: "tuxedo".to_string(),
            pwm_device_path: PathBuf::from("/sys/bus/platform/devices/tuxedo_fan_control"),
            poll_interval_ms: 1000,
            same_speed: true,
            control_enabled: true,
            dbus: true,
            profile: FanProfile::default(),
        }
    }
}

impl DaemonConfig {
    /// Resolve the configuration path: explicit path, then the environment,
    /// then the system default
    pub fn get_config_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: DaemonConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file at `path`, or the defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("Loading configuration from {}", path.display());
        Self::load_from_file(path).map_err(|e| {
            FanControlError::Config(format!("Failed to load {}: {}", path.display(), e))
        })
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(FanControlError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.hwmon_name.trim().is_empty() {
            return Err(FanControlError::Config("hwmon_name must not be empty".to_string()));
        }
        self.profile.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            same_speed: self.same_speed,
            control_enabled: self.control_enabled,
        }
    }

    pub fn selector(&self) -> InterfaceSelector {
        InterfaceSelector::new(&self.hwmon_root, &self.hwmon_name, &self.pwm_device_path)
    }

    pub fn profile_source(&self) -> SharedProfile {
        SharedProfile::new(self.profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fan_logic::SpeedLimits;
    use crate::profile::ProfileSource;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.hwmon_root, PathBuf::from("/sys/class/hwmon"));
        assert_eq!(config.hwmon_name, "tuxedo");
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.worker_settings(), WorkerSettings::default());
        assert_eq!(config.profile.name, "Balanced");
        assert!(config.dbus);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = DaemonConfig::load_or_default(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "same_speed": false,
                "poll_interval_ms": 500,
                "profile": { "name": "Cool", "minimum": 20, "offset": 5 }
            }"#,
        )
        .unwrap();

        let config = DaemonConfig::load_or_default(&path).unwrap();
        assert!(!config.same_speed);
        assert!(config.control_enabled);
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.hwmon_name, "tuxedo");
        assert_eq!(config.profile.name, "Cool");
        assert_eq!(config.profile.limits, SpeedLimits::new(20, 100, 5).unwrap());
        assert_eq!(config.profile_source().active_profile().name, "Cool");
    }

    #[test]
    fn test_custom_profile_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "profile": {
                    "name": "Custom",
                    "custom": {
                        "cpu": [{"temp": 40, "speed": 30}, {"temp": 60, "speed": 70}],
                        "gpu": [{"temp": 50, "speed": 40}]
                    }
                }
            }"#,
        )
        .unwrap();

        let config = DaemonConfig::load_or_default(&path).unwrap();
        let curves = config.profile.curves().unwrap();
        assert_eq!(curves.cpu.speed_for_temperature(50.0), 50);
        assert_eq!(curves.gpu.points().len(), 1);
    }

    #[test]
    fn test_invalid_files_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        for json in [
            "{ not json",
            r#"{"poll_interval_ms": 0}"#,
            r#"{"profile": {"name": "Balanced", "minimum": 80, "maximum": 40}}"#,
            r#"{"profile": {"name": "Balanced", "offset": 150}}"#,
            r#"{"profile": {"name": "Turbo"}}"#,
            r#"{"profile": {"name": "Custom"}}"#,
            r#"{"profile": {"name": "Custom", "custom": {"cpu": [], "gpu": [{"temp": 0, "speed": 0}]}}}"#,
        ] {
            fs::write(&path, json).unwrap();
            assert!(
                matches!(DaemonConfig::load_or_default(&path), Err(FanControlError::Config(_))),
                "accepted {}",
                json
            );
        }
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut config = DaemonConfig::default();
        config.dbus = false;
        config.profile = FanProfile::preset("Silent").unwrap();

        config.save_to_file(&path).unwrap();
        assert_eq!(DaemonConfig::load_from_file(&path).unwrap(), config);
    }

    // Only test that reads or writes FAN_CONTROL_DAEMON_CONFIG
    #[test]
    fn test_config_path_priority() {
        let explicit = Path::new("/tmp/explicit.json");

        std::env::set_var(CONFIG_PATH_ENV, "/run/fan-control/env.json");
        assert_eq!(DaemonConfig::get_config_path(Some(explicit)), explicit);
        assert_eq!(
            DaemonConfig::get_config_path(None),
            PathBuf::from("/run/fan-control/env.json")
        );

        std::env::set_var(CONFIG_PATH_ENV, "");
        assert_eq!(DaemonConfig::get_config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));

        std::env::remove_var(CONFIG_PATH_ENV);
        assert_eq!(DaemonConfig::get_config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(DaemonConfig::get_config_path(Some(explicit)), explicit);
    }
}
