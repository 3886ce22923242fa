//! Startup detection of the hardware control path

use crate::hwmon;
use log::info;
use std::fmt;
use std::path::{Path, PathBuf};

/// How fans are sensed and driven for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMode {
    /// Vendor hwmon device plus the dedicated pwm-control node: sensing and
    /// control both through sysfs
    DirectHwmon { hwmon: PathBuf, pwm_device: PathBuf },
    /// Vendor hwmon device only: firmware controls the fans, values are only
    /// published
    TelemetryOnlyHwmon { hwmon: PathBuf },
    /// No hwmon device: everything goes through the vendor interface
    VendorFallback,
}

impl ControlMode {
    pub fn name(&self) -> &'static str {
        match self {
            ControlMode::DirectHwmon { .. } => "DirectHwmon",
            ControlMode::TelemetryOnlyHwmon { .. } => "TelemetryOnlyHwmon",
            ControlMode::VendorFallback => "VendorFallback",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Probes the host for the three control paths in priority order
#[derive(Debug, Clone)]
pub struct InterfaceSelector {
    hwmon_root: PathBuf,
    hwmon_name: String,
    pwm_device: PathBuf,
}

impl InterfaceSelector {
    pub fn new(hwmon_root: impl Into<PathBuf>, hwmon_name: impl Into<String>, pwm_device: impl Into<PathBuf>) -> Self {
        Self {
            hwmon_root: hwmon_root.into(),
            hwmon_name: hwmon_name.into(),
            pwm_device: pwm_device.into(),
        }
    }

    pub fn probe(&self) -> ControlMode {
        let mode = match hwmon::find_hwmon_by_name(&self.hwmon_root, &self.hwmon_name) {
            Some(hwmon) if is_directory(&self.pwm_device) => ControlMode::DirectHwmon {
                hwmon,
                pwm_device: self.pwm_device.clone(),
            },
            Some(hwmon) => ControlMode::TelemetryOnlyHwmon { hwmon },
            None => ControlMode::VendorFallback,
        };

        match &mode {
            ControlMode::DirectHwmon { hwmon, pwm_device } => info!(
                "Fan control through sysfs: hwmon {} and pwm device {}",
                hwmon.display(),
                pwm_device.display()
            ),
            ControlMode::TelemetryOnlyHwmon { hwmon } => info!(
                "Fan telemetry only through {}: pwm device {} not present",
                hwmon.display(),
                self.pwm_device.display()
            ),
            ControlMode::VendorFallback => info!(
                "No '{}' hwmon device under {}, using the vendor interface",
                self.hwmon_name,
                self.hwmon_root.display()
            ),
        }

        mode
    }
}

fn is_directory(path: &Path) -> bool {
    path.metadata().map(|meta| meta.is_dir()).unwrap_or(false)
}
