//! Discovery of hwmon directories and the fan / temperature / pwm file sets
//! inside them

use crate::fan_logic::FanRole;
use crate::property::{NumericProperty, TextProperty};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Find the hwmon directory under `root` whose `name` file equals `name`
pub fn find_hwmon_by_name(root: &Path, name: &str) -> Option<PathBuf> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot list {}: {}", root.display(), e);
            return None;
        }
    };

    let mut candidates: Vec<PathBuf> = entries.flatten().map(|entry| entry.path()).collect();
    candidates.sort();

    candidates.into_iter().find(|path| {
        let device_name = TextProperty::new(path.join("name")).read_value();
        debug!("Checking hwmon device: {} -> {:?}", path.display(), device_name.as_deref().ok());
        matches!(device_name, Ok(ref found) if found == name)
    })
}

/// `fanN_input`, `fanN_label`, `fanN_max` under a hwmon directory
#[derive(Debug, Clone)]
pub struct FanFiles {
    pub number: u8,
    pub input: NumericProperty,
    pub label: TextProperty,
    pub max: NumericProperty,
}

impl FanFiles {
    /// Role named by the label file, if any
    pub fn role(&self) -> Option<FanRole> {
        self.label.read_value().ok().and_then(|label| FanRole::from_label(&label))
    }

    /// Current speed as a percentage of the fan's own reported maximum
    pub fn speed_percent(&self) -> Option<u8> {
        let input = self.input.read_value().ok()?;
        let max = self.max.read_value().ok()?;
        if max <= 0 || input < 0 {
            return None;
        }
        let percent = (input as f64 / max as f64 * 100.0).round();
        Some(percent.min(100.0) as u8)
    }
}

/// `tempN_input` (millidegrees Celsius) and `tempN_label` under a hwmon directory
#[derive(Debug, Clone)]
pub struct TempFiles {
    pub number: u8,
    pub input: NumericProperty,
    pub label: TextProperty,
}

impl TempFiles {
    pub fn role(&self) -> Option<FanRole> {
        self.label.read_value().ok().and_then(|label| FanRole::from_label(&label))
    }

    pub fn read_celsius(&self) -> Result<f32, crate::errors::PropertyError> {
        self.input.read_value().map(|millidegrees| millidegrees as f32 / 1000.0)
    }
}

/// `fanN_pwm` (0-255) and `fanN_pwm_enable` under the vendor pwm device
#[derive(Debug, Clone)]
pub struct PwmFiles {
    pub number: u8,
    pub pwm: NumericProperty,
    pub enable: NumericProperty,
}

impl PwmFiles {
    pub fn role(&self) -> Option<FanRole> {
        FanRole::from_number(self.number)
    }
}

/// `pwm_enable` value handing the fan to this daemon
pub const PWM_ENABLE_MANUAL: i64 = 1;
/// `pwm_enable` value handing the fan back to firmware
pub const PWM_ENABLE_AUTO: i64 = 2;

/// Convert a 0-100 percentage to the native 0-255 pwm range
pub fn percent_to_pwm(percent: u8) -> i64 {
    (percent.min(100) as f64 * 255.0 / 100.0).round() as i64
}

/// Convert a native 0-255 pwm value to a percentage
pub fn pwm_to_percent(pwm: i64) -> u8 {
    (pwm.clamp(0, 255) as f64 * 100.0 / 255.0).round() as u8
}

/// Parse `<prefix><N><suffix>` file names, e.g. `fan2_input`
fn parse_indexed(file_name: &str, prefix: &str, suffix: &str) -> Option<u8> {
    let number = file_name.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

fn indexed_files(dir: &Path, prefix: &str, suffix: &str) -> Vec<u8> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut numbers: Vec<u8> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            parse_indexed(name.to_str()?, prefix, suffix)
        })
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    numbers
}

pub fn enumerate_fans(hwmon: &Path) -> Vec<FanFiles> {
    indexed_files(hwmon, "fan", "_input")
        .into_iter()
        .map(|number| FanFiles {
            number,
            input: NumericProperty::new(hwmon.join(format!("fan{}_input", number))),
            label: TextProperty::new(hwmon.join(format!("fan{}_label", number))),
            max: NumericProperty::new(hwmon.join(format!("fan{}_max", number))),
        })
        .collect()
}

pub fn enumerate_temps(hwmon: &Path) -> Vec<TempFiles> {
    indexed_files(hwmon, "temp", "_input")
        .into_iter()
        .map(|number| TempFiles {
            number,
            input: NumericProperty::new(hwmon.join(format!("temp{}_input", number))),
            label: TextProperty::new(hwmon.join(format!("temp{}_label", number))),
        })
        .collect()
}

pub fn enumerate_pwms(pwm_device: &Path) -> Vec<PwmFiles> {
    indexed_files(pwm_device, "fan", "_pwm")
        .into_iter()
        .map(|number| PwmFiles {
            number,
            pwm: NumericProperty::new(pwm_device.join(format!("fan{}_pwm", number))),
            enable: NumericProperty::new(pwm_device.join(format!("fan{}_pwm_enable", number))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_find_hwmon_by_name() {
        let root = TempDir::new().unwrap();
        for (dir, name) in [("hwmon0", "acpitz"), ("hwmon1", "coretemp"), ("hwmon2", "tuxedo")] {
            fs::create_dir(root.path().join(dir)).unwrap();
            write(&root.path().join(dir), "name", &format!("{}\n", name));
        }
        fs::create_dir(root.path().join("hwmon3")).unwrap();

        assert_eq!(
            find_hwmon_by_name(root.path(), "tuxedo"),
            Some(root.path().join("hwmon2"))
        );
        assert_eq!(find_hwmon_by_name(root.path(), "nct6775"), None);
        assert_eq!(find_hwmon_by_name(&root.path().join("missing"), "tuxedo"), None);
    }

    #[test]
    fn test_parse_indexed() {
        assert_eq!(parse_indexed("fan2_input", "fan", "_input"), Some(2));
        assert_eq!(parse_indexed("fan12_pwm", "fan", "_pwm"), Some(12));
        assert_eq!(parse_indexed("fan1_pwm_enable", "fan", "_pwm"), None);
        assert_eq!(parse_indexed("fan_input", "fan", "_input"), None);
        assert_eq!(parse_indexed("fanx_input", "fan", "_input"), None);
        assert_eq!(parse_indexed("temp1_input", "fan", "_input"), None);
    }

    #[test]
    fn test_enumerate_file_sets() {
        let hwmon = TempDir::new().unwrap();
        write(hwmon.path(), "fan1_input", "3000\n");
        write(hwmon.path(), "fan1_label", "cpu0\n");
        write(hwmon.path(), "fan1_max", "6000\n");
        write(hwmon.path(), "fan2_input", "2000\n");
        write(hwmon.path(), "fan2_label", "gpu0\n");
        write(hwmon.path(), "temp1_input", "61500\n");
        write(hwmon.path(), "temp1_label", "cpu0\n");
        write(hwmon.path(), "temp3_input", "40000\n");
        write(hwmon.path(), "temp3_label", "ambient\n");

        let fans = enumerate_fans(hwmon.path());
        assert_eq!(fans.iter().map(|f| f.number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(fans[0].role(), Some(FanRole::Cpu));
        assert_eq!(fans[0].speed_percent(), Some(50));
        assert_eq!(fans[1].role(), Some(FanRole::Gpu1));
        assert_eq!(fans[1].speed_percent(), None);

        let temps = enumerate_temps(hwmon.path());
        assert_eq!(temps.len(), 2);
        assert_eq!(temps[0].role(), Some(FanRole::Cpu));
        assert_eq!(temps[0].read_celsius().unwrap(), 61.5);
        assert_eq!(temps[1].role(), None);
    }

    #[test]
    fn test_enumerate_pwms() {
        let device = TempDir::new().unwrap();
        write(device.path(), "fan1_pwm", "0");
        write(device.path(), "fan1_pwm_enable", "2");
        write(device.path(), "fan2_pwm", "0");
        write(device.path(), "fan2_pwm_enable", "2");

        let pwms = enumerate_pwms(device.path());
        assert_eq!(pwms.len(), 2);
        assert_eq!(pwms[1].role(), Some(FanRole::Gpu1));
        assert!(pwms[0].enable.is_available());
    }

    #[test]
    fn test_percent_to_pwm() {
        assert_eq!(percent_to_pwm(0), 0);
        assert_eq!(percent_to_pwm(50), 128);
        assert_eq!(percent_to_pwm(70), 179);
        assert_eq!(percent_to_pwm(100), 255);
        assert_eq!(percent_to_pwm(150), 255);

        assert_eq!(pwm_to_percent(179), 70);
        assert_eq!(pwm_to_percent(-5), 0);
        assert_eq!(pwm_to_percent(300), 100);
    }
}
