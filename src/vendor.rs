//! Vendor fan control capability interface
//!
//! The ioctl-style driver library is not part of this crate; the worker only
//! consumes it through [`VendorFanApi`].

use crate::errors::{FanControlError, Result};

/// Operations the vendor driver exposes for fan control. Fan indices are
/// zero-based (`FanRole::index`).
pub trait VendorFanApi: Send {
    /// Whether the driver transport can currently be used
    fn is_available(&self) -> bool;

    fn fan_count(&self) -> Result<u8>;

    /// Whether fans may be stopped completely
    fn fans_off_available(&self) -> Result<bool>;

    /// Lowest non-zero speed the hardware enforces, in percent
    fn fans_min_speed(&self) -> Result<u8>;

    /// Current speed in percent, `None` when the fan reports no speed
    fn fan_speed_percent(&self, index: u8) -> Result<Option<u8>>;

    fn set_fan_speed_percent(&self, index: u8, percent: u8) -> Result<()>;

    /// Sensor temperature in °C, `None` when the fan has no sensor
    fn fan_temperature(&self, index: u8) -> Result<Option<f32>>;

    /// Hand all fans back to firmware control
    fn set_fans_auto(&self) -> Result<()>;

    /// Tell the driver that this daemon drives the fans
    fn set_manual_mode(&self, enabled: bool) -> Result<()>;
}

/// Limits reported once by the vendor interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareLimits {
    pub fans_off_available: bool,
    pub min_speed: u8,
}

impl HardwareLimits {
    pub fn query(api: &dyn VendorFanApi) -> Result<Self> {
        Ok(Self {
            fans_off_available: api.fans_off_available()?,
            min_speed: api.fans_min_speed()?.min(100),
        })
    }

    /// Raise targets the hardware cannot run at. Zero is only kept when the
    /// fans may be switched off.
    pub fn apply(&self, speed: u8) -> u8 {
        if speed == 0 && self.fans_off_available {
            0
        } else {
            speed.max(self.min_speed)
        }
    }
}

impl Default for HardwareLimits {
    fn default() -> Self {
        Self {
            fans_off_available: true,
            min_speed: 0,
        }
    }
}

/// Stand-in used when no vendor driver binding is present on this host
#[derive(Debug, Default)]
pub struct UnavailableVendorApi;

impl UnavailableVendorApi {
    fn unavailable<T>() -> Result<T> {
        Err(FanControlError::Vendor("vendor interface not available".to_string()))
    }
}

impl VendorFanApi for UnavailableVendorApi {
    fn is_available(&self) -> bool {
        false
    }

    fn fan_count(&self) -> Result<u8> {
        Self::unavailable()
    }

    fn fans_off_available(&self) -> Result<bool> {
        Self::unavailable()
    }

    fn fans_min_speed(&self) -> Result<u8> {
        Self::unavailable()
    }

    fn fan_speed_percent(&self, _index: u8) -> Result<Option<u8>> {
        Self::unavailable()
    }

    fn set_fan_speed_percent(&self, _index: u8, _percent: u8) -> Result<()> {
        Self::unavailable()
    }

    fn fan_temperature(&self, _index: u8) -> Result<Option<f32>> {
        Self::unavailable()
    }

    fn set_fans_auto(&self) -> Result<()> {
        Self::unavailable()
    }

    fn set_manual_mode(&self, _enabled: bool) -> Result<()> {
        Self::unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_limits_apply() {
        let no_off = HardwareLimits {
            fans_off_available: false,
            min_speed: 25,
        };
        assert_eq!(no_off.apply(0), 25);
        assert_eq!(no_off.apply(10), 25);
        assert_eq!(no_off.apply(60), 60);

        let with_off = HardwareLimits {
            fans_off_available: true,
            min_speed: 25,
        };
        assert_eq!(with_off.apply(0), 0);
        assert_eq!(with_off.apply(10), 25);
    }

    #[test]
    fn test_unavailable_api() {
        let api = UnavailableVendorApi;
        assert!(!api.is_available());
        assert!(api.fan_count().is_err());
        assert!(HardwareLimits::query(&api).is_err());
    }
}
