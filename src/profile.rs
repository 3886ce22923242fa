//! Fan profiles: named presets, the custom profile, and change detection

use crate::curve::FanCurve;
use crate::errors::{FanControlError, Result};
use crate::fan_logic::{LogicKind, SpeedLimits};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Name of the profile kind that carries user-supplied curves
pub const CUSTOM_PROFILE_NAME: &str = "Custom";

/// Preset used when none is configured, or a configured one cannot be resolved
pub const DEFAULT_PRESET_NAME: &str = "Balanced";

pub const PRESET_NAMES: [&str; 4] = ["Silent", "Balanced", "Cool", "Maximum"];

/// CPU and GPU curves of a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCurves {
    pub cpu: FanCurve,
    pub gpu: FanCurve,
}

impl ProfileCurves {
    /// Both curves flat at `speed`
    pub fn constant(speed: u8) -> Self {
        Self {
            cpu: FanCurve::constant(speed),
            gpu: FanCurve::constant(speed),
        }
    }

    pub fn for_kind(&self, kind: LogicKind) -> &FanCurve {
        match kind {
            LogicKind::Cpu => &self.cpu,
            LogicKind::Gpu => &self.gpu,
        }
    }
}

/// Look up a named preset
pub fn preset(name: &str) -> Option<ProfileCurves> {
    let (cpu, gpu): (&[(i16, u8)], &[(i16, u8)]) = match name {
        "Silent" => (
            &[(0, 0), (55, 0), (65, 20), (75, 35), (85, 60), (95, 100)],
            &[(0, 0), (60, 0), (70, 25), (80, 45), (90, 75), (95, 100)],
        ),
        "Balanced" => (
            &[(0, 0), (45, 15), (55, 25), (65, 40), (75, 60), (85, 80), (95, 100)],
            &[(0, 0), (50, 15), (60, 30), (70, 45), (80, 65), (90, 90), (95, 100)],
        ),
        "Cool" => (
            &[(0, 15), (40, 25), (50, 35), (60, 50), (70, 70), (80, 90), (90, 100)],
            &[(0, 15), (45, 25), (55, 40), (65, 55), (75, 75), (85, 95), (90, 100)],
        ),
        "Maximum" => (&[(0, 100)], &[(0, 100)]),
        _ => return None,
    };

    Some(ProfileCurves {
        cpu: FanCurve::from_pairs(cpu).ok()?,
        gpu: FanCurve::from_pairs(gpu).ok()?,
    })
}

/// The fan part of the active profile, as seen by the worker for one tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanProfile {
    pub name: String,
    #[serde(flatten)]
    pub limits: SpeedLimits,
    /// Curves for the custom profile; ignored for presets
    pub custom: Option<ProfileCurves>,
}

impl FanProfile {
    pub fn preset(name: &str) -> Result<Self> {
        if preset(name).is_none() {
            return Err(FanControlError::ProfileNotFound {
                name: name.to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            limits: SpeedLimits::default(),
            custom: None,
        })
    }

    pub fn custom(curves: ProfileCurves, limits: SpeedLimits) -> Self {
        Self {
            name: CUSTOM_PROFILE_NAME.to_string(),
            limits,
            custom: Some(curves),
        }
    }

    pub fn is_custom(&self) -> bool {
        self.name == CUSTOM_PROFILE_NAME
    }

    /// The curves this profile selects, if they can be resolved
    pub fn curves(&self) -> Option<ProfileCurves> {
        if self.is_custom() {
            self.custom.clone()
        } else {
            preset(&self.name)
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        if self.is_custom() && self.custom.is_none() {
            return Err(FanControlError::Config(
                "custom fan profile has no curves".to_string(),
            ));
        }
        if !self.is_custom() && preset(&self.name).is_none() {
            return Err(FanControlError::ProfileNotFound {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

impl Default for FanProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_PRESET_NAME.to_string(),
            limits: SpeedLimits::default(),
            custom: None,
        }
    }
}

/// Read-only access to the active profile
pub trait ProfileSource: Send {
    fn active_profile(&self) -> FanProfile;
}

/// Active profile shared between the worker and the D-Bus surface
#[derive(Debug, Clone, Default)]
pub struct SharedProfile(Arc<RwLock<FanProfile>>);

impl SharedProfile {
    pub fn new(profile: FanProfile) -> Self {
        Self(Arc::new(RwLock::new(profile)))
    }

    pub fn replace(&self, profile: FanProfile) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = profile;
    }

    pub fn update(&self, f: impl FnOnce(&mut FanProfile)) {
        f(&mut self.0.write().unwrap_or_else(PoisonError::into_inner));
    }
}

impl ProfileSource for SharedProfile {
    fn active_profile(&self) -> FanProfile {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// The profile values last applied to the fan logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSnapshot {
    name: String,
    limits: SpeedLimits,
    custom: Option<ProfileCurves>,
}

impl ProfileSnapshot {
    pub fn of(profile: &FanProfile) -> Self {
        Self {
            name: profile.name.clone(),
            limits: profile.limits,
            custom: profile.custom.clone(),
        }
    }

    /// Whether applying `profile` would change anything. Custom curves are
    /// only compared when the profile is the custom kind.
    pub fn differs_from(&self, profile: &FanProfile) -> bool {
        if self.name != profile.name || self.limits != profile.limits {
            return true;
        }
        profile.is_custom() && self.custom != profile.custom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom_curves(top: u8) -> ProfileCurves {
        ProfileCurves {
            cpu: FanCurve::from_pairs(&[(40, 30), (60, top)]).unwrap(),
            gpu: FanCurve::from_pairs(&[(40, 30), (60, top)]).unwrap(),
        }
    }

    #[test]
    fn test_all_presets_resolve() {
        for name in PRESET_NAMES {
            let profile = FanProfile::preset(name).unwrap();
            assert!(profile.curves().is_some(), "preset {} did not resolve", name);
            assert!(profile.validate().is_ok());
        }
        assert!(FanProfile::preset("Turbo").is_err());
        assert!(preset(CUSTOM_PROFILE_NAME).is_none());
    }

    #[test]
    fn test_custom_profile_curves() {
        let profile = FanProfile::custom(custom_curves(70), SpeedLimits::default());
        assert!(profile.is_custom());
        assert_eq!(profile.curves(), Some(custom_curves(70)));

        let empty = FanProfile {
            name: CUSTOM_PROFILE_NAME.to_string(),
            ..FanProfile::default()
        };
        assert!(empty.curves().is_none());
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_snapshot_detects_limit_changes() {
        let mut profile = FanProfile::default();
        let snapshot = ProfileSnapshot::of(&profile);
        assert!(!snapshot.differs_from(&profile));

        profile.limits.offset = 10;
        assert!(snapshot.differs_from(&profile));

        profile.limits.offset = 0;
        profile.name = "Cool".to_string();
        assert!(snapshot.differs_from(&profile));
    }

    #[test]
    fn test_snapshot_compares_custom_curves_structurally() {
        let profile = FanProfile::custom(custom_curves(70), SpeedLimits::default());
        let snapshot = ProfileSnapshot::of(&profile);

        let same = FanProfile::custom(custom_curves(70), SpeedLimits::default());
        assert!(!snapshot.differs_from(&same));

        let changed = FanProfile::custom(custom_curves(80), SpeedLimits::default());
        assert!(snapshot.differs_from(&changed));
    }

    #[test]
    fn test_snapshot_ignores_stale_custom_curves_on_presets() {
        let mut profile = FanProfile::default();
        let snapshot = ProfileSnapshot::of(&profile);

        profile.custom = Some(custom_curves(70));
        assert!(!snapshot.differs_from(&profile));
    }

    #[test]
    fn test_shared_profile_update() {
        let shared = SharedProfile::new(FanProfile::default());
        shared.update(|p| p.limits.minimum = 25);
        assert_eq!(shared.active_profile().limits.minimum, 25);

        shared.replace(FanProfile::preset("Silent").unwrap());
        assert_eq!(shared.active_profile().name, "Silent");
        assert_eq!(shared.active_profile().limits.minimum, 0);
    }

    #[test]
    fn test_profile_deserializes_flat_limits() {
        let profile: FanProfile =
            serde_json::from_str(r#"{"name":"Cool","minimum":20,"offset":5}"#).unwrap();
        assert_eq!(profile.name, "Cool");
        assert_eq!(profile.limits, SpeedLimits::new(20, 100, 5).unwrap());
        assert!(profile.custom.is_none());
    }
}
