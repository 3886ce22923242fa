//! Per-fan control logic
//!
//! One [`FanControlLogic`] exists for each [`FanRole`] for the whole lifetime
//! of the worker, whether or not the physical fan is present on this host.

use crate::curve::{FanCurve, InterpolatedTable};
use crate::errors::{FanControlError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical fan position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FanRole {
    Cpu = 1,
    Gpu1 = 2,
    Gpu2 = 3,
}

impl FanRole {
    pub const ALL: [FanRole; 3] = [FanRole::Cpu, FanRole::Gpu1, FanRole::Gpu2];

    /// Role number as used in sysfs file names (`fan1_*` is the CPU fan)
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Zero-based index used by the vendor interface
    pub fn index(self) -> u8 {
        self.number() - 1
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(FanRole::Cpu),
            2 => Some(FanRole::Gpu1),
            3 => Some(FanRole::Gpu2),
            _ => None,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        index.checked_add(1).and_then(Self::from_number)
    }

    /// Map a hwmon `*_label` value to a role; unknown labels yield `None`
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "cpu0" => Some(FanRole::Cpu),
            "gpu0" => Some(FanRole::Gpu1),
            "gpu1" => Some(FanRole::Gpu2),
            _ => None,
        }
    }

    pub fn logic_kind(self) -> LogicKind {
        match self {
            FanRole::Cpu => LogicKind::Cpu,
            FanRole::Gpu1 | FanRole::Gpu2 => LogicKind::Gpu,
        }
    }
}

impl fmt::Display for FanRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FanRole::Cpu => "CPU",
            FanRole::Gpu1 => "GPU1",
            FanRole::Gpu2 => "GPU2",
        };
        f.write_str(name)
    }
}

/// Which curve of a profile a logic instance follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicKind {
    Cpu,
    Gpu,
}

/// Minimum, maximum and offset applied on top of the curve, all in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedLimits {
    pub minimum: u8,
    pub maximum: u8,
    pub offset: u8,
}

impl SpeedLimits {
    pub fn new(minimum: u8, maximum: u8, offset: u8) -> Result<Self> {
        let limits = Self {
            minimum,
            maximum,
            offset,
        };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> Result<()> {
        if self.minimum > 100 || self.maximum > 100 || self.offset > 100 {
            return Err(FanControlError::Config(format!(
                "fan speed limits must be within 0-100 (min {}, max {}, offset {})",
                self.minimum, self.maximum, self.offset
            )));
        }
        if self.minimum > self.maximum {
            return Err(FanControlError::Config(format!(
                "minimum fan speed {} exceeds maximum {}",
                self.minimum, self.maximum
            )));
        }
        Ok(())
    }

    /// Clamp into `[minimum, maximum]`, add the offset, clamp into `[0, 100]`
    pub fn apply(&self, speed: u8) -> u8 {
        let bounded = speed.max(self.minimum).min(self.maximum);
        (bounded as u16 + self.offset as u16).min(100) as u8
    }
}

impl Default for SpeedLimits {
    fn default() -> Self {
        Self {
            minimum: 0,
            maximum: 100,
            offset: 0,
        }
    }
}

/// Curve-driven controller for a single fan role
#[derive(Debug)]
pub struct FanControlLogic {
    role: FanRole,
    kind: LogicKind,
    curve: FanCurve,
    table: InterpolatedTable,
    limits: SpeedLimits,
    last_temperature: Option<f32>,
    table_builds: u64,
}

impl FanControlLogic {
    pub fn new(role: FanRole, curve: FanCurve, limits: SpeedLimits) -> Self {
        let table = curve.interpolate();
        Self {
            role,
            kind: role.logic_kind(),
            curve,
            table,
            limits,
            last_temperature: None,
            table_builds: 1,
        }
    }

    pub fn role(&self) -> FanRole {
        self.role
    }

    pub fn kind(&self) -> LogicKind {
        self.kind
    }

    /// Install a curve. The table is only rebuilt when the curve differs from
    /// the installed one; returns whether a rebuild happened. Never writes to
    /// hardware.
    pub fn set_fan_profile(&mut self, curve: &FanCurve) -> bool {
        if *curve == self.curve {
            return false;
        }
        self.curve = curve.clone();
        self.table = self.curve.interpolate();
        self.table_builds += 1;
        true
    }

    pub fn set_limits(&mut self, limits: SpeedLimits) {
        self.limits = limits;
    }

    /// Record the latest sample. Non-finite values clear the sample.
    pub fn report_temperature(&mut self, celsius: f32) {
        self.last_temperature = celsius.is_finite().then_some(celsius);
    }

    pub fn clear_temperature(&mut self) {
        self.last_temperature = None;
    }

    pub fn last_temperature(&self) -> Option<f32> {
        self.last_temperature
    }

    /// Target speed for the last reported temperature, or `None` before any
    /// valid sample.
    pub fn speed_percent(&self) -> Option<u8> {
        self.last_temperature.map(|temp| self.speed_for(temp))
    }

    /// Target speed for an arbitrary temperature
    pub fn speed_for(&self, celsius: f32) -> u8 {
        let raw = self.table.speed_at(celsius.round() as i32);
        self.limits.apply(raw)
    }

    pub fn table(&self) -> &InterpolatedTable {
        &self.table
    }

    /// Number of times the interpolated table has been built
    pub fn table_builds(&self) -> u64 {
        self.table_builds
    }
}
