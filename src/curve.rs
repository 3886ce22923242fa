//! Fan speed curves and their dense interpolated tables

use crate::errors::{FanControlError, Result};
use serde::{Deserialize, Serialize};
use zvariant::Type;

/// Lowest temperature covered by an [`InterpolatedTable`]
pub const TABLE_MIN_TEMP: i16 = 0;
/// Highest temperature covered by an [`InterpolatedTable`]
pub const TABLE_MAX_TEMP: i16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct FanPoint {
    pub temp: i16,
    pub speed: u8,
}

impl FanPoint {
    pub fn new(temp: i16, speed: u8) -> Self {
        Self { temp, speed }
    }
}

/// Ordered control points mapping temperature (°C) to fan speed (%).
///
/// Invariants, checked on construction and deserialization: at least one
/// point, temperatures and speeds both non-decreasing, speeds at most 100.
/// Equality compares the points in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FanPoint>", into = "Vec<FanPoint>")]
pub struct FanCurve {
    points: Vec<FanPoint>,
}

impl FanCurve {
    pub fn new(points: Vec<FanPoint>) -> Result<Self> {
        Self::validate(&points)?;
        Ok(Self { points })
    }

    /// Build a curve from `(temp, speed)` pairs
    pub fn from_pairs(pairs: &[(i16, u8)]) -> Result<Self> {
        Self::new(pairs.iter().map(|&(temp, speed)| FanPoint::new(temp, speed)).collect())
    }

    fn validate(points: &[FanPoint]) -> Result<()> {
        if points.is_empty() {
            return Err(FanControlError::InvalidCurve("curve has no points".to_string()));
        }

        if let Some(point) = points.iter().find(|p| p.speed > 100) {
            return Err(FanControlError::InvalidFanPoint {
                temp: point.temp,
                speed: point.speed,
            });
        }

        for pair in points.windows(2) {
            if pair[1].temp < pair[0].temp {
                return Err(FanControlError::InvalidCurve(format!(
                    "temperatures must be non-decreasing ({}°C after {}°C)",
                    pair[1].temp, pair[0].temp
                )));
            }
            if pair[1].speed < pair[0].speed {
                return Err(FanControlError::InvalidCurve(format!(
                    "speeds must be non-decreasing ({}% at {}°C after {}% at {}°C)",
                    pair[1].speed, pair[1].temp, pair[0].speed, pair[0].temp
                )));
            }
        }

        Ok(())
    }

    /// Flat curve at a single speed
    pub fn constant(speed: u8) -> Self {
        Self {
            points: vec![FanPoint::new(TABLE_MIN_TEMP, speed.min(100))],
        }
    }

    pub fn points(&self) -> &[FanPoint] {
        &self.points
    }

    /// Speed percentage at `temperature` by linear interpolation between
    /// neighboring points, held flat beyond either end of the curve. A NaN
    /// temperature maps to the lowest point's speed.
    pub fn speed_for_temperature(&self, temperature: f32) -> u8 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];

        if temperature.is_nan() || temperature <= first.temp as f32 {
            return first.speed;
        }
        if temperature >= last.temp as f32 {
            return last.speed;
        }

        // Last segment whose start is at or below the temperature, so that a
        // repeated temperature resolves to the later point.
        let start = self
            .points
            .iter()
            .rposition(|p| p.temp as f32 <= temperature)
            .unwrap_or(0)
            .min(self.points.len() - 2);
        let lower = self.points[start];
        let upper = self.points[start + 1];

        let factor = (temperature - lower.temp as f32) / (upper.temp as f32 - lower.temp as f32);
        let speed = lower.speed as f32 + factor * (upper.speed as f32 - lower.speed as f32);

        speed.round().clamp(0.0, 100.0) as u8
    }

    pub fn interpolate(&self) -> InterpolatedTable {
        InterpolatedTable::from_curve(self)
    }
}

impl TryFrom<Vec<FanPoint>> for FanCurve {
    type Error = FanControlError;

    fn try_from(points: Vec<FanPoint>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<FanCurve> for Vec<FanPoint> {
    fn from(curve: FanCurve) -> Self {
        curve.points
    }
}

/// Speed percentage for every integer temperature in
/// `TABLE_MIN_TEMP..=TABLE_MAX_TEMP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpolatedTable {
    speeds: Vec<u8>,
}

impl InterpolatedTable {
    pub fn from_curve(curve: &FanCurve) -> Self {
        let speeds = (TABLE_MIN_TEMP..=TABLE_MAX_TEMP)
            .map(|temp| curve.speed_for_temperature(temp as f32))
            .collect();
        Self { speeds }
    }

    /// Look up a temperature; values outside the table are held at the nearest end.
    pub fn speed_at(&self, temperature: i32) -> u8 {
        let clamped = temperature.clamp(TABLE_MIN_TEMP as i32, TABLE_MAX_TEMP as i32);
        self.speeds[(clamped - TABLE_MIN_TEMP as i32) as usize]
    }

    /// `(temperature, speed)` entries in ascending temperature order
    pub fn entries(&self) -> impl Iterator<Item = (i16, u8)> + '_ {
        (TABLE_MIN_TEMP..=TABLE_MAX_TEMP).zip(self.speeds.iter().copied())
    }
}
