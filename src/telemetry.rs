//! Timestamped fan telemetry handed to the presentation side

use crate::fan_logic::FanRole;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Value published when a role has no sensor or no speed reading
pub const NO_SENSOR: i32 = -1;

/// A value with the time it was sampled (milliseconds since the Unix epoch)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedValue {
    pub timestamp: i64,
    pub value: i32,
}

impl TimedValue {
    pub fn now(value: i32) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp_millis(),
            value,
        }
    }

    pub fn as_tuple(&self) -> (i64, i32) {
        (self.timestamp, self.value)
    }
}

/// Latest temperature (°C) and speed (%) of one role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanSample {
    pub temperature: TimedValue,
    pub speed: TimedValue,
}

pub trait TelemetrySink: Send {
    fn publish(&self, role: FanRole, sample: FanSample);
}

/// In-memory sink holding the most recent sample per role
#[derive(Debug, Clone, Default)]
pub struct FanTelemetry {
    samples: Arc<Mutex<BTreeMap<FanRole, FanSample>>>,
}

impl FanTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, role: FanRole) -> Option<FanSample> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&role)
            .copied()
    }
}

impl TelemetrySink for FanTelemetry {
    fn publish(&self, role: FanRole, sample: FanSample) {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(role, sample);
    }
}
