//! Fan Control Daemon
//!
//! Curve based laptop fan control: detects whether the vendor hwmon and pwm
//! sysfs nodes are present, drives the fans through them or through the
//! vendor driver interface, and publishes per-fan telemetry.

pub mod args;
pub mod config;
pub mod curve;
pub mod daemon;
pub mod errors;
pub mod fan_control;
pub mod fan_logic;
pub mod hwmon;
pub mod logging;
pub mod profile;
pub mod property;
pub mod selector;
pub mod telemetry;
pub mod vendor;

// DBus constants
pub const DBUS_SERVICE_NAME: &str = "com.fancontrol.Daemon";
pub const DBUS_OBJECT_PATH: &str = "/com/fancontrol/Daemon";
pub const DBUS_INTERFACE_NAME: &str = "com.fancontrol.Daemon";

// Re-export commonly used types
pub use config::DaemonConfig;
pub use curve::{FanCurve, FanPoint, InterpolatedTable};
pub use errors::{FanControlError, PropertyError, Result};
pub use fan_control::{FanControlWorker, WorkerSettings};
pub use fan_logic::{FanControlLogic, FanRole, SpeedLimits};
pub use profile::{FanProfile, ProfileCurves};
pub use selector::{ControlMode, InterfaceSelector};
