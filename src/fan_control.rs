//! Fan control worker
//!
//! Owns one [`FanControlLogic`] per fan role and, once per tick, reads the
//! sensors of the control path picked at startup, computes target speeds and
//! writes them to the actuators. [`FanControlWorker::on_exit`] hands the fans
//! back to firmware control and also runs when the worker is dropped.

use crate::fan_logic::{FanControlLogic, FanRole};
use crate::hwmon::{self, PwmFiles, PWM_ENABLE_AUTO, PWM_ENABLE_MANUAL};
use crate::profile::{preset, FanProfile, ProfileCurves, ProfileSnapshot, ProfileSource, DEFAULT_PRESET_NAME};
use crate::property::NumericProperty;
use crate::selector::ControlMode;
use crate::telemetry::{FanSample, TelemetrySink, TimedValue, NO_SENSOR};
use crate::vendor::{HardwareLimits, VendorFanApi};
use log::{debug, error, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::Path;
use std::time::Duration;

/// Fixed period between two ticks
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Policy switches for the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Drive every fan at the highest target of all fans with a valid sensor
    /// (vendor path only)
    pub same_speed: bool,
    /// When false, sensors are still published but nothing is written
    pub control_enabled: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            same_speed: true,
            control_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Exiting,
    Stopped,
}

/// Remembers which sensors are failing so each failure and recovery is
/// logged once instead of every tick.
#[derive(Debug, Default)]
struct FailureLog {
    failing: BTreeSet<String>,
}

impl FailureLog {
    /// Returns true when this is a new failure, logged at warn level
    fn failed(&mut self, what: &str, err: &dyn Display) -> bool {
        if self.failing.insert(what.to_string()) {
            warn!("{}: {}", what, err);
            true
        } else {
            debug!("{}: {}", what, err);
            false
        }
    }

    /// Returns true when `what` was failing and is now logged as recovered
    fn recovered(&mut self, what: &str) -> bool {
        let was_failing = self.failing.remove(what);
        if was_failing {
            info!("{}: recovered", what);
        }
        was_failing
    }
}

pub struct FanControlWorker {
    mode: ControlMode,
    settings: WorkerSettings,
    state: WorkerState,
    vendor: Box<dyn VendorFanApi>,
    profiles: Box<dyn ProfileSource>,
    telemetry: Box<dyn TelemetrySink>,
    logics: BTreeMap<FanRole, FanControlLogic>,
    fan_roles: Vec<FanRole>,
    previous_profile: ProfileSnapshot,
    profile_refreshes: u64,
    hardware_limits: Option<HardwareLimits>,
    vendor_available: Option<bool>,
    manual_mode_enabled: bool,
    pwm_enables: Vec<NumericProperty>,
    failures: FailureLog,
}

impl FanControlWorker {
    pub fn new(
        mode: ControlMode,
        settings: WorkerSettings,
        vendor: Box<dyn VendorFanApi>,
        profiles: Box<dyn ProfileSource>,
        telemetry: Box<dyn TelemetrySink>,
    ) -> Self {
        let profile = profiles.active_profile();
        let curves = resolve_curves(&profile);
        let logics = FanRole::ALL
            .into_iter()
            .map(|role| {
                let curve = curves.for_kind(role.logic_kind()).clone();
                (role, FanControlLogic::new(role, curve, profile.limits))
            })
            .collect();

        Self {
            mode,
            settings,
            state: WorkerState::Created,
            vendor,
            profiles,
            telemetry,
            logics,
            fan_roles: Vec::new(),
            previous_profile: ProfileSnapshot::of(&profile),
            profile_refreshes: 0,
            hardware_limits: None,
            vendor_available: None,
            manual_mode_enabled: false,
            pwm_enables: Vec::new(),
            failures: FailureLog::default(),
        }
    }

    pub fn mode(&self) -> &ControlMode {
        &self.mode
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Roles of the fans detected on the last tick, in role order
    pub fn fan_roles(&self) -> &[FanRole] {
        &self.fan_roles
    }

    pub fn logic(&self, role: FanRole) -> Option<&FanControlLogic> {
        self.logics.get(&role)
    }

    /// Number of times a profile change has been applied to the fan logic
    pub fn profile_refreshes(&self) -> u64 {
        self.profile_refreshes
    }

    pub fn hardware_limits(&self) -> Option<HardwareLimits> {
        self.hardware_limits
    }

    /// Prepare the hardware for the selected control path
    pub fn on_start(&mut self) {
        if self.state != WorkerState::Created {
            return;
        }

        match self.mode.clone() {
            ControlMode::DirectHwmon { pwm_device, .. } => {
                let pwms = hwmon::enumerate_pwms(&pwm_device);
                for pwm in &pwms {
                    self.claim_pwm(pwm);
                }
                self.update_fan_roles(pwms.iter().filter_map(PwmFiles::role).collect());
            }
            ControlMode::TelemetryOnlyHwmon { .. } => {}
            ControlMode::VendorFallback => self.query_hardware_limits(),
        }

        self.state = WorkerState::Running;
        info!("Fan control worker started in {} mode", self.mode);
    }

    /// One read / compute / write pass
    pub fn on_work(&mut self) {
        if self.state != WorkerState::Running {
            return;
        }

        let profile = self.profiles.active_profile();
        self.refresh_profile(&profile);

        match self.mode.clone() {
            ControlMode::DirectHwmon { hwmon: dir, pwm_device } => self.tick_direct(&dir, &pwm_device),
            ControlMode::TelemetryOnlyHwmon { hwmon: dir } => self.tick_telemetry_only(&dir),
            ControlMode::VendorFallback => self.tick_vendor(),
        }
    }

    /// Return the fans to automatic control. Failures are logged only; this
    /// always runs to completion and is safe to call more than once.
    pub fn on_exit(&mut self) {
        if matches!(self.state, WorkerState::Exiting | WorkerState::Stopped) {
            return;
        }
        self.state = WorkerState::Exiting;

        if self.manual_mode_enabled {
            info!("Returning fans to automatic control");
            if let Err(e) = self.vendor.set_fans_auto() {
                error!("Failed to set fans to automatic mode: {}", e);
            }
            if let Err(e) = self.vendor.set_manual_mode(false) {
                error!("Failed to clear manual fan mode: {}", e);
            }
            self.manual_mode_enabled = false;
        }

        for enable in self.pwm_enables.drain(..) {
            match enable.write_value(PWM_ENABLE_AUTO) {
                Ok(()) => info!("Automatic pwm control restored at {}", enable.path().display()),
                Err(e) => error!("Failed to restore automatic pwm control: {}", e),
            }
        }

        self.state = WorkerState::Stopped;
        info!("Fan control worker stopped");
    }

    fn refresh_profile(&mut self, profile: &FanProfile) {
        if !self.previous_profile.differs_from(profile) {
            return;
        }

        let curves = resolve_curves(profile);
        let mut rebuilt = 0;
        for logic in self.logics.values_mut() {
            if logic.set_fan_profile(curves.for_kind(logic.kind())) {
                debug!("{} fan table rebuilt", logic.role());
                rebuilt += 1;
            }
            logic.set_limits(profile.limits);
        }

        self.previous_profile = ProfileSnapshot::of(profile);
        self.profile_refreshes += 1;
        info!(
            "Applied fan profile '{}' (min {}%, max {}%, offset {}%), {} tables rebuilt",
            profile.name, profile.limits.minimum, profile.limits.maximum, profile.limits.offset, rebuilt
        );
    }

    /// Switch a pwm to manual mode and remember it for restore on exit.
    /// Does nothing when control is disabled or the pwm is already claimed.
    fn claim_pwm(&mut self, pwm: &PwmFiles) {
        if !self.settings.control_enabled || self.pwm_enables.contains(&pwm.enable) {
            return;
        }
        match pwm.enable.write_value(PWM_ENABLE_MANUAL) {
            Ok(()) => info!("Manual pwm control enabled for fan {}", pwm.number),
            Err(e) => warn!("Failed to enable manual pwm control for fan {}: {}", pwm.number, e),
        }
        self.pwm_enables.push(pwm.enable.clone());
    }

    /// Log transitions of the vendor transport; returns true when one was logged
    fn note_vendor_availability(&mut self, available: bool) -> bool {
        let logged = match (self.vendor_available, available) {
            (None | Some(true), false) => {
                warn!("Fan control unavailable: vendor interface not responding");
                true
            }
            (Some(false), true) => {
                info!("Fan control resumed: vendor interface available");
                true
            }
            _ => false,
        };
        self.vendor_available = Some(available);
        logged
    }

    fn update_fan_roles(&mut self, roles: Vec<FanRole>) {
        if roles != self.fan_roles {
            info!("Detected {} fans: {:?}", roles.len(), roles);
            self.fan_roles = roles;
        }
    }

    fn tick_direct(&mut self, hwmon_dir: &Path, pwm_device: &Path) {
        let pwms = hwmon::enumerate_pwms(pwm_device);
        for pwm in &pwms {
            self.claim_pwm(pwm);
        }
        self.update_fan_roles(pwms.iter().filter_map(PwmFiles::role).collect());

        let temperatures = self.read_hwmon_temperatures(hwmon_dir);
        self.report_temperatures(&temperatures);

        // The CPU sensor is the single control signal for every fan.
        let target = self.logics.get(&FanRole::Cpu).and_then(FanControlLogic::speed_percent);
        match target {
            Some(_) => {
                self.failures.recovered("CPU control temperature");
            }
            None => {
                self.failures.failed("CPU control temperature", &"no valid sample, fan speeds left unchanged");
            }
        }

        for pwm in &pwms {
            let Some(role) = pwm.role() else {
                continue;
            };

            let written = match target {
                Some(speed) if self.settings.control_enabled => {
                    let what = format!("fan{} pwm", pwm.number);
                    match pwm.pwm.write_value(hwmon::percent_to_pwm(speed)) {
                        Ok(()) => {
                            self.failures.recovered(&what);
                            Some(speed)
                        }
                        Err(e) => {
                            self.failures.failed(&what, &e);
                            None
                        }
                    }
                }
                _ => None,
            };

            let speed = written.or_else(|| pwm.pwm.read_value().ok().map(hwmon::pwm_to_percent));
            self.publish(role, temperatures.get(&role).copied(), speed);
        }
    }

    fn tick_telemetry_only(&mut self, hwmon_dir: &Path) {
        let temperatures = self.read_hwmon_temperatures(hwmon_dir);
        self.report_temperatures(&temperatures);

        let mut speeds = BTreeMap::new();
        for fan in hwmon::enumerate_fans(hwmon_dir) {
            if let Some(role) = fan.role() {
                speeds.entry(role).or_insert_with(|| fan.speed_percent());
            }
        }
        self.update_fan_roles(speeds.keys().copied().collect());

        let roles: BTreeSet<FanRole> = speeds.keys().chain(temperatures.keys()).copied().collect();
        for role in roles {
            let speed = speeds.get(&role).copied().flatten();
            self.publish(role, temperatures.get(&role).copied(), speed);
        }
    }

    fn tick_vendor(&mut self) {
        let available = self.vendor.is_available();
        self.note_vendor_availability(available);
        if !available {
            return;
        }

        if self.hardware_limits.is_none() {
            self.query_hardware_limits();
        }

        if self.settings.control_enabled && !self.manual_mode_enabled {
            // Set before the call so shutdown still hands control back if it fails.
            self.manual_mode_enabled = true;
            match self.vendor.set_manual_mode(true) {
                Ok(()) => info!("Manual fan mode enabled"),
                Err(e) => warn!("Failed to enable manual fan mode: {}", e),
            }
        }

        let count = match self.vendor.fan_count() {
            Ok(count) => {
                self.failures.recovered("vendor fan count");
                count
            }
            Err(e) => {
                self.failures.failed("vendor fan count", &e);
                return;
            }
        };
        let roles: Vec<FanRole> = (0..count).filter_map(FanRole::from_index).collect();
        self.update_fan_roles(roles.clone());

        let mut highest: Option<u8> = None;
        for &role in &roles {
            let temperature = self.read_vendor_temperature(role);
            if let Some(logic) = self.logics.get_mut(&role) {
                match temperature {
                    Some(celsius) => logic.report_temperature(celsius),
                    None => logic.clear_temperature(),
                }
                if let Some(speed) = logic.speed_percent() {
                    highest = Some(highest.map_or(speed, |h| h.max(speed)));
                }
            }
        }

        let limits = self.hardware_limits.unwrap_or_default();
        for &role in &roles {
            let logic = self.logics.get(&role);
            let own = logic.and_then(FanControlLogic::speed_percent);
            let temperature = logic.and_then(FanControlLogic::last_temperature);

            let target = if self.settings.same_speed || own.is_none() {
                highest
            } else {
                own
            };
            let target = target.map(|speed| limits.apply(speed));

            let written = match target {
                Some(speed) if self.settings.control_enabled => {
                    let what = format!("vendor fan {} speed", role.index());
                    match self.vendor.set_fan_speed_percent(role.index(), speed) {
                        Ok(()) => {
                            self.failures.recovered(&what);
                            Some(speed)
                        }
                        Err(e) => {
                            self.failures.failed(&what, &e);
                            None
                        }
                    }
                }
                _ => None,
            };

            let speed = written.or_else(|| self.vendor.fan_speed_percent(role.index()).ok().flatten());
            self.publish(role, temperature, speed);
        }
    }

    fn query_hardware_limits(&mut self) {
        if !self.vendor.is_available() {
            debug!("Vendor interface not available, hardware limits not queried");
            return;
        }
        match HardwareLimits::query(self.vendor.as_ref()) {
            Ok(limits) => {
                info!(
                    "Hardware fan limits: fans off {}, minimum speed {}%",
                    if limits.fans_off_available { "supported" } else { "not supported" },
                    limits.min_speed
                );
                self.hardware_limits = Some(limits);
            }
            Err(e) => warn!("Failed to query hardware fan limits: {}", e),
        }
    }

    fn read_vendor_temperature(&mut self, role: FanRole) -> Option<f32> {
        let what = format!("vendor fan {} temperature", role.index());
        match self.vendor.fan_temperature(role.index()) {
            Ok(temperature) => {
                self.failures.recovered(&what);
                temperature
            }
            Err(e) => {
                self.failures.failed(&what, &e);
                None
            }
        }
    }

    /// Temperatures of all labeled sensors; the first file per role wins
    fn read_hwmon_temperatures(&mut self, hwmon_dir: &Path) -> BTreeMap<FanRole, f32> {
        let mut temperatures = BTreeMap::new();
        for files in hwmon::enumerate_temps(hwmon_dir) {
            let Some(role) = files.role() else {
                continue;
            };
            let what = files.input.path().display().to_string();
            match files.read_celsius() {
                Ok(celsius) => {
                    self.failures.recovered(&what);
                    temperatures.entry(role).or_insert(celsius);
                }
                Err(e) => {
                    self.failures.failed(&what, &e);
                }
            }
        }
        temperatures
    }

    fn report_temperatures(&mut self, temperatures: &BTreeMap<FanRole, f32>) {
        for (role, logic) in self.logics.iter_mut() {
            match temperatures.get(role) {
                Some(&celsius) => logic.report_temperature(celsius),
                None => logic.clear_temperature(),
            }
        }
    }

    fn publish(&self, role: FanRole, temperature: Option<f32>, speed: Option<u8>) {
        let temperature = temperature.map_or(NO_SENSOR, |celsius| celsius.round() as i32);
        let speed = speed.map_or(NO_SENSOR, i32::from);
        self.telemetry.publish(
            role,
            FanSample {
                temperature: TimedValue::now(temperature),
                speed: TimedValue::now(speed),
            },
        );
    }
}

impl Drop for FanControlWorker {
    fn drop(&mut self) {
        self.on_exit();
    }
}

/// Curves for a profile, falling back to the default preset and finally to
/// full speed when the profile cannot be resolved
fn resolve_curves(profile: &FanProfile) -> ProfileCurves {
    if let Some(curves) = profile.curves() {
        return curves;
    }
    warn!(
        "Fan profile '{}' cannot be resolved, using '{}'",
        profile.name, DEFAULT_PRESET_NAME
    );
    preset(DEFAULT_PRESET_NAME).unwrap_or_else(|| ProfileCurves::constant(100))
}
