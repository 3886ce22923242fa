//! Daemon implementation: fixed-period control loop, signal handling and the
//! D-Bus surface

use crate::{
    config::DaemonConfig,
    curve::FanPoint,
    errors::zbus_error_from_display,
    fan_control::FanControlWorker,
    fan_logic::{FanRole, SpeedLimits},
    profile::{self, FanProfile, ProfileSource, SharedProfile, CUSTOM_PROFILE_NAME},
    selector::ControlMode,
    telemetry::FanTelemetry,
    vendor::VendorFanApi,
    DBUS_INTERFACE_NAME, DBUS_OBJECT_PATH, DBUS_SERVICE_NAME,
};
use anyhow::Context;
use log::{debug, info, warn};
use tokio::{
    signal::unix::{signal, Signal, SignalKind},
    time::{interval, MissedTickBehavior},
};
use zbus::{dbus_interface, Connection, ConnectionBuilder};

/// SIGINT, SIGHUP and SIGTERM listeners
struct ShutdownSignals {
    int: Signal,
    hup: Signal,
    term: Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            int: signal(SignalKind::interrupt())?,
            hup: signal(SignalKind::hangup())?,
            term: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the first of the three signals and return its name
    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.int.recv() => "SIGINT",
            _ = self.hup.recv() => "SIGHUP",
            _ = self.term.recv() => "SIGTERM"
        }
    }
}

/// Main daemon structure
pub struct FanDaemon {
    config: DaemonConfig,
    vendor: Box<dyn VendorFanApi>,
    profile: SharedProfile,
    telemetry: FanTelemetry,
}

impl FanDaemon {
    /// `vendor` is the driver binding used when no vendor hwmon device is found
    pub fn new(config: DaemonConfig, vendor: Box<dyn VendorFanApi>) -> Self {
        let profile = config.profile_source();
        Self {
            config,
            vendor,
            profile,
            telemetry: FanTelemetry::new(),
        }
    }

    pub fn profile(&self) -> &SharedProfile {
        &self.profile
    }

    pub fn telemetry(&self) -> &FanTelemetry {
        &self.telemetry
    }

    /// Worker for `mode` wired to this daemon's vendor interface, profile and
    /// telemetry
    fn into_worker(self, mode: ControlMode) -> FanControlWorker {
        FanControlWorker::new(
            mode,
            self.config.worker_settings(),
            self.vendor,
            Box::new(self.profile),
            Box::new(self.telemetry),
        )
    }

    /// Run until a termination signal arrives, then hand the fans back to
    /// automatic control
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting fan control daemon");

        let mut signals = ShutdownSignals::install().context("unable to install signal handlers")?;

        let mode = self.config.selector().probe();
        let poll_interval = self.config.poll_interval();
        let dbus = self.config.dbus;
        let interface = FanControlInterface::new(mode.clone(), self.profile.clone(), self.telemetry.clone());
        let mut worker = self.into_worker(mode);

        // Kept alive for the lifetime of the loop
        let _connection = if dbus {
            match serve_dbus(interface).await {
                Ok(connection) => {
                    info!(
                        "Registered {} DBus interface {} at {}",
                        DBUS_SERVICE_NAME, DBUS_INTERFACE_NAME, DBUS_OBJECT_PATH
                    );
                    Some(connection)
                }
                Err(e) => {
                    warn!("Failed to register DBus interface, continuing without it: {}", e);
                    None
                }
            }
        } else {
            None
        };

        worker.on_start();

        let mut ticks = interval(poll_interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                sig = signals.recv() => {
                    info!("caught signal: {}", sig);
                    break;
                }
                _ = ticks.tick() => worker.on_work(),
            }
        }

        worker.on_exit();

        info!("daemon exited from loop");
        Ok(())
    }
}

async fn serve_dbus(interface: FanControlInterface) -> zbus::Result<Connection> {
    ConnectionBuilder::system()?
        .name(DBUS_SERVICE_NAME)?
        .serve_at(DBUS_OBJECT_PATH, interface)?
        .build()
        .await
}

/// Read-mostly D-Bus view of the worker: telemetry, control mode and the
/// active profile
pub struct FanControlInterface {
    mode: ControlMode,
    profile: SharedProfile,
    telemetry: FanTelemetry,
}

impl FanControlInterface {
    pub fn new(mode: ControlMode, profile: SharedProfile, telemetry: FanTelemetry) -> Self {
        Self {
            mode,
            profile,
            telemetry,
        }
    }

    fn role(number: u8) -> zbus::fdo::Result<FanRole> {
        FanRole::from_number(number)
            .ok_or_else(|| zbus_error_from_display(format!("Unknown fan role: {}", number)))
    }
}

#[dbus_interface(name = "com.fancontrol.Daemon")]
impl FanControlInterface {
    /// Name of the control path picked at startup
    async fn get_control_mode(&self) -> String {
        self.mode.name().to_string()
    }

    /// Latest `(timestamp, temperature)` and `(timestamp, speed)` of a fan role
    async fn get_fan_data(&self, role: u8) -> zbus::fdo::Result<((i64, i32), (i64, i32))> {
        let role = Self::role(role)?;
        let sample = self
            .telemetry
            .latest(role)
            .ok_or_else(|| zbus_error_from_display(format!("No data for {} fan yet", role)))?;
        Ok((sample.temperature.as_tuple(), sample.speed.as_tuple()))
    }

    /// Control points of the curve the given role currently follows
    async fn get_fan_curve(&self, role: u8) -> zbus::fdo::Result<Vec<FanPoint>> {
        let role = Self::role(role)?;
        let active = self.profile.active_profile();
        let curves = active
            .curves()
            .ok_or_else(|| zbus_error_from_display(format!("Fan profile {} has no curves", active.name)))?;
        Ok(curves.for_kind(role.logic_kind()).points().to_vec())
    }

    async fn get_fan_profile(&self) -> String {
        self.profile.active_profile().name
    }

    async fn list_fan_profiles(&self) -> Vec<String> {
        let mut names: Vec<String> = profile::PRESET_NAMES.iter().map(|name| name.to_string()).collect();
        if self.profile.active_profile().custom.is_some() {
            names.push(CUSTOM_PROFILE_NAME.to_string());
        }
        names
    }

    /// Select a preset, or the custom curves when present. Not persisted.
    async fn set_fan_profile(&self, name: &str) -> zbus::fdo::Result<()> {
        debug!("Setting fan profile to {}", name);
        let mut selected = self.profile.active_profile();
        if name == CUSTOM_PROFILE_NAME {
            if selected.custom.is_none() {
                return Err(zbus_error_from_display("No custom fan curves configured"));
            }
        } else {
            FanProfile::preset(name).map_err(zbus_error_from_display)?;
        }

        selected.name = name.to_string();
        self.profile.replace(selected);
        info!("Fan profile set to: {}", name);
        Ok(())
    }

    async fn set_speed_limits(&self, minimum: u8, maximum: u8, offset: u8) -> zbus::fdo::Result<()> {
        let limits = SpeedLimits::new(minimum, maximum, offset).map_err(zbus_error_from_display)?;
        self.profile.update(|active| active.limits = limits);
        info!("Fan speed limits set to min {}%, max {}%, offset {}%", minimum, maximum, offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::FanCurve;
    use crate::profile::ProfileCurves;
    use crate::errors::Result;
    use crate::telemetry::{FanSample, TelemetrySink, TimedValue};
    use std::sync::{Arc, Mutex};
    use zbus::Interface;

    /// Vendor binding with one fan at a fixed temperature, recording writes
    #[derive(Debug, Clone, Default)]
    struct RecordingVendor {
        writes: Arc<Mutex<Vec<(u8, u8)>>>,
    }

    impl VendorFanApi for RecordingVendor {
        fn is_available(&self) -> bool {
            true
        }

        fn fan_count(&self) -> Result<u8> {
            Ok(1)
        }

        fn fans_off_available(&self) -> Result<bool> {
            Ok(true)
        }

        fn fans_min_speed(&self) -> Result<u8> {
            Ok(0)
        }

        fn fan_speed_percent(&self, _index: u8) -> Result<Option<u8>> {
            Ok(None)
        }

        fn set_fan_speed_percent(&self, index: u8, percent: u8) -> Result<()> {
            self.writes.lock().unwrap().push((index, percent));
            Ok(())
        }

        fn fan_temperature(&self, _index: u8) -> Result<Option<f32>> {
            Ok(Some(95.0))
        }

        fn set_fans_auto(&self) -> Result<()> {
            Ok(())
        }

        fn set_manual_mode(&self, _enabled: bool) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_daemon_drives_injected_vendor_binding() {
        let vendor = RecordingVendor::default();
        let daemon = FanDaemon::new(DaemonConfig::default(), Box::new(vendor.clone()));
        let telemetry = daemon.telemetry().clone();
        assert_eq!(daemon.profile().active_profile().name, "Balanced");

        let mut worker = daemon.into_worker(ControlMode::VendorFallback);
        worker.on_start();
        worker.on_work();

        // Balanced CPU curve at 95°C
        assert_eq!(*vendor.writes.lock().unwrap(), vec![(0, 100)]);
        assert_eq!(telemetry.latest(FanRole::Cpu).unwrap().speed.value, 100);
    }

    #[test]
    fn test_interface_name_matches_constant() {
        assert_eq!(FanControlInterface::name().as_str(), DBUS_INTERFACE_NAME);
    }

    fn interface(profile: FanProfile) -> (FanControlInterface, SharedProfile, FanTelemetry) {
        let shared = SharedProfile::new(profile);
        let telemetry = FanTelemetry::new();
        let iface = FanControlInterface::new(ControlMode::VendorFallback, shared.clone(), telemetry.clone());
        (iface, shared, telemetry)
    }

    #[tokio::test]
    async fn test_get_fan_data() {
        let (iface, _, telemetry) = interface(FanProfile::default());
        assert!(iface.get_fan_data(1).await.is_err());
        assert!(iface.get_fan_data(0).await.is_err());
        assert!(iface.get_fan_data(4).await.is_err());

        let sample = FanSample {
            temperature: TimedValue::now(55),
            speed: TimedValue::now(40),
        };
        telemetry.publish(FanRole::Gpu1, sample);

        let (temperature, speed) = iface.get_fan_data(2).await.unwrap();
        assert_eq!(temperature, sample.temperature.as_tuple());
        assert_eq!(speed.1, 40);
        assert_eq!(iface.get_control_mode().await, "VendorFallback");
    }

    #[tokio::test]
    async fn test_set_fan_profile() {
        let (iface, shared, _) = interface(FanProfile::default());
        iface.set_fan_profile("Silent").await.unwrap();
        assert_eq!(shared.active_profile().name, "Silent");
        assert_eq!(iface.get_fan_profile().await, "Silent");

        assert!(iface.set_fan_profile("Turbo").await.is_err());
        assert!(iface.set_fan_profile(CUSTOM_PROFILE_NAME).await.is_err());
        assert_eq!(shared.active_profile().name, "Silent");
        assert_eq!(iface.list_fan_profiles().await, vec!["Silent", "Balanced", "Cool", "Maximum"]);
    }

    #[tokio::test]
    async fn test_switch_between_custom_and_preset_keeps_curves() {
        let curves = ProfileCurves {
            cpu: FanCurve::from_pairs(&[(40, 30), (60, 70)]).unwrap(),
            gpu: FanCurve::constant(50),
        };
        let (iface, shared, _) = interface(FanProfile::custom(curves.clone(), SpeedLimits::default()));
        assert!(iface.list_fan_profiles().await.contains(&CUSTOM_PROFILE_NAME.to_string()));
        assert_eq!(iface.get_fan_curve(1).await.unwrap(), curves.cpu.points().to_vec());

        iface.set_fan_profile("Maximum").await.unwrap();
        assert_eq!(iface.get_fan_curve(2).await.unwrap(), vec![FanPoint::new(0, 100)]);

        iface.set_fan_profile(CUSTOM_PROFILE_NAME).await.unwrap();
        assert_eq!(shared.active_profile().curves(), Some(curves));
    }

    #[tokio::test]
    async fn test_set_speed_limits() {
        let (iface, shared, _) = interface(FanProfile::default());
        iface.set_speed_limits(20, 80, 5).await.unwrap();
        assert_eq!(shared.active_profile().limits, SpeedLimits::new(20, 80, 5).unwrap());

        assert!(iface.set_speed_limits(80, 20, 0).await.is_err());
        assert!(iface.set_speed_limits(0, 120, 0).await.is_err());
        assert_eq!(shared.active_profile().limits.minimum, 20);
    }
}
