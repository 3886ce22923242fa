//! Main entry point for the fan control daemon

use anyhow::Context;
use clap::Parser;
use fan_control_daemon::{
    args::{Args, Commands},
    config::DaemonConfig,
    daemon::FanDaemon,
    hwmon, logging,
    profile::FanProfile,
    selector::ControlMode,
    vendor::UnavailableVendorApi,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Print version and build metadata for binary identity verification
    let pkg_version = env!("CARGO_PKG_VERSION");
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    let git_desc = option_env!("GIT_DESC").unwrap_or("unknown");
    let build_time = option_env!("BUILD_TIME").unwrap_or("unknown");
    eprintln!(
        "fan-control-daemon v{} (git {} / {}) built {}",
        pkg_version, git_hash, git_desc, build_time
    );

    let args = Args::parse();

    logging::setup(args.verbose, args.log_file.as_deref()).context("failed to set up logging")?;

    let config_path = DaemonConfig::get_config_path(args.config.as_deref());
    let config = DaemonConfig::load_or_default(&config_path)
        .with_context(|| format!("invalid configuration {}", config_path.display()))?;

    match args.command {
        Commands::Daemon => FanDaemon::new(config, Box::new(UnavailableVendorApi)).run().await,
        Commands::Probe => {
            probe(&config);
            Ok(())
        }
        Commands::Curve { profile } => print_curves(&config, profile.as_deref()),
    }
}

/// Print the detected control path and the files it would use
fn probe(config: &DaemonConfig) {
    let mode = config.selector().probe();
    println!("Control mode: {}", mode);

    let hwmon_dir = match &mode {
        ControlMode::DirectHwmon { hwmon: dir, pwm_device } => {
            println!("pwm device: {}", pwm_device.display());
            for pwm in hwmon::enumerate_pwms(pwm_device) {
                let value = pwm.pwm.read_value().map(hwmon::pwm_to_percent);
                let enable = pwm.enable.read_value();
                println!(
                    "  fan{}_pwm: {} (enable {})",
                    pwm.number,
                    value.map_or_else(|e| e.to_string(), |percent| format!("{}%", percent)),
                    enable.map_or_else(|e| e.to_string(), |mode| mode.to_string())
                );
            }
            Some(dir)
        }
        ControlMode::TelemetryOnlyHwmon { hwmon: dir } => Some(dir),
        ControlMode::VendorFallback => None,
    };

    if let Some(dir) = hwmon_dir {
        println!("hwmon: {}", dir.display());
        for temp in hwmon::enumerate_temps(dir) {
            let role = temp.role().map_or_else(|| "-".to_string(), |role| role.to_string());
            match temp.read_celsius() {
                Ok(celsius) => println!("  temp{} [{}]: {:.1}°C", temp.number, role, celsius),
                Err(e) => println!("  temp{} [{}]: {}", temp.number, role, e),
            }
        }
        for fan in hwmon::enumerate_fans(dir) {
            let role = fan.role().map_or_else(|| "-".to_string(), |role| role.to_string());
            match fan.speed_percent() {
                Some(percent) => println!("  fan{} [{}]: {}%", fan.number, role, percent),
                None => println!("  fan{} [{}]: no speed reading", fan.number, role),
            }
        }
    }
}

/// Print the interpolated tables of a named profile, or of the configured one
fn print_curves(config: &DaemonConfig, name: Option<&str>) -> anyhow::Result<()> {
    let profile = match name {
        Some(name) if name == config.profile.name => config.profile.clone(),
        Some(name) => FanProfile::preset(name)?,
        None => config.profile.clone(),
    };
    let curves = profile
        .curves()
        .with_context(|| format!("fan profile {} has no curves", profile.name))?;

    println!("Profile: {}", profile.name);
    println!("{:>6} {:>6} {:>6}", "temp", "cpu", "gpu");
    let cpu = curves.cpu.interpolate();
    let gpu = curves.gpu.interpolate();
    for ((temp, cpu_speed), (_, gpu_speed)) in cpu.entries().zip(gpu.entries()) {
        println!(
            "{:>4}°C {:>5}% {:>5}%",
            temp,
            profile.limits.apply(cpu_speed),
            profile.limits.apply(gpu_speed)
        );
    }
    Ok(())
}
