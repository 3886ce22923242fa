//! Command line argument parsing for the fan control daemon

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Fan control daemon
///
/// Drives laptop fans from temperature curves through the vendor hwmon and
/// pwm sysfs nodes, falling back to the vendor driver interface.
#[derive(Parser, Debug)]
#[command(name = "fan-control-daemon")]
#[command(about = "Curve based fan control daemon")]
#[command(version)]
pub struct Args {
    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (default: $FAN_CONTROL_DAEMON_CONFIG or /etc/fan-control-daemon/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also append log output to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the daemon
    Daemon,
    /// Detect the fan control path and list the sensor and pwm files, without writing anything
    Probe,
    /// Print the interpolated CPU and GPU tables of a fan profile
    Curve {
        /// Profile name (default: the configured profile)
        #[arg(long)]
        profile: Option<String>,
    },
}
