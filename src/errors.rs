//! Error types for the fan control daemon

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for the fan control daemon
pub type Result<T> = std::result::Result<T, FanControlError>;

/// Main error type for the fan control daemon
#[derive(Error, Debug)]
pub enum FanControlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("DBus error: {0}")]
    DBus(#[from] zbus::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid fan curve: {0}")]
    InvalidCurve(String),

    #[error("Invalid fan curve point: temperature {temp}°C, speed {speed}%")]
    InvalidFanPoint { temp: i16, speed: u8 },

    #[error("Fan profile not found: {name}")]
    ProfileNotFound { name: String },

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error("Vendor interface error: {0}")]
    Vendor(String),
}

/// Outcome of a failed access to a single sysfs control point.
///
/// `Absent` is an expected condition (the node is simply not exposed on this
/// host) and must never be conflated with a node that exists but cannot be
/// read or written.
#[derive(Error, Debug)]
pub enum PropertyError {
    #[error("{} does not exist", path.display())]
    Absent { path: PathBuf },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed content in {}: {content:?}", path.display())]
    Malformed { path: PathBuf, content: String },
}

impl PropertyError {
    /// True when the node does not exist at all
    pub fn is_absent(&self) -> bool {
        matches!(self, PropertyError::Absent { .. })
    }

    pub(crate) fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            PropertyError::Absent { path }
        } else {
            PropertyError::Io { path, source }
        }
    }
}

/// Helper function to convert display errors to zbus errors
pub fn zbus_error_from_display(err: impl std::fmt::Display) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(format!("{}", err))
}
