//! Typed access to single sysfs control points
//!
//! Every call goes straight to the underlying file: there is no caching, so a
//! value read here is always the one the kernel reported at that moment.

use crate::errors::PropertyError;
use std::fmt::Display;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A sensor or actuator file holding a single value of type `T`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsProperty<T> {
    path: PathBuf,
    _value: PhantomData<fn() -> T>,
}

/// Integer-valued node such as `temp1_input` or `fan1_pwm`
pub type NumericProperty = SysfsProperty<i64>;

/// Text-valued node such as `fan1_label`; reads are trimmed
pub type TextProperty = SysfsProperty<String>;

impl<T> SysfsProperty<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _value: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the node exists and its metadata can be queried. Never fails.
    pub fn is_available(&self) -> bool {
        fs::metadata(&self.path)
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    fn read_raw(&self) -> Result<String, PropertyError> {
        fs::read_to_string(&self.path)
            .map(|content| content.trim().to_string())
            .map_err(|e| PropertyError::from_io(self.path.clone(), e))
    }
}

impl<T: FromStr> SysfsProperty<T> {
    /// Read and parse the current value
    pub fn read_value(&self) -> Result<T, PropertyError> {
        let content = self.read_raw()?;
        content.parse().map_err(|_| PropertyError::Malformed {
            path: self.path.clone(),
            content,
        })
    }
}

impl<T: Display> SysfsProperty<T> {
    /// Write a value. The node must already exist; sysfs attributes are never created.
    pub fn write_value(&self, value: T) -> Result<(), PropertyError> {
        if !self.path.exists() {
            return Err(PropertyError::Absent {
                path: self.path.clone(),
            });
        }
        fs::write(&self.path, value.to_string())
            .map_err(|e| PropertyError::from_io(self.path.clone(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_numeric_and_text() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("temp1_input"), "45000\n").unwrap();
        fs::write(dir.path().join("temp1_label"), "  cpu0 \n").unwrap();

        let input = NumericProperty::new(dir.path().join("temp1_input"));
        let label = TextProperty::new(dir.path().join("temp1_label"));

        assert!(input.is_available());
        assert_eq!(input.read_value().unwrap(), 45000);
        assert_eq!(label.read_value().unwrap(), "cpu0");
    }

    #[test]
    fn test_absent_is_distinguished_from_malformed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("fan1_input"), "not a number").unwrap();

        let missing = NumericProperty::new(dir.path().join("fan2_input"));
        assert!(!missing.is_available());
        assert!(missing.read_value().unwrap_err().is_absent());

        let malformed = NumericProperty::new(dir.path().join("fan1_input"));
        let err = malformed.read_value().unwrap_err();
        assert!(!err.is_absent());
        assert!(matches!(err, PropertyError::Malformed { ref content, .. } if content == "not a number"));
    }

    #[test]
    fn test_write_requires_existing_node() {
        let dir = TempDir::new().unwrap();
        let pwm_path = dir.path().join("fan1_pwm");
        fs::write(&pwm_path, "0").unwrap();

        let pwm = NumericProperty::new(&pwm_path);
        pwm.write_value(128).unwrap();
        assert_eq!(fs::read_to_string(&pwm_path).unwrap(), "128");

        let missing = NumericProperty::new(dir.path().join("fan2_pwm"));
        assert!(missing.write_value(128).unwrap_err().is_absent());
        assert!(!dir.path().join("fan2_pwm").exists());
    }

    #[test]
    fn test_directory_is_not_available() {
        let dir = TempDir::new().unwrap();
        let prop = TextProperty::new(dir.path());
        assert!(!prop.is_available());
    }
}
