//! Driver identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Name and version of a device driver, e.g. `ZigbeeSwitch 2.3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverId {
    pub name: String,
    pub version: String,
}

impl DriverId {
    /// Create a driver id.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] when `name` is empty.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(Self {
            name,
            version: version.into(),
        })
    }

    /// Driver id without a version (drivers loaded outside of a catalog).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] when `name` is empty.
    pub fn unversioned(name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(name, "0.0")
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}
