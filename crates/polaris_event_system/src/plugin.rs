//! # Plugin Contracts
//!
//! Types shared by every plugin unit and the bootstrap that loads them:
//! the [`PluginVersion`] triple and the [`PluginError`] taxonomy. The
//! registration trait itself lives next to the server it registers into.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic version of a plugin unit, rendered `major.minor.patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PluginVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for PluginVersion {
    type Err = PluginError;

    /// Parses `major[.minor[.patch]]`; pre-release and build suffixes are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let core = s
            .trim()
            .trim_start_matches('v')
            .split(['-', '+'])
            .next()
            .unwrap_or_default();

        let mut parts = [0u32; 3];
        let mut count = 0;
        for (index, part) in core.split('.').enumerate() {
            if index >= parts.len() {
                return Err(PluginError::InvalidVersion(s.to_string()));
            }
            parts[index] = part
                .parse()
                .map_err(|_| PluginError::InvalidVersion(s.to_string()))?;
            count += 1;
        }

        if count == 0 {
            return Err(PluginError::InvalidVersion(s.to_string()));
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

/// Errors raised by plugin units during construction and registration.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The plugin could not be constructed
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),
    /// Packet or handler registration failed
    #[error("Plugin registration failed: {0}")]
    RegistrationFailed(String),
    /// Error during normal operation or shutdown
    #[error("Plugin execution error: {0}")]
    ExecutionError(String),
    #[error("Invalid plugin version: {0}")]
    InvalidVersion(String),
}

impl From<polaris_protocol::RegistryError> for PluginError {
    fn from(error: polaris_protocol::RegistryError) -> Self {
        PluginError::RegistrationFailed(error.to_string())
    }
}

impl From<crate::EventError> for PluginError {
    fn from(error: crate::EventError) -> Self {
        PluginError::RegistrationFailed(error.to_string())
    }
}
