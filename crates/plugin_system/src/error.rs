//! Error types for the plugin system.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginSystemError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid plugin manifest {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    #[error("Plugin {0} could not be instantiated: {1}")]
    InstantiationFailed(String, polaris_event_system::PluginError),

    #[error("Plugin {0} failed to register: {1}")]
    RegistrationFailed(String, polaris_event_system::PluginError),

    #[error("Package {0} is not installed")]
    PackageNotFound(String),
}

impl PluginSystemError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PluginSystemError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn manifest(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        PluginSystemError::InvalidManifest {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
