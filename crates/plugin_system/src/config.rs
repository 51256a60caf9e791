//! Discovery settings, the `[plugins]` section of the server config.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PLUGIN_SUFFIX: &str = ".npplugin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Folder scanned for `*.npplugin` folders and manifest files
    pub directory: PathBuf,

    /// Name suffix marking an entry of `directory` as a plugin
    pub suffix: String,

    /// Host manifest whose `[dependencies]` are probed for plugin packages
    pub package_manifest: PathBuf,

    /// Folder holding one sub-folder (with a `Cargo.toml`) per dependency
    pub package_directory: PathBuf,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("plugins"),
            suffix: DEFAULT_PLUGIN_SUFFIX.to_string(),
            package_manifest: PathBuf::from("Cargo.toml"),
            package_directory: PathBuf::from("packages"),
        }
    }
}
