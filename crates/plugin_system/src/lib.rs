//! Plugin discovery and bootstrap.
//!
//! Plugins are compiled into the server binary and listed in a
//! [`PluginCatalog`]. At startup the [`PluginManager`] decides which of them
//! to instantiate by scanning the plugins folder for `*.npplugin` entries and
//! the host manifest for dependencies flagged as plugins, then lets each
//! instantiated plugin register itself on the
//! [`ServerBuilder`](game_server::ServerBuilder).

mod catalog;
mod config;
mod error;
pub mod folder;
mod manager;
pub mod package;

pub use catalog::PluginCatalog;
pub use config::{PluginsConfig, DEFAULT_PLUGIN_SUFFIX};
pub use error::PluginSystemError;
pub use manager::{LoadedPlugin, PluginManager, PluginSource};

/// Re-export commonly used types for plugin development
pub use game_server::{Plugin, PluginFactory, ServerBuilder};
pub use polaris_event_system::{PluginError, PluginVersion};

#[cfg(test)]
mod tests;
