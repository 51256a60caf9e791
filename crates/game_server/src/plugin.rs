//! # Plugin Capability
//!
//! A plugin unit is compiled into the binary and instantiated by the
//! bootstrap. During [`Plugin::register`] it gets mutable access to the
//! [`ServerBuilder`] and can:
//!
//! - register custom packets on any layer
//!   ([`ServerBuilder::packets_mut`]),
//! - install the inbound preprocessor
//!   ([`ServerBuilder::set_inbound_transformer`]),
//! - install a lobby join hook ([`ServerBuilder::set_lobby_join_hook`]),
//! - subscribe to server events ([`ServerBuilder::events`]).
//!
//! Registration is complete before the server starts listening; the packet
//! tables are frozen afterwards.

use crate::server::ServerBuilder;
use async_trait::async_trait;
use polaris_event_system::{PluginError, PluginVersion};

#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Unique, stable name used in logs and plugin events.
    fn name(&self) -> &str;

    fn version(&self) -> PluginVersion;

    /// Registers packets, hooks and event handlers.
    ///
    /// Errors abort startup for folder plugins and are logged and skipped
    /// for package plugins.
    async fn register(&mut self, server: &mut ServerBuilder) -> Result<(), PluginError>;

    /// Called once while the server closes.
    async fn on_shutdown(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Constructor stored in the plugin catalog.
pub type PluginFactory = fn() -> Result<Box<dyn Plugin>, PluginError>;
