//! Server assembly.
//!
//! The builder owns everything plugins may change: the packet registries,
//! the inbound transformer and the lobby join hook. [`ServerBuilder::build`]
//! freezes them into a [`GameServer`].

use super::core::GameServer;
use crate::config::ServerConfig;
use crate::context::ServerPacketRegistries;
use crate::lobby::{ExactCodeJoin, LobbyJoinHook, SharedJoinHook};
use crate::plugin::Plugin;
use crate::preprocess::{InboundPacketTransformer, PassthroughTransformer};
use polaris_event_system::{EventSystem, HandlerSnapshot};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a plugin's registration can change, captured before it runs.
pub struct BuilderCheckpoint {
    packets: ServerPacketRegistries,
    transformer: Option<Arc<dyn InboundPacketTransformer>>,
    join_hook: Option<SharedJoinHook>,
    handlers: HandlerSnapshot,
}

impl std::fmt::Debug for BuilderCheckpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderCheckpoint")
            .field("packets", &self.packets)
            .field("has_transformer", &self.transformer.is_some())
            .field("has_join_hook", &self.join_hook.is_some())
            .finish()
    }
}

pub struct ServerBuilder {
    config: ServerConfig,
    events: Arc<EventSystem>,
    packets: ServerPacketRegistries,
    transformer: Option<Arc<dyn InboundPacketTransformer>>,
    join_hook: Option<SharedJoinHook>,
    plugins: Vec<Box<dyn Plugin>>,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_event_system(config, Arc::new(EventSystem::new()))
    }

    pub fn with_event_system(config: ServerConfig, events: Arc<EventSystem>) -> Self {
        Self {
            config,
            events,
            packets: ServerPacketRegistries::new(),
            transformer: None,
            join_hook: None,
            plugins: Vec::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn events(&self) -> Arc<EventSystem> {
        self.events.clone()
    }

    pub fn packets(&self) -> &ServerPacketRegistries {
        &self.packets
    }

    pub fn packets_mut(&mut self) -> &mut ServerPacketRegistries {
        &mut self.packets
    }

    /// Installs the inbound preprocessor. The last installation wins.
    pub fn set_inbound_transformer(&mut self, transformer: impl InboundPacketTransformer) -> &mut Self {
        if self.transformer.is_some() {
            warn!("⚠️ Replacing the installed inbound packet transformer");
        }
        self.transformer = Some(Arc::new(transformer));
        self
    }

    pub fn has_inbound_transformer(&self) -> bool {
        self.transformer.is_some()
    }

    /// Installs the lobby join hook. The last installation wins.
    pub fn set_lobby_join_hook(&mut self, hook: impl LobbyJoinHook) -> &mut Self {
        if self.join_hook.is_some() {
            warn!("⚠️ Replacing the installed lobby join hook");
        }
        self.join_hook = Some(Arc::new(hook));
        self
    }

    /// Hands a registered plugin unit to the server, which keeps it until close.
    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Captures packets, transformer, join hook and event handlers.
    pub fn checkpoint(&self) -> BuilderCheckpoint {
        BuilderCheckpoint {
            packets: self.packets.clone(),
            transformer: self.transformer.clone(),
            join_hook: self.join_hook.clone(),
            handlers: self.events.handler_snapshot(),
        }
    }

    /// Undoes every registration made since `checkpoint` was taken.
    pub async fn rollback(&mut self, checkpoint: BuilderCheckpoint) {
        self.packets = checkpoint.packets;
        self.transformer = checkpoint.transformer;
        self.join_hook = checkpoint.join_hook;
        self.events.restore_handlers(&checkpoint.handlers).await;
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|plugin| plugin.name().to_string()).collect()
    }

    pub fn build(self) -> GameServer {
        info!(
            "🧩 Packet registries frozen: {} root, {} game-data, {} rpc",
            self.packets.root.len(),
            self.packets.game_data.len(),
            self.packets.rpc.len()
        );

        GameServer::new(
            self.config,
            self.events,
            self.packets,
            self.transformer.unwrap_or_else(|| Arc::new(PassthroughTransformer)),
            self.join_hook.unwrap_or_else(|| Arc::new(ExactCodeJoin)),
            self.plugins,
        )
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .field("packets", &self.packets)
            .field("has_transformer", &self.transformer.is_some())
            .field("has_join_hook", &self.join_hook.is_some())
            .field("plugins", &self.plugin_names())
            .finish()
    }
}
