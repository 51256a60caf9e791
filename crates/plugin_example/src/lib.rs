//! # Example Plugin
//!
//! Demonstrates every extension point of the server:
//!
//! - a custom packet on each layer (root `0x40`, game data `0x50`, RPC `0x60`),
//! - the signed-envelope inbound transformer,
//! - a lobby join hook that sends players asking for `"RANDOM"` to a random
//!   public lobby with room left,
//! - a `core:custom_packet` subscriber.
//!
//! Enable it with a folder plugin whose manifest names the entry:
//!
//! ```toml
//! # plugins/example.npplugin/index.toml
//! entry = "example"
//! ```

use async_trait::async_trait;
use game_server::{
    AuthenticatingTransformer, ExactCodeJoin, LobbyCode, LobbyJoinHook, LobbyTable, PacketContext,
    Plugin, ServerBuilder, UserConfig,
};
use polaris_event_system::{CustomPacketEvent, PluginError, PluginVersion};
use polaris_protocol::{PacketLayer, PacketPayload};
use rand::seq::SliceRandom;
use tracing::{debug, info};

pub mod packets;

pub use packets::{
    TestGameDataPacket, TestPacket, TestRpcPacket, TEST_GAME_DATA_OPCODE, TEST_PACKET_OPCODE,
    TEST_RPC_OPCODE,
};

/// Catalog key folder manifests use to select this plugin.
pub const PLUGIN_KEY: &str = "example";

/// Lobby code that asks for a random public lobby.
pub const RANDOM_LOBBY: &str = "RANDOM";

/// Catalog factory.
pub fn create_plugin() -> Result<Box<dyn Plugin>, PluginError> {
    Ok(Box::new(ExamplePlugin::new()))
}

/// Users accepted when the server config lists none.
pub fn sample_users() -> Vec<UserConfig> {
    [
        (
            "ec4435dfe404482b8e8a0946e12a9f9a",
            "3a6adcf92fec282614f9a77b9ad5d24bcacab84522631eaa789c05090156ca5135a4753236142993",
            "Cody",
        ),
        (
            "fc54bb9de1434234986b7bd873e93c86",
            "07f34399f3162ad5baf871f41646259e7b9d8cebb045b6e4648222de0cb38fe1b9a28bc177794648",
            "Rose",
        ),
        (
            "3af27ba3f117422fb399093a1393ec0e",
            "5848db9438bf15b53703e00b4b37fa1df7088002e197a7bb6b8b241c403691a9faf13364b32d72b4",
            "Sanae",
        ),
    ]
    .into_iter()
    .map(|(client_id, token, name)| UserConfig {
        client_id: client_id.to_string(),
        token: token.to_string(),
        name: name.to_string(),
    })
    .collect()
}

#[derive(Debug, Default)]
pub struct ExamplePlugin {
    registered: bool,
}

impl ExamplePlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Plugin for ExamplePlugin {
    fn name(&self) -> &str {
        "Test Plugin"
    }

    fn version(&self) -> PluginVersion {
        PluginVersion::new(1, 2, 3)
    }

    async fn register(&mut self, server: &mut ServerBuilder) -> Result<(), PluginError> {
        info!("🧪 ExamplePlugin: registering test packets");

        let packets = server.packets_mut();
        packets
            .layer_mut(PacketLayer::Root)
            .register_packet(TEST_PACKET_OPCODE, TestPacket::deserialize, handle_test_packet)?;
        packets.layer_mut(PacketLayer::GameData).register_packet(
            TEST_GAME_DATA_OPCODE,
            TestGameDataPacket::deserialize,
            handle_test_game_data_packet,
        )?;
        packets
            .layer_mut(PacketLayer::Rpc)
            .register_packet(TEST_RPC_OPCODE, TestRpcPacket::deserialize, handle_test_rpc_packet)?;

        let mut auth = server.config().auth.clone();
        if auth.users.is_empty() {
            info!("🧪 ExamplePlugin: no users configured, accepting the sample users");
            auth.users = sample_users();
        }
        let transformer = AuthenticatingTransformer::from_config(&auth)
            .map_err(|e| PluginError::InitializationFailed(e.to_string()))?;
        server.set_inbound_transformer(transformer);
        server.set_lobby_join_hook(RandomLobbyJoin);

        server
            .events()
            .on_core("custom_packet", |event: CustomPacketEvent| {
                debug!(
                    target: "custom_packet",
                    "{} packet 0x{:02x} ({}) from connection {}",
                    event.layer,
                    event.opcode,
                    event.packet_type,
                    event.connection_id
                );
                Ok(())
            })
            .await?;

        self.registered = true;
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<(), PluginError> {
        if self.registered {
            info!("🧪 ExamplePlugin: shutting down");
        }
        Ok(())
    }
}

/// Joins a random open public lobby for [`RANDOM_LOBBY`], and the exact
/// lobby otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomLobbyJoin;

impl LobbyJoinHook for RandomLobbyJoin {
    fn resolve(&self, requested: &str, lobbies: &LobbyTable) -> Option<LobbyCode> {
        if requested != RANDOM_LOBBY {
            return ExactCodeJoin.resolve(requested, lobbies);
        }

        lobbies.joinable_public().choose(&mut rand::thread_rng()).copied()
    }
}

fn handle_test_packet(ctx: &PacketContext, packet: &TestPacket) {
    match ctx.connection.lobby() {
        Some(lobby) => debug!(
            target: "test_packet",
            "Received TestPacket from connection {} in lobby {}: {}",
            ctx.connection.id(),
            lobby,
            packet.message
        ),
        None => debug!(
            target: "test_packet",
            "Received TestPacket from connection {}: {}",
            ctx.connection.id(),
            packet.message
        ),
    }
}

fn handle_test_game_data_packet(ctx: &PacketContext, packet: &TestGameDataPacket) {
    let lobby = ctx.lobby_code.map(|code| code.to_string()).unwrap_or_default();
    debug!(
        target: "test_game_data_packet",
        "Received TestGameDataPacket from connection {} for lobby {}: {}",
        ctx.connection.id(),
        lobby,
        packet.message
    );
}

fn handle_test_rpc_packet(ctx: &PacketContext, packet: &TestRpcPacket) {
    let Some(net_id) = ctx.net_id else {
        return;
    };

    debug!(
        target: "test_rpc_packet",
        "Received TestRpcPacket from connection {} (object #{}): {}",
        ctx.connection.id(),
        net_id,
        packet.message
    );
}

#[cfg(test)]
mod tests;
