//! Context handed to packet handlers.

use crate::connection::Connection;
use crate::lobby::LobbyCode;
use polaris_protocol::PacketLayer;
use std::sync::Arc;

/// Where a packet came from.
///
/// `lobby_code` is set for game-data and RPC packets (taken from the
/// enclosing root carrier); `net_id` is the RPC sender and is set for RPC
/// packets only.
#[derive(Debug, Clone)]
pub struct PacketContext {
    pub connection: Arc<Connection>,
    pub layer: PacketLayer,
    pub lobby_code: Option<LobbyCode>,
    pub net_id: Option<u32>,
}

impl PacketContext {
    pub fn root(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            layer: PacketLayer::Root,
            lobby_code: None,
            net_id: None,
        }
    }

    pub(crate) fn game_data(&self, lobby_code: LobbyCode) -> Self {
        Self {
            connection: self.connection.clone(),
            layer: PacketLayer::GameData,
            lobby_code: Some(lobby_code),
            net_id: None,
        }
    }

    pub(crate) fn rpc(&self, net_id: u32) -> Self {
        Self {
            connection: self.connection.clone(),
            layer: PacketLayer::Rpc,
            lobby_code: self.lobby_code,
            net_id: Some(net_id),
        }
    }
}

/// Registries keyed by the server's handler context.
pub type ServerPacketRegistries = polaris_protocol::PacketRegistries<PacketContext>;
