//! Transport parsing and the three-layer dispatch cascade.
//!
//! ```text
//! datagram ── header ── root messages ─┬─ 0x05 / 0x06 game data ─┬─ 0x02 rpc ── rpc registry
//!                                      │                         └─ game-data registry
//!                                      └─ root registry
//! ```
//!
//! Built-in carrier opcodes are never looked up in the registries. A
//! malformed frame abandons the rest of its enclosing message, while frames
//! already dispatched stay dispatched.

use super::core::GameServer;
use crate::connection::{Connection, DisconnectReason};
use crate::context::PacketContext;
use crate::lobby::LobbyCode;
use crate::transport::{acknowledgement, PacketHeader};
use polaris_event_system::{
    current_timestamp, CustomPacketEvent, PacketDecodeFailedEvent, UnknownPacketEvent,
};
use polaris_protocol::{opcodes, DispatchError, MessageReader};
use std::sync::Arc;
use tracing::{debug, trace, warn};

impl GameServer {
    pub(super) async fn process_transport(&self, connection: &Arc<Connection>, mut payload: MessageReader) {
        if !payload.has_bytes_left() {
            return;
        }

        let header_byte = match payload.read_byte() {
            Ok(byte) => byte,
            Err(_) => return,
        };
        let Some(header) = PacketHeader::from_byte(header_byte) else {
            debug!(
                "Ignoring datagram with unknown header 0x{:02x} from {}",
                header_byte,
                connection.remote_addr()
            );
            return;
        };

        if header.is_reliable() {
            match payload.read_u16_be() {
                Ok(nonce) => connection.queue(acknowledgement(nonce)),
                Err(e) => {
                    warn!("Reliable packet without nonce from {}: {}", connection.remote_addr(), e);
                    return;
                }
            }
        }

        match header {
            PacketHeader::Reliable | PacketHeader::Unreliable => {
                self.dispatch_root_messages(connection, payload).await;
            }
            PacketHeader::Hello => {
                trace!("👋 Hello from {}", connection.remote_addr());
            }
            PacketHeader::Ping => {
                trace!("🏓 Ping from {}", connection.remote_addr());
            }
            PacketHeader::Acknowledgement => {
                trace!("Acknowledgement from {}", connection.remote_addr());
            }
            PacketHeader::Disconnect => {
                connection.disconnect(DisconnectReason::ClientRequest);
            }
        }
    }

    async fn dispatch_root_messages(&self, connection: &Arc<Connection>, mut payload: MessageReader) {
        let context = PacketContext::root(connection.clone());

        while payload.has_bytes_left() && !connection.is_disconnected() {
            let message = match payload.read_message() {
                Ok(message) => message,
                Err(e) => {
                    warn!("Malformed root message from {}: {}", connection.remote_addr(), e);
                    return;
                }
            };
            let opcode = message.tag().unwrap_or_default();

            match opcode {
                opcodes::ROOT_GAME_DATA | opcodes::ROOT_GAME_DATA_TO => {
                    self.dispatch_game_data(&context, opcode, message).await;
                }
                _ => self.dispatch_custom(&context, opcode, message).await,
            }
        }
    }

    async fn dispatch_game_data(&self, root: &PacketContext, carrier: u8, mut message: MessageReader) {
        let code = match message.read_i32_le() {
            Ok(code) => LobbyCode(code),
            Err(e) => {
                warn!("Game data without lobby code from {}: {}", root.connection.remote_addr(), e);
                return;
            }
        };

        if carrier == opcodes::ROOT_GAME_DATA_TO {
            match message.read_packed_u32() {
                Ok(recipient) => trace!("Game data in {} addressed to client {}", code, recipient),
                Err(e) => {
                    warn!("Game data without recipient from {}: {}", root.connection.remote_addr(), e);
                    return;
                }
            }
        }

        let context = root.game_data(code);
        while message.has_bytes_left() && !root.connection.is_disconnected() {
            let child = match message.read_message() {
                Ok(child) => child,
                Err(e) => {
                    warn!("Malformed game data message from {}: {}", root.connection.remote_addr(), e);
                    return;
                }
            };
            let opcode = child.tag().unwrap_or_default();

            if opcode == opcodes::GAME_DATA_RPC {
                self.dispatch_rpc(&context, child).await;
            } else {
                self.dispatch_custom(&context, opcode, child).await;
            }
        }
    }

    async fn dispatch_rpc(&self, game_data: &PacketContext, mut message: MessageReader) {
        let header = message
            .read_packed_u32()
            .and_then(|net_id| Ok((net_id, message.read_byte()?)));

        match header {
            Ok((net_id, opcode)) => {
                let payload = message.read_remaining_bytes();
                self.dispatch_custom(&game_data.rpc(net_id), opcode, payload).await;
            }
            Err(e) => warn!("Malformed rpc from {}: {}", game_data.connection.remote_addr(), e),
        }
    }

    /// Looks `opcode` up in the context's layer and runs the handler.
    ///
    /// `core:custom_packet` is emitted after a successful decode and before
    /// the handler runs.
    async fn dispatch_custom(&self, context: &PacketContext, opcode: u8, mut reader: MessageReader) {
        let layer = context.layer;
        let raw = reader.buffer().slice(reader.cursor()..);

        let Some(entry) = self.registries.layer(layer).lookup(opcode) else {
            debug!("No {} packet registered for opcode 0x{:02x}", layer, opcode);
            self.emit(
                "unknown_packet",
                &UnknownPacketEvent {
                    layer,
                    opcode,
                    connection_id: context.connection.id(),
                    payload: raw.to_vec(),
                    timestamp: current_timestamp(),
                },
            )
            .await;
            return;
        };

        match entry.decode(&mut reader) {
            Ok(packet) => {
                trace!("📥 {} 0x{:02x} ({}) from {}", layer, opcode, entry.packet_type(), context.connection.id());
                self.emit(
                    "custom_packet",
                    &CustomPacketEvent {
                        layer,
                        opcode,
                        packet_type: entry.packet_type().to_string(),
                        connection_id: context.connection.id(),
                        lobby_code: context.lobby_code.map(LobbyCode::as_i32),
                        net_id: context.net_id,
                        payload: raw.to_vec(),
                        timestamp: current_timestamp(),
                    },
                )
                .await;
                entry.handle(context, packet.as_ref());
            }
            Err(source) => {
                let error = DispatchError::Decode { layer, opcode, source };
                warn!("⚠️ Dropping packet from {}: {}", context.connection.remote_addr(), error);
                self.emit(
                    "packet_decode_failed",
                    &PacketDecodeFailedEvent {
                        layer,
                        opcode,
                        connection_id: context.connection.id(),
                        error: error.to_string(),
                        timestamp: current_timestamp(),
                    },
                )
                .await;
            }
        }
    }
}
