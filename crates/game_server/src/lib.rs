//! # Game Server
//!
//! UDP server core for a lobby-based multiplayer game. The core holds no game
//! logic: it parses the transport header, walks the three nested packet
//! layers and hands every opcode it does not own to a handler registered by
//! a plugin.
//!
//! ## Packet Layers
//!
//! * **Root** - top-level messages of a reliable or unreliable datagram.
//!   Opcodes `0x05` and `0x06` are built-in game-data carriers.
//! * **Game data** - messages inside a carrier, scoped to a lobby code.
//!   Opcode `0x02` is the built-in RPC carrier.
//! * **RPC** - calls addressed to a networked object, keyed by the RPC byte.
//!
//! ## Datagram Flow
//!
//! 1. The installed [`InboundPacketTransformer`] sees the raw bytes first
//!    (the [`AuthenticatingTransformer`] verifies and strips the HMAC envelope)
//! 2. The transport header is parsed; reliable packets are acknowledged
//! 3. Root, game-data and RPC messages are dispatched through the
//!    [`ServerPacketRegistries`], emitting `core:custom_packet` or
//!    `core:unknown_packet` on the event system
//!
//! ## Plugins
//!
//! ```rust
//! use game_server::{PacketContext, ServerBuilder, ServerConfig};
//! use polaris_protocol::{FramingError, MessageReader, MessageWriter, PacketPayload};
//!
//! #[derive(Debug, Clone)]
//! struct Chat(String);
//!
//! impl PacketPayload for Chat {
//!     fn deserialize(reader: &mut MessageReader) -> Result<Self, FramingError> {
//!         Ok(Chat(reader.read_string()?))
//!     }
//!
//!     fn serialize(&self, writer: &mut MessageWriter) {
//!         writer.write_string(&self.0);
//!     }
//! }
//!
//! let mut builder = ServerBuilder::new(ServerConfig::default());
//! builder
//!     .packets_mut()
//!     .root
//!     .register_packet(0x40, Chat::deserialize, |ctx: &PacketContext, chat: &Chat| {
//!         println!("{} says {}", ctx.connection.id(), chat.0);
//!     })
//!     .unwrap();
//! let server = builder.build();
//! assert_eq!(server.registries().root.len(), 1);
//! ```
//!
//! ## Error Handling
//!
//! [`ServerError`] covers startup failures only. Malformed packets are
//! dropped with a warning and failed authentication disconnects the peer.

pub use auth::{AuthError, AuthenticatingTransformer, ClientId, UserDirectory, UserRecord};
pub use config::{AuthConfig, ServerConfig, UserConfig};
pub use connection::{Connection, ConnectionId, ConnectionManager, DisconnectReason};
pub use context::{PacketContext, ServerPacketRegistries};
pub use error::ServerError;
pub use lobby::{ExactCodeJoin, LobbyCode, LobbyInfo, LobbyJoinHook, LobbyTable};
pub use plugin::{Plugin, PluginFactory};
pub use preprocess::{AuthenticatedUser, InboundPacketTransformer, PassthroughTransformer, TransformedDatagram};
pub use server::{BuilderCheckpoint, GameServer, ServerBuilder, IDLE_DISCONNECT_MESSAGE};
pub use utils::{create_server, create_server_with_config};

pub mod auth;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod lobby;
pub mod plugin;
pub mod preprocess;
pub mod server;
pub mod transport;
pub mod utils;
