//! # Polaris Protocol
//!
//! Wire-level building blocks shared by the server and its plugins:
//!
//! - **Message framing** ([`MessageReader`], [`MessageWriter`]): fixed-width
//!   integers, packed integers, length-prefixed strings, and nested
//!   `{length, tag, payload}` sub-messages.
//! - **Layered packet registry** ([`PacketRegistries`]): one opcode table per
//!   protocol layer (root, game-data, RPC) mapping opcodes to a deserializer
//!   and a handler.
//!
//! Nothing in this crate performs network I/O.
//!
//! ## Example
//!
//! ```rust
//! use polaris_protocol::*;
//!
//! #[derive(Debug, Clone)]
//! struct Chat {
//!     message: String,
//! }
//!
//! impl PacketPayload for Chat {
//!     fn deserialize(reader: &mut MessageReader) -> Result<Self, FramingError> {
//!         Ok(Self { message: reader.read_string()? })
//!     }
//!
//!     fn serialize(&self, writer: &mut MessageWriter) {
//!         writer.write_string(&self.message);
//!     }
//! }
//!
//! let mut registries: PacketRegistries<()> = PacketRegistries::new();
//! registries
//!     .root
//!     .register_packet(0x40, Chat::deserialize, |_, chat: &Chat| println!("{}", chat.message))
//!     .unwrap();
//!
//! let framed = frame_packet(0x40, &Chat { message: "hi".into() }).unwrap();
//! let mut message = MessageReader::new(framed).read_message().unwrap();
//! let opcode = message.tag().unwrap();
//! registries.root.dispatch(opcode, &mut message, &()).unwrap();
//! ```

pub mod error;
pub mod message;
pub mod registry;

pub use error::{DispatchError, FramingError, RegistryError};
pub use message::{HexBytes, MessageReader, MessageWriter};
pub use registry::{
    frame_packet, opcodes, AnyPacket, DispatchOutcome, PacketLayer, PacketPayload, PacketRegistries,
    PacketRegistry, RegistrationEntry,
};
