//! Test packets registered on each dispatch layer.
//!
//! All three carry a single string and share the same wire form.

use polaris_protocol::{FramingError, MessageReader, MessageWriter, PacketPayload};

/// Root opcode of [`TestPacket`].
pub const TEST_PACKET_OPCODE: u8 = 0x40;
/// Game-data opcode of [`TestGameDataPacket`].
pub const TEST_GAME_DATA_OPCODE: u8 = 0x50;
/// RPC opcode of [`TestRpcPacket`].
pub const TEST_RPC_OPCODE: u8 = 0x60;

macro_rules! message_packet {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            pub message: String,
        }

        impl $name {
            pub fn new(message: impl Into<String>) -> Self {
                Self { message: message.into() }
            }
        }

        impl PacketPayload for $name {
            fn deserialize(reader: &mut MessageReader) -> Result<Self, FramingError> {
                Ok(Self {
                    message: reader.read_string()?,
                })
            }

            fn serialize(&self, writer: &mut MessageWriter) {
                writer.write_string(&self.message);
            }
        }
    };
}

message_packet!(
    /// Root-layer test packet.
    TestPacket
);
message_packet!(
    /// Test packet nested in a game-data carrier.
    TestGameDataPacket
);
message_packet!(
    /// Test packet sent as an RPC.
    TestRpcPacket
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_form() {
        let mut writer = MessageWriter::new();
        TestPacket::new("hello").serialize(&mut writer);
        assert_eq!(writer.as_slice(), &[0x05, b'h', b'e', b'l', b'l', b'o']);

        let mut reader = MessageReader::from_raw_bytes(writer.as_slice());
        assert_eq!(TestRpcPacket::deserialize(&mut reader).unwrap().message, "hello");
        assert!(!reader.has_bytes_left());
    }

    #[test]
    fn test_truncated_string() {
        let mut reader = MessageReader::from_raw_bytes(&[0x05, b'h', b'i']);
        assert!(TestGameDataPacket::deserialize(&mut reader).is_err());
    }
}
