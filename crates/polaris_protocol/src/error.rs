//! Error types for framing, registration and dispatch.

use crate::registry::PacketLayer;

/// Failures raised while reading or writing framed messages.
///
/// Every variant signals a malformed packet. Callers drop the packet (or
/// disconnect the connection) rather than propagating a crash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    /// A read asked for more bytes than the buffer holds
    #[error("Out of bounds read: requested {requested} byte(s) at offset {offset}, {available} available")]
    OutOfBounds {
        offset: usize,
        requested: usize,
        available: usize,
    },

    /// A deserializer returned without consuming its whole sub-message
    #[error("Deserializer left {remaining} unread byte(s) in the message")]
    TrailingBytes { remaining: usize },

    /// A length-prefixed string was not valid UTF-8
    #[error("Invalid UTF-8 string in message")]
    InvalidString,

    /// A packed integer ran past five bytes
    #[error("Packed integer is longer than five bytes")]
    InvalidPackedInt,

    /// A nested message grew past the 16-bit length prefix
    #[error("Nested message of {length} bytes does not fit a 16-bit length prefix")]
    MessageTooLong { length: usize },

    /// `end_message` without a matching `start_message`, or `finish` with messages still open
    #[error("Unbalanced nested message: {open} message(s) open")]
    UnbalancedMessage { open: usize },
}

/// Failures raised while mutating a packet registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The opcode is already taken on this layer, either by a built-in or a plugin
    #[error("Opcode 0x{opcode:02x} is already registered on the {layer} layer")]
    DuplicateOpcode { layer: PacketLayer, opcode: u8 },
}

/// Failures raised while dispatching a registered opcode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The registered deserializer rejected the payload bytes
    #[error("Failed to decode {layer} packet 0x{opcode:02x}: {source}")]
    Decode {
        layer: PacketLayer,
        opcode: u8,
        #[source]
        source: FramingError,
    },
}
