//! Disconnect reasons and their wire form.

use bytes::Bytes;
use polaris_protocol::{FramingError, MessageWriter};
use std::fmt;

use crate::transport::PacketHeader;

const REASON_CUSTOM: u8 = 0x08;
const REASON_SERVER_REQUEST: u8 = 0x10;

/// Why a connection was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Free-form reason shown to the client
    Custom(String),
    /// The server is shutting down
    ServerRequest,
    /// The client sent a disconnect packet
    ClientRequest,
}

impl DisconnectReason {
    pub fn custom(message: impl Into<String>) -> Self {
        DisconnectReason::Custom(message.into())
    }

    /// Encodes the server-to-client disconnect datagram:
    /// `0x09 0x01 [message tag 0x00: reason (+ message for custom reasons)]`.
    ///
    /// Returns `None` for [`DisconnectReason::ClientRequest`], which is never sent.
    pub fn encode(&self) -> Result<Option<Bytes>, FramingError> {
        let mut writer = MessageWriter::new();
        writer
            .write_byte(PacketHeader::Disconnect.byte())
            .write_bool(true)
            .start_message(0x00);

        match self {
            DisconnectReason::Custom(message) => {
                writer.write_byte(REASON_CUSTOM).write_string(message);
            }
            DisconnectReason::ServerRequest => {
                writer.write_byte(REASON_SERVER_REQUEST);
            }
            DisconnectReason::ClientRequest => return Ok(None),
        }

        writer.end_message()?;
        writer.finish().map(Some)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Custom(message) => f.write_str(message),
            DisconnectReason::ServerRequest => f.write_str("Server closed"),
            DisconnectReason::ClientRequest => f.write_str("Client disconnected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_reason_wire_form() {
        let bytes = DisconnectReason::custom("Unknown user").encode().unwrap().unwrap();

        let mut expected = vec![0x09, 0x01, 0x0e, 0x00, 0x00, 0x08, 0x0c];
        expected.extend_from_slice(b"Unknown user");
        assert_eq!(&bytes[..], &expected[..]);
    }

    #[test]
    fn test_server_request_wire_form() {
        let bytes = DisconnectReason::ServerRequest.encode().unwrap().unwrap();
        assert_eq!(&bytes[..], &[0x09, 0x01, 0x01, 0x00, 0x00, 0x10]);
        assert_eq!(DisconnectReason::ClientRequest.encode().unwrap(), None);
    }
}
