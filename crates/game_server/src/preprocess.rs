//! Inbound preprocessing stage.
//!
//! Every received datagram passes through exactly one
//! [`InboundPacketTransformer`] before the transport header is parsed. The
//! transformer may rewrite the bytes (e.g. strip an authentication envelope)
//! or reject the connection. Rejection is expressed by disconnecting the
//! connection and returning an empty payload, so dispatch never sees bytes
//! the transformer refused.

use crate::connection::Connection;
use polaris_protocol::MessageReader;

/// Identity established by a transformer on this datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Lower-case hex client id
    pub client_id: String,
    pub display_name: String,
}

/// Output of the preprocessing stage.
#[derive(Debug)]
pub struct TransformedDatagram {
    /// Bytes handed on to transport parsing and dispatch
    pub payload: MessageReader,
    /// Set when this datagram bound the connection to an identity for the first time
    pub newly_authenticated: Option<AuthenticatedUser>,
}

impl TransformedDatagram {
    pub fn passthrough(payload: MessageReader) -> Self {
        Self {
            payload,
            newly_authenticated: None,
        }
    }

    /// An empty payload; nothing reaches dispatch.
    pub fn dropped() -> Self {
        Self::passthrough(MessageReader::empty())
    }
}

/// Filter applied to raw inbound datagrams.
///
/// Runs synchronously and to completion for each datagram; datagrams of one
/// connection are processed in arrival order.
pub trait InboundPacketTransformer: Send + Sync + 'static {
    fn transform_inbound(&self, connection: &Connection, datagram: MessageReader) -> TransformedDatagram;
}

/// Hands every datagram through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughTransformer;

impl InboundPacketTransformer for PassthroughTransformer {
    fn transform_inbound(&self, _connection: &Connection, datagram: MessageReader) -> TransformedDatagram {
        TransformedDatagram::passthrough(datagram)
    }
}
