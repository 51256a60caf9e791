//! Connection management for UDP peers.
//!
//! A connection is identified by its remote address. It is created on the
//! first datagram from that address and lives until either side disconnects
//! or the server closes.

pub mod client;
pub mod disconnect;
pub mod manager;

pub use client::{Connection, OutboundDatagram};
pub use disconnect::DisconnectReason;
pub use manager::ConnectionManager;

/// Identifier of a connection, unique for the lifetime of the server.
pub type ConnectionId = u64;
