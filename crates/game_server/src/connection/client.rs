//! A single UDP peer.

use super::{ConnectionId, DisconnectReason};
use crate::lobby::LobbyCode;
use crate::transport::PacketHeader;
use bytes::Bytes;
use compact_str::CompactString;
use dashmap::DashMap;
use polaris_protocol::{frame_packet, FramingError, MessageWriter, PacketPayload};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A datagram queued for the send task.
pub type OutboundDatagram = (SocketAddr, Bytes);

/// A connected peer.
///
/// Connections are shared as `Arc<Connection>` between the receive loop,
/// packet handlers and the lobby table. Every field uses interior
/// mutability so handlers only ever need a shared reference.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    connected_at: SystemTime,
    last_seen: Mutex<Instant>,
    meta: DashMap<CompactString, Value>,
    lobby: Mutex<Option<LobbyCode>>,
    disconnect_reason: OnceLock<DisconnectReason>,
    next_nonce: AtomicU16,
    outbound: mpsc::UnboundedSender<OutboundDatagram>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        outbound: mpsc::UnboundedSender<OutboundDatagram>,
    ) -> Self {
        Self {
            id,
            remote_addr,
            connected_at: SystemTime::now(),
            last_seen: Mutex::new(Instant::now()),
            meta: DashMap::new(),
            lobby: Mutex::new(None),
            disconnect_reason: OnceLock::new(),
            next_nonce: AtomicU16::new(1),
            outbound,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    /// Marks the peer as heard from now.
    pub(crate) fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Instant::now();
    }

    /// Time since the last datagram from this peer.
    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .elapsed()
    }

    // --- Metadata ---------------------------------------------------------

    pub fn has_meta(&self, key: &str) -> bool {
        self.meta.contains_key(key)
    }

    pub fn get_meta(&self, key: &str) -> Option<Value> {
        self.meta.get(key).map(|entry| entry.value().clone())
    }

    /// Convenience accessor for string metadata.
    pub fn get_meta_str(&self, key: &str) -> Option<String> {
        self.meta
            .get(key)
            .and_then(|entry| entry.value().as_str().map(str::to_owned))
    }

    pub fn set_meta(&self, key: &str, value: impl Into<Value>) {
        self.meta.insert(CompactString::new(key), value.into());
    }

    pub fn remove_meta(&self, key: &str) -> Option<Value> {
        self.meta.remove(key).map(|(_, value)| value)
    }

    // --- Lobby ------------------------------------------------------------

    pub fn lobby(&self) -> Option<LobbyCode> {
        *self.lobby.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn set_lobby(&self, code: Option<LobbyCode>) -> Option<LobbyCode> {
        let mut lobby = self.lobby.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *lobby, code)
    }

    // --- Lifecycle --------------------------------------------------------

    pub fn is_disconnected(&self) -> bool {
        self.disconnect_reason.get().is_some()
    }

    pub fn disconnect_reason(&self) -> Option<&DisconnectReason> {
        self.disconnect_reason.get()
    }

    /// Disconnects the peer with `reason`.
    ///
    /// Only the first call has an effect; it queues the disconnect datagram
    /// (unless the client initiated the disconnect) and returns `true`.
    pub fn disconnect(&self, reason: DisconnectReason) -> bool {
        if self.disconnect_reason.set(reason.clone()).is_err() {
            return false;
        }

        debug!(
            "Disconnecting connection {} ({}): {}",
            self.id, self.remote_addr, reason
        );

        match reason.encode() {
            Ok(Some(datagram)) => self.queue(datagram),
            Ok(None) => {}
            Err(e) => warn!("Failed to encode disconnect for {}: {}", self.remote_addr, e),
        }

        true
    }

    // --- Sending ----------------------------------------------------------

    /// Sends `payload` as a reliable packet and returns the nonce used.
    pub fn send_reliable(&self, payload: &[u8]) -> Option<u16> {
        if self.is_disconnected() {
            return None;
        }

        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        let mut writer = MessageWriter::new();
        writer
            .write_byte(PacketHeader::Reliable.byte())
            .write_u16_be(nonce)
            .write_bytes(payload);

        match writer.finish() {
            Ok(datagram) => {
                self.queue(datagram);
                Some(nonce)
            }
            Err(e) => {
                warn!("Failed to build reliable packet for {}: {}", self.remote_addr, e);
                None
            }
        }
    }

    pub fn send_unreliable(&self, payload: &[u8]) {
        if self.is_disconnected() {
            return;
        }

        let mut datagram = Vec::with_capacity(payload.len() + 1);
        datagram.push(PacketHeader::Unreliable.byte());
        datagram.extend_from_slice(payload);
        self.queue(Bytes::from(datagram));
    }

    /// Frames `packet` as a root message with `opcode` and sends it reliably.
    ///
    /// Returns the nonce used, or `None` if the connection is already
    /// disconnected.
    pub fn send_root_packet<P: PacketPayload>(&self, opcode: u8, packet: &P) -> Result<Option<u16>, FramingError> {
        let framed = frame_packet(opcode, packet)?;
        let nonce = self.send_reliable(&framed);
        if nonce.is_none() {
            debug!("Dropped root packet 0x{:02x} for {}", opcode, self.remote_addr);
        }
        Ok(nonce)
    }

    /// Queues a raw datagram without adding a transport header.
    pub(crate) fn queue(&self, datagram: Bytes) {
        if self.outbound.send((self.remote_addr, datagram)).is_err() {
            debug!("Send task is gone; dropping datagram for {}", self.remote_addr);
        }
    }
}
