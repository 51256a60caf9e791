//! # Event Traits and Core Events
//!
//! The [`Event`] trait, handler abstractions, and every event the server
//! publishes on the `core:` namespace.
//!
//! ## Core Events
//!
//! | Key | Payload |
//! |-----|---------|
//! | `core:server_ready` | [`ServerReadyEvent`] |
//! | `core:custom_packet` | [`CustomPacketEvent`] |
//! | `core:unknown_packet` | [`UnknownPacketEvent`] |
//! | `core:packet_decode_failed` | [`PacketDecodeFailedEvent`] |
//! | `core:connection_authenticated` | [`ConnectionAuthenticatedEvent`] |
//! | `core:connection_disconnected` | [`ConnectionDisconnectedEvent`] |
//! | `core:plugin_loaded` | [`PluginLoadedEvent`] |
//!
//! Events are notifications: handlers observe them and cannot cancel the
//! action that produced them.

use async_trait::async_trait;
use polaris_protocol::PacketLayer;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt::Debug;

// ============================================================================
// Event Traits
// ============================================================================

/// Core trait that all events implement.
///
/// Most types get it through the blanket implementation below: derive
/// `Serialize`, `Deserialize` and `Debug` and the type is an event.
pub trait Event: Send + Sync + Any + Debug {
    /// Stable name of the event type, used in handler names and logs.
    fn type_name() -> &'static str
    where
        Self: Sized;

    fn serialize(&self) -> Result<Vec<u8>, EventError>;

    fn deserialize(data: &[u8]) -> Result<Self, EventError>
    where
        Self: Sized;

    fn as_any(&self) -> &dyn Any;
}

impl<T> Event for T
where
    T: Serialize + DeserializeOwned + Send + Sync + Any + Debug + 'static,
{
    fn type_name() -> &'static str {
        std::any::type_name::<T>()
    }

    fn serialize(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| {
            tracing::error!(
                "🔴 Event serialization failed for type '{}': {}",
                Self::type_name(),
                e
            );
            EventError::Serialization(e)
        })
    }

    fn deserialize(data: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(data).map_err(|e| {
            tracing::error!(
                "🔴 Event deserialization failed for type '{}': {} ({} bytes)",
                Self::type_name(),
                e,
                data.len()
            );
            EventError::Deserialization(e)
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Handler trait for processing serialized events.
///
/// Implemented by [`TypedEventHandler`]; callers normally register closures
/// through [`EventSystem::on_core`](crate::EventSystem::on_core).
#[async_trait]
pub trait EventHandler: Send + Sync + 'static + Debug {
    async fn handle(&self, data: &[u8]) -> Result<(), EventError>;

    fn expected_type_id(&self) -> TypeId;

    fn handler_name(&self) -> &str;
}

/// Bridges a typed closure to the untyped [`EventHandler`] interface.
pub struct TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    handler: F,
    name: String,
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T, F> TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    pub fn new(name: String, handler: F) -> Self {
        Self {
            handler,
            name,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> Debug for TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedEventHandler")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<T, F> EventHandler for TypedEventHandler<T, F>
where
    T: Event,
    F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
{
    async fn handle(&self, data: &[u8]) -> Result<(), EventError> {
        match T::deserialize(data) {
            Ok(event) => (self.handler)(event),
            Err(e) => {
                // A handler registered for the wrong payload type is skipped, not fatal
                tracing::warn!(
                    "🟡 EventHandler '{}' (expects type '{}'): {}. Handler skipped.",
                    self.name,
                    std::any::type_name::<T>(),
                    e
                );
                Ok(())
            }
        }
    }

    fn expected_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn handler_name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Core Server Events
// ============================================================================

/// Emitted once the server socket is bound and the receive loop is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerReadyEvent {
    pub bind_address: String,
    pub plugin_count: usize,
    pub timestamp: u64,
}

/// Emitted for every custom packet that decoded successfully, before its
/// registered handler runs.
///
/// ```rust
/// use polaris_event_system::{current_timestamp, CustomPacketEvent, EventSystem};
/// use polaris_protocol::PacketLayer;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let events = EventSystem::new();
/// events.on_core("custom_packet", |event: CustomPacketEvent| {
///     println!("{} packet 0x{:02x}", event.layer, event.opcode);
///     Ok(())
/// }).await?;
///
/// events.emit_core("custom_packet", &CustomPacketEvent {
///     layer: PacketLayer::Root,
///     opcode: 0x40,
///     packet_type: "TestPacket".to_string(),
///     connection_id: 1,
///     lobby_code: None,
///     net_id: None,
///     payload: vec![0x02, b'h', b'i'],
///     timestamp: current_timestamp(),
/// }).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomPacketEvent {
    pub layer: PacketLayer,
    pub opcode: u8,
    /// Rust type name of the decoded payload
    pub packet_type: String,
    pub connection_id: u64,
    /// Lobby the packet was addressed to, for game-data and RPC packets
    pub lobby_code: Option<i32>,
    /// Sender net id, for RPC packets
    pub net_id: Option<u32>,
    /// The payload re-serialized without its message header
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

/// Emitted when no registration exists for an opcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownPacketEvent {
    pub layer: PacketLayer,
    pub opcode: u8,
    pub connection_id: u64,
    pub payload: Vec<u8>,
    pub timestamp: u64,
}

/// Emitted when a registered deserializer rejects a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketDecodeFailedEvent {
    pub layer: PacketLayer,
    pub opcode: u8,
    pub connection_id: u64,
    pub error: String,
    pub timestamp: u64,
}

/// Emitted the first time a connection presents a valid signed envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionAuthenticatedEvent {
    pub connection_id: u64,
    /// Lower-case hex client id
    pub client_id: String,
    pub display_name: String,
    pub timestamp: u64,
}

/// Emitted when the server disconnects a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDisconnectedEvent {
    pub connection_id: u64,
    pub remote_addr: String,
    pub reason: String,
    pub timestamp: u64,
}

/// Emitted for every plugin unit the bootstrap instantiates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginLoadedEvent {
    pub name: String,
    pub version: String,
    /// Folder entry path or package name the plugin came from
    pub source: String,
    pub timestamp: u64,
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by the event system.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Deserialization error: {0}")]
    Deserialization(serde_json::Error),
    #[error("Handler execution error: {0}")]
    HandlerExecution(String),
}
