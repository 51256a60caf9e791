//! # Layered Packet Registry
//!
//! Opcode-keyed dispatch tables for the three protocol layers. Each layer owns
//! its own opcode namespace, so `0x40` on the root layer and `0x40` on the RPC
//! layer are unrelated entries.
//!
//! Registries are populated while plugins register and are read-only once the
//! server starts listening. The server shares them behind an `Arc` without any
//! locking.
//!
//! ## Dispatch
//!
//! ```text
//! opcode ──► lookup ──► deserialize(reader) ──► exact-consumption check ──► handler(ctx, packet)
//!              │                   │
//!              ▼                   ▼
//!        Unknown (not an     DispatchError::Decode
//!        error; the caller
//!        raises a notification)
//! ```

use crate::error::{DispatchError, FramingError, RegistryError};
use crate::message::{MessageReader, MessageWriter};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Protocol layer a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketLayer {
    Root,
    GameData,
    Rpc,
}

impl PacketLayer {
    pub const ALL: [PacketLayer; 3] = [PacketLayer::Root, PacketLayer::GameData, PacketLayer::Rpc];

    /// Opcodes the framework itself decodes on this layer. They carry the
    /// next layer of the cascade and can never be claimed by a plugin.
    pub fn builtin_opcodes(self) -> &'static [u8] {
        match self {
            PacketLayer::Root => &[opcodes::ROOT_GAME_DATA, opcodes::ROOT_GAME_DATA_TO],
            PacketLayer::GameData => &[opcodes::GAME_DATA_RPC],
            PacketLayer::Rpc => &[],
        }
    }

    pub fn is_builtin(self, opcode: u8) -> bool {
        self.builtin_opcodes().contains(&opcode)
    }
}

impl fmt::Display for PacketLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PacketLayer::Root => "root",
            PacketLayer::GameData => "game-data",
            PacketLayer::Rpc => "rpc",
        })
    }
}

/// Opcodes of the cascade carriers.
pub mod opcodes {
    /// Root packet wrapping game-data messages for a whole lobby
    pub const ROOT_GAME_DATA: u8 = 0x05;
    /// Root packet wrapping game-data messages for one recipient
    pub const ROOT_GAME_DATA_TO: u8 = 0x06;
    /// Game-data packet wrapping a single RPC
    pub const GAME_DATA_RPC: u8 = 0x02;
}

/// A custom packet kind.
///
/// `deserialize` must consume exactly the bytes of the sub-message it is
/// handed; the registry rejects a decode that leaves bytes behind.
/// `serialize` writes the payload only, without the enclosing message header.
pub trait PacketPayload: Clone + fmt::Debug + Send + Sync + 'static {
    fn deserialize(reader: &mut MessageReader) -> Result<Self, FramingError>;

    fn serialize(&self, writer: &mut MessageWriter);
}

/// Object-safe view of a decoded packet.
pub trait AnyPacket: fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn serialize_into(&self, writer: &mut MessageWriter);

    fn clone_packet(&self) -> Box<dyn AnyPacket>;

    fn packet_type(&self) -> &'static str;
}

impl<P: PacketPayload> AnyPacket for P {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn serialize_into(&self, writer: &mut MessageWriter) {
        self.serialize(writer);
    }

    fn clone_packet(&self) -> Box<dyn AnyPacket> {
        Box::new(self.clone())
    }

    fn packet_type(&self) -> &'static str {
        std::any::type_name::<P>()
    }
}

impl<'a> dyn AnyPacket + 'a {
    pub fn downcast_ref<P: PacketPayload>(&self) -> Option<&P> {
        self.as_any().downcast_ref::<P>()
    }

    /// Serializes the payload alone.
    pub fn to_bytes(&self) -> Bytes {
        let mut writer = MessageWriter::new();
        self.serialize_into(&mut writer);
        // Payload writers never open messages, so finishing cannot fail here
        writer.finish().unwrap_or_default()
    }
}

impl Clone for Box<dyn AnyPacket> {
    fn clone(&self) -> Self {
        self.clone_packet()
    }
}

type DecodeFn = dyn Fn(&mut MessageReader) -> Result<Box<dyn AnyPacket>, FramingError> + Send + Sync;
type HandlerFn<C> = dyn Fn(&C, &dyn AnyPacket) + Send + Sync;

/// One `{opcode, deserialize, handler}` triple.
pub struct RegistrationEntry<C> {
    opcode: u8,
    packet_type: &'static str,
    decode: Arc<DecodeFn>,
    handler: Arc<HandlerFn<C>>,
}

impl<C> RegistrationEntry<C> {
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn packet_type(&self) -> &'static str {
        self.packet_type
    }

    /// Materializes the payload and checks that every byte was consumed.
    pub fn decode(&self, reader: &mut MessageReader) -> Result<Box<dyn AnyPacket>, FramingError> {
        let packet = (self.decode)(reader)?;

        if reader.has_bytes_left() {
            return Err(FramingError::TrailingBytes {
                remaining: reader.remaining(),
            });
        }

        Ok(packet)
    }

    pub fn handle(&self, context: &C, packet: &dyn AnyPacket) {
        (self.handler)(context, packet);
    }
}

impl<C> Clone for RegistrationEntry<C> {
    fn clone(&self) -> Self {
        Self {
            opcode: self.opcode,
            packet_type: self.packet_type,
            decode: Arc::clone(&self.decode),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<C> fmt::Debug for RegistrationEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationEntry")
            .field("opcode", &format_args!("0x{:02x}", self.opcode))
            .field("packet_type", &self.packet_type)
            .finish()
    }
}

/// Result of a successful dispatch.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A registered handler ran with this packet
    Handled(Box<dyn AnyPacket>),
    /// No entry for the opcode; the caller raises an unknown-packet notification
    Unknown,
}

/// Opcode table for one layer, generic over the handler context.
pub struct PacketRegistry<C> {
    layer: PacketLayer,
    entries: HashMap<u8, RegistrationEntry<C>>,
}

impl<C> PacketRegistry<C> {
    pub fn new(layer: PacketLayer) -> Self {
        Self {
            layer,
            entries: HashMap::new(),
        }
    }

    pub fn layer(&self) -> PacketLayer {
        self.layer
    }

    /// Registers a custom packet kind.
    ///
    /// Fails with [`RegistryError::DuplicateOpcode`] when the opcode is
    /// already taken by a built-in carrier or an earlier registration.
    pub fn register_packet<P, F>(
        &mut self,
        opcode: u8,
        deserialize: fn(&mut MessageReader) -> Result<P, FramingError>,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        C: 'static,
        P: PacketPayload,
        F: Fn(&C, &P) + Send + Sync + 'static,
    {
        if self.layer.is_builtin(opcode) || self.entries.contains_key(&opcode) {
            return Err(RegistryError::DuplicateOpcode {
                layer: self.layer,
                opcode,
            });
        }

        let decode = move |reader: &mut MessageReader| -> Result<Box<dyn AnyPacket>, FramingError> {
            deserialize(reader).map(|packet| Box::new(packet) as Box<dyn AnyPacket>)
        };

        let layer = self.layer;
        let handler = move |context: &C, packet: &dyn AnyPacket| match packet.downcast_ref::<P>() {
            Some(packet) => handler(context, packet),
            None => tracing::error!(
                target: "packet_registry",
                "Handler for {} opcode 0x{:02x} received a {} instead of a {}",
                layer,
                opcode,
                packet.packet_type(),
                std::any::type_name::<P>()
            ),
        };

        self.entries.insert(
            opcode,
            RegistrationEntry {
                opcode,
                packet_type: std::any::type_name::<P>(),
                decode: Arc::new(decode),
                handler: Arc::new(handler),
            },
        );

        tracing::debug!(
            target: "packet_registry",
            "Registered {} packet 0x{:02x} ({})",
            self.layer,
            opcode,
            std::any::type_name::<P>()
        );

        Ok(())
    }

    pub fn lookup(&self, opcode: u8) -> Option<&RegistrationEntry<C>> {
        self.entries.get(&opcode)
    }

    pub fn contains(&self, opcode: u8) -> bool {
        self.entries.contains_key(&opcode)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered opcodes in ascending order.
    pub fn opcodes(&self) -> Vec<u8> {
        let mut opcodes: Vec<u8> = self.entries.keys().copied().collect();
        opcodes.sort_unstable();
        opcodes
    }

    /// Decodes `reader` with the entry for `opcode` and runs its handler.
    pub fn dispatch(
        &self,
        opcode: u8,
        reader: &mut MessageReader,
        context: &C,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(entry) = self.lookup(opcode) else {
            return Ok(DispatchOutcome::Unknown);
        };

        let packet = entry.decode(reader).map_err(|source| DispatchError::Decode {
            layer: self.layer,
            opcode,
            source,
        })?;

        entry.handle(context, packet.as_ref());
        Ok(DispatchOutcome::Handled(packet))
    }
}

impl<C> Clone for PacketRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            layer: self.layer,
            entries: self.entries.clone(),
        }
    }
}

impl<C> fmt::Debug for PacketRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketRegistry")
            .field("layer", &self.layer)
            .field("opcodes", &self.opcodes())
            .finish()
    }
}

/// The three per-layer registries.
#[derive(Debug)]
pub struct PacketRegistries<C> {
    pub root: PacketRegistry<C>,
    pub game_data: PacketRegistry<C>,
    pub rpc: PacketRegistry<C>,
}

impl<C> PacketRegistries<C> {
    pub fn new() -> Self {
        Self {
            root: PacketRegistry::new(PacketLayer::Root),
            game_data: PacketRegistry::new(PacketLayer::GameData),
            rpc: PacketRegistry::new(PacketLayer::Rpc),
        }
    }

    pub fn layer(&self, layer: PacketLayer) -> &PacketRegistry<C> {
        match layer {
            PacketLayer::Root => &self.root,
            PacketLayer::GameData => &self.game_data,
            PacketLayer::Rpc => &self.rpc,
        }
    }

    pub fn layer_mut(&mut self, layer: PacketLayer) -> &mut PacketRegistry<C> {
        match layer {
            PacketLayer::Root => &mut self.root,
            PacketLayer::GameData => &mut self.game_data,
            PacketLayer::Rpc => &mut self.rpc,
        }
    }

    pub fn total_registered(&self) -> usize {
        self.root.len() + self.game_data.len() + self.rpc.len()
    }
}

impl<C> Clone for PacketRegistries<C> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            game_data: self.game_data.clone(),
            rpc: self.rpc.clone(),
        }
    }
}

impl<C> Default for PacketRegistries<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Frames a payload as a `{length, opcode, payload}` sub-message.
pub fn frame_packet<P: PacketPayload>(opcode: u8, packet: &P) -> Result<Bytes, FramingError> {
    let mut writer = MessageWriter::new();
    writer.start_message(opcode);
    packet.serialize(&mut writer);
    writer.end_message()?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        text: String,
    }

    impl PacketPayload for Note {
        fn deserialize(reader: &mut MessageReader) -> Result<Self, FramingError> {
            Ok(Self {
                text: reader.read_string()?,
            })
        }

        fn serialize(&self, writer: &mut MessageWriter) {
            writer.write_string(&self.text);
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Counter(u16);

    impl PacketPayload for Counter {
        fn deserialize(reader: &mut MessageReader) -> Result<Self, FramingError> {
            reader.read_u16_le().map(Counter)
        }

        fn serialize(&self, writer: &mut MessageWriter) {
            writer.write_u16_le(self.0);
        }
    }

    #[derive(Default)]
    struct Seen(Mutex<Vec<String>>);

    fn note_reader(text: &str) -> MessageReader {
        let mut writer = MessageWriter::new();
        Note { text: text.into() }.serialize(&mut writer);
        MessageReader::new(writer.finish().unwrap())
    }

    #[test]
    fn test_duplicate_opcode_is_rejected() {
        let mut registry: PacketRegistry<Seen> = PacketRegistry::new(PacketLayer::Root);
        registry.register_packet(0x40, Note::deserialize, |_, _| {}).unwrap();

        let err = registry
            .register_packet(0x40, Counter::deserialize, |_, _| {})
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateOpcode {
                layer: PacketLayer::Root,
                opcode: 0x40
            }
        );
        assert_eq!(registry.lookup(0x40).unwrap().packet_type(), std::any::type_name::<Note>());
    }

    #[test]
    fn test_builtin_carriers_cannot_be_claimed() {
        let mut registries: PacketRegistries<Seen> = PacketRegistries::new();

        assert!(registries.root.register_packet(0x05, Note::deserialize, |_, _| {}).is_err());
        assert!(registries.root.register_packet(0x06, Note::deserialize, |_, _| {}).is_err());
        assert!(registries.game_data.register_packet(0x02, Note::deserialize, |_, _| {}).is_err());
        assert!(registries.rpc.register_packet(0x02, Note::deserialize, |_, _| {}).is_ok());
    }

    #[test]
    fn test_same_opcode_on_distinct_layers_dispatches_independently() {
        let mut registries: PacketRegistries<Seen> = PacketRegistries::new();
        registries
            .root
            .register_packet(0x40, Note::deserialize, |seen: &Seen, note: &Note| {
                seen.0.lock().unwrap().push(format!("root:{}", note.text));
            })
            .unwrap();
        registries
            .rpc
            .register_packet(0x40, Note::deserialize, |seen: &Seen, note: &Note| {
                seen.0.lock().unwrap().push(format!("rpc:{}", note.text));
            })
            .unwrap();

        let seen = Seen::default();
        registries.layer(PacketLayer::Rpc).dispatch(0x40, &mut note_reader("b"), &seen).unwrap();
        registries.layer(PacketLayer::Root).dispatch(0x40, &mut note_reader("a"), &seen).unwrap();

        assert_eq!(*seen.0.lock().unwrap(), vec!["rpc:b".to_string(), "root:a".to_string()]);
        assert_eq!(registries.total_registered(), 2);
    }

    #[test]
    fn test_unknown_opcode_is_not_an_error() {
        let registry: PacketRegistry<Seen> = PacketRegistry::new(PacketLayer::GameData);
        let outcome = registry
            .dispatch(0x50, &mut note_reader("x"), &Seen::default())
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Unknown));
    }

    #[test]
    fn test_decode_failure_skips_handler() {
        let mut registry: PacketRegistry<Seen> = PacketRegistry::new(PacketLayer::Root);
        registry
            .register_packet(0x41, Counter::deserialize, |seen: &Seen, _| {
                seen.0.lock().unwrap().push("ran".into());
            })
            .unwrap();

        let seen = Seen::default();
        let mut short = MessageReader::from_raw_bytes(&[0x01]);
        let err = registry.dispatch(0x41, &mut short, &seen).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Decode {
                layer: PacketLayer::Root,
                opcode: 0x41,
                source: FramingError::OutOfBounds { .. }
            }
        ));

        let mut long = MessageReader::from_raw_bytes(&[0x01, 0x02, 0x03]);
        let err = registry.dispatch(0x41, &mut long, &seen).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Decode {
                source: FramingError::TrailingBytes { remaining: 1 },
                ..
            }
        ));

        assert!(seen.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handled_packet_is_returned() {
        let mut registry: PacketRegistry<Seen> = PacketRegistry::new(PacketLayer::Root);
        registry.register_packet(0x40, Note::deserialize, |_, _| {}).unwrap();

        let outcome = registry
            .dispatch(0x40, &mut note_reader("hello"), &Seen::default())
            .unwrap();
        let DispatchOutcome::Handled(packet) = outcome else {
            panic!("expected a handled packet");
        };
        assert_eq!(packet.downcast_ref::<Note>().unwrap().text, "hello");
        assert!(packet.downcast_ref::<Counter>().is_none());
        assert_eq!(&packet.to_bytes()[..], &[0x05, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_framed_length_matches_prefix() {
        let framed = frame_packet(0x40, &Note { text: "hello world".into() }).unwrap();
        let declared = u16::from_le_bytes([framed[0], framed[1]]) as usize;

        assert_eq!(framed[2], 0x40);
        assert_eq!(framed.len(), declared + 3);

        let mut reader = MessageReader::new(framed);
        let mut message = reader.read_message().unwrap();
        assert_eq!(message.tag(), Some(0x40));
        assert_eq!(Note::deserialize(&mut message).unwrap().text, "hello world");
    }

    #[test]
    fn test_layer_display_and_serde() {
        assert_eq!(PacketLayer::GameData.to_string(), "game-data");
        assert_eq!(serde_json::to_string(&PacketLayer::GameData).unwrap(), "\"game_data\"");
    }
}
