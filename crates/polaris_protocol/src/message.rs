//! # Nested Message Framing
//!
//! Read and write primitives for the length-prefixed message format shared by
//! every protocol layer. A nested message is framed as
//!
//! ```text
//! [length: u16 LE][tag: u8][payload: length bytes]
//! ```
//!
//! where `length` counts only the payload. Writers open a message with
//! [`MessageWriter::start_message`], write the payload, then back-patch the
//! length in [`MessageWriter::end_message`]. Messages nest to any depth, which
//! lets root packets embed game-data packets that in turn embed RPC packets.
//!
//! Readers are cheap views over a shared [`Bytes`] buffer; sub-readers
//! returned by [`MessageReader::read_message`] and
//! [`MessageReader::read_remaining_bytes`] share the same allocation.

use crate::error::FramingError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

const MESSAGE_HEADER_LEN: usize = 3;
const MAX_PACKED_BYTES: usize = 5;

// ============================================================================
// Reader
// ============================================================================

/// Sequential reader over a framed byte buffer.
///
/// Reads past the end fail with [`FramingError::OutOfBounds`] and leave the
/// cursor where it was.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct MessageReader {
    buffer: Bytes,
    cursor: usize,
    tag: Option<u8>,
}

impl MessageReader {
    /// Creates a reader over the given bytes, positioned at the start.
    pub fn new(buffer: impl Into<Bytes>) -> Self {
        Self {
            buffer: buffer.into(),
            cursor: 0,
            tag: None,
        }
    }

    /// Creates a reader with no bytes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a reader by copying a byte slice.
    pub fn from_raw_bytes(bytes: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(bytes))
    }

    fn tagged(buffer: Bytes, tag: u8) -> Self {
        Self {
            buffer,
            cursor: 0,
            tag: Some(tag),
        }
    }

    /// The tag of the nested message this reader was produced from, if any.
    pub fn tag(&self) -> Option<u8> {
        self.tag
    }

    /// Total length of the underlying buffer, read or not.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Current read position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn has_bytes_left(&self) -> bool {
        self.remaining() > 0
    }

    /// The whole underlying buffer, including consumed bytes.
    pub fn buffer(&self) -> &Bytes {
        &self.buffer
    }

    /// Consumes the reader, returning the whole underlying buffer.
    pub fn into_bytes(self) -> Bytes {
        self.buffer
    }

    /// Inspects the byte `offset` positions past the cursor without consuming it.
    pub fn peek(&self, offset: usize) -> Result<u8, FramingError> {
        self.buffer
            .get(self.cursor + offset)
            .copied()
            .ok_or(FramingError::OutOfBounds {
                offset: self.cursor + offset,
                requested: 1,
                available: self.remaining().saturating_sub(offset),
            })
    }

    fn take(&mut self, count: usize) -> Result<Bytes, FramingError> {
        if count > self.remaining() {
            return Err(FramingError::OutOfBounds {
                offset: self.cursor,
                requested: count,
                available: self.remaining(),
            });
        }

        let slice = self.buffer.slice(self.cursor..self.cursor + count);
        self.cursor += count;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], FramingError> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&slice);
        Ok(out)
    }

    pub fn read_byte(&mut self) -> Result<u8, FramingError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, FramingError> {
        Ok(self.read_byte()? != 0)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, FramingError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn read_u16_be(&mut self) -> Result<u16, FramingError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, FramingError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, FramingError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    /// Reads a 7-bit packed unsigned integer (at most five bytes).
    pub fn read_packed_u32(&mut self) -> Result<u32, FramingError> {
        let start = self.cursor;
        let mut value: u32 = 0;

        for index in 0..MAX_PACKED_BYTES {
            let byte = match self.read_byte() {
                Ok(byte) => byte,
                Err(e) => {
                    self.cursor = start;
                    return Err(e);
                }
            };

            value |= u32::from(byte & 0x7f) << (7 * index);

            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }

        self.cursor = start;
        Err(FramingError::InvalidPackedInt)
    }

    /// Reads `count` bytes as a new reader.
    pub fn read_bytes(&mut self, count: usize) -> Result<MessageReader, FramingError> {
        self.take(count).map(MessageReader::new)
    }

    /// Reads a packed-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, FramingError> {
        let start = self.cursor;
        let length = self.read_packed_u32()? as usize;

        let bytes = match self.take(length) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.cursor = start;
                return Err(e);
            }
        };

        String::from_utf8(bytes.to_vec()).map_err(|_| {
            self.cursor = start;
            FramingError::InvalidString
        })
    }

    /// Reads one nested `{length, tag, payload}` message as a tagged reader.
    pub fn read_message(&mut self) -> Result<MessageReader, FramingError> {
        if self.remaining() < MESSAGE_HEADER_LEN {
            return Err(FramingError::OutOfBounds {
                offset: self.cursor,
                requested: MESSAGE_HEADER_LEN,
                available: self.remaining(),
            });
        }

        let start = self.cursor;
        let length = self.read_u16_le()? as usize;
        let tag = self.read_byte()?;

        match self.take(length) {
            Ok(payload) => Ok(MessageReader::tagged(payload, tag)),
            Err(e) => {
                self.cursor = start;
                Err(e)
            }
        }
    }

    /// Returns every unconsumed byte as a new reader and moves the cursor to the end.
    pub fn read_remaining_bytes(&mut self) -> MessageReader {
        let rest = self.buffer.slice(self.cursor..);
        self.cursor = self.buffer.len();
        MessageReader::new(rest)
    }
}

impl fmt::Debug for MessageReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageReader")
            .field("tag", &self.tag)
            .field("cursor", &self.cursor)
            .field("bytes", &HexBytes(&self.buffer))
            .finish()
    }
}

impl fmt::Display for MessageReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HexBytes(&self.buffer))
    }
}

/// Lower-case hex rendering of a byte slice, used for log output.
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Append-only writer with nested message framing.
///
/// Append methods return `&mut Self` so packets can be built in one chain:
///
/// ```
/// use polaris_protocol::MessageWriter;
///
/// let mut writer = MessageWriter::new();
/// writer
///     .write_byte(0x01)
///     .write_u16_be(0x07)
///     .start_message(0x40)
///     .write_string("hello world")
///     .end_message()
///     .unwrap();
/// assert_eq!(writer.len(), 1 + 2 + 3 + 12);
/// ```
#[derive(Debug, Default)]
pub struct MessageWriter {
    buffer: BytesMut,
    open_messages: Vec<usize>,
    overflow: Option<usize>,
}

impl MessageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// The bytes written so far, including any unpatched length placeholders.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn write_byte(&mut self, value: u8) -> &mut Self {
        self.buffer.put_u8(value);
        self
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_byte(u8::from(value))
    }

    pub fn write_u16_le(&mut self, value: u16) -> &mut Self {
        self.buffer.put_u16_le(value);
        self
    }

    pub fn write_u16_be(&mut self, value: u16) -> &mut Self {
        self.buffer.put_u16(value);
        self
    }

    pub fn write_u32_le(&mut self, value: u32) -> &mut Self {
        self.buffer.put_u32_le(value);
        self
    }

    pub fn write_i32_le(&mut self, value: i32) -> &mut Self {
        self.buffer.put_i32_le(value);
        self
    }

    pub fn write_packed_u32(&mut self, mut value: u32) -> &mut Self {
        loop {
            let mut byte = (value & 0x7f) as u8;
            value >>= 7;

            if value != 0 {
                byte |= 0x80;
            }

            self.buffer.put_u8(byte);

            if value == 0 {
                return self;
            }
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buffer.put_slice(bytes);
        self
    }

    /// Writes a packed-length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> &mut Self {
        // Strings are bounded by the 16-bit message length long before u32 matters.
        self.write_packed_u32(value.len() as u32);
        self.write_bytes(value.as_bytes())
    }

    /// Opens a nested message: reserves the 2-byte length and writes the tag.
    pub fn start_message(&mut self, tag: u8) -> &mut Self {
        self.open_messages.push(self.buffer.len());
        self.buffer.put_u16_le(0);
        self.buffer.put_u8(tag);
        self
    }

    /// Closes the innermost open message and back-patches its length.
    pub fn end_message(&mut self) -> Result<&mut Self, FramingError> {
        let start = self
            .open_messages
            .pop()
            .ok_or(FramingError::UnbalancedMessage { open: 0 })?;

        let length = self.buffer.len() - start - MESSAGE_HEADER_LEN;
        let Ok(prefix) = u16::try_from(length) else {
            self.overflow = Some(length);
            return Err(FramingError::MessageTooLong { length });
        };

        self.buffer[start..start + 2].copy_from_slice(&prefix.to_le_bytes());
        Ok(self)
    }

    /// Returns the finished buffer. Fails if a message is still open or overflowed.
    pub fn finish(self) -> Result<Bytes, FramingError> {
        if let Some(length) = self.overflow {
            return Err(FramingError::MessageTooLong { length });
        }

        if !self.open_messages.is_empty() {
            return Err(FramingError::UnbalancedMessage {
                open: self.open_messages.len(),
            });
        }

        Ok(self.buffer.freeze())
    }
}
