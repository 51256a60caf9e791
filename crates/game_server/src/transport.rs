//! Transport header of the UDP protocol.
//!
//! Every datagram (after preprocessing) starts with one header byte. Reliable,
//! hello and ping packets carry a big-endian `u16` nonce that the receiver
//! acknowledges with `0x0a nonce 0xff`.

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketHeader {
    Unreliable,
    Reliable,
    Hello,
    Disconnect,
    Acknowledgement,
    Ping,
}

impl PacketHeader {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(PacketHeader::Unreliable),
            0x01 => Some(PacketHeader::Reliable),
            0x08 => Some(PacketHeader::Hello),
            0x09 => Some(PacketHeader::Disconnect),
            0x0a => Some(PacketHeader::Acknowledgement),
            0x0c => Some(PacketHeader::Ping),
            _ => None,
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            PacketHeader::Unreliable => 0x00,
            PacketHeader::Reliable => 0x01,
            PacketHeader::Hello => 0x08,
            PacketHeader::Disconnect => 0x09,
            PacketHeader::Acknowledgement => 0x0a,
            PacketHeader::Ping => 0x0c,
        }
    }

    /// Whether the sender expects an acknowledgement.
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            PacketHeader::Reliable | PacketHeader::Hello | PacketHeader::Ping
        )
    }
}

/// Builds the acknowledgement for `nonce`.
pub fn acknowledgement(nonce: u16) -> Bytes {
    let [high, low] = nonce.to_be_bytes();
    Bytes::from(vec![PacketHeader::Acknowledgement.byte(), high, low, 0xff])
}
