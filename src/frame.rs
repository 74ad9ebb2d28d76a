//! Outer frame parsing and encoding.
//!
//! Wire format (little-endian):
//! ```text
//! CC | size:2 | CRC8 | info | msgID:2 | seq:2 | PAYLOAD... | CRC16:2
//! ```
//!
//! The size field stores the total frame length left-shifted by three bits
//! inside a 16-bit little-endian word. CRC-8 covers the first three bytes;
//! CRC-16 covers everything before its own two bytes.

use crate::crc::{crc16, crc8};
use crate::error::{Result, WireError};

/// First byte of every framed packet.
pub const MAGIC: u8 = 0xCC;

/// Preamble length: magic + size + crc8 + info + msgID + seq.
pub const PREAMBLE_LEN: usize = 9;

/// Minimum frame: preamble plus trailing CRC-16.
pub const MIN_FRAME_LEN: usize = PREAMBLE_LEN + 2;

// ---------------------------------------------------------------------------
// Size field
// ---------------------------------------------------------------------------

/// Encode a total frame length into the two on-wire size bytes.
pub fn encode_size(len: u16) -> [u8; 2] {
    [((len << 3) & 0xFF) as u8, ((len >> 5) & 0xFF) as u8]
}

/// Recover a total frame length from the two on-wire size bytes.
pub fn decode_size(lo: u8, hi: u8) -> u16 {
    u16::from_le_bytes([lo, hi]) >> 3
}

// ---------------------------------------------------------------------------
// Packet type/direction bitfield
// ---------------------------------------------------------------------------

/// The type/direction byte at preamble offset 4.
///
/// Bit layout, LSB first: `packetSubtype:3 | packetType:3 | toDrone:1 |
/// fromDrone:1`. Commands use a handful of fixed values (0x48, 0x50, 0x60,
/// 0x68, 0x70) kept as constants in [`crate::protocol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    pub from_drone: bool,
    pub to_drone: bool,
    pub packet_type: u8,
    pub packet_subtype: u8,
}

impl PacketInfo {
    pub fn from_byte(b: u8) -> Self {
        Self {
            from_drone: b & 0x80 != 0,
            to_drone: b & 0x40 != 0,
            packet_type: (b >> 3) & 0x07,
            packet_subtype: b & 0x07,
        }
    }

    pub fn as_byte(self) -> u8 {
        (u8::from(self.from_drone) << 7)
            | (u8::from(self.to_drone) << 6)
            | ((self.packet_type & 0x07) << 3)
            | (self.packet_subtype & 0x07)
    }
}

// ---------------------------------------------------------------------------
// RawPacket
// ---------------------------------------------------------------------------

/// A parsed outer frame: preamble fields plus payload.
#[derive(Debug, Clone)]
pub struct RawPacket {
    pub info: PacketInfo,
    pub msg_id: u16,
    pub seq: u16,
    pub payload: Vec<u8>,
}

impl RawPacket {
    pub fn new(info: u8, msg_id: u16, seq: u16, payload: Vec<u8>) -> Self {
        Self {
            info: PacketInfo::from_byte(info),
            msg_id,
            seq,
            payload,
        }
    }

    /// Parse a single datagram as a framed packet.
    ///
    /// Verifies the magic byte only; the firmware itself emits frames whose
    /// CRCs some replies do not populate, so checksum validation is a
    /// separate, opt-in step ([`parse_strict`](Self::parse_strict)).
    pub fn parse(wire: &[u8]) -> Result<Self> {
        if wire.len() < MIN_FRAME_LEN {
            return Err(WireError::PacketTooShort {
                len: wire.len(),
                min: MIN_FRAME_LEN,
            });
        }
        if wire[0] != MAGIC {
            return Err(WireError::BadMagic { got: wire[0] });
        }

        let info = PacketInfo::from_byte(wire[4]);
        let msg_id = u16::from_le_bytes([wire[5], wire[6]]);
        let seq = u16::from_le_bytes([wire[7], wire[8]]);
        let payload = wire[PREAMBLE_LEN..wire.len() - 2].to_vec();

        Ok(Self {
            info,
            msg_id,
            seq,
            payload,
        })
    }

    /// Parse a datagram and verify both checksums.
    pub fn parse_strict(wire: &[u8]) -> Result<Self> {
        let packet = Self::parse(wire)?;

        let computed8 = crc8(&wire[..3]);
        if computed8 != wire[3] {
            return Err(WireError::Crc8Mismatch {
                expected: wire[3],
                computed: computed8,
            });
        }

        let expected16 = u16::from_le_bytes([wire[wire.len() - 2], wire[wire.len() - 1]]);
        let computed16 = crc16(&wire[..wire.len() - 2]);
        if computed16 != expected16 {
            return Err(WireError::Crc16Mismatch {
                expected: expected16,
                computed: computed16,
            });
        }

        Ok(packet)
    }

    /// Encode into a complete wire frame with size field and checksums.
    pub fn encode(&self) -> Vec<u8> {
        let total = PREAMBLE_LEN + self.payload.len() + 2;
        let mut wire = Vec::with_capacity(total);

        wire.push(MAGIC);
        wire.extend_from_slice(&encode_size(total as u16));
        wire.push(crc8(&wire[..3]));
        wire.push(self.info.as_byte());
        wire.extend_from_slice(&self.msg_id.to_le_bytes());
        wire.extend_from_slice(&self.seq.to_le_bytes());
        wire.extend_from_slice(&self.payload);
        wire.extend_from_slice(&crc16(&wire).to_le_bytes());
        wire
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
