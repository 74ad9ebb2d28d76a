use thiserror::Error;

/// Errors arising from wire protocol parsing and encoding.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("packet too short ({len} bytes, minimum {min})")]
    PacketTooShort { len: usize, min: usize },

    #[error("missing packet magic (expected 0xCC, got 0x{got:02X})")]
    BadMagic { got: u8 },

    #[error("payload too short for {msg_type}: need {need} bytes, got {got}")]
    PayloadTooShort {
        msg_type: &'static str,
        need: usize,
        got: usize,
    },

    #[error("header CRC-8 mismatch (expected 0x{expected:02X}, computed 0x{computed:02X})")]
    Crc8Mismatch { expected: u8, computed: u8 },

    #[error("frame CRC-16 mismatch (expected 0x{expected:04X}, computed 0x{computed:04X})")]
    Crc16Mismatch { expected: u16, computed: u16 },

    #[error("corrupted log stream at offset {offset} (expected 0x55, got 0x{got:02X})")]
    CorruptedLog { offset: usize, got: u8 },

    #[error("invalid string payload: {0}")]
    InvalidString(#[from] std::string::FromUtf8Error),
}

impl WireError {
    /// Create a `PayloadTooShort` error.
    pub(crate) fn payload_too_short(msg_type: &'static str, need: usize, got: usize) -> Self {
        Self::PayloadTooShort {
            msg_type,
            need,
            got,
        }
    }
}

pub type Result<T> = std::result::Result<T, WireError>;
