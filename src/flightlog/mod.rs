//! Flight-log record stream decoder.
//!
//! The drone embeds a self-delimiting TLV record stream inside the payload
//! of message 0x1051. Record format:
//!
//! ```text
//! 55 | len:2 | CRC8 | type:2 | xorKey | reserved:3 | PAYLOAD... | CRC16:2
//! ```
//!
//! `len` covers the whole record including header and trailing CRC. Every
//! payload byte is XORed with the per-record key. Records decode in the
//! drone's native frame; the facade rotates them into the canonical frame
//! before publishing.

pub mod records;

use crate::codec;
use crate::error::{Result, WireError};
use crate::math::{Matrix3, Quaternion, Vector3};

use records::{ImuExRecord, ImuRecord, MvoRecord};

/// First byte of every log record.
pub const RECORD_MAGIC: u8 = 0x55;
/// Record header: magic + len + crc8 + type + key + 3 reserved.
pub const RECORD_HEADER_LEN: usize = 10;

// Record types the parser interprets.
pub const REC_USONIC: u16 = 0x0010;
pub const REC_MVO: u16 = 0x001D;
pub const REC_IMU: u16 = 0x0800;
pub const REC_IMU_EX: u16 = 0x0810;

/// Record types the drone is known to emit but the library does not
/// interpret. They surface as [`LogRecord::Unhandled`].
pub const KNOWN_UNHANDLED: &[u16] = &[
    0x000C, // goTxtOrOsd
    0x03E8, // controller
    0x03E9, // aircraftCond
    0x03EA, // serialApiInputs
    0x04B0, // ctrlVertDbg
    0x04B2, // ctrlVertVelDbg
    0x04B3, // ctrlVertAccDbg
    0x0514, // ctrlHorizDbg
    0x0517, 0x0518, 0x0519, 0x051A, 0x051B, // ctrlHoriz*
    0x06AE, // battInfo
    0x08A0, // attiMini
    0x2765, // nsDataDebug
    0x2766, // nsDataComponent
    0x2774, // recAirComp
];

// ---------------------------------------------------------------------------
// Structured samples
// ---------------------------------------------------------------------------

/// Per-axis validity flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisValidity {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl AxisValidity {
    fn from_bits(bits: u8) -> Self {
        Self {
            x: bits & 0x01 != 0,
            y: bits & 0x02 != 0,
            z: bits & 0x04 != 0,
        }
    }
}

/// Velocity/position validity split, decoded from a record's bitmap
/// (bits 0..2 velocity, bits 3..5 position).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Validity {
    pub vel: AxisValidity,
    pub pos: AxisValidity,
}

impl Validity {
    pub fn from_bitmap(bits: u8) -> Self {
        Self {
            vel: AxisValidity::from_bits(bits),
            pos: AxisValidity::from_bits(bits >> 3),
        }
    }
}

/// Multiview visual odometry sample.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mvo {
    /// Velocity, m/s.
    pub velocity: Vector3,
    /// Position, m.
    pub position: Vector3,
    pub position_cov: Matrix3,
    pub velocity_cov: Matrix3,
    /// Height above ground, m.
    pub height: f64,
    pub height_variance: f64,
    pub valid: Validity,
}

/// Inertial sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Imu {
    /// Inertial-frame acceleration, g.
    pub accel: Vector3,
    /// Body-frame angular rate, degrees/s.
    pub gyro: Vector3,
    pub orientation: Quaternion,
    /// Degrees C.
    pub temperature: f64,
}

/// Visual odometry sample.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vo {
    /// Velocity, m/s.
    pub velocity: Vector3,
    /// Position, m.
    pub position: Vector3,
    pub valid: Validity,
}

/// One parsed log record.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Mvo(Mvo),
    Imu(Imu),
    Vo(Vo),
    /// Ultrasonic ground distance, metres.
    Proximity(f64),
    /// A type from [`KNOWN_UNHANDLED`]; payload passed through de-obfuscated.
    Unhandled {
        record_type: u16,
        length: u16,
        payload: Vec<u8>,
    },
    /// A type the library has never seen.
    Unknown {
        record_type: u16,
        length: u16,
        payload: Vec<u8>,
    },
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Walk the payload of a log-data message and decode every record.
///
/// The first payload byte (always 0x00) is skipped. A record whose magic
/// does not match aborts the whole payload with
/// [`WireError::CorruptedLog`]; a record that would run past the end of the
/// buffer terminates the walk cleanly.
pub fn parse(message_payload: &[u8]) -> Result<Vec<LogRecord>> {
    let mut out = Vec::new();
    if message_payload.is_empty() {
        return Ok(out);
    }
    let data = &message_payload[1..];

    let mut cursor = 0usize;
    while cursor < data.len().saturating_sub(2) {
        if data[cursor] != RECORD_MAGIC {
            return Err(WireError::CorruptedLog {
                offset: cursor,
                got: data[cursor],
            });
        }
        if cursor + RECORD_HEADER_LEN > data.len() {
            break;
        }

        let length = codec::read_u16(data, cursor + 1)?;
        let record_type = codec::read_u16(data, cursor + 4)?;
        let xor_key = data[cursor + 6];

        let payload_len = (length as usize).saturating_sub(RECORD_HEADER_LEN + 2);
        let start = cursor + RECORD_HEADER_LEN;
        if length as usize <= RECORD_HEADER_LEN + 2 || start + payload_len > data.len() {
            break;
        }

        let mut payload = data[start..start + payload_len].to_vec();
        for b in &mut payload {
            *b ^= xor_key;
        }

        out.push(decode_record(record_type, length, payload)?);
        cursor += length as usize;
    }

    Ok(out)
}

fn decode_record(record_type: u16, length: u16, payload: Vec<u8>) -> Result<LogRecord> {
    match record_type {
        REC_MVO => {
            let raw = MvoRecord::decode(&payload)?;
            Ok(LogRecord::Mvo(Mvo {
                velocity: Vector3::new(
                    f64::from(raw.velocity[0]) / 1000.0,
                    f64::from(raw.velocity[1]) / 1000.0,
                    f64::from(raw.velocity[2]) / 1000.0,
                ),
                position: Vector3::new(
                    f64::from(raw.position[0]),
                    f64::from(raw.position[1]),
                    f64::from(raw.position[2]),
                ),
                position_cov: Matrix3::from_upper_triangle(raw.position_cov.map(f64::from)),
                velocity_cov: Matrix3::from_upper_triangle(raw.velocity_cov.map(f64::from)),
                height: f64::from(raw.height),
                height_variance: f64::from(raw.height_variance),
                valid: Validity::from_bitmap(raw.validity),
            }))
        }
        REC_IMU => {
            let raw = ImuRecord::decode(&payload)?;
            Ok(LogRecord::Imu(Imu {
                accel: Vector3::new(
                    f64::from(raw.accel[0]),
                    f64::from(raw.accel[1]),
                    f64::from(raw.accel[2]),
                ),
                gyro: Vector3::new(
                    f64::from(raw.gyro[0]),
                    f64::from(raw.gyro[1]),
                    f64::from(raw.gyro[2]),
                ),
                orientation: Quaternion::new(
                    f64::from(raw.quat[0]),
                    f64::from(raw.quat[1]),
                    f64::from(raw.quat[2]),
                    f64::from(raw.quat[3]),
                ),
                temperature: f64::from(raw.temperature) / 100.0,
            }))
        }
        REC_IMU_EX => {
            let raw = ImuExRecord::decode(&payload)?;
            Ok(LogRecord::Vo(Vo {
                velocity: Vector3::new(
                    f64::from(raw.velocity[0]),
                    f64::from(raw.velocity[1]),
                    f64::from(raw.velocity[2]),
                ),
                position: Vector3::new(
                    f64::from(raw.position[0]),
                    f64::from(raw.position[1]),
                    f64::from(raw.position[2]),
                ),
                valid: Validity::from_bitmap(raw.validity),
            }))
        }
        REC_USONIC => {
            let mm = codec::read_u16(&payload, 0)?;
            Ok(LogRecord::Proximity(f64::from(mm) / 1000.0))
        }
        t if KNOWN_UNHANDLED.contains(&t) => Ok(LogRecord::Unhandled {
            record_type,
            length,
            payload,
        }),
        _ => Ok(LogRecord::Unknown {
            record_type,
            length,
            payload,
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
