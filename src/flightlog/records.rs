//! Raw flight-log record layouts.
//!
//! Fixed little-endian offsets inside the de-obfuscated record payloads.
//! Fields the library does not consume (GPS placeholders, debug words) are
//! skipped rather than decoded.

use crate::codec;
use crate::error::{Result, WireError};

/// Inertial sample (record type 0x0800, ~10 Hz).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImuRecord {
    /// Inertial-frame acceleration, g.
    pub accel: [f32; 3],
    /// Body-frame angular rate, degrees/s.
    pub gyro: [f32; 3],
    /// Attitude quaternion `(w, x, y, z)`.
    pub quat: [f32; 4],
    /// Raw magnetometer counts.
    pub mag: [i16; 3],
    /// Temperature in centi-degrees C.
    pub temperature: i16,
}

impl ImuRecord {
    pub const WIRE_LEN: usize = 108;

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::WIRE_LEN {
            return Err(WireError::payload_too_short(
                "ImuRecord",
                Self::WIRE_LEN,
                payload.len(),
            ));
        }
        Ok(Self {
            accel: [
                codec::read_f32(payload, 20)?,
                codec::read_f32(payload, 24)?,
                codec::read_f32(payload, 28)?,
            ],
            gyro: [
                codec::read_f32(payload, 32)?,
                codec::read_f32(payload, 36)?,
                codec::read_f32(payload, 40)?,
            ],
            quat: [
                codec::read_f32(payload, 48)?,
                codec::read_f32(payload, 52)?,
                codec::read_f32(payload, 56)?,
                codec::read_f32(payload, 60)?,
            ],
            mag: [
                codec::read_i16(payload, 96)?,
                codec::read_i16(payload, 98)?,
                codec::read_i16(payload, 100)?,
            ],
            temperature: codec::read_i16(payload, 102)?,
        })
    }
}

/// Multiview-visual-odometry sample (record type 0x001D, ~5 Hz).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MvoRecord {
    /// Velocity in millimetres/s.
    pub velocity: [i16; 3],
    /// Position in metres.
    pub position: [f32; 3],
    /// Position covariance upper triangle `c1..c6`.
    pub position_cov: [f32; 6],
    /// Velocity covariance upper triangle `c1..c6`.
    pub velocity_cov: [f32; 6],
    pub height: f32,
    pub height_variance: f32,
    /// Validity bitmap: bits 0..2 velocity x,y,z; bits 3..5 position x,y,z.
    pub validity: u8,
}

impl MvoRecord {
    pub const WIRE_LEN: usize = 80;

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::WIRE_LEN {
            return Err(WireError::payload_too_short(
                "MvoRecord",
                Self::WIRE_LEN,
                payload.len(),
            ));
        }
        let mut position_cov = [0f32; 6];
        let mut velocity_cov = [0f32; 6];
        for i in 0..6 {
            position_cov[i] = codec::read_f32(payload, 20 + 4 * i)?;
            velocity_cov[i] = codec::read_f32(payload, 44 + 4 * i)?;
        }
        Ok(Self {
            velocity: [
                codec::read_i16(payload, 2)?,
                codec::read_i16(payload, 4)?,
                codec::read_i16(payload, 6)?,
            ],
            position: [
                codec::read_f32(payload, 8)?,
                codec::read_f32(payload, 12)?,
                codec::read_f32(payload, 16)?,
            ],
            position_cov,
            velocity_cov,
            height: codec::read_f32(payload, 68)?,
            height_variance: codec::read_f32(payload, 72)?,
            validity: payload[76],
        })
    }
}

/// Visual-odometry sample (record type 0x0810, "ImuEx", ~10 Hz).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImuExRecord {
    /// Velocity in m/s.
    pub velocity: [f32; 3],
    /// Position in metres.
    pub position: [f32; 3],
    /// Ultrasonic vertical velocity, m/s.
    pub us_velocity: f32,
    /// Ultrasonic ground distance, millimetres.
    pub us_distance: f32,
    pub rtk_longitude: f64,
    pub rtk_latitude: f64,
    pub rtk_altitude: f32,
    /// Validity bitmap: bits 0..2 velocity x,y,z; bits 3..5 position x,y,z.
    pub validity: u8,
    pub error_flags: u8,
}

impl ImuExRecord {
    pub const WIRE_LEN: usize = 60;

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::WIRE_LEN {
            return Err(WireError::payload_too_short(
                "ImuExRecord",
                Self::WIRE_LEN,
                payload.len(),
            ));
        }
        Ok(Self {
            velocity: [
                codec::read_f32(payload, 0)?,
                codec::read_f32(payload, 4)?,
                codec::read_f32(payload, 8)?,
            ],
            position: [
                codec::read_f32(payload, 12)?,
                codec::read_f32(payload, 16)?,
                codec::read_f32(payload, 20)?,
            ],
            us_velocity: codec::read_f32(payload, 24)?,
            us_distance: codec::read_f32(payload, 28)?,
            rtk_longitude: codec::read_f64(payload, 32)?,
            rtk_latitude: codec::read_f64(payload, 40)?,
            rtk_altitude: codec::read_f32(payload, 48)?,
            validity: payload[52],
            error_flags: payload[53],
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{write_f32, write_i16};

    #[test]
    fn imu_record_offsets() {
        let mut buf = vec![0u8; ImuRecord::WIRE_LEN];
        buf[20..24].copy_from_slice(&0.5f32.to_le_bytes());
        buf[48..52].copy_from_slice(&1.0f32.to_le_bytes()); // quat w
        buf[102..104].copy_from_slice(&2650i16.to_le_bytes());
        let rec = ImuRecord::decode(&buf).unwrap();
        assert_eq!(rec.accel[0], 0.5);
        assert_eq!(rec.quat[0], 1.0);
        assert_eq!(rec.temperature, 2650);
    }

    #[test]
    fn mvo_record_layout() {
        let mut buf = Vec::new();
        write_i16(&mut buf, 0); // frame counter
        for v in [100i16, -250, 30] {
            write_i16(&mut buf, v);
        }
        for p in [1.0f32, 2.0, -3.0] {
            write_f32(&mut buf, p);
        }
        for c in 1..=6 {
            write_f32(&mut buf, c as f32); // position cov
        }
        for c in 1..=6 {
            write_f32(&mut buf, 10.0 + c as f32); // velocity cov
        }
        write_f32(&mut buf, 1.25); // height
        write_f32(&mut buf, 0.01); // height variance
        buf.push(0b0011_1111); // all axes valid
        buf.resize(MvoRecord::WIRE_LEN, 0);

        let rec = MvoRecord::decode(&buf).unwrap();
        assert_eq!(rec.velocity, [100, -250, 30]);
        assert_eq!(rec.position, [1.0, 2.0, -3.0]);
        assert_eq!(rec.position_cov[1], 2.0);
        assert_eq!(rec.velocity_cov[5], 16.0);
        assert_eq!(rec.height, 1.25);
        assert_eq!(rec.validity, 0x3F);
    }

    #[test]
    fn imu_ex_record_layout() {
        let mut buf = Vec::new();
        for v in [0.1f32, 0.2, 0.3, 4.0, 5.0, 6.0] {
            write_f32(&mut buf, v);
        }
        write_f32(&mut buf, -0.5); // us velocity
        write_f32(&mut buf, 1000.0); // us distance
        buf.extend_from_slice(&0f64.to_le_bytes());
        buf.extend_from_slice(&0f64.to_le_bytes());
        write_f32(&mut buf, 0.0);
        buf.push(0b0001_1000); // pos x,y valid only... bits 3,4
        buf.push(0);
        buf.resize(ImuExRecord::WIRE_LEN, 0);

        let rec = ImuExRecord::decode(&buf).unwrap();
        assert_eq!(rec.velocity, [0.1, 0.2, 0.3]);
        assert_eq!(rec.position, [4.0, 5.0, 6.0]);
        assert_eq!(rec.us_distance, 1000.0);
        assert_eq!(rec.validity, 0b0001_1000);
    }

    #[test]
    fn short_records_rejected() {
        assert!(ImuRecord::decode(&[0u8; 107]).is_err());
        assert!(MvoRecord::decode(&[0u8; 79]).is_err());
        assert!(ImuExRecord::decode(&[0u8; 59]).is_err());
    }
}
