//! Field codecs for the drone wire protocol.
//!
//! All multi-byte fields are little-endian, tightly packed. Records are
//! decoded by value copy at fixed offsets; there is no padding anywhere in
//! the protocol.

use crate::error::{Result, WireError};

// ---------------------------------------------------------------------------
// Read helpers
// ---------------------------------------------------------------------------

/// Read a little-endian signed 16-bit integer.
pub fn read_i16(data: &[u8], offset: usize) -> Result<i16> {
    check_len(data, offset, 2, "INT16")?;
    Ok(i16::from_le_bytes([data[offset], data[offset + 1]]))
}

/// Read a little-endian unsigned 16-bit integer.
pub fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    check_len(data, offset, 2, "UINT16")?;
    Ok(u16::from_le_bytes([data[offset], data[offset + 1]]))
}

/// Read a little-endian unsigned 32-bit integer.
pub fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    check_len(data, offset, 4, "UINT32")?;
    Ok(u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]))
}

/// Read a little-endian IEEE 754 single.
pub fn read_f32(data: &[u8], offset: usize) -> Result<f32> {
    check_len(data, offset, 4, "FLOAT32")?;
    Ok(f32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]))
}

/// Read a little-endian IEEE 754 double.
pub fn read_f64(data: &[u8], offset: usize) -> Result<f64> {
    check_len(data, offset, 8, "FLOAT64")?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    Ok(f64::from_le_bytes(bytes))
}

// ---------------------------------------------------------------------------
// Write helpers
// ---------------------------------------------------------------------------

/// Write a little-endian signed 16-bit integer.
pub fn write_i16(buf: &mut Vec<u8>, val: i16) {
    buf.extend_from_slice(&val.to_le_bytes());
}

/// Write a little-endian unsigned 16-bit integer.
pub fn write_u16(buf: &mut Vec<u8>, val: u16) {
    buf.extend_from_slice(&val.to_le_bytes());
}

/// Write a little-endian IEEE 754 single.
pub fn write_f32(buf: &mut Vec<u8>, val: f32) {
    buf.extend_from_slice(&val.to_le_bytes());
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

fn check_len(data: &[u8], offset: usize, need: usize, name: &'static str) -> Result<()> {
    if data.len() < offset + need {
        Err(WireError::payload_too_short(name, offset + need, data.len()))
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
