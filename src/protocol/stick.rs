//! Stick (joystick) packet payload and wall-clock payloads.
//!
//! The drone only acts on commands while it keeps receiving stick packets,
//! so this payload is the heartbeat of the whole link. Four 11-bit axes and
//! a fast-mode bit are packed LSB-first into a 55-bit little-endian field,
//! followed by a 7-byte local wall-clock tail.

use chrono::{DateTime, Datelike, Local, Timelike};

/// Neutral raw axis value.
pub const AXIS_CENTER: u16 = 1024;
/// Half-range of the raw axis scale.
pub const AXIS_SCALE: f64 = 660.0;

/// Map a unit stick deflection onto the 11-bit wire scale.
///
/// Input is clamped to `[-1, 1]`; output lands in `[364, 1684]`.
pub fn axis_to_raw(v: f64) -> u16 {
    let clamped = v.clamp(-1.0, 1.0);
    (f64::from(AXIS_CENTER) + (AXIS_SCALE * clamped).round()) as u16
}

/// One stick frame: unit deflections per axis plus the fast-mode bit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StickCommand {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub thrust: f64,
    pub fast_mode: bool,
}

impl StickCommand {
    /// Encode with the current local wall clock.
    pub fn encode(&self) -> Vec<u8> {
        self.encode_at(Local::now())
    }

    /// Encode with an explicit timestamp for the clock tail.
    pub fn encode_at(&self, now: DateTime<Local>) -> Vec<u8> {
        let axes = u64::from(axis_to_raw(self.roll))
            | u64::from(axis_to_raw(self.pitch)) << 11
            | u64::from(axis_to_raw(self.thrust)) << 22
            | u64::from(axis_to_raw(self.yaw)) << 33
            | u64::from(self.fast_mode) << 44;

        let mut payload = Vec::with_capacity(13);
        payload.extend_from_slice(&axes.to_le_bytes()[..6]);
        payload.extend_from_slice(&wall_clock_tail(now));
        payload
    }
}

/// The 7-byte clock tail appended to every stick packet.
///
/// Milliseconds go out as two little-endian 16-bit words carrying the low
/// and high byte of one 16-bit value. Redundant, but it is what the
/// firmware expects on the wire.
pub fn wall_clock_tail(now: DateTime<Local>) -> [u8; 7] {
    let millis = (now.nanosecond() / 1_000_000) as u16;
    let lo = (millis & 0xFF).to_le_bytes();
    let hi = (millis >> 8).to_le_bytes();
    [
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
        lo[0],
        lo[1],
        hi[0],
        hi[1],
    ]
}

/// The 15-byte reply payload for the drone's time request.
pub fn date_time_payload(now: DateTime<Local>) -> Vec<u8> {
    let mut payload = Vec::with_capacity(15);
    payload.push(0x00);
    for field in [
        now.year() as u16,
        now.month() as u16,
        now.day() as u16,
        now.hour() as u16,
        now.minute() as u16,
        now.second() as u16,
        (now.nanosecond() / 1_000_000) as u16,
    ] {
        payload.extend_from_slice(&field.to_le_bytes());
    }
    payload
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
