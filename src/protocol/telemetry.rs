//! Telemetry message payloads carried outside the flight-log stream.

use crate::codec;
use crate::error::{Result, WireError};

/// Flight data broadcast (24 bytes, message 0x0056, ~10 Hz).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlightData {
    /// Height above takeoff point (decimetres).
    pub height: i16,
    /// North speed (decimetres/s).
    pub north_speed: i16,
    /// East speed (decimetres/s).
    pub east_speed: i16,
    /// Vertical speed (decimetres/s).
    pub vertical_speed: i16,
    /// Time since motors started (tenths of a second).
    pub fly_time: i16,

    pub imu_state: bool,
    pub pressure_state: bool,
    pub down_visual_state: bool,
    pub power_state: bool,
    pub battery_state: bool,
    pub gravity_state: bool,
    pub wind_state: bool,

    pub imu_calibration_state: u8,
    pub battery_percentage: u8,
    pub drone_fly_time_left: i16,
    /// Remaining battery (millivolts).
    pub drone_battery_left: i16,

    pub em_sky: bool,
    pub em_ground: bool,
    pub em_open: bool,
    pub drone_hover: bool,
    pub outage_recording: bool,
    pub battery_low: bool,
    pub battery_lower: bool,
    pub factory_mode: bool,

    pub fly_mode: u8,
    pub throw_fly_timer: u8,
    pub camera_state: u8,
    pub electrical_machinery_state: u8,

    pub front_in: bool,
    pub front_out: bool,
    pub front_lsc: bool,
    pub temperature_height: bool,
}

impl FlightData {
    pub const WIRE_LEN: usize = 24;

    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::WIRE_LEN {
            return Err(WireError::payload_too_short(
                "FlightData",
                Self::WIRE_LEN,
                payload.len(),
            ));
        }
        Ok(Self {
            height: codec::read_i16(payload, 0)?,
            north_speed: codec::read_i16(payload, 2)?,
            east_speed: codec::read_i16(payload, 4)?,
            vertical_speed: codec::read_i16(payload, 6)?,
            fly_time: codec::read_i16(payload, 8)?,

            imu_state: payload[10] & 0x01 != 0,
            pressure_state: payload[10] & 0x02 != 0,
            down_visual_state: payload[10] & 0x04 != 0,
            power_state: payload[10] & 0x08 != 0,
            battery_state: payload[10] & 0x10 != 0,
            gravity_state: payload[10] & 0x20 != 0,
            wind_state: payload[10] & 0x80 != 0,

            imu_calibration_state: payload[11],
            battery_percentage: payload[12],
            drone_fly_time_left: codec::read_i16(payload, 13)?,
            drone_battery_left: codec::read_i16(payload, 15)?,

            em_sky: payload[17] & 0x01 != 0,
            em_ground: payload[17] & 0x02 != 0,
            em_open: payload[17] & 0x04 != 0,
            drone_hover: payload[17] & 0x08 != 0,
            outage_recording: payload[17] & 0x10 != 0,
            battery_low: payload[17] & 0x20 != 0,
            battery_lower: payload[17] & 0x40 != 0,
            factory_mode: payload[17] & 0x80 != 0,

            fly_mode: payload[18],
            throw_fly_timer: payload[19],
            camera_state: payload[20],
            electrical_machinery_state: payload[21],

            front_in: payload[22] & 0x01 != 0,
            front_out: payload[22] & 0x02 != 0,
            front_lsc: payload[22] & 0x04 != 0,
            temperature_height: payload[23] & 0x01 != 0,
        })
    }
}

/// Coarse flight phase derived from `(fly_mode, em_sky)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlightState {
    Landed,
    TakingOff,
    Flying,
    Hovering,
    Landing,
}

impl FlightState {
    /// Derive a state from the flight-data fields, or `None` for
    /// combinations that should not move the published state.
    pub fn derive(fly_mode: u8, em_sky: bool) -> Option<Self> {
        match (fly_mode, em_sky) {
            (1, true) => Some(FlightState::Flying),
            (6, true) => Some(FlightState::Hovering),
            (6, false) => Some(FlightState::Landed),
            (11, true) => Some(FlightState::TakingOff),
            (12, true) => Some(FlightState::Landing),
            _ => None,
        }
    }
}

/// WiFi link quality (message 0x001A).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WifiInfo {
    pub strength: u8,
    pub disturb: u8,
}

impl WifiInfo {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 2 {
            return Err(WireError::payload_too_short("WifiInfo", 2, payload.len()));
        }
        Ok(Self {
            strength: payload[0],
            disturb: payload[1],
        })
    }
}

/// Ambient light report (message 0x0035).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LightInfo {
    pub strength: u8,
}

impl LightInfo {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(WireError::payload_too_short("LightInfo", 1, 0));
        }
        Ok(Self {
            strength: payload[0],
        })
    }
}

/// Altitude limit reply (message 0x1056): status byte, then metres.
pub fn decode_alt_limit(payload: &[u8]) -> Result<u16> {
    if payload.len() < 3 {
        return Err(WireError::payload_too_short("AltLimit", 3, payload.len()));
    }
    codec::read_u16(payload, 1)
}

/// Firmware version reply (message 0x0045): status byte, then a NUL-padded
/// ASCII string.
pub fn decode_version(payload: &[u8]) -> Result<String> {
    if payload.len() < 2 {
        return Err(WireError::payload_too_short("Version", 2, payload.len()));
    }
    let text = String::from_utf8(payload[1..].to_vec())?;
    Ok(text.trim_end_matches('\0').to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Vec<u8> {
        let mut p = vec![0u8; 24];
        p[0] = 0x0A; // height 10 dm
        p[2] = 0x03; // north 3
        p[10] = 0b0001_0101; // imu, downVisual, battery
        p[12] = 72; // battery %
        p[17] = 0b0000_0001; // emSky
        p[18] = 6; // hover mode
        p
    }

    #[test]
    fn decode_sample() {
        let fd = FlightData::decode(&sample_payload()).unwrap();
        assert_eq!(fd.height, 10);
        assert_eq!(fd.north_speed, 3);
        assert!(fd.imu_state);
        assert!(!fd.pressure_state);
        assert!(fd.down_visual_state);
        assert!(fd.battery_state);
        assert_eq!(fd.battery_percentage, 72);
        assert!(fd.em_sky);
        assert_eq!(fd.fly_mode, 6);
    }

    #[test]
    fn short_payload() {
        assert!(matches!(
            FlightData::decode(&[0u8; 23]),
            Err(WireError::PayloadTooShort { .. })
        ));
    }

    #[test]
    fn flight_state_table() {
        assert_eq!(FlightState::derive(1, true), Some(FlightState::Flying));
        assert_eq!(FlightState::derive(6, true), Some(FlightState::Hovering));
        assert_eq!(FlightState::derive(6, false), Some(FlightState::Landed));
        assert_eq!(FlightState::derive(11, true), Some(FlightState::TakingOff));
        assert_eq!(FlightState::derive(12, true), Some(FlightState::Landing));
        assert_eq!(FlightState::derive(1, false), None);
        assert_eq!(FlightState::derive(0, true), None);
        assert_eq!(FlightState::derive(12, false), None);
    }

    #[test]
    fn wifi_decode() {
        let info = WifiInfo::decode(&[90, 5]).unwrap();
        assert_eq!(info.strength, 90);
        assert_eq!(info.disturb, 5);
    }

    #[test]
    fn alt_limit_decode() {
        assert_eq!(decode_alt_limit(&[0x00, 0x1E, 0x00]).unwrap(), 30);
    }

    #[test]
    fn version_decode() {
        let mut payload = vec![0x00];
        payload.extend_from_slice(b"01.04.35.01\0\0\0");
        assert_eq!(decode_version(&payload).unwrap(), "01.04.35.01");
    }
}
