//! Message ids and command encoding.
//!
//! [`Command`] covers the messages we originate; inbound messages are
//! dispatched by id through the transport's handler map and decoded by the
//! structs in [`telemetry`] and [`crate::flightlog`].

pub mod stick;
pub mod telemetry;

use chrono::{DateTime, Local};

use crate::frame::RawPacket;

// ---------------------------------------------------------------------------
// Message id constants
// ---------------------------------------------------------------------------

pub const MSG_CONNECT: u16 = 0x0001;
pub const MSG_SSID: u16 = 0x0011;
pub const MSG_SSID_CMD: u16 = 0x0012;
pub const MSG_SSID_PASSWORD: u16 = 0x0013;
pub const MSG_SSID_PASSWORD_CMD: u16 = 0x0014;
pub const MSG_WIFI_REGION: u16 = 0x0015;
pub const MSG_WIFI_REGION_CMD: u16 = 0x0016;
pub const MSG_WIFI: u16 = 0x001A;
pub const MSG_LIGHT: u16 = 0x0035;
pub const MSG_ERROR_1: u16 = 0x0043;
pub const MSG_ERROR_2: u16 = 0x0044;
pub const MSG_VERSION: u16 = 0x0045;
pub const MSG_TIME: u16 = 0x0046;
pub const MSG_STICK: u16 = 0x0050;
pub const MSG_TAKEOFF: u16 = 0x0054;
pub const MSG_LAND: u16 = 0x0055;
pub const MSG_FLIGHT: u16 = 0x0056;
pub const MSG_ALT_LIMIT_CMD: u16 = 0x0058;
pub const MSG_FLIP: u16 = 0x005C;
pub const MSG_THROW_AND_GO: u16 = 0x005D;
pub const MSG_PALM_LAND: u16 = 0x005E;
pub const MSG_SMART_VIDEO_CMD: u16 = 0x0080;
pub const MSG_SMART_VIDEO_STATUS: u16 = 0x0081;
pub const MSG_LOG_HEADER: u16 = 0x1050;
pub const MSG_LOG_DATA: u16 = 0x1051;
pub const MSG_LOG_CONFIG: u16 = 0x1052;
pub const MSG_CALIBRATE: u16 = 0x1054;
pub const MSG_LOW_BAT_THRESHOLD_CMD: u16 = 0x1055;
pub const MSG_ALT_LIMIT: u16 = 0x1056;
pub const MSG_LOW_BAT_THRESHOLD: u16 = 0x1057;
pub const MSG_ATT_LIMIT_CMD: u16 = 0x1058;
pub const MSG_ATT_LIMIT: u16 = 0x1059;

// ---------------------------------------------------------------------------
// packetTypeInfo values used by outbound commands
// ---------------------------------------------------------------------------

pub const INFO_QUERY: u8 = 0x48;
pub const INFO_TIME: u8 = 0x50;
pub const INFO_STICK: u8 = 0x60;
pub const INFO_COMMAND: u8 = 0x68;
pub const INFO_FLIP: u8 = 0x70;

// ---------------------------------------------------------------------------
// Command — messages we send to the drone
// ---------------------------------------------------------------------------

/// Flip directions (single byte in the flip command payload).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlipDirection {
    Forward = 0,
    Left = 1,
    Back = 2,
    Right = 3,
    ForwardLeft = 4,
    BackLeft = 5,
    BackRight = 6,
    ForwardRight = 7,
}

/// Calibration variants for the calibrate command.
///
/// `Imu` normally drives a multi-pose prompt sequence in the vendor app;
/// here it only sends the command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CalibrationType {
    Center = 0,
    Imu = 1,
}

/// A message we originate (host → drone).
#[derive(Debug, Clone)]
pub enum Command {
    TakeOff,
    Land,
    CancelLanding,
    PalmLand,
    ThrowAndGo,
    Flip(FlipDirection),
    Calibrate(CalibrationType),
    SetAltitudeLimit(u8),
    QueryAltitudeLimit,
    SetLowBatteryThreshold(u8),
    QueryLowBatteryThreshold,
    QueryAttitudeLimit,
    QueryVersion,
    TimeDate(DateTime<Local>),
    /// Echo of the first three log-header bytes, acknowledging the stream.
    LogHeaderAck([u8; 3]),
    Stick(stick::StickCommand),
}

impl Command {
    /// Whether this command consumes a sequence number. Stick, flip, and
    /// log acknowledgements always go out with sequence zero.
    pub fn sequenced(&self) -> bool {
        !matches!(
            self,
            Command::Stick(_) | Command::Flip(_) | Command::LogHeaderAck(_)
        )
    }

    /// Encode into a [`RawPacket`] ready for wire transmission.
    pub fn encode(&self, seq: u16) -> RawPacket {
        let seq = if self.sequenced() { seq } else { 0 };
        let (info, msg_id, payload) = match self {
            Command::TakeOff => (INFO_COMMAND, MSG_TAKEOFF, vec![]),
            Command::Land => (INFO_COMMAND, MSG_LAND, vec![0x00]),
            Command::CancelLanding => (INFO_COMMAND, MSG_LAND, vec![0x01]),
            Command::PalmLand => (INFO_COMMAND, MSG_PALM_LAND, vec![0x00]),
            Command::ThrowAndGo => (INFO_QUERY, MSG_THROW_AND_GO, vec![0x00]),
            Command::Flip(dir) => (INFO_FLIP, MSG_FLIP, vec![*dir as u8]),
            Command::Calibrate(kind) => (INFO_COMMAND, MSG_CALIBRATE, vec![*kind as u8]),
            Command::SetAltitudeLimit(m) => (INFO_COMMAND, MSG_ALT_LIMIT_CMD, vec![*m, 0x00]),
            Command::QueryAltitudeLimit => (INFO_COMMAND, MSG_ALT_LIMIT, vec![]),
            Command::SetLowBatteryThreshold(pct) => {
                (INFO_COMMAND, MSG_LOW_BAT_THRESHOLD_CMD, vec![*pct])
            }
            Command::QueryLowBatteryThreshold => (INFO_COMMAND, MSG_LOW_BAT_THRESHOLD, vec![]),
            Command::QueryAttitudeLimit => (INFO_COMMAND, MSG_ATT_LIMIT, vec![]),
            Command::QueryVersion => (INFO_QUERY, MSG_VERSION, vec![]),
            Command::TimeDate(t) => (INFO_TIME, MSG_TIME, stick::date_time_payload(*t)),
            Command::LogHeaderAck(head) => (INFO_TIME, MSG_LOG_HEADER, head.to_vec()),
            Command::Stick(s) => (INFO_STICK, MSG_STICK, s.encode()),
        };
        RawPacket::new(info, msg_id, seq, payload)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takeoff_matches_wire_capture() {
        let wire = Command::TakeOff.encode(0x01E4).encode();
        assert_eq!(
            wire,
            [0xCC, 0x58, 0x00, 0x7C, 0x68, 0x54, 0x00, 0xE4, 0x01, 0xC2, 0x16]
        );
    }

    #[test]
    fn land_and_cancel_differ_by_payload() {
        let land = Command::Land.encode(1);
        let cancel = Command::CancelLanding.encode(1);
        assert_eq!(land.msg_id, MSG_LAND);
        assert_eq!(cancel.msg_id, MSG_LAND);
        assert_eq!(land.payload, vec![0x00]);
        assert_eq!(cancel.payload, vec![0x01]);
    }

    #[test]
    fn unsequenced_commands_use_seq_zero() {
        assert_eq!(Command::Flip(FlipDirection::Left).encode(99).seq, 0);
        assert_eq!(Command::LogHeaderAck([0, 1, 2]).encode(99).seq, 0);
        assert_eq!(Command::TakeOff.encode(99).seq, 99);
    }

    #[test]
    fn command_info_bytes() {
        assert_eq!(Command::Calibrate(CalibrationType::Center).encode(0).info.as_byte(), 0x68);
        assert_eq!(Command::QueryVersion.encode(0).info.as_byte(), 0x48);
        assert_eq!(Command::LogHeaderAck([0; 3]).encode(0).info.as_byte(), 0x50);
        assert_eq!(Command::Flip(FlipDirection::Back).encode(0).info.as_byte(), 0x70);
    }

    #[test]
    fn altitude_limit_payload() {
        let packet = Command::SetAltitudeLimit(30).encode(2);
        assert_eq!(packet.payload, vec![30, 0]);
    }
}
