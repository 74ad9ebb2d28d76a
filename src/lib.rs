//! Client library for the Ryze Tello binary protocol.
//!
//! Speaks the drone's native UDP protocol (port 8889): framed packets with
//! CRC-8/CRC-16, the `conn_req:`/`conn_ack:` handshake, the 20 Hz stick
//! heartbeat, and the XOR-obfuscated flight-log telemetry stream. On top of
//! the decoded telemetry it closes a four-axis position/attitude loop on
//! the host and feeds the corrections back through the heartbeat.
//!
//! # Example
//!
//! ```no_run
//! use skylark::{Drone, transport::DEFAULT_ADDR};
//!
//! let drone = Drone::new(DEFAULT_ADDR)?;
//! drone.sensors().flight_state.subscribe(|s| println!("state: {s:?}"));
//! drone.connect()?;
//! drone.take_off();
//! drone.go_to(Some(1.0), Some(0.0), None);
//! # Ok::<(), skylark::ConnError>(())
//! ```

pub mod codec;
pub mod controller;
pub mod crc;
pub mod drone;
pub mod error;
pub mod flightlog;
pub mod frame;
pub mod heartbeat;
pub mod math;
pub mod pid;
pub mod protocol;
pub mod sensor;
pub mod transport;

pub use controller::{
    ControlAxis, Controls, ControllerState, Pose, PositionController, PositionSample, ResetReason,
};
pub use drone::{Config, Drone, OrientationSource, PositionSource, Sensors};
pub use error::WireError;
pub use frame::RawPacket;
pub use pid::{ControlError, Gains, Pid};
pub use protocol::{CalibrationType, Command, FlipDirection};
pub use sensor::{Sensor, Subscription};
pub use transport::{ConnError, ConnectionState, Transport};
