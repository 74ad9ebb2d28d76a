//! Drone facade: wires the transport, heartbeat, flight-log decoding, and
//! position controller into one object and exposes the command surface.
//!
//! Inbound telemetry fans out over [`Sensor`] channels. Vector-valued log
//! records are rotated from the drone's Z-down frame into the canonical
//! Z-up frame before publishing; everything downstream of the facade works
//! in canonical coordinates.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, trace, warn};

use crate::controller::{
    ControlAxis, Controls, Pose, PositionController, PositionSample, ResetReason,
};
use crate::flightlog::{self, Imu, LogRecord, Mvo, Vo};
use crate::heartbeat::{DEFAULT_KEEP_ALIVE, Heartbeat};
use crate::math::{FRAME_ROTATION, FRAME_ROTATION_Q, Quaternion};
use crate::pid::{ControlError, Gains};
use crate::protocol::telemetry::{
    FlightData, FlightState, LightInfo, WifiInfo, decode_alt_limit, decode_version,
};
use crate::protocol::{
    CalibrationType, Command, FlipDirection, MSG_ALT_LIMIT, MSG_ATT_LIMIT, MSG_CALIBRATE,
    MSG_ERROR_1, MSG_ERROR_2, MSG_FLIGHT, MSG_LAND, MSG_LIGHT, MSG_LOG_CONFIG, MSG_LOG_DATA,
    MSG_LOG_HEADER, MSG_LOW_BAT_THRESHOLD, MSG_TAKEOFF, MSG_TIME, MSG_VERSION, MSG_WIFI,
};
use crate::sensor::{Sensor, Subscription};
use crate::transport::{ConnError, ConnectionState, Transport, TransportConfig};

/// Facade configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Stick heartbeat cadence.
    pub keep_alive_interval: Duration,
    /// Receive watchdog window.
    pub timeout_interval: Duration,
    /// Local port announced in the handshake.
    pub stream_port: u16,
    /// Validate CRCs on inbound frames.
    pub validate_crcs: bool,
}

impl Default for Config {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            keep_alive_interval: DEFAULT_KEEP_ALIVE,
            timeout_interval: transport.timeout,
            stream_port: transport.stream_port,
            validate_crcs: transport.validate_crcs,
        }
    }
}

/// Which channel feeds the controller's position input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSource {
    Vo,
    Mvo,
}

/// Which channel feeds the controller's yaw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationSource {
    Imu,
}

/// Telemetry fan-out channels, all owned by the facade.
#[derive(Clone)]
pub struct Sensors {
    pub flight_data: Sensor<FlightData>,
    pub flight_state: Sensor<FlightState>,
    pub mvo: Sensor<Mvo>,
    pub imu: Sensor<Imu>,
    pub vo: Sensor<Vo>,
    /// Ultrasonic ground distance, metres.
    pub proximity: Sensor<f64>,
    pub wifi: Sensor<WifiInfo>,
    pub light: Sensor<LightInfo>,
    /// Altitude limit, metres.
    pub alt_limit: Sensor<u16>,
    pub version: Sensor<String>,
}

impl Sensors {
    fn new() -> Self {
        Self {
            flight_data: Sensor::new(),
            flight_state: Sensor::deduplicating(),
            mvo: Sensor::new(),
            imu: Sensor::new(),
            vo: Sensor::new(),
            proximity: Sensor::new(),
            wifi: Sensor::new(),
            light: Sensor::new(),
            alt_limit: Sensor::new(),
            version: Sensor::new(),
        }
    }
}

/// The drone client.
pub struct Drone {
    transport: Arc<Transport>,
    config: Config,
    heartbeat: Mutex<Option<Heartbeat>>,
    controller: PositionController,
    controls: Arc<Mutex<Controls>>,
    fast_mode: Arc<AtomicBool>,
    sensors: Sensors,
    ctrl_pos: Sensor<PositionSample>,
    ctrl_yaw: Sensor<f64>,
    source_subs: Mutex<Vec<Subscription>>,
}

impl Drone {
    /// Client for a drone at `addr` (usually [`crate::transport::DEFAULT_ADDR`]).
    pub fn new(addr: &str) -> Result<Self, ConnError> {
        Self::with_config(addr, Config::default())
    }

    pub fn with_config(addr: &str, config: Config) -> Result<Self, ConnError> {
        let transport = Arc::new(Transport::new(
            addr,
            TransportConfig {
                timeout: config.timeout_interval,
                stream_port: config.stream_port,
                validate_crcs: config.validate_crcs,
            },
        )?);

        let drone = Self {
            transport,
            config,
            heartbeat: Mutex::new(None),
            controller: PositionController::new(),
            controls: Arc::new(Mutex::new(Controls::default())),
            fast_mode: Arc::new(AtomicBool::new(false)),
            sensors: Sensors::new(),
            ctrl_pos: Sensor::new(),
            ctrl_yaw: Sensor::new(),
            source_subs: Mutex::new(Vec::new()),
        };

        drone.register_handlers();
        drone.controller.source(&drone.ctrl_pos, &drone.ctrl_yaw);
        {
            let controls = Arc::clone(&drone.controls);
            drone.controller.output().subscribe(move |c: &Controls| {
                controls.lock().unwrap().assign_non_empty(c);
            });
        }
        drone.set_controller_source(PositionSource::Vo, OrientationSource::Imu);
        Ok(drone)
    }

    // -----------------------------------------------------------------------
    // Channels
    // -----------------------------------------------------------------------

    pub fn sensors(&self) -> &Sensors {
        &self.sensors
    }

    pub fn connection_state(&self) -> &Sensor<ConnectionState> {
        self.transport.state()
    }

    pub fn controller(&self) -> &PositionController {
        &self.controller
    }

    /// The controls the next heartbeat tick will send.
    pub fn controls_snapshot(&self) -> Controls {
        *self.controls.lock().unwrap()
    }

    // -----------------------------------------------------------------------
    // Link commands
    // -----------------------------------------------------------------------

    /// Start the handshake and the stick heartbeat.
    pub fn connect(&self) -> Result<(), ConnError> {
        self.transport.connect()?;
        let mut slot = self.heartbeat.lock().unwrap();
        if let Some(mut old) = slot.take() {
            old.stop();
        }
        *slot = Some(Heartbeat::start(
            Arc::clone(&self.transport),
            Arc::clone(&self.controls),
            Arc::clone(&self.fast_mode),
            self.config.keep_alive_interval,
        ));
        Ok(())
    }

    /// Cancel any target, stop the heartbeat, and tear the link down.
    pub fn disconnect(&self) {
        self.controller.reset(ResetReason::TargetCanceled);
        if let Some(mut heartbeat) = self.heartbeat.lock().unwrap().take() {
            heartbeat.stop();
        }
        self.transport.disconnect();
    }

    // -----------------------------------------------------------------------
    // Flight commands
    // -----------------------------------------------------------------------

    pub fn take_off(&self) {
        self.transport.send_command(&Command::TakeOff);
    }

    /// Land. Cancels any active target first.
    pub fn land(&self) {
        self.controller.reset(ResetReason::TargetCanceled);
        *self.controls.lock().unwrap() = Controls::zeroed();
        self.transport.send_command(&Command::Land);
    }

    pub fn cancel_landing(&self) {
        self.transport.send_command(&Command::CancelLanding);
    }

    /// Cut the maneuver short and land immediately.
    pub fn emergency(&self) {
        self.controller.reset(ResetReason::TargetCanceled);
        *self.controls.lock().unwrap() = Controls::zeroed();
        self.transport.send_command(&Command::Land);
    }

    pub fn palm_land(&self) {
        self.transport.send_command(&Command::PalmLand);
    }

    pub fn throw_and_go(&self) {
        self.transport.send_command(&Command::ThrowAndGo);
    }

    pub fn flip(&self, direction: FlipDirection) {
        self.transport.send_command(&Command::Flip(direction));
    }

    pub fn calibrate(&self, kind: CalibrationType) {
        self.transport.send_command(&Command::Calibrate(kind));
    }

    // -----------------------------------------------------------------------
    // Settings & queries
    // -----------------------------------------------------------------------

    pub fn set_altitude_limit(&self, metres: u8) {
        self.transport
            .send_command(&Command::SetAltitudeLimit(metres));
    }

    pub fn query_altitude_limit(&self) {
        self.transport.send_command(&Command::QueryAltitudeLimit);
    }

    pub fn set_low_battery_threshold(&self, percent: u8) {
        self.transport
            .send_command(&Command::SetLowBatteryThreshold(percent));
    }

    pub fn query_low_battery_threshold(&self) {
        self.transport
            .send_command(&Command::QueryLowBatteryThreshold);
    }

    pub fn query_attitude_limit(&self) {
        self.transport.send_command(&Command::QueryAttitudeLimit);
    }

    pub fn query_version(&self) {
        self.transport.send_command(&Command::QueryVersion);
    }

    pub fn set_time_date(&self, when: DateTime<Local>) {
        self.transport.send_command(&Command::TimeDate(when));
    }

    pub fn set_fast_mode(&self, on: bool) {
        self.fast_mode.store(on, Ordering::Relaxed);
    }

    // -----------------------------------------------------------------------
    // Control commands
    // -----------------------------------------------------------------------

    /// Override the sticks directly. Cancels any active target.
    pub fn manual_sticks(&self, roll: f64, pitch: f64, yaw: f64, thrust: f64) {
        self.controller.reset(ResetReason::TargetCanceled);
        *self.controls.lock().unwrap() = Controls {
            roll: Some(roll),
            pitch: Some(pitch),
            yaw: Some(yaw),
            thrust: Some(thrust),
        };
    }

    /// Fly to a position in the controller's frame. Unset axes are left
    /// uncontrolled.
    pub fn go_to(&self, x: Option<f64>, y: Option<f64>, z: Option<f64>) {
        self.go_to_pose(Pose {
            x,
            y,
            z,
            yaw: None,
        });
    }

    pub fn go_to_pose(&self, target: Pose) {
        self.controller.set_target(target);
    }

    pub fn go_to_yaw(&self, yaw: f64) {
        self.go_to_pose(Pose {
            yaw: Some(yaw),
            ..Pose::default()
        });
    }

    /// Cancel any target and hold neutral sticks.
    pub fn hover(&self) {
        self.controller.reset(ResetReason::TargetCanceled);
        *self.controls.lock().unwrap() = Controls::zeroed();
    }

    pub fn set_controller_gains(
        &self,
        axis: ControlAxis,
        gains: Gains,
        deadband: f64,
    ) -> Result<(), ControlError> {
        let result = self.controller.set_gains(axis, gains, deadband);
        if let Err(ref e) = result {
            warn!("rejected controller gains for {axis:?}: {e}");
        }
        result
    }

    pub fn set_origin(&self, origin: Pose) {
        self.controller.set_origin(origin);
    }

    pub fn set_origin_to_current_pose(&self) {
        self.controller.set_origin_to_current_pose();
    }

    /// Compose an origin from the latest VO position, ultrasonic height,
    /// and IMU yaw.
    pub fn set_origin_to_vo(&self) {
        let vo = self.sensors.vo.get();
        let origin = Pose {
            x: vo.as_ref().map(|v| v.position.x),
            y: vo.as_ref().map(|v| v.position.y),
            z: self.sensors.proximity.get(),
            yaw: self.sensors.imu.get().map(|i| i.orientation.yaw()),
        };
        self.controller.set_origin(origin);
    }

    /// Re-point the controller's inputs at different telemetry channels.
    pub fn set_controller_source(&self, pos: PositionSource, ori: OrientationSource) {
        let mut subs = self.source_subs.lock().unwrap();
        for sub in subs.drain(..) {
            sub.cancel();
        }

        let ctrl_pos = self.ctrl_pos.clone();
        subs.push(match pos {
            PositionSource::Vo => self.sensors.vo.subscribe(move |vo: &Vo| {
                ctrl_pos.write(PositionSample {
                    position: vo.position,
                    valid: vo.valid.pos,
                });
            }),
            PositionSource::Mvo => self.sensors.mvo.subscribe(move |mvo: &Mvo| {
                ctrl_pos.write(PositionSample {
                    position: mvo.position,
                    valid: mvo.valid.pos,
                });
            }),
        });

        let ctrl_yaw = self.ctrl_yaw.clone();
        subs.push(match ori {
            OrientationSource::Imu => self.sensors.imu.subscribe(move |imu: &Imu| {
                ctrl_yaw.write(imu.orientation.yaw());
            }),
        });
    }

    // -----------------------------------------------------------------------
    // Inbound wiring
    // -----------------------------------------------------------------------

    fn register_handlers(&self) {
        let t = &self.transport;

        let sensors = self.sensors.clone();
        t.register(MSG_FLIGHT, move |pkt| {
            match FlightData::decode(&pkt.payload) {
                Ok(data) => {
                    if let Some(state) = FlightState::derive(data.fly_mode, data.em_sky) {
                        sensors.flight_state.write(state);
                    }
                    sensors.flight_data.write(data);
                }
                Err(e) => warn!("bad flight data: {e}"),
            }
        });

        let sensors = self.sensors.clone();
        t.register(MSG_LOG_DATA, move |pkt| {
            let records = match flightlog::parse(&pkt.payload) {
                Ok(records) => records,
                Err(e) => {
                    warn!("discarding log payload: {e}");
                    return;
                }
            };
            for record in records {
                match record {
                    LogRecord::Mvo(mvo) => sensors.mvo.write(rotate_mvo(mvo)),
                    LogRecord::Imu(imu) => sensors.imu.write(rotate_imu(imu)),
                    LogRecord::Vo(vo) => sensors.vo.write(rotate_vo(vo)),
                    LogRecord::Proximity(metres) => sensors.proximity.write(metres),
                    LogRecord::Unhandled { record_type, .. } => {
                        trace!("skipping log record 0x{record_type:04X}");
                    }
                    LogRecord::Unknown {
                        record_type,
                        length,
                        ..
                    } => debug!("unknown log record 0x{record_type:04X} ({length} bytes)"),
                }
            }
        });

        let transport = Arc::clone(&self.transport);
        t.register(MSG_LOG_HEADER, move |pkt| {
            if pkt.payload.len() < 3 {
                warn!("log header too short ({} bytes)", pkt.payload.len());
                return;
            }
            let head = [pkt.payload[0], pkt.payload[1], pkt.payload[2]];
            transport.send_command(&Command::LogHeaderAck(head));
        });

        t.register(MSG_LOG_CONFIG, |pkt| {
            debug!("log config ({} bytes)", pkt.payload.len());
        });

        let transport = Arc::clone(&self.transport);
        t.register(MSG_TIME, move |_| {
            transport.send_command(&Command::TimeDate(Local::now()));
        });

        let sensors = self.sensors.clone();
        t.register(MSG_WIFI, move |pkt| match WifiInfo::decode(&pkt.payload) {
            Ok(info) => sensors.wifi.write(info),
            Err(e) => warn!("bad wifi info: {e}"),
        });

        let sensors = self.sensors.clone();
        t.register(MSG_LIGHT, move |pkt| {
            match LightInfo::decode(&pkt.payload) {
                Ok(info) => sensors.light.write(info),
                Err(e) => warn!("bad light info: {e}"),
            }
        });

        let sensors = self.sensors.clone();
        t.register(MSG_ALT_LIMIT, move |pkt| {
            match decode_alt_limit(&pkt.payload) {
                Ok(metres) => sensors.alt_limit.write(metres),
                Err(e) => warn!("bad altitude limit: {e}"),
            }
        });

        let sensors = self.sensors.clone();
        t.register(MSG_VERSION, move |pkt| {
            match decode_version(&pkt.payload) {
                Ok(version) => sensors.version.write(version),
                Err(e) => warn!("bad version reply: {e}"),
            }
        });

        for (msg_id, which) in [(MSG_ERROR_1, 1), (MSG_ERROR_2, 2)] {
            t.register(msg_id, move |pkt| {
                warn!(
                    "drone error {which}: {}",
                    String::from_utf8_lossy(&pkt.payload)
                );
            });
        }

        for (msg_id, name) in [
            (MSG_TAKEOFF, "takeoff"),
            (MSG_LAND, "land"),
            (MSG_CALIBRATE, "calibrate"),
            (MSG_LOW_BAT_THRESHOLD, "low battery threshold"),
            (MSG_ATT_LIMIT, "attitude limit"),
        ] {
            t.register(msg_id, move |pkt| {
                debug!("{name} ack (seq {})", pkt.seq);
            });
        }
    }
}

impl Drop for Drone {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ---------------------------------------------------------------------------
// Frame rotation
// ---------------------------------------------------------------------------

fn rotate_mvo(mut mvo: Mvo) -> Mvo {
    mvo.velocity = FRAME_ROTATION * mvo.velocity;
    mvo.position = FRAME_ROTATION * mvo.position;
    mvo.position_cov = mvo.position_cov.rotated_by(&FRAME_ROTATION);
    mvo.velocity_cov = mvo.velocity_cov.rotated_by(&FRAME_ROTATION);
    mvo
}

fn rotate_vo(mut vo: Vo) -> Vo {
    vo.velocity = FRAME_ROTATION * vo.velocity;
    vo.position = FRAME_ROTATION * vo.position;
    vo
}

/// Rotate an IMU sample and re-synthesize the orientation: the drone
/// reports attitude in a frame whose X is flipped relative to its own
/// velocity frame, so after rotation the roll is shifted back by pi.
fn rotate_imu(mut imu: Imu) -> Imu {
    imu.accel = FRAME_ROTATION * imu.accel;
    imu.gyro = FRAME_ROTATION * imu.gyro;
    let (roll, pitch, yaw) = (FRAME_ROTATION_Q * imu.orientation).to_euler();
    imu.orientation = Quaternion::from_euler(roll - PI, pitch, yaw);
    imu
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{SocketAddr, UdpSocket};
    use std::time::Instant;

    use crate::controller::ControllerState;
    use crate::frame::RawPacket;
    use crate::protocol::MSG_STICK;

    // -- scripted fake drone ------------------------------------------------

    struct FakeDrone {
        socket: UdpSocket,
        client: Option<SocketAddr>,
    }

    impl FakeDrone {
        fn new() -> Self {
            let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
            socket
                .set_read_timeout(Some(Duration::from_secs(3)))
                .unwrap();
            Self {
                socket,
                client: None,
            }
        }

        fn addr(&self) -> String {
            self.socket.local_addr().unwrap().to_string()
        }

        /// Consume the conn_req and acknowledge it.
        fn accept(&mut self) {
            let mut buf = [0u8; 256];
            let (n, client) = self.socket.recv_from(&mut buf).unwrap();
            assert!(buf[..n].starts_with(b"conn_req:"));
            self.socket.send_to(b"conn_ack:ok", client).unwrap();
            self.client = Some(client);
        }

        fn send_packet(&self, packet: &RawPacket) {
            self.socket
                .send_to(&packet.encode(), self.client.unwrap())
                .unwrap();
        }

        /// Receive frames until one matches `msg_id`, skipping everything
        /// else (the stick heartbeat floods the socket).
        fn expect_msg(&self, msg_id: u16) -> RawPacket {
            let deadline = Instant::now() + Duration::from_secs(2);
            let mut buf = [0u8; 2048];
            while Instant::now() < deadline {
                let Ok((n, _)) = self.socket.recv_from(&mut buf) else {
                    continue;
                };
                if let Ok(packet) = RawPacket::parse(&buf[..n])
                    && packet.msg_id == msg_id
                {
                    return packet;
                }
            }
            panic!("no message 0x{msg_id:04X} within deadline");
        }
    }

    fn test_drone(fake: &FakeDrone) -> Drone {
        Drone::with_config(
            &fake.addr(),
            Config {
                keep_alive_interval: Duration::from_millis(30),
                // Long enough that a quiet fake doesn't trip reconnects
                // mid-test; watchdog behavior is covered in transport tests.
                timeout_interval: Duration::from_secs(60),
                ..Config::default()
            },
        )
        .unwrap()
    }

    fn wait_until(mut pred: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if pred() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    /// Build one obfuscated log record.
    fn log_record(record_type: u16, key: u8, payload: &[u8]) -> Vec<u8> {
        let length = (flightlog::RECORD_HEADER_LEN + payload.len() + 2) as u16;
        let mut rec = vec![flightlog::RECORD_MAGIC];
        rec.extend_from_slice(&length.to_le_bytes());
        rec.push(0x00);
        rec.extend_from_slice(&record_type.to_le_bytes());
        rec.push(key);
        rec.extend_from_slice(&[0, 0, 0]);
        rec.extend(payload.iter().map(|b| b ^ key));
        rec.extend_from_slice(&[0, 0]);
        rec
    }

    fn log_data_packet(records: &[Vec<u8>]) -> RawPacket {
        let mut payload = vec![0x00];
        for record in records {
            payload.extend_from_slice(record);
        }
        RawPacket::new(0xD0, MSG_LOG_DATA, 0, payload)
    }

    // -- scenarios ----------------------------------------------------------

    #[test]
    fn heartbeat_sends_neutral_sticks() {
        let mut fake = FakeDrone::new();
        let drone = test_drone(&fake);
        drone.connect().unwrap();
        fake.accept();

        let stick = fake.expect_msg(MSG_STICK);
        assert_eq!(stick.info.as_byte(), 0x60);
        assert_eq!(stick.seq, 0);
        assert_eq!(stick.payload.len(), 13);
        // Neutral: all four axes at 1024, fast mode off.
        assert_eq!(&stick.payload[..6], &[0x00, 0x04, 0x20, 0x00, 0x01, 0x08]);
    }

    #[test]
    fn flight_data_derives_hovering() {
        let mut fake = FakeDrone::new();
        let drone = test_drone(&fake);
        drone.connect().unwrap();
        fake.accept();

        let mut payload = vec![0u8; FlightData::WIRE_LEN];
        payload[12] = 72; // battery
        payload[17] = 0x01; // emSky
        payload[18] = 6; // fly mode
        fake.send_packet(&RawPacket::new(0xD0, MSG_FLIGHT, 1, payload));

        assert!(wait_until(|| {
            drone.sensors().flight_state.get() == Some(FlightState::Hovering)
        }));
        assert_eq!(
            drone.sensors().flight_data.get().unwrap().battery_percentage,
            72
        );
    }

    #[test]
    fn proximity_record_decodes_obfuscated_millimetres() {
        let mut fake = FakeDrone::new();
        let drone = test_drone(&fake);
        drone.connect().unwrap();
        fake.accept();

        // 0x03E8 mm XOR 0x5A on the wire ({0xB2, 0x59}).
        let record = log_record(flightlog::REC_USONIC, 0x5A, &[0xE8, 0x03]);
        assert_eq!(
            &record[flightlog::RECORD_HEADER_LEN..flightlog::RECORD_HEADER_LEN + 2],
            &[0xB2, 0x59]
        );
        fake.send_packet(&log_data_packet(&[record]));

        assert!(wait_until(|| {
            drone.sensors().proximity.get() == Some(1.0)
        }));
    }

    #[test]
    fn mvo_position_rotates_into_canonical_frame() {
        let mut fake = FakeDrone::new();
        let drone = test_drone(&fake);
        drone.connect().unwrap();
        fake.accept();

        let mut payload = vec![0u8; 8];
        for p in [1.0f32, 2.0, -3.0] {
            payload.extend_from_slice(&p.to_le_bytes());
        }
        payload.resize(76, 0);
        payload.push(0x3F); // all axes valid
        payload.resize(80, 0);
        fake.send_packet(&log_data_packet(&[log_record(
            flightlog::REC_MVO,
            0x21,
            &payload,
        )]));

        assert!(wait_until(|| drone.sensors().mvo.get().is_some()));
        let mvo = drone.sensors().mvo.get().unwrap();
        assert_eq!(mvo.position, crate::math::Vector3::new(1.0, -2.0, 3.0));
    }

    #[test]
    fn log_header_echoes_three_byte_ack() {
        let mut fake = FakeDrone::new();
        let drone = test_drone(&fake);
        drone.connect().unwrap();
        fake.accept();

        fake.send_packet(&RawPacket::new(
            0x50,
            MSG_LOG_HEADER,
            9,
            vec![0xAD, 0x05, 0x01, 0xFF, 0xFF],
        ));

        let ack = fake.expect_msg(MSG_LOG_HEADER);
        assert_eq!(ack.info.as_byte(), 0x50);
        assert_eq!(ack.seq, 0);
        assert_eq!(ack.payload, vec![0xAD, 0x05, 0x01]);
    }

    #[test]
    fn time_request_answered_with_local_time() {
        let mut fake = FakeDrone::new();
        let drone = test_drone(&fake);
        drone.connect().unwrap();
        fake.accept();

        fake.send_packet(&RawPacket::new(0x50, MSG_TIME, 4, vec![]));
        let reply = fake.expect_msg(MSG_TIME);
        assert_eq!(reply.info.as_byte(), 0x50);
        assert_eq!(reply.payload.len(), 15);
        assert_eq!(reply.payload[0], 0x00);
    }

    #[test]
    fn take_off_command_reaches_the_wire() {
        let mut fake = FakeDrone::new();
        let drone = test_drone(&fake);
        drone.connect().unwrap();
        fake.accept();

        drone.take_off();
        let packet = fake.expect_msg(crate::protocol::MSG_TAKEOFF);
        assert_eq!(packet.info.as_byte(), 0x68);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn go_to_converges_on_vo_samples() {
        let mut fake = FakeDrone::new();
        let drone = test_drone(&fake);
        drone.connect().unwrap();
        fake.accept();

        drone
            .set_controller_gains(ControlAxis::X, Gains::p(1.0), 0.05)
            .unwrap();
        drone.go_to(Some(1.0), None, None);

        for x in [0.0f32, 0.2, 0.5, 0.9, 0.99, 1.0, 1.0, 1.0, 1.0, 1.0] {
            let mut payload = vec![0u8; 12];
            payload.extend_from_slice(&x.to_le_bytes());
            payload.extend_from_slice(&0f32.to_le_bytes());
            payload.extend_from_slice(&0f32.to_le_bytes());
            payload.resize(52, 0);
            payload.push(0b0001_1000); // position x, y valid
            payload.resize(60, 0);
            fake.send_packet(&log_data_packet(&[log_record(
                flightlog::REC_IMU_EX,
                0x33,
                &payload,
            )]));
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(wait_until(|| {
            drone.controller().state().get() == Some(ControllerState::Converged)
        }));
        let pitch = drone.controls_snapshot().pitch.unwrap();
        assert!(pitch.abs() < 0.05, "pitch {pitch} not settled");
    }

    #[test]
    fn manual_sticks_cancel_target_and_steer() {
        let mut fake = FakeDrone::new();
        let drone = test_drone(&fake);
        drone.connect().unwrap();
        fake.accept();

        drone.go_to(Some(1.0), None, None);

        // One valid VO sample puts the controller into correcting; only a
        // running controller has a target to cancel.
        let mut payload = vec![0u8; 52];
        payload.push(0b0001_1000);
        payload.resize(60, 0);
        fake.send_packet(&log_data_packet(&[log_record(
            flightlog::REC_IMU_EX,
            0x00,
            &payload,
        )]));
        assert!(wait_until(|| {
            drone.controller().state().get() == Some(ControllerState::Correcting)
        }));

        drone.manual_sticks(0.5, 0.0, 0.0, -0.2);
        assert_eq!(drone.controller().target().get(), Some(None));

        // Heartbeat carries the override: roll raw = 1024 + 330 = 1354.
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            assert!(Instant::now() < deadline, "no steering stick observed");
            let stick = fake.expect_msg(MSG_STICK);
            let axes = u64::from_le_bytes([
                stick.payload[0],
                stick.payload[1],
                stick.payload[2],
                stick.payload[3],
                stick.payload[4],
                stick.payload[5],
                0,
                0,
            ]);
            let roll = (axes & 0x7FF) as u16;
            if roll == 1354 {
                break;
            }
        }
    }
}
