//! UDP transport to the drone.
//!
//! Owns the socket and a background reader thread. Handles the ASCII
//! `conn_req:`/`conn_ack:` handshake, resets a timeout watchdog on every
//! datagram, and dispatches framed packets to per-message-id handlers.
//! When the watchdog expires the socket is torn down and the handshake
//! restarts, indefinitely, until [`Transport::disconnect`].
//!
//! Handlers run on the reader thread and must not block.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use thiserror::Error;

use crate::frame::{self, RawPacket};
use crate::protocol::Command;
use crate::sensor::Sensor;

/// Default drone address and command port.
pub const DEFAULT_ADDR: &str = "192.168.10.1:8889";

/// Default watchdog window.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Local port announced to the drone for its out-of-band streams.
pub const DEFAULT_STREAM_PORT: u16 = 6038;

const CONN_REQ: &[u8] = b"conn_req:";
const CONN_ACK: &[u8] = b"conn_ack:";
const UNKNOWN_CMD: &[u8] = b"unknown command:";

/// Socket read tick; bounds watchdog and shutdown latency.
const READ_TICK: Duration = Duration::from_millis(100);

/// Errors from transport operations.
#[derive(Debug, Error)]
pub enum ConnError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("drone address did not resolve")]
    InvalidAddr,
}

/// Link state, published on a deduplicating channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    TimedOut,
    Error,
}

/// Transport tuning knobs.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Watchdog window: no datagram for this long tears the link down.
    pub timeout: Duration,
    /// Port announced in the handshake.
    pub stream_port: u16,
    /// Verify CRC-8/CRC-16 on inbound frames and drop mismatches.
    pub validate_crcs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            stream_port: DEFAULT_STREAM_PORT,
            validate_crcs: false,
        }
    }
}

type Handler = Box<dyn FnMut(&RawPacket) + Send>;

struct Shared {
    remote: SocketAddr,
    config: TransportConfig,
    socket: RwLock<Option<UdpSocket>>,
    handlers: Mutex<HashMap<u16, Handler>>,
    state: Sensor<ConnectionState>,
    last_rx: Mutex<Instant>,
    shutdown: AtomicBool,
    seq: AtomicU16,
}

/// UDP transport with a background receive loop.
pub struct Transport {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    pub fn new(addr: impl ToSocketAddrs, config: TransportConfig) -> Result<Self, ConnError> {
        let remote = addr
            .to_socket_addrs()?
            .next()
            .ok_or(ConnError::InvalidAddr)?;
        let state = Sensor::deduplicating();
        state.write(ConnectionState::Disconnected);
        Ok(Self {
            shared: Arc::new(Shared {
                remote,
                config,
                socket: RwLock::new(None),
                handlers: Mutex::new(HashMap::new()),
                state,
                last_rx: Mutex::new(Instant::now()),
                shutdown: AtomicBool::new(false),
                seq: AtomicU16::new(1),
            }),
            reader: Mutex::new(None),
        })
    }

    /// Link state channel.
    pub fn state(&self) -> &Sensor<ConnectionState> {
        &self.shared.state
    }

    pub fn connected(&self) -> bool {
        self.shared.state.get() == Some(ConnectionState::Connected)
    }

    /// Register the handler for one message id, replacing any previous one.
    pub fn register(&self, msg_id: u16, handler: impl FnMut(&RawPacket) + Send + 'static) {
        self.shared
            .handlers
            .lock()
            .unwrap()
            .insert(msg_id, Box::new(handler));
    }

    /// Bind a fresh socket, send `conn_req:`, and start the receive loop.
    pub fn connect(&self) -> Result<(), ConnError> {
        self.disconnect();
        self.shared.shutdown.store(false, Ordering::SeqCst);

        let socket = bind_socket(self.shared.remote)?;
        let reader_socket = socket.try_clone()?;
        *self.shared.socket.write().unwrap() = Some(socket);
        *self.shared.last_rx.lock().unwrap() = Instant::now();

        self.shared.state.write(ConnectionState::Connecting);
        send_handshake(&self.shared)?;

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("skylark-rx".into())
            .spawn(move || reader_loop(shared, reader_socket))?;
        *self.reader.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Stop the receive loop, drop the socket, and go quiet.
    pub fn disconnect(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.reader.lock().unwrap().take() {
            let _ = handle.join();
        }
        *self.shared.socket.write().unwrap() = None;
        self.shared.state.write(ConnectionState::Disconnected);
    }

    /// Send a framed packet. Dropped silently unless the link is up or
    /// mid-handshake.
    pub fn send(&self, packet: &RawPacket) {
        match self.shared.state.get() {
            Some(ConnectionState::Connected | ConnectionState::Connecting) => {}
            _ => {
                trace!("dropping message 0x{:04X}: link down", packet.msg_id);
                return;
            }
        }
        if let Some(socket) = &*self.shared.socket.read().unwrap()
            && let Err(e) = socket.send(&packet.encode())
        {
            warn!("send of 0x{:04X} failed: {e}", packet.msg_id);
        }
    }

    /// Encode and send a command, consuming a sequence number if the
    /// command uses one.
    pub fn send_command(&self, command: &Command) {
        let seq = if command.sequenced() {
            self.shared.seq.fetch_add(1, Ordering::SeqCst)
        } else {
            0
        };
        self.send(&command.encode(seq));
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ---------------------------------------------------------------------------
// Internal
// ---------------------------------------------------------------------------

fn bind_socket(remote: SocketAddr) -> Result<UdpSocket, ConnError> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.set_read_timeout(Some(READ_TICK))?;
    socket.connect(remote)?;
    Ok(socket)
}

fn send_handshake(shared: &Shared) -> Result<(), ConnError> {
    let mut req = CONN_REQ.to_vec();
    req.extend_from_slice(&shared.config.stream_port.to_le_bytes());
    if let Some(socket) = &*shared.socket.read().unwrap() {
        socket.send(&req)?;
    }
    Ok(())
}

fn reader_loop(shared: Arc<Shared>, mut socket: UdpSocket) {
    let mut buf = [0u8; 2048];
    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }

        match socket.recv(&mut buf) {
            Ok(n) => {
                *shared.last_rx.lock().unwrap() = Instant::now();
                handle_datagram(&shared, &buf[..n]);
            }
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => {
                if shared.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                warn!("socket receive failed: {e}");
                shared.state.write(ConnectionState::Error);
            }
        }

        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }

        let watched = matches!(
            shared.state.get(),
            Some(
                ConnectionState::Connected | ConnectionState::Connecting | ConnectionState::Error
            )
        );
        let expired = shared.last_rx.lock().unwrap().elapsed() >= shared.config.timeout;
        if watched && expired {
            shared.state.write(ConnectionState::TimedOut);
            debug!("watchdog expired, restarting handshake");
            *shared.last_rx.lock().unwrap() = Instant::now();
            match bind_socket(shared.remote) {
                Ok(fresh) => match fresh.try_clone() {
                    Ok(clone) => {
                        *shared.socket.write().unwrap() = Some(fresh);
                        socket = clone;
                        if let Err(e) = send_handshake(&shared) {
                            warn!("handshake send failed: {e}");
                        } else {
                            shared.state.write(ConnectionState::Connecting);
                        }
                    }
                    Err(e) => {
                        warn!("socket clone failed: {e}");
                        shared.state.write(ConnectionState::Error);
                    }
                },
                Err(e) => {
                    warn!("socket rebuild failed: {e}");
                    shared.state.write(ConnectionState::Error);
                }
            }
        }
    }
}

fn handle_datagram(shared: &Shared, data: &[u8]) {
    if data.is_empty() {
        return;
    }
    if data[0] == frame::MAGIC {
        let parsed = if shared.config.validate_crcs {
            RawPacket::parse_strict(data)
        } else {
            RawPacket::parse(data)
        };
        match parsed {
            Ok(packet) => {
                let mut handlers = shared.handlers.lock().unwrap();
                if let Some(handler) = handlers.get_mut(&packet.msg_id) {
                    handler(&packet);
                } else {
                    debug!(
                        "no handler for message 0x{:04X} ({} bytes)",
                        packet.msg_id,
                        packet.payload.len()
                    );
                }
            }
            Err(e) => warn!("dropping frame: {e}"),
        }
    } else if data.starts_with(CONN_ACK) {
        debug!("conn_ack received");
        shared.state.write(ConnectionState::Connected);
    } else if data.starts_with(UNKNOWN_CMD) {
        warn!("drone rejected command: {}", String::from_utf8_lossy(data));
    } else {
        warn!("unintelligible datagram ({} bytes)", data.len());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
