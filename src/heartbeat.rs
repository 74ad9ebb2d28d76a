//! Periodic stick heartbeat.
//!
//! The drone only accepts commands while stick packets keep arriving, so a
//! background timer sends one every `interval` (20 Hz by default) carrying
//! the latest controls snapshot. The timer pauses itself while the
//! transport is not connected and resumes on reconnect; [`Heartbeat::stop`]
//! releases it for good.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::trace;

use crate::controller::Controls;
use crate::protocol::Command;
use crate::protocol::stick::StickCommand;
use crate::transport::Transport;

/// Default heartbeat cadence (20 Hz).
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_millis(50);

/// Handle to the heartbeat thread.
pub struct Heartbeat {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Start the timer thread.
    pub fn start(
        transport: Arc<Transport>,
        controls: Arc<Mutex<Controls>>,
        fast_mode: Arc<AtomicBool>,
        interval: Duration,
    ) -> Self {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let stop_flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("skylark-heartbeat".into())
            .spawn(move || {
                let (lock, cvar) = &*stop_flag;
                let mut stopped = lock.lock().unwrap();
                loop {
                    let (guard, _) = cvar.wait_timeout(stopped, interval).unwrap();
                    stopped = guard;
                    if *stopped {
                        return;
                    }
                    if !transport.connected() {
                        trace!("heartbeat paused: link down");
                        continue;
                    }
                    let snapshot = *controls.lock().unwrap();
                    let stick = StickCommand {
                        roll: snapshot.roll.unwrap_or(0.0),
                        pitch: snapshot.pitch.unwrap_or(0.0),
                        yaw: snapshot.yaw.unwrap_or(0.0),
                        thrust: snapshot.thrust.unwrap_or(0.0),
                        fast_mode: fast_mode.load(Ordering::Relaxed),
                    };
                    transport.send_command(&Command::Stick(stick));
                }
            })
            .expect("spawn heartbeat thread");

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop and join the timer thread. Idempotent.
    pub fn stop(&mut self) {
        {
            let (lock, cvar) = &*self.stop;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}
