//! Four-axis position controller.
//!
//! Owns one PID per axis (x, y, z, yaw), consumes position and yaw
//! measurement channels, and aggregates per-axis corrections into stick
//! controls. Axis mapping: x error drives pitch, y drives negative roll,
//! z drives thrust, yaw drives yaw.
//!
//! Poses and controls are sparse: a field that no sensor has delivered yet
//! is `None`, which is distinct from a measured zero. Channel callbacks run
//! with the controller locked; do not call controller methods from inside a
//! state/output subscriber.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::warn;

use crate::flightlog::AxisValidity;
use crate::math::Vector3;
use crate::pid::{ControlError, Gains, Pid};
use crate::sensor::Sensor;

/// Consecutive invalid position samples before the controller latches a
/// sensor failure and resets.
pub const SENSOR_FAILURE_THRESHOLD: u32 = 30;

// ---------------------------------------------------------------------------
// Sparse pose and controls
// ---------------------------------------------------------------------------

/// A pose with independently optional fields.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pose {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub yaw: Option<f64>,
}

impl Pose {
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.z.is_none() && self.yaw.is_none()
    }

    /// Copy only the fields `other` has set.
    pub fn assign_non_empty(&mut self, other: &Pose) {
        if other.x.is_some() {
            self.x = other.x;
        }
        if other.y.is_some() {
            self.y = other.y;
        }
        if other.z.is_some() {
            self.z = other.z;
        }
        if other.yaw.is_some() {
            self.yaw = other.yaw;
        }
    }
}

/// Stick-space controls with independently optional fields.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Controls {
    pub roll: Option<f64>,
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
    pub thrust: Option<f64>,
}

impl Controls {
    /// All four axes explicitly zeroed.
    pub fn zeroed() -> Self {
        Self {
            roll: Some(0.0),
            pitch: Some(0.0),
            yaw: Some(0.0),
            thrust: Some(0.0),
        }
    }

    /// Copy only the fields `other` has set.
    pub fn assign_non_empty(&mut self, other: &Controls) {
        if other.roll.is_some() {
            self.roll = other.roll;
        }
        if other.pitch.is_some() {
            self.pitch = other.pitch;
        }
        if other.yaw.is_some() {
            self.yaw = other.yaw;
        }
        if other.thrust.is_some() {
            self.thrust = other.thrust;
        }
    }
}

/// One position measurement with per-axis validity, in the canonical frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub position: Vector3,
    pub valid: AxisValidity,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Why the controller reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResetReason {
    OriginChanged,
    SensorFailure,
    TargetCompleted,
    TargetCanceled,
}

/// Controller state, published on a deduplicating channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControllerState {
    Idle,
    Correcting,
    Converged,
    Reset(ResetReason),
}

/// Controller axis selector for gain updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAxis {
    X,
    Y,
    Z,
    Yaw,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

struct Inner {
    x: Pid,
    y: Pid,
    z: Pid,
    yaw: Pid,
    origin: Pose,
    target: Option<Pose>,
    input: Pose,
    output: Controls,
    failures: u32,
    failure_latched: bool,
    state: ControllerState,
}

impl Inner {
    fn pid_mut(&mut self, axis: ControlAxis) -> &mut Pid {
        match axis {
            ControlAxis::X => &mut self.x,
            ControlAxis::Y => &mut self.y,
            ControlAxis::Z => &mut self.z,
            ControlAxis::Yaw => &mut self.yaw,
        }
    }

    fn reset_pids(&mut self) {
        self.x.reset();
        self.y.reset();
        self.z.reset();
        self.yaw.reset();
    }
}

/// The four-axis position controller. Clones share state.
#[derive(Clone)]
pub struct PositionController {
    inner: Arc<Mutex<Inner>>,
    state: Sensor<ControllerState>,
    target: Sensor<Option<Pose>>,
    output: Sensor<Controls>,
}

impl Default for PositionController {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionController {
    /// Conservative proportional-only defaults; callers tune per airframe
    /// through [`set_gains`](Self::set_gains).
    pub fn new() -> Self {
        let pid = |kp: f64, deadband: f64| {
            Pid::new(Gains::p(kp), deadband).expect("default gains are valid")
        };
        Self {
            inner: Arc::new(Mutex::new(Inner {
                x: pid(0.5, 0.05),
                y: pid(0.5, 0.05),
                z: pid(0.8, 0.05),
                yaw: pid(0.5, 0.02),
                origin: Pose::default(),
                target: None,
                input: Pose::default(),
                output: Controls::default(),
                failures: 0,
                failure_latched: false,
                state: ControllerState::Idle,
            })),
            state: Sensor::deduplicating(),
            target: Sensor::new(),
            output: Sensor::new(),
        }
    }

    /// Controller state channel (deduplicating).
    pub fn state(&self) -> &Sensor<ControllerState> {
        &self.state
    }

    /// Target channel; `None` is published when a reset clears the target.
    pub fn target(&self) -> &Sensor<Option<Pose>> {
        &self.target
    }

    /// Aggregated corrections channel.
    pub fn output(&self) -> &Sensor<Controls> {
        &self.output
    }

    pub fn origin(&self) -> Pose {
        self.inner.lock().unwrap().origin
    }

    /// Latest merged measurement (origin-relative).
    pub fn input(&self) -> Pose {
        self.inner.lock().unwrap().input
    }

    /// Set a new target and restart all four PIDs.
    pub fn set_target(&self, t: Pose) {
        let mut inner = self.inner.lock().unwrap();
        inner.target = Some(t);
        inner.reset_pids();
        self.target.write(Some(t));
    }

    /// Replace gains on one axis. The controller as a whole keeps running;
    /// the axis PID restarts.
    pub fn set_gains(
        &self,
        axis: ControlAxis,
        gains: Gains,
        deadband: f64,
    ) -> Result<(), ControlError> {
        self.inner
            .lock()
            .unwrap()
            .pid_mut(axis)
            .set_gains(gains, deadband)
    }

    /// Shift the measurement frame. Resets the controller first.
    pub fn set_origin(&self, origin: Pose) {
        let mut inner = self.inner.lock().unwrap();
        self.reset_locked(&mut inner, ResetReason::OriginChanged);
        inner.origin = origin;
    }

    /// Use the latest merged input as the new origin.
    pub fn set_origin_to_current_pose(&self) {
        let mut inner = self.inner.lock().unwrap();
        let origin = inner.input;
        self.reset_locked(&mut inner, ResetReason::OriginChanged);
        inner.origin = origin;
    }

    /// Cancel any target and return to idle. No-op when already idle.
    pub fn reset(&self, reason: ResetReason) {
        let mut inner = self.inner.lock().unwrap();
        self.reset_locked(&mut inner, reason);
    }

    /// Feed one merged measurement through the axis PIDs.
    ///
    /// Returns `None` (and goes idle) when no target is set; otherwise the
    /// sparse corrections for the axes that ran.
    pub fn update(&self, measured: Pose) -> Option<Controls> {
        let mut inner = self.inner.lock().unwrap();
        self.update_locked(&mut inner, measured, Instant::now())
    }

    /// Wire the controller to a position channel and a yaw channel.
    ///
    /// Each sample is shifted by the origin, merged into the running input,
    /// run through [`update`](Self::update), and the merged output is
    /// published on the returned channel.
    pub fn source(&self, pos: &Sensor<PositionSample>, yaw: &Sensor<f64>) -> Sensor<Controls> {
        let ctrl = self.clone();
        pos.subscribe(move |sample| ctrl.ingest_position(sample));

        let ctrl = self.clone();
        yaw.subscribe(move |value| ctrl.ingest_yaw(*value));

        self.output.clone()
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn ingest_position(&self, sample: &PositionSample) {
        let mut inner = self.inner.lock().unwrap();

        if sample.valid.x && sample.valid.y {
            inner.failures = 0;
            inner.failure_latched = false;
        } else {
            inner.failures += 1;
            if inner.failures >= SENSOR_FAILURE_THRESHOLD && !inner.failure_latched {
                inner.failure_latched = true;
                warn!(
                    "position sensor invalid for {} consecutive samples",
                    inner.failures
                );
                self.reset_locked(&mut inner, ResetReason::SensorFailure);
            }
        }

        let origin = inner.origin;
        let sparse = Pose {
            x: sample
                .valid
                .x
                .then(|| sample.position.x - origin.x.unwrap_or(0.0)),
            y: sample
                .valid
                .y
                .then(|| sample.position.y - origin.y.unwrap_or(0.0)),
            z: sample
                .valid
                .z
                .then(|| sample.position.z - origin.z.unwrap_or(0.0)),
            yaw: None,
        };
        if sparse.is_empty() {
            return;
        }
        self.ingest_locked(&mut inner, sparse);
    }

    fn ingest_yaw(&self, yaw: f64) {
        let mut inner = self.inner.lock().unwrap();
        let origin_yaw = inner.origin.yaw.unwrap_or(0.0);
        let sparse = Pose {
            yaw: Some(yaw - origin_yaw),
            ..Pose::default()
        };
        self.ingest_locked(&mut inner, sparse);
    }

    fn ingest_locked(&self, inner: &mut Inner, sparse: Pose) {
        inner.input.assign_non_empty(&sparse);
        let measured = inner.input;
        if let Some(corrections) = self.update_locked(inner, measured, Instant::now()) {
            inner.output.assign_non_empty(&corrections);
            self.output.write(inner.output);
        }
    }

    fn update_locked(
        &self,
        inner: &mut Inner,
        measured: Pose,
        now: Instant,
    ) -> Option<Controls> {
        let Some(target) = inner.target else {
            self.set_state_locked(inner, ControllerState::Idle);
            return None;
        };

        self.set_state_locked(inner, ControllerState::Correcting);

        let mut out = Controls::default();
        let mut invoked = false;
        let mut all_converged = true;

        if let Some((t, m)) = both_finite(target.x, measured.x) {
            out.pitch = Some(inner.x.update_at(t, m, now));
            invoked = true;
            all_converged &= inner.x.converged();
        }
        if let Some((t, m)) = both_finite(target.y, measured.y) {
            out.roll = Some(-inner.y.update_at(t, m, now));
            invoked = true;
            all_converged &= inner.y.converged();
        }
        if let Some((t, m)) = both_finite(target.z, measured.z) {
            out.thrust = Some(inner.z.update_at(t, m, now));
            invoked = true;
            all_converged &= inner.z.converged();
        }
        if let Some((t, m)) = both_finite(target.yaw, measured.yaw) {
            out.yaw = Some(inner.yaw.update_at(t, m, now));
            invoked = true;
            all_converged &= inner.yaw.converged();
        }

        if invoked && all_converged {
            self.set_state_locked(inner, ControllerState::Converged);
        }
        Some(out)
    }

    fn reset_locked(&self, inner: &mut Inner, reason: ResetReason) {
        if inner.state == ControllerState::Idle {
            return;
        }
        inner.target = None;
        inner.input = Pose::default();
        inner.output = Controls::default();
        inner.reset_pids();
        self.target.write(None);
        self.set_state_locked(inner, ControllerState::Reset(reason));
        self.set_state_locked(inner, ControllerState::Idle);
    }

    fn set_state_locked(&self, inner: &mut Inner, state: ControllerState) {
        inner.state = state;
        self.state.write(state);
    }

    #[cfg(test)]
    pub(crate) fn pid_integrals(&self) -> [f64; 4] {
        let inner = self.inner.lock().unwrap();
        [
            inner.x.integral_error(),
            inner.y.integral_error(),
            inner.z.integral_error(),
            inner.yaw.integral_error(),
        ]
    }
}

fn both_finite(target: Option<f64>, measured: Option<f64>) -> Option<(f64, f64)> {
    match (target, measured) {
        (Some(t), Some(m)) if t.is_finite() && m.is_finite() => Some((t, m)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
