//! PID with deadband and a convergence window.
//!
//! One quirk is carried over from the firmware-era implementation and must
//! not be "fixed": the integral term accumulates `dE * dt` (change in error
//! times dt), not `e * dt`. Tuning done against that behavior depends on it.

use std::collections::VecDeque;
use std::time::Instant;

use thiserror::Error;

/// Errors from controller construction and gain setters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("PID gains must be finite and non-negative")]
    InvalidGains,

    #[error("deadband must be finite and non-negative")]
    InvalidDeadband,
}

/// Default convergence-window length.
pub const DEFAULT_WINDOW: usize = 5;

/// Proportional/integral/derivative gains.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Gains {
    pub fn p(kp: f64) -> Self {
        Self {
            kp,
            ki: 0.0,
            kd: 0.0,
        }
    }

    fn valid(&self) -> bool {
        [self.kp, self.ki, self.kd]
            .iter()
            .all(|g| g.is_finite() && *g >= 0.0)
    }
}

/// A single-axis PID controller.
#[derive(Debug)]
pub struct Pid {
    gains: Gains,
    deadband: f64,
    window_size: usize,
    errors: VecDeque<f64>,
    last_error: Option<f64>,
    last_d_error: f64,
    integral: f64,
    last_time: Option<Instant>,
    converged: bool,
}

impl Pid {
    pub fn new(gains: Gains, deadband: f64) -> Result<Self, ControlError> {
        Self::with_window(gains, deadband, DEFAULT_WINDOW)
    }

    pub fn with_window(
        gains: Gains,
        deadband: f64,
        window_size: usize,
    ) -> Result<Self, ControlError> {
        if !gains.valid() {
            return Err(ControlError::InvalidGains);
        }
        if !deadband.is_finite() || deadband < 0.0 {
            return Err(ControlError::InvalidDeadband);
        }
        Ok(Self {
            gains,
            deadband,
            window_size,
            errors: VecDeque::with_capacity(window_size),
            last_error: None,
            last_d_error: 0.0,
            integral: 0.0,
            last_time: None,
            converged: false,
        })
    }

    /// Replace gains and deadband. Resets the controller state.
    pub fn set_gains(&mut self, gains: Gains, deadband: f64) -> Result<(), ControlError> {
        if !gains.valid() {
            return Err(ControlError::InvalidGains);
        }
        if !deadband.is_finite() || deadband < 0.0 {
            return Err(ControlError::InvalidDeadband);
        }
        self.gains = gains;
        self.deadband = deadband;
        self.reset();
        Ok(())
    }

    /// Advance the controller with a new measurement against `setpoint`.
    pub fn update(&mut self, setpoint: f64, measured: f64) -> f64 {
        self.update_at(setpoint, measured, Instant::now())
    }

    pub(crate) fn update_at(&mut self, setpoint: f64, measured: f64, now: Instant) -> f64 {
        let e = setpoint - measured;

        if self.errors.len() == self.window_size {
            self.errors.pop_front();
        }
        self.errors.push_back(e);
        if self.errors.len() == self.window_size {
            let mean = self.errors.iter().sum::<f64>() / self.window_size as f64;
            self.converged = mean.abs() <= self.deadband;
        }

        let de = self.last_error.map_or(0.0, |last| e - last);
        let p = self.gains.kp * e;
        let (i, d) = match self.last_time {
            Some(last) => {
                let dt = now.duration_since(last).as_secs_f64();
                self.integral += de * dt;
                let i = self.gains.ki * self.integral;
                let d = if dt > 0.0 { self.gains.kd * de / dt } else { 0.0 };
                (i, d)
            }
            None => (0.0, 0.0),
        };

        self.last_error = Some(e);
        self.last_d_error = de;
        self.last_time = Some(now);
        p + i + d
    }

    /// Clear all state except gains, deadband, and window length.
    pub fn reset(&mut self) {
        self.errors.clear();
        self.last_error = None;
        self.last_d_error = 0.0;
        self.integral = 0.0;
        self.last_time = None;
        self.converged = false;
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn last_error(&self) -> Option<f64> {
        self.last_error
    }

    pub fn last_d_error(&self) -> f64 {
        self.last_d_error
    }

    pub fn integral_error(&self) -> f64 {
        self.integral
    }

    pub fn gains(&self) -> Gains {
        self.gains
    }

    pub fn deadband(&self) -> f64 {
        self.deadband
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ticks(start: Instant) -> impl Iterator<Item = Instant> {
        (0u64..).map(move |k| start + Duration::from_millis(100 * k))
    }

    #[test]
    fn rejects_negative_gains() {
        let bad = Gains {
            kp: -0.1,
            ki: 0.0,
            kd: 0.0,
        };
        assert_eq!(Pid::new(bad, 0.1).unwrap_err(), ControlError::InvalidGains);
        assert_eq!(
            Pid::new(Gains::p(1.0), -0.01).unwrap_err(),
            ControlError::InvalidDeadband
        );
    }

    #[test]
    fn first_update_is_proportional_only() {
        let mut pid = Pid::new(
            Gains {
                kp: 2.0,
                ki: 5.0,
                kd: 5.0,
            },
            0.0,
        )
        .unwrap();
        let out = pid.update_at(1.0, 0.0, Instant::now());
        assert_eq!(out, 2.0);
        assert_eq!(pid.integral_error(), 0.0);
    }

    #[test]
    fn integral_accumulates_error_change_not_error() {
        // With a constant error the legacy integral never moves: dE is zero
        // on every step after the first.
        let mut pid = Pid::new(
            Gains {
                kp: 0.0,
                ki: 1.0,
                kd: 0.0,
            },
            0.0,
        )
        .unwrap();
        let mut clock = ticks(Instant::now());
        for _ in 0..10 {
            let out = pid.update_at(1.0, 0.0, clock.next().unwrap());
            assert_eq!(out, 0.0);
        }
        assert_eq!(pid.integral_error(), 0.0);

        // A changing error does accumulate.
        let out = pid.update_at(1.0, 0.5, clock.next().unwrap());
        assert!(out < 0.0);
        assert!(pid.integral_error() < 0.0);
    }

    #[test]
    fn derivative_tracks_error_change() {
        let mut pid = Pid::new(
            Gains {
                kp: 0.0,
                ki: 0.0,
                kd: 1.0,
            },
            0.0,
        )
        .unwrap();
        let mut clock = ticks(Instant::now());
        pid.update_at(1.0, 0.0, clock.next().unwrap());
        // Error drops 1.0 -> 0.5 over 0.1 s: d = -0.5 / 0.1.
        let out = pid.update_at(1.0, 0.5, clock.next().unwrap());
        assert!((out - (-5.0)).abs() < 1e-9);
        assert_eq!(pid.last_d_error(), -0.5);
    }

    #[test]
    fn converges_within_window() {
        let mut pid = Pid::new(Gains::p(1.0), 0.05).unwrap();
        let mut clock = ticks(Instant::now());
        for measured in [0.0, 0.2, 0.5, 0.9, 0.99] {
            pid.update_at(1.0, measured, clock.next().unwrap());
            assert!(!pid.converged());
        }
        // Window fills with shrinking errors until the mean dips below the
        // deadband.
        for _ in 0..DEFAULT_WINDOW {
            pid.update_at(1.0, 1.0, clock.next().unwrap());
        }
        assert!(pid.converged());
    }

    #[test]
    fn convergence_needs_full_window() {
        let mut pid = Pid::new(Gains::p(1.0), 1.0).unwrap();
        let mut clock = ticks(Instant::now());
        for _ in 0..DEFAULT_WINDOW - 1 {
            pid.update_at(0.0, 0.0, clock.next().unwrap());
            assert!(!pid.converged());
        }
        pid.update_at(0.0, 0.0, clock.next().unwrap());
        assert!(pid.converged());
    }

    #[test]
    fn reset_keeps_gains_clears_state() {
        let mut pid = Pid::new(
            Gains {
                kp: 1.0,
                ki: 1.0,
                kd: 0.0,
            },
            0.5,
        )
        .unwrap();
        let mut clock = ticks(Instant::now());
        for measured in [0.0, 0.3, 0.6] {
            pid.update_at(1.0, measured, clock.next().unwrap());
        }
        assert!(pid.last_error().is_some());
        pid.reset();
        assert_eq!(pid.last_error(), None);
        assert_eq!(pid.integral_error(), 0.0);
        assert!(!pid.converged());
        assert_eq!(pid.gains().kp, 1.0);
        assert_eq!(pid.deadband(), 0.5);
    }

    #[test]
    fn set_gains_validates_and_resets() {
        let mut pid = Pid::new(Gains::p(1.0), 0.1).unwrap();
        let mut clock = ticks(Instant::now());
        pid.update_at(1.0, 0.0, clock.next().unwrap());
        pid.update_at(1.0, 0.5, clock.next().unwrap());

        assert_eq!(
            pid.set_gains(
                Gains {
                    kp: 1.0,
                    ki: f64::NAN,
                    kd: 0.0
                },
                0.1
            ),
            Err(ControlError::InvalidGains)
        );

        pid.set_gains(Gains::p(2.0), 0.2).unwrap();
        assert_eq!(pid.last_error(), None);
        assert_eq!(pid.gains().kp, 2.0);
    }
}
