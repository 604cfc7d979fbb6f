//! PI controller with clamping anti-windup.
//!
//! `output = Kp*e + Ki*I`, where `I += e*dt` is clamped to `±max_integral`
//! before the integral term is formed and the output is clamped to
//! `[output_min, output_max]`.  When the output saturates and the error
//! pushes further into the saturated side, that step's `e*dt` is rolled
//! back so the integral never winds up against the limit.

use std::time::Instant;

use crate::config::{AntiWindupConfig, PiConfig};

/// `dt` used for the first update after construction or reset.
const FIRST_STEP_DT: f32 = 0.1;
/// Floor for non-positive `dt`.
const MIN_DT: f32 = 0.01;

/// PI controller
#[derive(Debug, Clone)]
pub struct PiController {
    kp: f32,
    ki: f32,
    output_min: f32,
    output_max: f32,
    anti_windup: bool,
    max_integral: f32,
    integral: f32,
    last_error: f32,
    last_time: Option<Instant>,
}

/// Read-only view of the controller for status reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PiStatus {
    pub kp: f32,
    pub ki: f32,
    pub integral: f32,
    pub last_error: f32,
    pub output_min: f32,
    pub output_max: f32,
    pub anti_windup: bool,
    pub max_integral: f32,
}

impl PiController {
    pub fn new(kp: f32, ki: f32, output_min: f32, output_max: f32) -> Self {
        Self {
            kp,
            ki,
            output_min,
            output_max,
            anti_windup: true,
            max_integral: 50.0,
            integral: 0.0,
            last_error: 0.0,
            last_time: None,
        }
    }

    pub fn from_config(gains: &PiConfig, windup: &AntiWindupConfig, output_min: f32, output_max: f32) -> Self {
        let mut pi = Self::new(gains.kp, gains.ki, output_min, output_max);
        pi.set_anti_windup(windup.enable, windup.max_integral);
        pi
    }

    pub fn set_anti_windup(&mut self, enable: bool, max_integral: f32) {
        self.anti_windup = enable;
        self.max_integral = max_integral.abs();
    }

    /// Update gains and limits in place, keeping the accumulated integral.
    pub fn retune(&mut self, gains: &PiConfig, windup: &AntiWindupConfig, output_min: f32, output_max: f32) {
        self.kp = gains.kp;
        self.ki = gains.ki;
        self.output_min = output_min;
        self.output_max = output_max;
        self.set_anti_windup(windup.enable, windup.max_integral);
    }

    /// One controller step with an explicit `dt` (seconds).
    pub fn update(&mut self, setpoint: f32, measured: f32, dt: f32) -> f32 {
        let dt = if dt > 0.0 { dt } else { MIN_DT };
        let error = setpoint - measured;

        self.integral += error * dt;
        if self.anti_windup {
            self.integral = self.integral.clamp(-self.max_integral, self.max_integral);
        }

        let raw = self.kp * error + self.ki * self.integral;
        let output = raw.clamp(self.output_min, self.output_max);

        if self.anti_windup
            && ((raw > self.output_max && error > 0.0) || (raw < self.output_min && error < 0.0))
        {
            self.integral -= error * dt;
        }

        self.last_error = error;
        output
    }

    /// One controller step timed against the previous call.
    ///
    /// The first call after construction or [`reset`](Self::reset) uses a
    /// 0.1 s step.
    pub fn update_at(&mut self, setpoint: f32, measured: f32, now: Instant) -> f32 {
        let dt = match self.last_time {
            Some(prev) => now.saturating_duration_since(prev).as_secs_f32(),
            None => FIRST_STEP_DT,
        };
        self.last_time = Some(now);
        self.update(setpoint, measured, dt)
    }

    /// Zero the integral and forget the step timestamp.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
        self.last_time = None;
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn status(&self) -> PiStatus {
        PiStatus {
            kp: self.kp,
            ki: self.ki,
            integral: self.integral,
            last_error: self.last_error,
            output_min: self.output_min,
            output_max: self.output_max,
            anti_windup: self.anti_windup,
            max_integral: self.max_integral,
        }
    }
}
