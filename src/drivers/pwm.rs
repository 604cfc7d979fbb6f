//! Feeder motor PWM actuator.
//!
//! Wraps any [`PwmChannel`] (an `embedded-hal` duty-cycle output that can
//! also be switched on and off) and enforces the configured duty window.
//!
//! ## Safety contract
//!
//! Every value written to the channel is clamped to
//! `[min_duty_cycle, max_duty_cycle]`, including NaN and out-of-range
//! requests.  `emergency_stop` drives the output to the minimum duty, never
//! to zero: a stalled feeder motor is recovered more safely from a slow
//! crawl than from a dead stop.

use std::thread;
use std::time::Duration;

use embedded_hal::pwm::SetDutyCycle;
use log::{debug, error, info, warn};

use crate::app::ports::ActuatorPort;
use crate::config::PwmConfig;
use crate::error::ActuatorError;

/// Changes smaller than this are applied silently (percentage points).
const LOG_CHANGE_THRESHOLD: f32 = 0.1;

/// A PWM output that can be enabled, disabled and optionally read back.
pub trait PwmChannel: SetDutyCycle {
    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Raw duty currently in effect, if the hardware reports it.
    fn read_duty_cycle(&self) -> Option<u16> {
        None
    }
}

/// One step of a linearity sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearityPoint {
    pub commanded: f32,
    pub actual: f32,
    pub error: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearityReport {
    pub points: Vec<LinearityPoint>,
    pub max_error: f32,
    pub avg_error: f32,
    /// `1 - max_error / (max - min)`; 1.0 is a perfect channel.
    pub linearity_score: f32,
}

pub struct PwmActuator<C: PwmChannel> {
    channel: C,
    min_duty: f32,
    max_duty: f32,
    frequency: u32,
    duty: f32,
    running: bool,
}

impl<C: PwmChannel> PwmActuator<C> {
    pub fn new(channel: C, config: &PwmConfig) -> Self {
        Self {
            channel,
            min_duty: config.min_duty_cycle,
            max_duty: config.max_duty_cycle,
            frequency: config.frequency,
            duty: config.min_duty_cycle,
            running: false,
        }
    }

    /// Enable the output at `initial` (clamped); `None` starts at the minimum.
    pub fn start(&mut self, initial: Option<f32>) -> Result<f32, ActuatorError> {
        let duty = self.clamp(initial.unwrap_or(self.min_duty));
        self.write(duty)?;
        self.channel
            .set_enabled(true)
            .map_err(|_| ActuatorError::PwmWriteFailed)?;
        self.running = true;
        info!(
            "PWM started: {duty:.1}% @ {} Hz (window {:.1}-{:.1}%)",
            self.frequency, self.min_duty, self.max_duty
        );
        Ok(duty)
    }

    /// Apply `duty` (%), clamped to the configured window.  Returns the
    /// value written.
    pub fn set_duty_cycle(&mut self, duty: f32) -> Result<f32, ActuatorError> {
        if !self.running {
            return Err(ActuatorError::NotRunning);
        }
        let clamped = self.clamp(duty);
        if duty.is_nan() || (clamped - duty).abs() > f32::EPSILON {
            debug!("PWM request {duty:.2}% clamped to {clamped:.2}%");
        }
        let previous = self.duty;
        self.write(clamped)?;
        if (clamped - previous).abs() > LOG_CHANGE_THRESHOLD {
            info!("PWM duty: {previous:.1}% -> {clamped:.1}%");
        }
        Ok(clamped)
    }

    pub fn current_duty(&self) -> f32 {
        self.duty
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn limits(&self) -> (f32, f32) {
        (self.min_duty, self.max_duty)
    }

    /// Replace the duty window.  A running output that falls outside the
    /// new window is moved to its nearest edge.
    pub fn set_limits(&mut self, min: f32, max: f32) -> Result<(), ActuatorError> {
        if !(0.0..=100.0).contains(&min) || !(0.0..=100.0).contains(&max) || min >= max {
            return Err(ActuatorError::InvalidWindow);
        }
        if (min - self.min_duty).abs() <= f32::EPSILON && (max - self.max_duty).abs() <= f32::EPSILON {
            return Ok(());
        }
        info!(
            "PWM window: {:.1}-{:.1}% -> {min:.1}-{max:.1}%",
            self.min_duty, self.max_duty
        );
        self.min_duty = min;
        self.max_duty = max;
        if self.running {
            let duty = self.clamp(self.duty);
            if (duty - self.duty).abs() > f32::EPSILON {
                self.write(duty)?;
            }
        }
        Ok(())
    }

    /// Force the minimum duty cycle immediately.
    pub fn emergency_stop(&mut self) -> Result<(), ActuatorError> {
        if !self.running {
            return Ok(());
        }
        let min = self.min_duty;
        self.write(min).inspect_err(|e| error!("Emergency stop failed: {e}"))?;
        warn!("PWM emergency stop: output forced to {min:.1}%");
        Ok(())
    }

    /// Drop to the minimum duty, then disable the output.
    pub fn stop(&mut self) -> Result<(), ActuatorError> {
        if !self.running {
            return Ok(());
        }
        self.emergency_stop()?;
        self.channel
            .set_enabled(false)
            .map_err(|_| ActuatorError::PwmWriteFailed)?;
        self.running = false;
        info!("PWM stopped");
        Ok(())
    }

    /// Sweep `points` evenly spaced duties across the window, compare the
    /// commanded duty with what the channel reports, then restore the
    /// original duty.
    pub fn linearity_test(&mut self, points: usize, dwell: Duration) -> Result<LinearityReport, ActuatorError> {
        if !self.running {
            return Err(ActuatorError::NotRunning);
        }
        let points = points.max(2);
        let original = self.duty;
        let step = (self.max_duty - self.min_duty) / (points - 1) as f32;
        info!("PWM linearity test: {points} points");

        let mut results = Vec::with_capacity(points);
        for i in 0..points {
            let commanded = self.min_duty + step * i as f32;
            self.set_duty_cycle(commanded)?;
            if !dwell.is_zero() {
                thread::sleep(dwell);
            }
            let actual = self.read_back();
            results.push(LinearityPoint {
                commanded,
                actual,
                error: (commanded - actual).abs(),
            });
        }
        self.set_duty_cycle(original)?;

        let max_error = results.iter().map(|p| p.error).fold(0.0f32, f32::max);
        let avg_error = results.iter().map(|p| p.error).sum::<f32>() / results.len() as f32;
        let span = self.max_duty - self.min_duty;
        let linearity_score = if span > 0.0 { 1.0 - max_error / span } else { 1.0 };

        info!("  max error: {max_error:.2}%");
        info!("  avg error: {avg_error:.2}%");
        info!("  linearity score: {linearity_score:.3}");

        Ok(LinearityReport {
            points: results,
            max_error,
            avg_error,
            linearity_score,
        })
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    // ── Internal ──────────────────────────────────────────────────

    fn clamp(&self, duty: f32) -> f32 {
        if duty.is_nan() {
            return self.min_duty;
        }
        duty.clamp(self.min_duty, self.max_duty)
    }

    fn write(&mut self, duty: f32) -> Result<(), ActuatorError> {
        let max = f32::from(self.channel.max_duty_cycle());
        let raw = (duty / 100.0 * max).round().clamp(0.0, max) as u16;
        self.channel
            .set_duty_cycle(raw)
            .map_err(|_| ActuatorError::PwmWriteFailed)?;
        self.duty = duty;
        Ok(())
    }

    fn read_back(&self) -> f32 {
        let max = f32::from(self.channel.max_duty_cycle());
        match self.channel.read_duty_cycle() {
            Some(raw) if max > 0.0 => f32::from(raw) / max * 100.0,
            _ => self.duty,
        }
    }
}

impl<C: PwmChannel> ActuatorPort for PwmActuator<C> {
    fn set_duty_cycle(&mut self, duty: f32) -> Result<f32, ActuatorError> {
        PwmActuator::set_duty_cycle(self, duty)
    }

    fn emergency_stop(&mut self) -> Result<(), ActuatorError> {
        PwmActuator::emergency_stop(self)
    }

    fn set_limits(&mut self, min: f32, max: f32) -> Result<(), ActuatorError> {
        PwmActuator::set_limits(self, min, max)
    }

    fn current_duty(&self) -> f32 {
        PwmActuator::current_duty(self)
    }
}

impl<C: PwmChannel> Drop for PwmActuator<C> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("PWM shutdown on drop failed: {e}");
        }
    }
}
