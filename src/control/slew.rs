//! Output slew-rate limiter.

use crate::config::SlewConfig;

/// Caps the change between consecutive PWM commands, then clamps the
/// result into the actuator's duty range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlewLimiter {
    pub delta_up: f32,
    pub delta_down: f32,
    pub min: f32,
    pub max: f32,
}

impl SlewLimiter {
    pub fn new(delta_up: f32, delta_down: f32, min: f32, max: f32) -> Self {
        Self {
            delta_up: delta_up.abs(),
            delta_down: delta_down.abs(),
            min,
            max,
        }
    }

    pub fn from_config(slew: &SlewConfig, min: f32, max: f32) -> Self {
        Self::new(slew.delta_up, slew.delta_down, min, max)
    }

    /// Next command moving from `current` toward `target`.
    pub fn apply(&self, current: f32, target: f32) -> f32 {
        let delta = (target - current).clamp(-self.delta_down, self.delta_up);
        (current + delta).clamp(self.min, self.max)
    }
}
