//! In-memory PWM channel for simulation runs and tests.

use embedded_hal::pwm::{ErrorKind, ErrorType, SetDutyCycle};

use super::pwm::PwmChannel;

/// Duty resolution: 0.01 % per step.
pub const SIM_DUTY_RESOLUTION: u16 = 10_000;

#[derive(Debug, Clone, Default)]
pub struct SimulatedPwmChannel {
    duty: u16,
    enabled: bool,
    failing: bool,
    writes: usize,
}

impl SimulatedPwmChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail.
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    pub fn duty_cycle(&self) -> u16 {
        self.duty
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of successful duty writes.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl ErrorType for SimulatedPwmChannel {
    type Error = ErrorKind;
}

impl SetDutyCycle for SimulatedPwmChannel {
    fn max_duty_cycle(&self) -> u16 {
        SIM_DUTY_RESOLUTION
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        if self.failing {
            return Err(ErrorKind::Other);
        }
        self.duty = duty.min(SIM_DUTY_RESOLUTION);
        self.writes += 1;
        Ok(())
    }
}

impl PwmChannel for SimulatedPwmChannel {
    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
        if self.failing {
            return Err(ErrorKind::Other);
        }
        self.enabled = enabled;
        Ok(())
    }

    fn read_duty_cycle(&self) -> Option<u16> {
        Some(self.duty)
    }
}
