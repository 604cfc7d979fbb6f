//! Actuator drivers: the feeder motor PWM and its channel backends.

pub mod pwm;
pub mod sim_pwm;
pub mod sysfs_pwm;

pub use pwm::{LinearityReport, PwmActuator, PwmChannel};
pub use sim_pwm::SimulatedPwmChannel;
pub use sysfs_pwm::SysfsPwmChannel;
