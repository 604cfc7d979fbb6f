//! Linux sysfs PWM channel (`/sys/class/pwm/pwmchipN/pwmM`).
//!
//! Duty is written in nanoseconds of the carrier period; the channel
//! exposes a fixed 0.01 % resolution to `embedded-hal` callers.

use std::fs;
use std::path::{Path, PathBuf};

use embedded_hal::pwm::{ErrorKind, ErrorType, SetDutyCycle};
use log::{debug, info};

use super::pwm::PwmChannel;
use crate::config::PwmConfig;
use crate::error::ActuatorError;

pub const SYSFS_PWM_ROOT: &str = "/sys/class/pwm";
/// Raw duty steps per full period.
pub const SYSFS_DUTY_RESOLUTION: u16 = 10_000;

pub struct SysfsPwmChannel {
    dir: PathBuf,
    period_ns: u64,
}

impl SysfsPwmChannel {
    pub fn open(config: &PwmConfig) -> Result<Self, ActuatorError> {
        Self::open_at(Path::new(SYSFS_PWM_ROOT), config)
    }

    /// Export (if needed) and configure the channel under `root`.
    pub fn open_at(root: &Path, config: &PwmConfig) -> Result<Self, ActuatorError> {
        let chip = root.join(format!("pwmchip{}", config.chip));
        if !chip.is_dir() {
            return Err(ActuatorError::ChannelUnavailable(format!(
                "{} not found",
                chip.display()
            )));
        }

        let dir = chip.join(format!("pwm{}", config.channel));
        if !dir.is_dir() {
            debug!("Exporting PWM channel {} on {}", config.channel, chip.display());
            fs::write(chip.join("export"), config.channel.to_string())
                .map_err(|e| ActuatorError::ChannelUnavailable(format!("export: {e}")))?;
            if !dir.is_dir() {
                return Err(ActuatorError::ChannelUnavailable(format!(
                    "{} missing after export",
                    dir.display()
                )));
            }
        }

        let period_ns = 1_000_000_000 / u64::from(config.frequency.max(1));
        // duty_cycle may never exceed period, so zero it first.
        write_attr(&dir, "duty_cycle", 0)
            .and_then(|()| write_attr(&dir, "period", period_ns))
            .map_err(|e| ActuatorError::ChannelUnavailable(format!("configure: {e}")))?;

        info!(
            "sysfs PWM {} ready: period {period_ns} ns (GPIO {})",
            dir.display(),
            config.gpio_pin
        );
        Ok(Self { dir, period_ns })
    }

    pub fn period_ns(&self) -> u64 {
        self.period_ns
    }
}

fn write_attr(dir: &Path, name: &str, value: u64) -> std::io::Result<()> {
    fs::write(dir.join(name), value.to_string())
}

impl ErrorType for SysfsPwmChannel {
    type Error = ErrorKind;
}

impl SetDutyCycle for SysfsPwmChannel {
    fn max_duty_cycle(&self) -> u16 {
        SYSFS_DUTY_RESOLUTION
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        let duty = u64::from(duty.min(SYSFS_DUTY_RESOLUTION));
        let ns = self.period_ns * duty / u64::from(SYSFS_DUTY_RESOLUTION);
        write_attr(&self.dir, "duty_cycle", ns).map_err(|_| ErrorKind::Other)
    }
}

impl PwmChannel for SysfsPwmChannel {
    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
        write_attr(&self.dir, "enable", u64::from(enabled)).map_err(|_| ErrorKind::Other)
    }

    fn read_duty_cycle(&self) -> Option<u16> {
        let ns: u64 = fs::read_to_string(self.dir.join("duty_cycle"))
            .ok()?
            .trim()
            .parse()
            .ok()?;
        if self.period_ns == 0 {
            return None;
        }
        let raw = ns * u64::from(SYSFS_DUTY_RESOLUTION) / self.period_ns;
        u16::try_from(raw).ok()
    }
}
