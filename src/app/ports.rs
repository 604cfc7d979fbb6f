//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ FeederService (domain)
//! ```
//!
//! Driven adapters (camera, PWM, event sinks, config storage) implement
//! these traits.  The [`FeederService`](super::service::FeederService)
//! consumes them via generics, so the domain core never touches hardware
//! directly.

use crate::config::SystemConfig;
use crate::error::{ActuatorError, ConfigError};

use super::events::AppEvent;

// ───────────────────────────────────────────────────────────────
// Camera port (driven adapter: device → acquisition thread)
// ───────────────────────────────────────────────────────────────

pub use crate::camera::CameraPort;

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// The single duty-cycle output.  Only the control thread writes to it.
pub trait ActuatorPort {
    /// Apply `duty` (%).  Implementations clamp to their safe window and
    /// return the value actually applied.
    fn set_duty_cycle(&mut self, duty: f32) -> Result<f32, ActuatorError>;

    /// Drive the output to its minimum safe duty immediately.
    fn emergency_stop(&mut self) -> Result<(), ActuatorError>;

    /// Replace the duty window (%) used for clamping and emergency stop.
    fn set_limits(&mut self, min: f32, max: f32) -> Result<(), ActuatorError>;

    fn current_duty(&self) -> f32;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / observers)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port.  Adapters
/// decide where they go (log, CSV file, feature stream).
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: &AppEvent) {
        (**self).emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate before persisting.  Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], never silently clamped.
pub trait ConfigPort {
    /// Load configuration.  Missing keys take their defaults.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;
}
