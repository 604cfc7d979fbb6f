//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (operator
//! console, tuning tools) that the
//! [`FeederService`](super::service::FeederService) interprets and acts
//! upon.

use crate::config::SystemConfig;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Install a new configuration snapshot.  Validated immediately, applied
    /// at the start of the next cycle.
    UpdateConfig(Box<SystemConfig>),

    /// Drop the feature extractor's frame history (e.g. after the camera
    /// reconnects).
    ResetVision,

    /// Restart the feeding cycle from INIT with a fresh PI controller.
    ResetController,
}
