//! Unified error types for the feeder control core.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! top-level control loop's error handling uniform.  Sub-errors are small
//! enums with hand-written `Display` impls so log lines stay compact.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Camera could not be opened, read, or has gone away.
    Camera(CameraError),
    /// A PWM duty-cycle command failed.
    Actuator(ActuatorError),
    /// A vision computation could not produce a value.
    Vision(VisionError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera(e) => write!(f, "camera: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Vision(e) => write!(f, "vision: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Camera errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    /// Device could not be opened or configured.
    OpenFailed(String),
    /// A single frame read failed.
    ReadFailed(String),
    /// No frame arrived within the requested wait.
    Timeout,
    /// The acquisition loop has exited; no more frames will arrive.
    Disconnected,
    /// The acquisition thread could not be spawned.
    ThreadSpawn(String),
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed(msg) => write!(f, "open failed: {msg}"),
            Self::ReadFailed(msg) => write!(f, "read failed: {msg}"),
            Self::Timeout => write!(f, "frame wait timed out"),
            Self::Disconnected => write!(f, "camera disconnected"),
            Self::ThreadSpawn(msg) => write!(f, "acquisition thread: {msg}"),
        }
    }
}

impl std::error::Error for CameraError {}

impl From<CameraError> for Error {
    fn from(e: CameraError) -> Self {
        Self::Camera(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    /// PWM channel could not be acquired (missing sysfs node, permissions).
    ChannelUnavailable(String),
    /// PWM duty-cycle write failed.
    PwmWriteFailed,
    /// A command was issued before `start()` or after `stop()`.
    NotRunning,
    /// Requested duty window is empty or outside 0-100 %.
    InvalidWindow,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelUnavailable(msg) => write!(f, "PWM channel unavailable: {msg}"),
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::NotRunning => write!(f, "PWM output not running"),
            Self::InvalidWindow => write!(f, "invalid PWM duty window"),
        }
    }
}

impl std::error::Error for ActuatorError {}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Vision errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisionError {
    /// ROI has zero width or height.
    EmptyRoi,
    /// ROI is too small for the requested transform.
    RoiTooSmall { width: u32, height: u32 },
    /// Two images that must match in size do not.
    DimensionMismatch,
    /// The computation produced NaN or infinity.
    NonFinite,
    /// The histogram reference image could not be loaded.
    ReferenceImage(String),
}

impl fmt::Display for VisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRoi => write!(f, "empty ROI"),
            Self::RoiTooSmall { width, height } => {
                write!(f, "ROI too small ({width}x{height})")
            }
            Self::DimensionMismatch => write!(f, "image dimensions differ"),
            Self::NonFinite => write!(f, "non-finite result"),
            Self::ReferenceImage(msg) => write!(f, "reference image: {msg}"),
        }
    }
}

impl std::error::Error for VisionError {}

impl From<VisionError> for Error {
    fn from(e: VisionError) -> Self {
        Self::Vision(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from loading, validating, or persisting configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No config document at the given location.
    NotFound,
    /// Document exists but could not be parsed.
    Corrupted(String),
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the backing store.
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted(msg) => write!(f, "config corrupted: {msg}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Anomaly faults
// ---------------------------------------------------------------------------

/// Hard anomalies force the feeding cycle into ANOMALY and the actuator to
/// its safe duty.  They are accumulated in a bitfield by the anomaly
/// monitor so that each can be raised and cleared independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AnomalyFault {
    /// Measured frame rate below threshold for longer than the trip delay.
    LowFrameRate = 0b0000_0001,
    /// Frame source reported that the camera is gone.
    CameraLost = 0b0000_0010,
}

impl AnomalyFault {
    /// Return the bitmask for this fault.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AnomalyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowFrameRate => write!(f, "frame rate below threshold"),
            Self::CameraLost => write!(f, "camera lost"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
