//! Outbound application events.
//!
//! The [`FeederService`](super::service::FeederService) emits these through
//! the [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log a line, append a CSV row, publish
//! the feature vector.

use std::time::Duration;

use crate::features::FeatureVector;
use crate::fsm::StateId;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service has started (carries initial state).
    Started(StateId),

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// Features extracted from one processed frame.
    Features(FeatureVector),

    /// One completed control cycle.
    Cycle(CycleRecord),

    /// One or more anomaly faults were raised.
    AnomalyDetected(u8),

    /// All anomaly faults have been cleared.
    AnomalyCleared,

    /// Sustained low activity stretched the evaluation phase.
    EvaluationExtended { t_eval: f64 },

    /// The PI integral was discarded.
    ControllerReset,

    /// Feature history was discarded.
    VisionReset,

    /// A new configuration snapshot took effect.
    ConfigApplied,

    /// Periodic runtime summary.
    Status(StatusReport),
}

/// One row of the per-cycle log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleRecord {
    pub state: StateId,
    pub pwm: f32,
    pub h: f32,
    pub features: FeatureVector,
}

/// Runtime summary produced by the control loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    pub runtime: Duration,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    /// Processed frames per second since start.
    pub processing_rate: f32,
    pub state: StateId,
    pub pwm: f32,
    pub h: f32,
    pub rsi: f32,
    pub pop: f32,
}
