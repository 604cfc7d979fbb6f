//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the blackboard the feeding-cycle handlers read from and
//! write to: the current time, when the active state was entered, the
//! effective phase durations, the anomaly fault mask, and the drive mode
//! the service should apply to the actuator this cycle.

use std::time::{Duration, Instant};

use crate::config::TimingConfig;
use crate::error::AnomalyFault;

/// A timed transition noticed later than this restarts the phase clock at
/// `now` instead of at the nominal deadline.
pub const LATE_TOLERANCE: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Drive mode (written by state handlers; consumed by the service)
// ---------------------------------------------------------------------------

/// What the service does with the PWM command this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMode {
    /// Keep the last command.
    #[default]
    Hold,
    /// Run the PI loop and the slew limiter.
    Regulate,
    /// Force the configured safe duty cycle.
    Safe,
}

// ---------------------------------------------------------------------------
// Phase timing
// ---------------------------------------------------------------------------

/// Effective phase durations (s).  `t_eval` may be stretched by the
/// low-activity fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseTiming {
    pub t_feed: f64,
    pub t_eval: f64,
    pub t_settle: f64,
}

impl From<&TimingConfig> for PhaseTiming {
    fn from(t: &TimingConfig) -> Self {
        Self {
            t_feed: t.t_feed,
            t_eval: t.t_eval,
            t_settle: t.t_settle,
        }
    }
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

pub struct FsmContext {
    // -- Timing --
    /// Time of the current update.  Set by the caller before each tick.
    pub now: Instant,
    /// When the active state was entered.
    pub state_entry: Instant,
    /// Entry time for the state about to be entered, set by timed handlers.
    pub scheduled_entry: Option<Instant>,
    pub timing: PhaseTiming,

    // -- Inputs --
    /// Latest activity index.
    pub activity: f32,
    /// Anomaly fault bitmask (see [`AnomalyFault::mask`]).
    pub fault_flags: u8,

    // -- Outputs --
    pub drive: DriveMode,
    /// Set when the PI integral must be discarded before the next update.
    pub pi_reset_requested: bool,
}

impl FsmContext {
    pub fn new(timing: &TimingConfig, now: Instant) -> Self {
        Self {
            now,
            state_entry: now,
            scheduled_entry: None,
            timing: PhaseTiming::from(timing),
            activity: 0.0,
            fault_flags: 0,
            drive: DriveMode::Hold,
            pi_reset_requested: false,
        }
    }

    /// Seconds elapsed since the current state was entered.
    pub fn secs_in_state(&self) -> f64 {
        self.now.saturating_duration_since(self.state_entry).as_secs_f64()
    }

    pub fn has_faults(&self) -> bool {
        self.fault_flags != 0
    }

    pub fn has_fault(&self, fault: AnomalyFault) -> bool {
        self.fault_flags & fault.mask() != 0
    }

    /// `true` once `secs` have passed since entry.  Schedules the next
    /// state's entry at the nominal deadline so phases do not drift with
    /// the frame rate, unless the deadline was missed by more than
    /// [`LATE_TOLERANCE`].
    pub fn phase_elapsed(&mut self, secs: f64) -> bool {
        let due = self.state_entry + Duration::from_secs_f64(secs.max(0.0));
        if self.now < due {
            return false;
        }
        let late = self.now.duration_since(due);
        self.scheduled_entry = Some(if late > LATE_TOLERANCE { self.now } else { due });
        true
    }
}
