//! Anomaly monitor.
//!
//! Runs **every cycle before the FSM** and maintains a fault bitmask that
//! the state handlers read from `FsmContext.fault_flags`.
//!
//! ## Fault lifecycle
//!
//! 1. The measured frame rate drops below `fps_threshold`.
//! 2. Once it has stayed low for longer than `fps_trip_secs`, the monitor
//!    sets [`AnomalyFault::LowFrameRate`] and the FSM moves to ANOMALY,
//!    where the safe duty cycle is applied.
//! 3. The first cycle with a recovered frame rate clears the bit; the FSM
//!    returns to EVALUATING and the PI integral is discarded.
//!
//! [`AnomalyFault::CameraLost`] is latched by the frame source and only
//! cleared when the camera delivers frames again.
//!
//! Sustained very low activity (`H < H_lo / 2` for `low_activity_duration`)
//! is not a fault: it is reported as a request to stretch `t_eval`.

use std::time::{Duration, Instant};

use crate::config::{AnomalyConfig, ThresholdConfig};
use crate::error::AnomalyFault;
use log::{error, info, warn};

/// Outcome of one monitor pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnomalyReport {
    /// Active fault bitmask.
    pub faults: u8,
    /// Activity has been very low for the configured duration.
    pub extend_evaluation: bool,
}

pub struct AnomalyMonitor {
    fps_threshold: f32,
    fps_trip: Duration,
    low_activity_level: f32,
    low_activity_duration: Duration,
    /// Latched fault bitmask.
    faults: u8,
    fps_low_since: Option<Instant>,
    low_activity_since: Option<Instant>,
}

impl AnomalyMonitor {
    pub fn new(config: &AnomalyConfig, thresholds: &ThresholdConfig) -> Self {
        let mut monitor = Self {
            fps_threshold: 0.0,
            fps_trip: Duration::ZERO,
            low_activity_level: 0.0,
            low_activity_duration: Duration::ZERO,
            faults: 0,
            fps_low_since: None,
            low_activity_since: None,
        };
        monitor.retune(config, thresholds);
        monitor
    }

    /// Adopt new limits, keeping running timers and latched faults.
    pub fn retune(&mut self, config: &AnomalyConfig, thresholds: &ThresholdConfig) {
        self.fps_threshold = config.fps_threshold;
        self.fps_trip = Duration::from_secs_f64(config.fps_trip_secs.max(0.0));
        self.low_activity_level = thresholds.h_lo * 0.5;
        self.low_activity_duration = Duration::from_secs_f64(config.low_activity_duration.max(0.0));
    }

    /// Evaluate both watch conditions.  `activity` is `None` on cycles
    /// without a processed frame.
    pub fn evaluate(&mut self, fps: f32, activity: Option<f32>, now: Instant) -> AnomalyReport {
        // ── Frame rate ─────────────────────────────────────────────
        let fps_low = fps.is_nan() || fps < self.fps_threshold;
        let tripped = if fps_low {
            let since = *self.fps_low_since.get_or_insert(now);
            now.saturating_duration_since(since) > self.fps_trip
        } else {
            self.fps_low_since = None;
            false
        };
        self.eval_fault(AnomalyFault::LowFrameRate, tripped);

        // ── Sustained low activity ─────────────────────────────────
        let mut extend_evaluation = false;
        if let Some(h) = activity {
            if h < self.low_activity_level {
                let since = *self.low_activity_since.get_or_insert(now);
                if now.saturating_duration_since(since) > self.low_activity_duration {
                    warn!(
                        "activity below {:.3} for over {:.0}s",
                        self.low_activity_level,
                        self.low_activity_duration.as_secs_f64()
                    );
                    extend_evaluation = true;
                    self.low_activity_since = None;
                }
            } else {
                self.low_activity_since = None;
            }
        }

        AnomalyReport {
            faults: self.faults,
            extend_evaluation,
        }
    }

    /// Latch or clear the camera-lost fault.
    pub fn set_camera_lost(&mut self, lost: bool) {
        self.eval_fault(AnomalyFault::CameraLost, lost);
    }

    /// Clear timers and faults.
    pub fn reset(&mut self) {
        self.faults = 0;
        self.fps_low_since = None;
        self.low_activity_since = None;
    }

    pub fn faults(&self) -> u8 {
        self.faults
    }

    pub fn has_faults(&self) -> bool {
        self.faults != 0
    }

    pub fn has_fault(&self, fault: AnomalyFault) -> bool {
        self.faults & fault.mask() != 0
    }

    // ── Internal ──────────────────────────────────────────────────

    /// Set or clear a fault bit based on a boolean condition.
    fn eval_fault(&mut self, fault: AnomalyFault, condition: bool) {
        if condition {
            if self.faults & fault.mask() == 0 {
                error!("ANOMALY FAULT SET: {fault}");
            }
            self.faults |= fault.mask();
        } else {
            if self.faults & fault.mask() != 0 {
                info!("ANOMALY FAULT CLEARED: {fault}");
            }
            self.faults &= !fault.mask();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> AnomalyMonitor {
        AnomalyMonitor::new(&AnomalyConfig::default(), &ThresholdConfig::default())
    }

    fn at(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    #[test]
    fn brief_fps_dip_does_not_trip() {
        let mut m = monitor();
        let t0 = Instant::now();
        for ms in (0..=1_000).step_by(100) {
            assert_eq!(m.evaluate(20.0, Some(0.5), at(t0, ms)).faults, 0);
        }
        assert_eq!(m.evaluate(60.0, Some(0.5), at(t0, 1_100)).faults, 0);
        // Timer restarted by the recovery.
        assert_eq!(m.evaluate(20.0, Some(0.5), at(t0, 1_200)).faults, 0);
    }

    #[test]
    fn sustained_low_fps_trips_and_recovers() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.evaluate(20.0, None, t0);
        let r = m.evaluate(20.0, None, at(t0, 1_050));
        assert!(r.faults & AnomalyFault::LowFrameRate.mask() != 0);

        let r = m.evaluate(60.0, None, at(t0, 1_100));
        assert_eq!(r.faults, 0);
    }

    #[test]
    fn nan_fps_counts_as_low() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.evaluate(f32::NAN, None, t0);
        assert!(m.evaluate(f32::NAN, None, at(t0, 1_500)).faults != 0);
    }

    #[test]
    fn sustained_low_activity_requests_extension_once_per_window() {
        let mut m = monitor();
        let t0 = Instant::now();
        // H_lo = 0.35 -> very low below 0.175
        assert!(!m.evaluate(60.0, Some(0.1), t0).extend_evaluation);
        assert!(!m.evaluate(60.0, Some(0.1), at(t0, 30_000)).extend_evaluation);
        assert!(m.evaluate(60.0, Some(0.1), at(t0, 30_100)).extend_evaluation);
        // Window restarts.
        assert!(!m.evaluate(60.0, Some(0.1), at(t0, 30_200)).extend_evaluation);
    }

    #[test]
    fn activity_recovery_resets_low_activity_timer() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.evaluate(60.0, Some(0.1), t0);
        m.evaluate(60.0, Some(0.5), at(t0, 20_000));
        assert!(!m.evaluate(60.0, Some(0.1), at(t0, 31_000)).extend_evaluation);
    }

    #[test]
    fn idle_cycles_do_not_touch_activity_timer() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.evaluate(60.0, Some(0.1), t0);
        m.evaluate(60.0, None, at(t0, 15_000));
        assert!(m.evaluate(60.0, Some(0.1), at(t0, 31_000)).extend_evaluation);
    }

    #[test]
    fn camera_lost_is_latched_until_cleared() {
        let mut m = monitor();
        m.set_camera_lost(true);
        assert!(m.has_fault(AnomalyFault::CameraLost));
        assert!(m.evaluate(60.0, None, Instant::now()).faults != 0);
        m.set_camera_lost(false);
        assert!(!m.has_faults());
    }

    #[test]
    fn reset_clears_everything() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.evaluate(1.0, None, t0);
        m.evaluate(1.0, None, at(t0, 2_000));
        assert!(m.has_faults());
        m.reset();
        assert_eq!(m.faults(), 0);
    }
}
