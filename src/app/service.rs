//! Application service: the hexagonal core.
//!
//! [`FeederService`] is the owned controller object: it holds the vision
//! pipeline, the feeding-cycle FSM, the anomaly monitor, the PI loop and
//! the current PWM command.  All I/O flows through port traits injected
//! at call sites, making the entire service testable with mock adapters.
//!
//! ```text
//!   Frame ──▶ ┌──────────────────────────────────────┐ ──▶ EventSink
//!             │             FeederService            │
//!             │ preprocess · features · fusion (H)   │
//!             │ anomaly monitor · FSM · PI · slew    │
//! Actuator ◀──│                                      │
//!             └──────────────────────────────────────┘
//! ```
//!
//! One control cycle is strictly sequential: anomaly evaluation, FSM
//! update, then the drive mode chosen by the active state decides the
//! PWM command that is written to the actuator.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};

use crate::config::SystemConfig;
use crate::control::{PiController, PiStatus, SlewLimiter};
use crate::error::{ActuatorError, AnomalyFault, ConfigError, Error};
use crate::features::{FeatureExtractor, FeatureVector};
use crate::fsm::context::{DriveMode, FsmContext, PhaseTiming};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::fusion::ActivityFusion;
use crate::safety::AnomalyMonitor;
use crate::vision::{Frame, ImagePreprocessor};

use super::commands::AppCommand;
use super::events::{AppEvent, CycleRecord};
use super::ports::{ActuatorPort, EventSink};

/// Snapshot of the controller for status queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerStatus {
    pub state: StateId,
    pub current_pwm: f32,
    pub target_h: f32,
    pub last_h: f32,
    pub time_in_state: f64,
    /// Effective phase durations, including any `t_eval` extension.
    pub timing: PhaseTiming,
    pub h_hi: f32,
    pub h_lo: f32,
    pub fault_flags: u8,
    pub pi: PiStatus,
}

// ───────────────────────────────────────────────────────────────
// FeederService
// ───────────────────────────────────────────────────────────────

pub struct FeederService {
    config: Arc<SystemConfig>,
    /// Validated snapshot waiting for the next cycle start.
    pending: Option<Arc<SystemConfig>>,
    /// The actuator has not yet accepted the installed duty window.
    window_pending: bool,

    preprocessor: ImagePreprocessor,
    extractor: FeatureExtractor,
    fusion: ActivityFusion,

    fsm: Fsm,
    ctx: FsmContext,
    monitor: AnomalyMonitor,
    pi: PiController,
    slew: SlewLimiter,

    /// Last PWM command the actuator accepted (%).
    pwm: f32,
    last_h: f32,
    last_features: FeatureVector,
    frames_processed: u64,
}

impl FeederService {
    /// Construct the service from a configuration snapshot.
    ///
    /// Does **not** start the FSM: call [`start`](Self::start) next.
    pub fn new(config: Arc<SystemConfig>) -> Self {
        let pwm_cfg = &config.hardware.pwm;
        let ctrl = &config.controller;
        let (pwm_min, pwm_max) = (pwm_cfg.min_duty_cycle, pwm_cfg.max_duty_cycle);

        Self {
            pending: None,
            window_pending: false,
            preprocessor: ImagePreprocessor::new(&config.vision),
            extractor: FeatureExtractor::new(
                &config.vision.feature_extraction,
                &config.feature_fusion.baseline,
            ),
            fusion: ActivityFusion::from_config(&config.feature_fusion),
            fsm: Fsm::new(build_state_table(), StateId::Init),
            ctx: FsmContext::new(&ctrl.timing, Instant::now()),
            monitor: AnomalyMonitor::new(&config.anomaly_detection, &ctrl.thresholds),
            pi: PiController::from_config(&ctrl.pi_controller, &ctrl.anti_windup, pwm_min, pwm_max),
            slew: SlewLimiter::from_config(&ctrl.constraints, pwm_min, pwm_max),
            pwm: pwm_min,
            last_h: 0.0,
            last_features: FeatureVector::default(),
            frames_processed: 0,
            config,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter INIT at `now`.
    pub fn start(&mut self, now: Instant, sink: &mut impl EventSink) {
        self.ctx.now = now;
        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!(
            "FeederService started in {}, pwm={:.2}%",
            self.fsm.current_state(),
            self.pwm
        );
    }

    /// Return to INIT with a fresh PI integral, cleared anomaly timers and
    /// the configured `t_eval`.  The PWM command is left where it is.
    pub fn reset(&mut self, now: Instant, sink: &mut impl EventSink) {
        self.pi.reset();
        self.monitor.reset();
        self.ctx.fault_flags = 0;
        self.ctx.pi_reset_requested = false;
        self.ctx.timing = PhaseTiming::from(&self.config.controller.timing);
        self.ctx.now = now;
        self.fsm.restart(StateId::Init, &mut self.ctx);
        sink.emit(&AppEvent::ControllerReset);
        info!("controller reset");
    }

    // ── Per-cycle orchestration ───────────────────────────────

    /// Run the full pipeline on one frame: preprocess → features → H →
    /// control cycle.
    ///
    /// A frame the vision pipeline cannot use still runs the anomaly
    /// monitor (as an idle cycle) before the error is returned.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        fps: f32,
        now: Instant,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> Result<CycleRecord, Error> {
        self.begin_cycle(hw, sink)?;
        if self.monitor.has_fault(AnomalyFault::CameraLost) {
            self.monitor.set_camera_lost(false);
        }

        let features = match self.preprocessor.process(frame) {
            Ok(pre) => self.extractor.extract(&pre.rois()),
            Err(e) => {
                warn!("frame #{} unusable: {e}", frame.sequence);
                self.cycle(None, fps, now, hw, sink)?;
                return Err(e.into());
            }
        };
        self.frames_processed += 1;
        sink.emit(&AppEvent::Features(features));

        Ok(self.update(features, fps, now, hw, sink)?)
    }

    /// Control cycle for an already extracted feature vector.
    pub fn update(
        &mut self,
        features: FeatureVector,
        fps: f32,
        now: Instant,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> Result<CycleRecord, ActuatorError> {
        self.begin_cycle(hw, sink)?;
        let h = self.fusion.activity_index(&features);
        self.last_features = features;
        self.last_h = h;

        self.cycle(Some(h), fps, now, hw, sink)?;

        let record = CycleRecord {
            state: self.fsm.current_state(),
            pwm: self.pwm,
            h,
            features,
        };
        sink.emit(&AppEvent::Cycle(record));
        Ok(record)
    }

    /// Cycle without a frame (queue wait timed out).  Only the anomaly
    /// monitor runs; phase timing does not advance, but a tripped fault
    /// still forces ANOMALY and the safe output.
    pub fn idle_tick(
        &mut self,
        fps: f32,
        now: Instant,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> Result<(), ActuatorError> {
        self.begin_cycle(hw, sink)?;
        debug!("idle cycle, fps={fps:.1}");
        self.cycle(None, fps, now, hw, sink)
    }

    /// The frame source has gone away: latch the fault and drive the safe
    /// output immediately.
    pub fn camera_lost(
        &mut self,
        now: Instant,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> Result<(), ActuatorError> {
        self.monitor.set_camera_lost(true);
        self.cycle(None, 0.0, now, hw, sink)
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        now: Instant,
        sink: &mut impl EventSink,
    ) -> Result<(), ConfigError> {
        match cmd {
            AppCommand::UpdateConfig(config) => {
                config.validate()?;
                self.pending = Some(Arc::new(*config));
                info!("config update accepted, applying at next cycle");
            }
            AppCommand::ResetVision => {
                self.extractor.reset();
                sink.emit(&AppEvent::VisionReset);
                info!("feature history cleared");
            }
            AppCommand::ResetController => self.reset(now, sink),
        }
        Ok(())
    }

    /// Queue `config` for the next cycle unless it is already the live
    /// snapshot.
    pub fn sync_config(&mut self, config: &Arc<SystemConfig>) {
        let pending_same = self.pending.as_ref().is_some_and(|p| Arc::ptr_eq(p, config));
        if !Arc::ptr_eq(&self.config, config) && !pending_same {
            self.pending = Some(Arc::clone(config));
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn current_pwm(&self) -> f32 {
        self.pwm
    }

    pub fn last_activity(&self) -> f32 {
        self.last_h
    }

    pub fn last_features(&self) -> FeatureVector {
        self.last_features
    }

    pub fn pi_integral(&self) -> f32 {
        self.pi.integral()
    }

    pub fn effective_t_eval(&self) -> f64 {
        self.ctx.timing.t_eval
    }

    pub fn fault_flags(&self) -> u8 {
        self.ctx.fault_flags
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn config(&self) -> &Arc<SystemConfig> {
        &self.config
    }

    pub fn status(&self) -> ControllerStatus {
        let thresholds = &self.config.controller.thresholds;
        ControllerStatus {
            state: self.fsm.current_state(),
            current_pwm: self.pwm,
            target_h: thresholds.target(),
            last_h: self.last_h,
            time_in_state: self.ctx.secs_in_state(),
            timing: self.ctx.timing,
            h_hi: thresholds.h_hi,
            h_lo: thresholds.h_lo,
            fault_flags: self.ctx.fault_flags,
            pi: self.pi.status(),
        }
    }

    // ── Internal ──────────────────────────────────────────────

    fn begin_cycle(&mut self, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) -> Result<(), ActuatorError> {
        if let Some(next) = self.pending.take() {
            self.install_config(next);
            sink.emit(&AppEvent::ConfigApplied);
        }
        if self.window_pending {
            let pwm = &self.config.hardware.pwm;
            hw.set_limits(pwm.min_duty_cycle, pwm.max_duty_cycle)?;
            self.window_pending = false;
        }
        Ok(())
    }

    /// Adopt a new snapshot.  Tunables change in place; the PI integral,
    /// phase clock and anomaly timers survive.  Vision stages are rebuilt
    /// only when their section changed.
    fn install_config(&mut self, next: Arc<SystemConfig>) {
        let prev = std::mem::replace(&mut self.config, next);
        let cfg = Arc::clone(&self.config);
        let ctrl = &cfg.controller;
        let (pwm_min, pwm_max) = (cfg.hardware.pwm.min_duty_cycle, cfg.hardware.pwm.max_duty_cycle);

        self.pi.retune(&ctrl.pi_controller, &ctrl.anti_windup, pwm_min, pwm_max);
        self.slew = SlewLimiter::from_config(&ctrl.constraints, pwm_min, pwm_max);
        self.monitor.retune(&cfg.anomaly_detection, &ctrl.thresholds);
        self.fusion = ActivityFusion::from_config(&cfg.feature_fusion);
        if prev.hardware.pwm != cfg.hardware.pwm {
            self.window_pending = true;
        }
        if prev.controller.timing != ctrl.timing {
            self.ctx.timing = PhaseTiming::from(&ctrl.timing);
        }
        if prev.vision != cfg.vision || prev.feature_fusion.baseline != cfg.feature_fusion.baseline {
            self.preprocessor = ImagePreprocessor::new(&cfg.vision);
            self.extractor =
                FeatureExtractor::new(&cfg.vision.feature_extraction, &cfg.feature_fusion.baseline);
        }
        self.pwm = self.pwm.clamp(pwm_min, pwm_max);
        info!("config snapshot installed");
    }

    /// Monitor → FSM → drive.  `activity` is `None` on cycles without a
    /// processed frame; those never advance phase timing.
    fn cycle(
        &mut self,
        activity: Option<f32>,
        fps: f32,
        now: Instant,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> Result<(), ActuatorError> {
        let prev_state = self.fsm.current_state();
        let prev_faults = self.ctx.fault_flags;
        self.ctx.now = now;

        // 1. Anomaly evaluation
        let report = self.monitor.evaluate(fps, activity, now);
        self.ctx.fault_flags = report.faults;
        if report.faults != 0 && report.faults != prev_faults {
            warn!("anomaly! flags=0b{:08b}", report.faults);
            sink.emit(&AppEvent::AnomalyDetected(report.faults));
        } else if report.faults == 0 && prev_faults != 0 {
            sink.emit(&AppEvent::AnomalyCleared);
        }
        if report.extend_evaluation {
            self.extend_evaluation(sink);
        }

        // 2. FSM
        if let Some(h) = activity {
            self.ctx.activity = h;
        }
        let transition = if report.faults != 0 {
            self.fsm.force_transition(StateId::Anomaly, &mut self.ctx)
        } else if activity.is_some() {
            self.fsm.tick(&mut self.ctx)
        } else {
            None
        };
        if let Some(t) = transition {
            sink.emit(&AppEvent::StateChanged { from: t.from, to: t.to });
        }

        // 3. Leaving ANOMALY discards the integral; regulation resumes on
        //    the following cycle.
        let recovering = self.ctx.pi_reset_requested;
        if recovering {
            self.ctx.pi_reset_requested = false;
            self.pi.reset();
            sink.emit(&AppEvent::ControllerReset);
        }

        // 4. Drive
        let command = match (self.ctx.drive, activity) {
            (DriveMode::Safe, _) => self.config.anomaly_detection.fallback_mode.pwm_safe_value,
            (DriveMode::Regulate, Some(h)) if !recovering => {
                let target = self.config.controller.thresholds.target();
                let pi_out = self.pi.update_at(h, target, now);
                self.slew.apply(self.pwm, pi_out)
            }
            _ => self.pwm,
        };
        self.pwm = hw.set_duty_cycle(command)?;

        if self.fsm.current_state() != prev_state {
            debug!("cycle: {} -> {}, pwm={:.2}%", prev_state, self.fsm.current_state(), self.pwm);
        }
        Ok(())
    }

    fn extend_evaluation(&mut self, sink: &mut impl EventSink) {
        let fallback = &self.config.anomaly_detection.fallback_mode;
        let extended = (self.ctx.timing.t_eval * fallback.evaluation_extension).min(fallback.max_t_eval);
        if extended > self.ctx.timing.t_eval {
            warn!(
                "low activity: t_eval {:.2}s -> {:.2}s",
                self.ctx.timing.t_eval, extended
            );
            self.ctx.timing.t_eval = extended;
            sink.emit(&AppEvent::EvaluationExtended { t_eval: extended });
        }
    }
}
