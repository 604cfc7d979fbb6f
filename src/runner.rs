//! Control-thread loop.
//!
//! ```text
//!  FrameSource ──next_frame(timeout)──▶ FeederService ──▶ ActuatorPort
//!       │                                   │
//!       │ Timeout      → idle_tick           └──▶ EventSink
//!       │ Disconnected → camera_lost, stop
//! ```
//!
//! Each iteration takes one config snapshot, drains pending commands, then
//! waits (bounded) for one frame.  Shutdown order: stop and join the
//! acquisition thread with a bounded wait, then force the actuator to its
//! minimum duty.  The caller releases the PWM channel afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::app::events::StatusReport;
use crate::app::ports::{ActuatorPort, EventSink};
use crate::app::{AppCommand, AppEvent, FeederService};
use crate::camera::{FrameSource, JOIN_TIMEOUT};
use crate::config::ConfigStore;
use crate::error::{CameraError, Error};
use crate::fsm::StateId;

/// Cloneable stop flag shared with whatever decides the run is over.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopRequested,
    DurationElapsed,
    CameraLost,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub reason: ExitReason,
    pub runtime: Duration,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub final_state: StateId,
    pub final_pwm: f32,
    /// The acquisition thread exited within the join timeout.
    pub joined: bool,
}

pub struct ControlLoop {
    service: FeederService,
    store: Arc<ConfigStore>,
    commands: Option<Receiver<AppCommand>>,
    stop: StopHandle,
    duration: Option<Duration>,
}

impl ControlLoop {
    pub fn new(store: Arc<ConfigStore>, stop: StopHandle) -> Self {
        Self {
            service: FeederService::new(store.snapshot()),
            store,
            commands: None,
            stop,
            duration: None,
        }
    }

    pub fn with_commands(mut self, commands: Receiver<AppCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// End the run after `duration` of wall-clock time.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn service(&self) -> &FeederService {
        &self.service
    }

    /// Run until stopped, the duration elapses, or the camera is lost.
    pub fn run(
        &mut self,
        source: &mut FrameSource,
        hw: &mut impl ActuatorPort,
        sink: &mut impl EventSink,
    ) -> RunSummary {
        let started = Instant::now();
        self.service.start(started, sink);
        let mut next_status = self.status_interval().and_then(|d| started.checked_add(d));

        let reason = loop {
            if self.stop.is_stopped() {
                info!("stop requested");
                break ExitReason::StopRequested;
            }
            if self.duration.is_some_and(|d| started.elapsed() >= d) {
                info!("run duration elapsed");
                break ExitReason::DurationElapsed;
            }

            let config = self.store.snapshot();
            self.service.sync_config(&config);
            self.drain_commands(sink);

            let timeout = Duration::from_millis(config.hardware.camera.frame_timeout_ms);
            match source.next_frame(timeout) {
                Ok(frame) => {
                    let fps = source.measured_fps();
                    match self.service.process_frame(&frame, fps, Instant::now(), hw, sink) {
                        Ok(_) => {}
                        Err(Error::Actuator(e)) => error!("PWM write failed: {e}"),
                        Err(e) => debug!("frame #{} skipped: {e}", frame.sequence),
                    }
                }
                Err(CameraError::Timeout) => {
                    debug!("no frame within {}ms", timeout.as_millis());
                    if let Err(e) = self.service.idle_tick(source.measured_fps(), Instant::now(), hw, sink) {
                        error!("PWM write failed: {e}");
                    }
                }
                Err(e) => {
                    error!("frame source lost: {e}");
                    if let Err(e) = self.service.camera_lost(Instant::now(), hw, sink) {
                        error!("PWM write failed: {e}");
                    }
                    break ExitReason::CameraLost;
                }
            }

            let now = Instant::now();
            if next_status.is_some_and(|due| now >= due) {
                sink.emit(&AppEvent::Status(self.status_report(started, source.dropped_frames())));
                next_status = self.status_interval().and_then(|d| now.checked_add(d));
            }
        };

        // ── Shutdown ──────────────────────────────────────────
        let joined = source.stop(JOIN_TIMEOUT);
        if !joined {
            warn!("acquisition thread did not exit within {:?}", JOIN_TIMEOUT);
        }
        if let Err(e) = hw.emergency_stop() {
            error!("failed to drive PWM to minimum on shutdown: {e}");
        }

        let summary = RunSummary {
            reason,
            runtime: started.elapsed(),
            frames_processed: self.service.frames_processed(),
            frames_dropped: source.dropped_frames(),
            final_state: self.service.state(),
            final_pwm: hw.current_duty(),
            joined,
        };
        info!(
            "run finished ({:?}) after {:.1}s, {} frames processed, {} dropped",
            summary.reason,
            summary.runtime.as_secs_f64(),
            summary.frames_processed,
            summary.frames_dropped
        );
        summary
    }

    // ── Internal ──────────────────────────────────────────────

    fn drain_commands(&mut self, sink: &mut impl EventSink) {
        let Some(rx) = &self.commands else {
            return;
        };
        let pending: Vec<AppCommand> = rx.try_iter().collect();
        for cmd in pending {
            match cmd {
                // Routed through the store so the snapshot sync sees it.
                AppCommand::UpdateConfig(cfg) => match self.store.replace(*cfg) {
                    Ok(_) => info!("config update stored"),
                    Err(e) => warn!("config update rejected: {e}"),
                },
                other => {
                    if let Err(e) = self.service.handle_command(other, Instant::now(), sink) {
                        warn!("command rejected: {e}");
                    }
                }
            }
        }
    }

    /// `None` disables the periodic report.
    fn status_interval(&self) -> Option<Duration> {
        let secs = self.store.snapshot().logging.status_interval_secs;
        (secs > 0.0).then(|| Duration::try_from_secs_f64(secs).ok()).flatten()
    }

    fn status_report(&self, started: Instant, dropped: u64) -> StatusReport {
        let runtime = started.elapsed();
        let frames = self.service.frames_processed();
        let fv = self.service.last_features();
        let secs = runtime.as_secs_f64();
        StatusReport {
            runtime,
            frames_processed: frames,
            frames_dropped: dropped,
            processing_rate: if secs > 0.0 { (frames as f64 / secs) as f32 } else { 0.0 },
            state: self.service.state(),
            pwm: self.service.current_pwm(),
            h: self.service.last_activity(),
            rsi: fv.rsi,
            pop: fv.pop,
        }
    }
}
