//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by rendering structured application events as
//! one-line `log` records.  Per-cycle and per-frame events go to `debug`
//! so the console stays readable at the default level.

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | initial_state={}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from, to);
            }
            AppEvent::Features(fv) => {
                debug!(
                    "FEAT  | RSI={:.4} POP={:.4} FLOW={:.4} ME={:.4}",
                    fv.rsi, fv.pop, fv.flow, fv.me
                );
            }
            AppEvent::Cycle(c) => {
                debug!("CYCLE | state={} pwm={:.2}% H={:.4}", c.state, c.pwm, c.h);
            }
            AppEvent::AnomalyDetected(flags) => {
                warn!("ANOMALY | detected, flags=0b{:08b}", flags);
            }
            AppEvent::AnomalyCleared => {
                info!("ANOMALY | all cleared");
            }
            AppEvent::EvaluationExtended { t_eval } => {
                info!("TIMING | t_eval extended to {:.2}s", t_eval);
            }
            AppEvent::ControllerReset => {
                info!("PI | integral reset");
            }
            AppEvent::VisionReset => {
                info!("VISION | feature history cleared");
            }
            AppEvent::ConfigApplied => {
                info!("CONFIG | new snapshot applied");
            }
            AppEvent::Status(s) => {
                info!(
                    "STATUS | runtime={:.1}s | frames={} ({:.1}/s, dropped {}) | state={} | \
                     pwm={:.1}% | H={:.3} | RSI={:.3} POP={:.3}",
                    s.runtime.as_secs_f64(),
                    s.frames_processed,
                    s.processing_rate,
                    s.frames_dropped,
                    s.state,
                    s.pwm,
                    s.h,
                    s.rsi,
                    s.pop,
                );
            }
        }
    }
}
