//! Rolling frame-rate meter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Width of the averaging window.
pub const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Counts frame arrivals over the last [`FPS_WINDOW`].
///
/// Before a full window has elapsed since the first frame, the rate is
/// estimated from the spacing of the frames seen so far.
#[derive(Debug, Clone, Default)]
pub struct FpsMeter {
    stamps: VecDeque<Instant>,
    first: Option<Instant>,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at: Instant) {
        self.first.get_or_insert(at);
        self.stamps.push_back(at);
        self.evict(at);
    }

    /// Frames per second as of `now`.  Zero when frames stopped arriving.
    pub fn fps(&self, now: Instant) -> f32 {
        let in_window: Vec<&Instant> = self
            .stamps
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < FPS_WINDOW)
            .collect();
        let Some(first) = self.first else { return 0.0 };

        if now.saturating_duration_since(first) >= FPS_WINDOW {
            return in_window.len() as f32 / FPS_WINDOW.as_secs_f32();
        }
        match (in_window.first(), in_window.last()) {
            (Some(&&a), Some(&&b)) if in_window.len() >= 2 && b > a => {
                (in_window.len() - 1) as f32 / b.duration_since(a).as_secs_f32()
            }
            _ => 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.stamps.clear();
        self.first = None;
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.stamps.front() {
            if now.saturating_duration_since(oldest) < FPS_WINDOW {
                break;
            }
            self.stamps.pop_front();
        }
    }
}
