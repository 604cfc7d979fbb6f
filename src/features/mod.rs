//! Behavioral feature extraction from the two ROIs.
//!
//! | Feature | ROI  | Meaning                                   | Fallback |
//! |---------|------|-------------------------------------------|----------|
//! | ME      | ring | % of pixels changed since last frame      | `ME0`    |
//! | RSI     | ring | high/low spectral energy ratio            | `RSI0`   |
//! | POP     | bub  | round bubble contours, scaled to per-second | 0      |
//! | FLOW    | ring | std-dev of optical-flow magnitudes        | 0        |
//!
//! Each calculator returns a `Result`; [`FeatureExtractor`] decides the
//! fallback and logs it, so a failed transform never aborts the cycle.

pub mod bubble;
pub mod flow;
pub mod motion;
pub mod ripple;

use log::{info, warn};
use serde::Serialize;

use crate::config::{BaselineConfig, FeatureExtractionConfig};
use crate::vision::Rois;
use crate::vision::preprocess::roi_to_image;

use bubble::BubbleDetector;
use flow::FlowTracker;
use motion::MotionEnergy;
use ripple::RippleSpectrum;

/// Upper bound on the motion-energy ring buffer.
pub const MAX_TEMPORAL_WINDOW: usize = 16;

/// Per-frame feature values.  All fields are finite and non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FeatureVector {
    #[serde(rename = "ME")]
    pub me: f32,
    #[serde(rename = "RSI")]
    pub rsi: f32,
    #[serde(rename = "POP")]
    pub pop: f32,
    #[serde(rename = "FLOW")]
    pub flow: f32,
}

impl FeatureVector {
    /// Motion energy of the ring ROI (the only motion measured).
    pub fn me_ring(&self) -> f32 {
        self.me
    }

    /// Observation channel layout: `[RSI, POP, FLOW, ME_ring, ME]`.
    pub fn channel(&self) -> [f32; 5] {
        [self.rsi, self.pop, self.flow, self.me_ring(), self.me]
    }

    fn sanitized(self) -> Self {
        let clean = |v: f32| if v.is_finite() { v.max(0.0) } else { 0.0 };
        Self {
            me: clean(self.me),
            rsi: clean(self.rsi),
            pop: clean(self.pop),
            flow: clean(self.flow),
        }
    }
}

/// Owns the motion ring buffer and the optical-flow previous frame.
pub struct FeatureExtractor {
    motion: MotionEnergy,
    ripple: RippleSpectrum,
    bubbles: BubbleDetector,
    flow: FlowTracker,
    baseline: BaselineConfig,
}

impl FeatureExtractor {
    pub fn new(config: &FeatureExtractionConfig, baseline: &BaselineConfig) -> Self {
        Self {
            motion: MotionEnergy::new(
                config.motion_energy.temporal_window,
                config.motion_energy.threshold,
                baseline.me0,
            ),
            ripple: RippleSpectrum::new(&config.ripple_spectral, baseline.rsi0),
            bubbles: BubbleDetector::new(&config.bubble_pop),
            flow: FlowTracker::new(&config.optical_flow),
            baseline: baseline.clone(),
        }
    }

    pub fn extract(&mut self, rois: &Rois<'_>) -> FeatureVector {
        let ring = roi_to_image(&rois.ring);
        let bub = roi_to_image(&rois.bubble);

        let rsi = self.ripple.index(&ring).unwrap_or_else(|e| {
            warn!("RSI extraction failed: {e}; using baseline");
            self.baseline.rsi0
        });
        let pop = self.bubbles.pop_rate(&bub).unwrap_or_else(|e| {
            warn!("POP extraction failed: {e}; using 0");
            0.0
        });
        let flow = self.flow.inconsistency(&ring).unwrap_or_else(|e| {
            warn!("FLOW extraction failed: {e}; using 0");
            0.0
        });
        let me = self.motion.update(ring).unwrap_or_else(|e| {
            warn!("ME extraction failed: {e}; using baseline");
            self.baseline.me0
        });

        FeatureVector { me, rsi, pop, flow }.sanitized()
    }

    /// Drop buffered history, e.g. after the camera reconnects.
    pub fn reset(&mut self) {
        self.motion.reset();
        self.flow.reset();
        info!("Feature buffers reset");
    }

    pub fn buffered_frames(&self) -> usize {
        self.motion.buffered()
    }
}
