//! Motion energy (ME): share of ring-ROI pixels that changed between the
//! two most recent frames, in percent.

use heapless::Deque;
use image::GrayImage;

use crate::error::VisionError;

use super::MAX_TEMPORAL_WINDOW;

pub struct MotionEnergy {
    frames: Deque<GrayImage, MAX_TEMPORAL_WINDOW>,
    window: usize,
    threshold: u8,
    baseline: f32,
}

impl MotionEnergy {
    /// `window` is clamped to `2..=MAX_TEMPORAL_WINDOW`.
    pub fn new(window: usize, threshold: u8, baseline: f32) -> Self {
        Self {
            frames: Deque::new(),
            window: window.clamp(2, MAX_TEMPORAL_WINDOW),
            threshold,
            baseline,
        }
    }

    /// Buffer `roi` and score it against the previous frame.
    ///
    /// Returns the baseline while fewer than two frames are buffered.
    pub fn update(&mut self, roi: GrayImage) -> Result<f32, VisionError> {
        if self.frames.len() >= self.window {
            self.frames.pop_front();
        }
        if self.frames.push_back(roi).is_err() {
            return Err(VisionError::DimensionMismatch);
        }

        let mut recent = self.frames.iter().rev();
        let (Some(current), Some(previous)) = (recent.next(), recent.next()) else {
            return Ok(self.baseline);
        };

        if current.dimensions() != previous.dimensions() {
            // ROI geometry changed; restart history from the newest frame.
            while self.frames.len() > 1 {
                self.frames.pop_front();
            }
            return Err(VisionError::DimensionMismatch);
        }

        let total = current.as_raw().len();
        if total == 0 {
            return Err(VisionError::EmptyRoi);
        }
        let lit = current
            .as_raw()
            .iter()
            .zip(previous.as_raw())
            .filter(|&(&a, &b)| a.abs_diff(b) > self.threshold)
            .count();

        Ok(lit as f32 / total as f32 * 100.0)
    }

    pub fn buffered(&self) -> usize {
        self.frames.len()
    }

    pub fn reset(&mut self) {
        self.frames.clear();
    }
}
