//! Ripple spectral index (RSI): ratio of high-band to low-band spectral
//! energy of the ring ROI.
//!
//! Radial distance is measured from the centred DC bin and normalized by
//! the smaller half-dimension, so `1.0` is the edge of the inscribed
//! circle of the spectrum.

use image::GrayImage;
use rustfft::FftPlanner;
use rustfft::num_complex::Complex32;

use crate::config::RippleSpectralConfig;
use crate::error::VisionError;

pub struct RippleSpectrum {
    planner: FftPlanner<f32>,
    high_freq_start: f32,
    low_freq_end: f32,
    baseline: f32,
}

impl RippleSpectrum {
    pub fn new(config: &RippleSpectralConfig, baseline: f32) -> Self {
        Self {
            planner: FftPlanner::new(),
            high_freq_start: config.high_freq_start,
            low_freq_end: config.low_freq_end,
            baseline,
        }
    }

    pub fn index(&mut self, roi: &GrayImage) -> Result<f32, VisionError> {
        let (w, h) = roi.dimensions();
        if w < 2 || h < 2 {
            return Err(VisionError::RoiTooSmall {
                width: w,
                height: h,
            });
        }
        let (cols, rows) = (w as usize, h as usize);

        // Row transforms over the row-major buffer.
        let mut rowwise: Vec<Complex32> = roi
            .as_raw()
            .iter()
            .map(|&p| Complex32::new(f32::from(p), 0.0))
            .collect();
        self.planner.plan_fft_forward(cols).process(&mut rowwise);

        // Column transforms over the transposed buffer.
        let mut spectrum = vec![Complex32::new(0.0, 0.0); rows * cols];
        for r in 0..rows {
            for c in 0..cols {
                spectrum[c * rows + r] = rowwise[r * cols + c];
            }
        }
        self.planner.plan_fft_forward(rows).process(&mut spectrum);

        let center_r = (rows / 2) as f32;
        let center_c = (cols / 2) as f32;
        let max_distance = center_r.min(center_c);

        let mut high = 0f64;
        let mut low = 0f64;
        for c in 0..cols {
            // Position of this bin after centring the zero frequency.
            let dc = ((c + cols / 2) % cols) as f32 - center_c;
            for r in 0..rows {
                let dr = ((r + rows / 2) % rows) as f32 - center_r;
                let distance = (dc * dc + dr * dr).sqrt() / max_distance;
                let energy = f64::from(spectrum[c * rows + r].norm_sqr());
                if distance >= self.high_freq_start {
                    high += energy;
                }
                if distance <= self.low_freq_end {
                    low += energy;
                }
            }
        }

        if low <= 0.0 {
            return Ok(self.baseline);
        }
        let rsi = (high / low) as f32;
        if rsi.is_finite() {
            Ok(rsi)
        } else {
            Err(VisionError::NonFinite)
        }
    }
}
