//! Histogram matching against a stored reference distribution.
//!
//! Used to pull frames from a differently lit tank into the intensity
//! domain the feature thresholds were calibrated on.

use std::path::Path;

use image::{GrayImage, Luma};
use imageproc::map::map_colors;
use imageproc::stats::cumulative_histogram;

use crate::error::VisionError;

const BINS: usize = 256;

/// Normalized cumulative intensity distribution of the reference image.
#[derive(Debug, Clone)]
pub struct HistogramMatcher {
    reference_cdf: [f64; BINS],
}

impl HistogramMatcher {
    pub fn from_reference(reference: &GrayImage) -> Result<Self, VisionError> {
        if reference.width() == 0 || reference.height() == 0 {
            return Err(VisionError::EmptyRoi);
        }
        Ok(Self {
            reference_cdf: normalized_cdf(reference),
        })
    }

    pub fn load(path: &Path) -> Result<Self, VisionError> {
        let img = image::open(path)
            .map_err(|e| VisionError::ReferenceImage(format!("{}: {e}", path.display())))?;
        Self::from_reference(&img.to_luma8())
    }

    /// Lookup table mapping input intensities to reference intensities.
    ///
    /// Each input level maps to the first reference level whose CDF value is
    /// closest.  Both CDFs are non-decreasing, so the table is monotonic.
    pub fn lut_for(&self, img: &GrayImage) -> [u8; BINS] {
        let input_cdf = normalized_cdf(img);
        let mut lut = [0u8; BINS];
        for (slot, &target) in lut.iter_mut().zip(input_cdf.iter()) {
            let mut best = 0usize;
            let mut best_diff = f64::INFINITY;
            for (j, &r) in self.reference_cdf.iter().enumerate() {
                let diff = (r - target).abs();
                if diff < best_diff {
                    best = j;
                    best_diff = diff;
                }
            }
            *slot = best as u8;
        }
        lut
    }

    pub fn apply(&self, img: &GrayImage) -> GrayImage {
        let lut = self.lut_for(img);
        map_colors(img, |p| Luma([lut[p[0] as usize]]))
    }
}

fn normalized_cdf(img: &GrayImage) -> [f64; BINS] {
    let counts = &cumulative_histogram(img).channels[0];
    let total = f64::from(counts[BINS - 1].max(1));
    let mut cdf = [0f64; BINS];
    for (slot, &acc) in cdf.iter_mut().zip(counts.iter()) {
        *slot = f64::from(acc) / total;
    }
    cdf
}
