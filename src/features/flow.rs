//! Optical-flow inconsistency (FLOW).
//!
//! Pyramidal Lucas-Kanade on a regular grid of points across the ring ROI,
//! between the previous ring frame and the current one.  FLOW is the
//! population standard deviation of the tracked flow magnitudes: calm
//! water drifts coherently, feeding fish stir it in all directions.

use image::GrayImage;

use crate::config::OpticalFlowConfig;
use crate::error::VisionError;

const MAX_ITERATIONS: usize = 10;
const CONVERGENCE_EPS: f32 = 0.01;
/// Minimum eigenvalue of the per-pixel structure tensor for a trackable window.
const MIN_EIGEN: f32 = 1e-2;

pub struct FlowTracker {
    previous: Option<GrayImage>,
    levels: u32,
    half_window: i32,
    grid_step: u32,
}

impl FlowTracker {
    pub fn new(config: &OpticalFlowConfig) -> Self {
        Self {
            previous: None,
            levels: config.pyramid_levels.max(1),
            half_window: (config.window_size / 2).max(1) as i32,
            grid_step: config.grid_step.max(1),
        }
    }

    /// Score `roi` against the previously seen ring frame, then keep it as
    /// the new reference.  The first frame scores 0.
    pub fn inconsistency(&mut self, roi: &GrayImage) -> Result<f32, VisionError> {
        let Some(previous) = self.previous.replace(roi.clone()) else {
            return Ok(0.0);
        };
        if previous.dimensions() != roi.dimensions() {
            return Err(VisionError::DimensionMismatch);
        }
        let flows = self.track_grid(&previous, roi)?;
        Ok(magnitude_std(&flows))
    }

    /// Flow vectors for every trackable grid point.
    pub fn track_grid(
        &self,
        previous: &GrayImage,
        next: &GrayImage,
    ) -> Result<Vec<(f32, f32)>, VisionError> {
        let (w, h) = previous.dimensions();
        let window = (2 * self.half_window + 1) as u32;
        if w < window || h < window {
            return Err(VisionError::RoiTooSmall {
                width: w,
                height: h,
            });
        }

        let prev_pyr = pyramid(previous, self.levels, window);
        let next_pyr = pyramid(next, self.levels, window);

        let margin = self.half_window as u32 + 1;
        let mut flows = Vec::new();
        for y in (margin..h - margin).step_by(self.grid_step as usize) {
            for x in (margin..w - margin).step_by(self.grid_step as usize) {
                if let Some(v) = self.track_point(&prev_pyr, &next_pyr, x as f32, y as f32) {
                    flows.push(v);
                }
            }
        }
        Ok(flows)
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    fn track_point(
        &self,
        prev_pyr: &[Plane],
        next_pyr: &[Plane],
        x: f32,
        y: f32,
    ) -> Option<(f32, f32)> {
        let hw = self.half_window;
        let n = ((2 * hw + 1) * (2 * hw + 1)) as f32;
        let mut guess = (0.0f32, 0.0f32);

        for level in (0..prev_pyr.len()).rev() {
            let scale = (1u32 << level) as f32;
            let (px, py) = (x / scale, y / scale);
            let prev = &prev_pyr[level];
            let next = &next_pyr[level];

            let mut gxx = 0.0f32;
            let mut gxy = 0.0f32;
            let mut gyy = 0.0f32;
            for dy in -hw..=hw {
                for dx in -hw..=hw {
                    let (sx, sy) = (px + dx as f32, py + dy as f32);
                    let (ix, iy) = prev.gradient(sx, sy);
                    gxx += ix * ix;
                    gxy += ix * iy;
                    gyy += iy * iy;
                }
            }
            let det = gxx * gyy - gxy * gxy;
            let trace = gxx + gyy;
            let min_eig = (trace - ((gxx - gyy).powi(2) + 4.0 * gxy * gxy).sqrt()) / 2.0;
            if min_eig / n < MIN_EIGEN || det.abs() < f32::EPSILON {
                return None;
            }

            let mut v = (0.0f32, 0.0f32);
            for _ in 0..MAX_ITERATIONS {
                let mut bx = 0.0f32;
                let mut by = 0.0f32;
                for dy in -hw..=hw {
                    for dx in -hw..=hw {
                        let (sx, sy) = (px + dx as f32, py + dy as f32);
                        let (ix, iy) = prev.gradient(sx, sy);
                        let diff = prev.sample(sx, sy)
                            - next.sample(sx + guess.0 + v.0, sy + guess.1 + v.1);
                        bx += diff * ix;
                        by += diff * iy;
                    }
                }
                let eta_x = (gyy * bx - gxy * by) / det;
                let eta_y = (gxx * by - gxy * bx) / det;
                v.0 += eta_x;
                v.1 += eta_y;
                if eta_x.abs() < CONVERGENCE_EPS && eta_y.abs() < CONVERGENCE_EPS {
                    break;
                }
            }

            guess = (guess.0 + v.0, guess.1 + v.1);
            if level > 0 {
                guess = (guess.0 * 2.0, guess.1 * 2.0);
            }
        }

        (guess.0.is_finite() && guess.1.is_finite()).then_some(guess)
    }
}

/// Population standard deviation of the vector magnitudes.
pub fn magnitude_std(flows: &[(f32, f32)]) -> f32 {
    if flows.len() < 2 {
        return 0.0;
    }
    let mags: Vec<f32> = flows.iter().map(|(u, v)| (u * u + v * v).sqrt()).collect();
    let mean = mags.iter().sum::<f32>() / mags.len() as f32;
    let var = mags.iter().map(|m| (m - mean).powi(2)).sum::<f32>() / mags.len() as f32;
    var.sqrt()
}

// ---------------------------------------------------------------------------
// Float image plane with clamped bilinear sampling
// ---------------------------------------------------------------------------

struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_gray(img: &GrayImage) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.as_raw().iter().map(|&p| f32::from(p)).collect(),
        }
    }

    /// Half-resolution plane, each pixel the mean of a 2x2 block.
    fn downsample(&self) -> Self {
        let width = self.width / 2;
        let height = self.height / 2;
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let (sx, sy) = (2 * x, 2 * y);
                let sum = self.at(sx, sy) + self.at(sx + 1, sy) + self.at(sx, sy + 1) + self.at(sx + 1, sy + 1);
                data.push(sum / 4.0);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y.min(self.height - 1) * self.width + x.min(self.width - 1)]
    }

    fn sample(&self, x: f32, y: f32) -> f32 {
        let x = x.clamp(0.0, (self.width - 1) as f32);
        let y = y.clamp(0.0, (self.height - 1) as f32);
        let (x0, y0) = (x.floor() as usize, y.floor() as usize);
        let (fx, fy) = (x - x0 as f32, y - y0 as f32);
        let top = self.at(x0, y0) * (1.0 - fx) + self.at(x0 + 1, y0) * fx;
        let bottom = self.at(x0, y0 + 1) * (1.0 - fx) + self.at(x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    fn gradient(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (self.sample(x + 1.0, y) - self.sample(x - 1.0, y)) / 2.0,
            (self.sample(x, y + 1.0) - self.sample(x, y - 1.0)) / 2.0,
        )
    }
}

/// Level 0 is full resolution.  Stops early once a level would be smaller
/// than one tracking window.
fn pyramid(img: &GrayImage, levels: u32, window: u32) -> Vec<Plane> {
    let mut out = vec![Plane::from_gray(img)];
    while out.len() < levels as usize {
        let Some(last) = out.last() else { break };
        if last.width / 2 < window as usize || last.height / 2 < window as usize {
            break;
        }
        let next = last.downsample();
        out.push(next);
    }
    out
}
