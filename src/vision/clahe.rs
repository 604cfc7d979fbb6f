//! Contrast-limited adaptive histogram equalization.
//!
//! The image is split into a grid of tiles.  Each tile gets its own
//! equalization table, built from a histogram whose bins are capped at
//! `clip_limit x (tile pixels / 256)` with the clipped excess spread back
//! over all bins.  Output pixels blend the tables of the four nearest tile
//! centres bilinearly so tile seams do not show.

use image::{GrayImage, Luma};

use crate::config::ClaheConfig;

const BINS: usize = 256;

#[derive(Debug, Clone)]
pub struct Clahe {
    clip_limit: f32,
    grid_x: u32,
    grid_y: u32,
}

impl Clahe {
    pub fn new(clip_limit: f32, grid_x: u32, grid_y: u32) -> Self {
        Self {
            clip_limit,
            grid_x: grid_x.max(1),
            grid_y: grid_y.max(1),
        }
    }

    pub fn from_config(config: &ClaheConfig) -> Self {
        Self::new(
            config.clip_limit,
            config.tile_grid_size[0],
            config.tile_grid_size[1],
        )
    }

    pub fn apply(&self, img: &GrayImage) -> GrayImage {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return img.clone();
        }
        let gx = self.grid_x.min(w);
        let gy = self.grid_y.min(h);

        let x_bounds: Vec<u32> = (0..=gx).map(|i| i * w / gx).collect();
        let y_bounds: Vec<u32> = (0..=gy).map(|i| i * h / gy).collect();

        let mut luts = Vec::with_capacity((gx * gy) as usize);
        for ty in 0..gy as usize {
            for tx in 0..gx as usize {
                let mut hist = [0u32; BINS];
                for y in y_bounds[ty]..y_bounds[ty + 1] {
                    for x in x_bounds[tx]..x_bounds[tx + 1] {
                        hist[img.get_pixel(x, y)[0] as usize] += 1;
                    }
                }
                let area = (x_bounds[tx + 1] - x_bounds[tx]) * (y_bounds[ty + 1] - y_bounds[ty]);
                let limit = ((self.clip_limit * area as f32 / BINS as f32) as u32).max(1);
                clip_histogram(&mut hist, limit);
                luts.push(equalization_lut(&hist, area));
            }
        }

        let tile_w = w as f32 / gx as f32;
        let tile_h = h as f32 / gy as f32;
        let last_x = i64::from(gx) - 1;
        let last_y = i64::from(gy) - 1;

        GrayImage::from_fn(w, h, |x, y| {
            let fy = (y as f32 + 0.5) / tile_h - 0.5;
            let y0 = fy.floor();
            let wy = fy - y0;
            let ty0 = (y0 as i64).clamp(0, last_y) as usize;
            let ty1 = (y0 as i64 + 1).clamp(0, last_y) as usize;

            let fx = (x as f32 + 0.5) / tile_w - 0.5;
            let x0 = fx.floor();
            let wx = fx - x0;
            let tx0 = (x0 as i64).clamp(0, last_x) as usize;
            let tx1 = (x0 as i64 + 1).clamp(0, last_x) as usize;

            let v = img.get_pixel(x, y)[0] as usize;
            let at = |tx: usize, ty: usize| f32::from(luts[ty * gx as usize + tx][v]);

            let top = at(tx0, ty0) * (1.0 - wx) + at(tx1, ty0) * wx;
            let bottom = at(tx0, ty1) * (1.0 - wx) + at(tx1, ty1) * wx;
            Luma([(top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8])
        })
    }
}

/// Cap every bin at `limit` and redistribute the excess evenly.
/// The total count is preserved.
pub(crate) fn clip_histogram(hist: &mut [u32; BINS], limit: u32) {
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }

    let per_bin = excess / BINS as u32;
    let residual = (excess % BINS as u32) as usize;
    for bin in hist.iter_mut() {
        *bin += per_bin;
    }
    if residual > 0 {
        let step = (BINS / residual).max(1);
        for bin in hist.iter_mut().step_by(step).take(residual) {
            *bin += 1;
        }
    }
}

fn equalization_lut(hist: &[u32; BINS], area: u32) -> [u8; BINS] {
    let mut lut = [0u8; BINS];
    let scale = 255.0 / area.max(1) as f32;
    let mut cdf = 0u32;
    for (slot, &count) in lut.iter_mut().zip(hist.iter()) {
        cdf += count;
        *slot = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}
