//! Procedural tank scene for simulation runs.
//!
//! Renders expanding surface ripples around the feed point plus a handful
//! of bright round bubbles whose count follows the configured activity.
//! Frames are paced to the requested rate.

use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use image::{DynamicImage, GrayImage, Luma};

use crate::config::CameraConfig;
use crate::error::CameraError;

use super::CameraPort;

const MAX_BUBBLES: u32 = 12;
const BUBBLE_RADIUS: i64 = 6;

pub struct SyntheticCamera {
    width: u32,
    height: u32,
    interval: Duration,
    next_due: Option<Instant>,
    frame: u64,
    activity: f32,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width: width.max(16),
            height: height.max(16),
            interval: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
            next_due: None,
            frame: 0,
            activity: 0.5,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Result<Self, CameraError> {
        if config.width == 0 || config.height == 0 {
            return Err(CameraError::OpenFailed("zero-sized synthetic frame".into()));
        }
        Ok(Self::new(config.width, config.height, config.fps))
    }

    /// Scene activity in `[0, 1]`: ripple amplitude and bubble count.
    pub fn with_activity(mut self, activity: f32) -> Self {
        self.activity = activity.clamp(0.0, 1.0);
        self
    }

    /// Render frame number `n` without pacing.
    pub fn render(&self, n: u64) -> GrayImage {
        let (w, h) = (self.width, self.height);
        let (cx, cy) = (w as f32 / 2.0, h as f32 / 2.0);
        let phase = n as f32 * 0.35;
        let amplitude = 10.0 + 40.0 * self.activity;
        let wavelength = (w.min(h) as f32 / 24.0).max(4.0);

        let bubbles: Vec<(i64, i64)> = (0..(self.activity * MAX_BUBBLES as f32).round() as u32)
            .map(|i| {
                let seed = scramble(n.wrapping_mul(31).wrapping_add(u64::from(i)));
                let bx = (seed % u64::from(w)) as i64;
                let by = ((seed >> 32) % u64::from(h)) as i64;
                (bx, by)
            })
            .collect();

        GrayImage::from_fn(w, h, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let r = (dx * dx + dy * dy).sqrt();
            let ripple = (TAU * r / wavelength - phase).sin() * amplitude * (-r / (w as f32)).exp();
            let shade = 90.0 + 30.0 * (y as f32 / h as f32) + ripple;

            let in_bubble = bubbles.iter().any(|&(bx, by)| {
                let ddx = i64::from(x) - bx;
                let ddy = i64::from(y) - by;
                ddx * ddx + ddy * ddy <= BUBBLE_RADIUS * BUBBLE_RADIUS
            });
            let v = if in_bubble { 235.0 } else { shade };
            Luma([v.clamp(0.0, 255.0) as u8])
        })
    }
}

impl CameraPort for SyntheticCamera {
    fn read_frame(&mut self) -> Result<DynamicImage, CameraError> {
        let now = Instant::now();
        let due = *self.next_due.get_or_insert(now);
        if due > now {
            thread::sleep(due - now);
        }
        self.next_due = Some(due.max(now) + self.interval);

        self.frame += 1;
        Ok(DynamicImage::ImageLuma8(self.render(self.frame)))
    }
}

/// 64-bit mix (splitmix64 finalizer) for repeatable bubble placement.
fn scramble(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
