//! Captured frames and ROI geometry.

use std::time::Instant;

use image::{DynamicImage, GrayImage};

use crate::config::RoiRect;

/// One image from the camera, stamped at capture time.
///
/// Owned by the acquisition thread until it is pushed into the frame queue;
/// the control thread takes ownership on dequeue and drops it after one
/// pipeline pass.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: DynamicImage,
    pub captured_at: Instant,
    /// Monotonic capture counter, starting at 1.
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: DynamicImage, captured_at: Instant, sequence: u64) -> Self {
        Self {
            image,
            captured_at,
            sequence,
        }
    }

    /// Single-channel intensity copy of the frame.
    pub fn to_gray(&self) -> GrayImage {
        self.image.to_luma8()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

impl RoiRect {
    /// Fit the rectangle inside a `width` x `height` image.
    ///
    /// Oversized rectangles shrink to the image; rectangles hanging off the
    /// right or bottom edge slide back inside, keeping their size.
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        let w = self.width.min(width);
        let h = self.height.min(height);
        Self {
            x: self.x.min(width - w),
            y: self.y.min(height - h),
            width: w,
            height: h,
        }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}
