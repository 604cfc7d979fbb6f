//! Bubble pop-event rate (POP) from the bubble ROI.
//!
//! Blur, gaussian adaptive threshold, morphological opening, then every
//! outer contour whose area and circularity fall in the configured window
//! counts as one bubble.

use std::f32::consts::PI;

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::open;
use imageproc::point::Point;

use crate::config::BubblePopConfig;
use crate::error::VisionError;

/// Sigma equivalent to a 5x5 Gaussian kernel.
const PRE_BLUR_SIGMA: f32 = 1.1;
/// Sigma equivalent to an 11x11 adaptive-threshold block.
const BLOCK_SIGMA: f32 = 2.0;
/// Offset subtracted from the local mean.
const THRESHOLD_OFFSET: i16 = 2;

#[derive(Debug, Clone)]
pub struct BubbleDetector {
    min_area: f32,
    max_area: f32,
    circularity_threshold: f32,
    assumed_fps: f32,
}

impl BubbleDetector {
    pub fn new(config: &BubblePopConfig) -> Self {
        Self {
            min_area: config.min_area,
            max_area: config.max_area,
            circularity_threshold: config.circularity_threshold,
            assumed_fps: config.assumed_fps,
        }
    }

    /// Bubbles per second.
    ///
    /// Scales the per-frame count by a fixed assumed capture rate rather
    /// than the measured one; POP thresholds were calibrated against this
    /// scaling.
    pub fn pop_rate(&self, roi: &GrayImage) -> Result<f32, VisionError> {
        let count = self.count(roi)?;
        Ok(count as f32 * self.assumed_fps / 1000.0)
    }

    pub fn count(&self, roi: &GrayImage) -> Result<usize, VisionError> {
        let (w, h) = roi.dimensions();
        if w == 0 || h == 0 {
            return Err(VisionError::EmptyRoi);
        }

        let binary = adaptive_threshold(&gaussian_blur_f32(roi, PRE_BLUR_SIGMA));
        let opened = open(&binary, Norm::L1, 1);

        let count = find_contours::<i32>(&opened)
            .iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .filter(|c| self.is_bubble(&c.points))
            .count();
        Ok(count)
    }

    fn is_bubble(&self, points: &[Point<i32>]) -> bool {
        let area = polygon_area(points);
        if area < self.min_area || area > self.max_area {
            return false;
        }
        let perimeter = closed_perimeter(points);
        perimeter > 0.0 && circularity(area, perimeter) >= self.circularity_threshold
    }
}

/// Pixel is foreground when brighter than its gaussian-weighted
/// neighbourhood mean minus a small offset.
fn adaptive_threshold(img: &GrayImage) -> GrayImage {
    let mean = gaussian_blur_f32(img, BLOCK_SIGMA);
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let v = i16::from(img.get_pixel(x, y)[0]);
        let m = i16::from(mean.get_pixel(x, y)[0]);
        Luma([if v > m - THRESHOLD_OFFSET { 255 } else { 0 }])
    })
}

/// Shoelace area of the closed polygon through `points`.
pub(crate) fn polygon_area(points: &[Point<i32>]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    (twice.abs() as f32) / 2.0
}

pub(crate) fn closed_perimeter(points: &[Point<i32>]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| {
            let dx = (a.x - b.x) as f32;
            let dy = (a.y - b.y) as f32;
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// `4 pi A / P^2`: 1.0 for a circle, lower for elongated shapes.
pub(crate) fn circularity(area: f32, perimeter: f32) -> f32 {
    4.0 * PI * area / (perimeter * perimeter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: i32) -> Vec<Point<i32>> {
        vec![
            Point::new(0, 0),
            Point::new(side, 0),
            Point::new(side, side),
            Point::new(0, side),
        ]
    }

    fn scene(centres: &[(i32, i32)], radius: i32) -> GrayImage {
        GrayImage::from_fn(160, 120, |x, y| {
            let inside = centres.iter().any(|&(cx, cy)| {
                let dx = x as i32 - cx;
                let dy = y as i32 - cy;
                dx * dx + dy * dy <= radius * radius
            });
            Luma([if inside { 220 } else { 20 }])
        })
    }

    #[test]
    fn shoelace_and_perimeter_of_square() {
        let sq = square(10);
        assert!((polygon_area(&sq) - 100.0).abs() < 1e-4);
        assert!((closed_perimeter(&sq) - 40.0).abs() < 1e-4);
        // A square is less round than a circle.
        let c = circularity(100.0, 40.0);
        assert!((c - PI / 4.0).abs() < 1e-4);
    }

    #[test]
    fn degenerate_contours_have_no_area() {
        assert!(polygon_area(&[Point::new(3, 3)]).abs() < f32::EPSILON);
        assert!(closed_perimeter(&[Point::new(3, 3)]).abs() < f32::EPSILON);
    }

    #[test]
    fn flat_water_has_no_bubbles() {
        let det = BubbleDetector::new(&BubblePopConfig::default());
        let img = GrayImage::from_pixel(160, 120, Luma([90]));
        assert_eq!(det.count(&img).unwrap(), 0);
        assert!(det.pop_rate(&img).unwrap().abs() < f32::EPSILON);
    }

    #[test]
    fn isolated_round_blobs_are_counted() {
        let det = BubbleDetector::new(&BubblePopConfig::default());
        let img = scene(&[(30, 30), (80, 60), (130, 90)], 7);
        assert_eq!(det.count(&img).unwrap(), 3);
        assert!((det.pop_rate(&img).unwrap() - 0.09).abs() < 1e-5);
    }

    #[test]
    fn blobs_outside_area_window_are_ignored() {
        let det = BubbleDetector::new(&BubblePopConfig::default());
        // radius 2 -> area well under min_area
        let img = scene(&[(30, 30), (80, 60)], 2);
        assert_eq!(det.count(&img).unwrap(), 0);
    }
}
