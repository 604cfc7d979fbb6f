//! Frame normalization and ROI slicing.

use image::{GenericImageView, GrayImage, SubImage, imageops};
use log::{info, warn};

use crate::config::{RoiRect, VisionConfig};
use crate::error::VisionError;

use super::clahe::Clahe;
use super::frame::Frame;
use super::histogram::HistogramMatcher;

/// Contrast-normalized frame plus the two ROI rectangles, already clamped
/// to its bounds.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    image: GrayImage,
    bubble: RoiRect,
    ring: RoiRect,
}

/// Borrowed sub-views into a [`Preprocessed`] image.
pub struct Rois<'a> {
    pub bubble: SubImage<&'a GrayImage>,
    pub ring: SubImage<&'a GrayImage>,
}

impl Preprocessed {
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn bubble_rect(&self) -> RoiRect {
        self.bubble
    }

    pub fn ring_rect(&self) -> RoiRect {
        self.ring
    }

    pub fn rois(&self) -> Rois<'_> {
        Rois {
            bubble: imageops::crop_imm(
                &self.image,
                self.bubble.x,
                self.bubble.y,
                self.bubble.width,
                self.bubble.height,
            ),
            ring: imageops::crop_imm(
                &self.image,
                self.ring.x,
                self.ring.y,
                self.ring.width,
                self.ring.height,
            ),
        }
    }
}

/// Grayscale conversion, CLAHE, optional histogram matching, ROI slicing.
///
/// Stateless between frames apart from the reference histogram, which is
/// loaded once at construction.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    clahe: Clahe,
    matcher: Option<HistogramMatcher>,
    bubble: RoiRect,
    ring: RoiRect,
}

impl ImagePreprocessor {
    /// Build from config.  A reference image that cannot be loaded disables
    /// histogram matching with a warning rather than failing startup.
    pub fn new(config: &VisionConfig) -> Self {
        let hm = &config.preprocessing.histogram_matching;
        let matcher = match (&hm.enable, &hm.reference_image_path) {
            (true, Some(path)) => match HistogramMatcher::load(path) {
                Ok(m) => {
                    info!("Histogram matching against {}", path.display());
                    Some(m)
                }
                Err(e) => {
                    warn!("Histogram matching disabled: {e}");
                    None
                }
            },
            (true, None) => {
                warn!("Histogram matching enabled without reference_image_path; disabled");
                None
            }
            _ => None,
        };

        Self {
            clahe: Clahe::from_config(&config.preprocessing.clahe),
            matcher,
            bubble: config.roi_config.roi_bub,
            ring: config.roi_config.roi_ring,
        }
    }

    /// Replace the reference distribution (e.g. a freshly captured tank shot).
    pub fn with_matcher(mut self, matcher: HistogramMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn matching_enabled(&self) -> bool {
        self.matcher.is_some()
    }

    pub fn process(&self, frame: &Frame) -> Result<Preprocessed, VisionError> {
        let gray = frame.to_gray();
        let (w, h) = gray.dimensions();
        if w == 0 || h == 0 {
            return Err(VisionError::EmptyRoi);
        }

        let mut image = self.clahe.apply(&gray);
        if let Some(matcher) = &self.matcher {
            image = matcher.apply(&image);
        }

        Ok(Preprocessed {
            bubble: self.bubble.clamp_to(w, h),
            ring: self.ring.clamp_to(w, h),
            image,
        })
    }
}

/// Copy a ROI view into an owned buffer for the feature math.
pub fn roi_to_image(view: &SubImage<&GrayImage>) -> GrayImage {
    let (w, h) = view.dimensions();
    GrayImage::from_fn(w, h, |x, y| view.get_pixel(x, y))
}
