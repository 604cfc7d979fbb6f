//! Vision front end: frames, contrast normalization, ROI extraction.
//!
//! ```text
//!  Frame ──▶ gray ──▶ CLAHE ──▶ [histogram match] ──▶ ROI slices
//!                                                     ├─ roi_bub  (bubble pops)
//!                                                     └─ roi_ring (ripple / motion / flow)
//! ```

pub mod clahe;
pub mod frame;
pub mod histogram;
pub mod preprocess;

pub use frame::Frame;
pub use preprocess::{ImagePreprocessor, Preprocessed, Rois};
