//! Native webcam capture through `nokhwa`.

use image::{DynamicImage, RgbImage};
use log::{info, warn};
use nokhwa::Camera;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType};

use crate::config::CameraConfig;
use crate::error::CameraError;

use super::CameraPort;

pub struct NokhwaCamera {
    camera: Camera,
    streaming: bool,
}

impl NokhwaCamera {
    /// Open device `config.device_id` at the closest supported format.
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let index = CameraIndex::Index(config.device_id);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new_from(config.width, config.height, FrameFormat::MJPEG, config.fps),
        ));

        let mut camera = Camera::new(index, requested).map_err(|e| CameraError::OpenFailed(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        let format = camera.camera_format();
        info!(
            "Webcam {} streaming {}x{} @ {} fps",
            config.device_id,
            format.width(),
            format.height(),
            format.frame_rate()
        );
        Ok(Self {
            camera,
            streaming: true,
        })
    }
}

impl CameraPort for NokhwaCamera {
    fn read_frame(&mut self) -> Result<DynamicImage, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::ReadFailed(e.to_string()))?;
        let (w, h) = (decoded.width(), decoded.height());
        RgbImage::from_raw(w, h, decoded.into_raw())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| CameraError::ReadFailed("decoded buffer size mismatch".into()))
    }

    fn release(&mut self) {
        if self.streaming {
            if let Err(e) = self.camera.stop_stream() {
                warn!("Webcam stop_stream failed: {e}");
            }
            self.streaming = false;
        }
    }
}
