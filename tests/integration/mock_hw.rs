//! Mock hardware adapters for integration tests.
//!
//! Records every actuator call so tests can assert on the full command
//! history without touching a real PWM channel.

use aquafeed::app::ports::{ActuatorPort, EventSink};
use aquafeed::app::{AppEvent, CycleRecord};
use aquafeed::camera::CameraPort;
use aquafeed::config::{NormalizationConfig, RoiRect, SystemConfig};
use aquafeed::error::{ActuatorError, CameraError};
use aquafeed::features::FeatureVector;
use aquafeed::fsm::StateId;
use image::DynamicImage;

// ── MockActuator ──────────────────────────────────────────────

/// Records commanded duties verbatim (no clamping), so tests see exactly
/// what the service asked for.
pub struct MockActuator {
    pub duties: Vec<f32>,
    pub limits: Vec<(f32, f32)>,
    pub current: f32,
    pub emergency_stops: usize,
    pub failing: bool,
}

#[allow(dead_code)]
impl MockActuator {
    pub fn new() -> Self {
        Self {
            duties: Vec::new(),
            limits: Vec::new(),
            current: 0.0,
            emergency_stops: 0,
            failing: false,
        }
    }

    pub fn last(&self) -> Option<f32> {
        self.duties.last().copied()
    }
}

impl Default for MockActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuatorPort for MockActuator {
    fn set_duty_cycle(&mut self, duty: f32) -> Result<f32, ActuatorError> {
        if self.failing {
            return Err(ActuatorError::PwmWriteFailed);
        }
        self.duties.push(duty);
        self.current = duty;
        Ok(duty)
    }

    fn emergency_stop(&mut self) -> Result<(), ActuatorError> {
        self.emergency_stops += 1;
        self.current = 20.0;
        Ok(())
    }

    fn set_limits(&mut self, min: f32, max: f32) -> Result<(), ActuatorError> {
        self.limits.push((min, max));
        Ok(())
    }

    fn current_duty(&self) -> f32 {
        self.current
    }
}

// ── CollectingSink ────────────────────────────────────────────

#[derive(Default)]
pub struct CollectingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<(StateId, StateId)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn cycles(&self) -> Vec<CycleRecord> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Cycle(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for CollectingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Cameras ───────────────────────────────────────────────────

/// Every read fails, as with an unplugged device.
pub struct DeadCamera;

impl CameraPort for DeadCamera {
    fn read_frame(&mut self) -> Result<DynamicImage, CameraError> {
        Err(CameraError::ReadFailed("device unplugged".into()))
    }
}

// ── Fixtures ──────────────────────────────────────────────────

/// Unit ceilings so feature values map straight onto H.
#[allow(dead_code)]
pub fn unit_ceiling_config() -> SystemConfig {
    let mut cfg = SystemConfig::default();
    cfg.feature_fusion.normalization = NormalizationConfig {
        rsi_max: 1.0,
        pop_max: 1.0,
        flow_max: 1.0,
        me_max: 1.0,
    };
    cfg
}

/// 320x240 frames with ROIs that fit inside them.
#[allow(dead_code)]
pub fn small_frame_config() -> SystemConfig {
    let mut cfg = SystemConfig::default();
    cfg.hardware.camera.width = 320;
    cfg.hardware.camera.height = 240;
    cfg.hardware.camera.frame_timeout_ms = 100;
    cfg.vision.roi_config.roi_bub = RoiRect {
        x: 80,
        y: 60,
        width: 160,
        height: 120,
    };
    cfg.vision.roi_config.roi_ring = RoiRect {
        x: 40,
        y: 30,
        width: 240,
        height: 180,
    };
    cfg
}

/// H = 0.45 under [`unit_ceiling_config`], inside the default band.
#[allow(dead_code)]
pub fn in_band_features() -> FeatureVector {
    FeatureVector {
        me: 0.0,
        rsi: 0.5,
        pop: 0.5,
        flow: 0.5,
    }
}
