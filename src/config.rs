//! System configuration parameters
//!
//! All tunable parameters for the feeder, grouped the way the JSON config
//! document is laid out (`hardware.pwm.min_duty_cycle`, `controller.timing.t_eval`,
//! ...).  Every section carries `#[serde(default)]`, so a partial document
//! only overrides the keys it names.
//!
//! At runtime the configuration is copy-on-write: [`ConfigStore`] hands out
//! `Arc` snapshots, and replacing the config installs a new snapshot rather
//! than mutating the one a running cycle is reading.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub hardware: HardwareConfig,
    pub controller: ControllerConfig,
    pub vision: VisionConfig,
    pub feature_fusion: FusionConfig,
    pub anomaly_detection: AnomalyConfig,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// hardware.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub camera: CameraConfig,
    pub pwm: PwmConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Device index as enumerated by the OS.
    pub device_id: u32,
    pub width: u32,
    pub height: u32,
    /// Requested capture rate (frames per second).
    pub fps: u32,
    /// Bounded wait for the next frame before the control loop idles (ms).
    pub frame_timeout_ms: u64,
    /// Consecutive read failures after which the camera is considered lost.
    pub max_consecutive_read_failures: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 1920,
            height: 1080,
            fps: 60,
            frame_timeout_ms: 500,
            max_consecutive_read_failures: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PwmConfig {
    /// Header pin the motor driver is wired to (informational for sysfs).
    pub gpio_pin: u32,
    /// PWM carrier frequency (Hz).
    pub frequency: u32,
    /// Lowest duty cycle the feeder motor is ever driven at (%).
    pub min_duty_cycle: f32,
    /// Highest duty cycle the feeder motor is ever driven at (%).
    pub max_duty_cycle: f32,
    /// sysfs `pwmchipN` index.
    pub chip: u32,
    /// Channel within the chip.
    pub channel: u32,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            gpio_pin: 18,
            frequency: 1000,
            min_duty_cycle: 20.0,
            max_duty_cycle: 70.0,
            chip: 0,
            channel: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// controller.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub timing: TimingConfig,
    pub thresholds: ThresholdConfig,
    pub pi_controller: PiConfig,
    pub constraints: SlewConfig,
    pub anti_windup: AntiWindupConfig,
}

/// Feeding-cycle phase durations (seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub t_feed: f64,
    pub t_eval: f64,
    pub t_settle: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            t_feed: 0.6,
            t_eval: 3.0,
            t_settle: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    #[serde(rename = "H_hi")]
    pub h_hi: f32,
    #[serde(rename = "H_lo")]
    pub h_lo: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            h_hi: 0.65,
            h_lo: 0.35,
        }
    }
}

impl ThresholdConfig {
    /// Activity level the PI loop regulates around.
    pub fn target(&self) -> f32 {
        (self.h_hi + self.h_lo) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PiConfig {
    #[serde(rename = "Kp")]
    pub kp: f32,
    #[serde(rename = "Ki")]
    pub ki: f32,
}

impl Default for PiConfig {
    fn default() -> Self {
        Self { kp: 15.0, ki: 2.0 }
    }
}

/// Maximum PWM change per control cycle (percentage points).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlewConfig {
    pub delta_up: f32,
    pub delta_down: f32,
}

impl Default for SlewConfig {
    fn default() -> Self {
        Self {
            delta_up: 10.0,
            delta_down: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiWindupConfig {
    pub enable: bool,
    pub max_integral: f32,
}

impl Default for AntiWindupConfig {
    fn default() -> Self {
        Self {
            enable: true,
            max_integral: 50.0,
        }
    }
}

// ---------------------------------------------------------------------------
// vision.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub roi_config: RoiConfig,
    pub preprocessing: PreprocessingConfig,
    pub feature_extraction: FeatureExtractionConfig,
}

/// Pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    /// Surface patch watched for bubble pops.
    pub roi_bub: RoiRect,
    /// Wider patch watched for ripples, motion and flow.
    pub roi_ring: RoiRect,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            roi_bub: RoiRect {
                x: 400,
                y: 300,
                width: 320,
                height: 240,
            },
            roi_ring: RoiRect {
                x: 200,
                y: 150,
                width: 720,
                height: 480,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub clahe: ClaheConfig,
    pub histogram_matching: HistogramMatchingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaheConfig {
    pub clip_limit: f32,
    /// Tile grid as `[columns, rows]`.
    pub tile_grid_size: [u32; 2],
}

impl Default for ClaheConfig {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tile_grid_size: [8, 8],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramMatchingConfig {
    pub enable: bool,
    /// Grayscale image whose intensity distribution frames are remapped to.
    pub reference_image_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureExtractionConfig {
    pub motion_energy: MotionEnergyConfig,
    pub ripple_spectral: RippleSpectralConfig,
    pub bubble_pop: BubblePopConfig,
    pub optical_flow: OpticalFlowConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionEnergyConfig {
    /// Number of ring-ROI frames kept for differencing.
    pub temporal_window: usize,
    /// Absolute intensity difference above which a pixel counts as moving.
    pub threshold: u8,
}

impl Default for MotionEnergyConfig {
    fn default() -> Self {
        Self {
            temporal_window: 5,
            threshold: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RippleSpectralConfig {
    /// Normalized radius at which the high band starts.
    pub high_freq_start: f32,
    /// Normalized radius at which the low band ends.
    pub low_freq_end: f32,
}

impl Default for RippleSpectralConfig {
    fn default() -> Self {
        Self {
            high_freq_start: 0.3,
            low_freq_end: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BubblePopConfig {
    pub min_area: f32,
    pub max_area: f32,
    pub circularity_threshold: f32,
    /// Capture rate the pop-rate scaling assumes. Not the measured FPS.
    pub assumed_fps: f32,
}

impl Default for BubblePopConfig {
    fn default() -> Self {
        Self {
            min_area: 50.0,
            max_area: 500.0,
            circularity_threshold: 0.7,
            assumed_fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpticalFlowConfig {
    pub pyramid_levels: u32,
    /// Side of the square Lucas-Kanade window (pixels).
    pub window_size: u32,
    /// Spacing of the tracked point grid (pixels).
    pub grid_step: u32,
}

impl Default for OpticalFlowConfig {
    fn default() -> Self {
        Self {
            pyramid_levels: 3,
            window_size: 15,
            grid_step: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// feature_fusion.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub weights: FusionWeights,
    pub normalization: NormalizationConfig,
    pub baseline: BaselineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
    pub delta: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            alpha: 0.4,
            beta: 0.3,
            gamma: 0.2,
            delta: 0.1,
        }
    }
}

/// Ceilings each feature is divided by before fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    #[serde(rename = "RSI_max")]
    pub rsi_max: f32,
    #[serde(rename = "POP_max")]
    pub pop_max: f32,
    #[serde(rename = "FLOW_max")]
    pub flow_max: f32,
    #[serde(rename = "ME_max")]
    pub me_max: f32,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            rsi_max: 2.0,
            pop_max: 10.0,
            flow_max: 100.0,
            me_max: 50.0,
        }
    }
}

/// Values reported while a feature has too little history to compute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    #[serde(rename = "ME0")]
    pub me0: f32,
    #[serde(rename = "RSI0")]
    pub rsi0: f32,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            me0: 10.0,
            rsi0: 0.2,
        }
    }
}

// ---------------------------------------------------------------------------
// anomaly_detection.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Frame rate below which the vision pipeline is considered unreliable.
    pub fps_threshold: f32,
    /// How long the frame rate must stay low before ANOMALY trips (s).
    pub fps_trip_secs: f64,
    /// How long activity must stay very low before evaluation is extended (s).
    pub low_activity_duration: f64,
    pub fallback_mode: FallbackConfig,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            fps_threshold: 50.0,
            fps_trip_secs: 1.0,
            low_activity_duration: 30.0,
            fallback_mode: FallbackConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Duty cycle held while in ANOMALY (%).
    pub pwm_safe_value: f32,
    /// Factor `t_eval` is multiplied by after sustained low activity.
    pub evaluation_extension: f64,
    /// Upper bound for the extended `t_eval` (s).
    pub max_t_eval: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            pwm_safe_value: 30.0,
            evaluation_extension: 2.0,
            max_t_eval: 30.0,
        }
    }
}

// ---------------------------------------------------------------------------
// logging.*
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub csv_output: CsvOutputConfig,
    /// Period of the runtime status report (s).
    pub status_interval_secs: f64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            csv_output: CsvOutputConfig::default(),
            status_interval_secs: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOutputConfig {
    pub enable: bool,
    /// `{date}` is replaced with the local start date (`YYYYMMDD`).
    pub file_path: String,
}

impl Default for CsvOutputConfig {
    fn default() -> Self {
        Self {
            enable: true,
            file_path: "logs/feeding_log_{date}.csv".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl SystemConfig {
    /// Reject physically meaningless parameter sets.
    ///
    /// Loading never silently clamps: a document that parses but fails
    /// here is refused with [`ConfigError::ValidationFailed`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pwm = &self.hardware.pwm;
        if !(0.0..=100.0).contains(&pwm.min_duty_cycle)
            || !(0.0..=100.0).contains(&pwm.max_duty_cycle)
        {
            return Err(ConfigError::ValidationFailed("duty cycle limits must be within 0-100%"));
        }
        if pwm.min_duty_cycle >= pwm.max_duty_cycle {
            return Err(ConfigError::ValidationFailed("min_duty_cycle must be below max_duty_cycle"));
        }
        if pwm.frequency == 0 {
            return Err(ConfigError::ValidationFailed("PWM frequency must be positive"));
        }

        let cam = &self.hardware.camera;
        if cam.width == 0 || cam.height == 0 || cam.fps == 0 {
            return Err(ConfigError::ValidationFailed("camera resolution and fps must be positive"));
        }

        let timing = &self.controller.timing;
        if !(timing.t_feed > 0.0 && timing.t_eval > 0.0 && timing.t_settle > 0.0) {
            return Err(ConfigError::ValidationFailed("phase durations must be positive"));
        }

        let th = &self.controller.thresholds;
        if !(0.0..=1.0).contains(&th.h_lo) || !(0.0..=1.0).contains(&th.h_hi) {
            return Err(ConfigError::ValidationFailed("activity thresholds must be within 0-1"));
        }
        if th.h_lo >= th.h_hi {
            return Err(ConfigError::ValidationFailed("H_lo must be below H_hi"));
        }

        let pi = &self.controller.pi_controller;
        if !(pi.kp >= 0.0 && pi.ki >= 0.0) {
            return Err(ConfigError::ValidationFailed("PI gains must be non-negative"));
        }
        if self.controller.anti_windup.max_integral <= 0.0 {
            return Err(ConfigError::ValidationFailed("max_integral must be positive"));
        }

        let slew = &self.controller.constraints;
        if !(slew.delta_up > 0.0 && slew.delta_down > 0.0) {
            return Err(ConfigError::ValidationFailed("slew limits must be positive"));
        }

        let pre = &self.vision.preprocessing;
        if pre.clahe.clip_limit <= 0.0 || pre.clahe.tile_grid_size.contains(&0) {
            return Err(ConfigError::ValidationFailed("CLAHE clip limit and grid must be positive"));
        }
        for roi in [self.vision.roi_config.roi_bub, self.vision.roi_config.roi_ring] {
            if roi.width == 0 || roi.height == 0 {
                return Err(ConfigError::ValidationFailed("ROI width and height must be positive"));
            }
        }

        let fx = &self.vision.feature_extraction;
        if !(2..=crate::features::MAX_TEMPORAL_WINDOW).contains(&fx.motion_energy.temporal_window) {
            return Err(ConfigError::ValidationFailed("temporal_window must be within 2-16"));
        }
        let rsi = &fx.ripple_spectral;
        if !(0.0 < rsi.low_freq_end && rsi.low_freq_end < rsi.high_freq_start) {
            return Err(ConfigError::ValidationFailed("low_freq_end must be positive and below high_freq_start"));
        }
        let bub = &fx.bubble_pop;
        if bub.min_area < 0.0 || bub.min_area > bub.max_area || bub.assumed_fps <= 0.0 {
            return Err(ConfigError::ValidationFailed("bubble area window or assumed_fps invalid"));
        }
        let flow = &fx.optical_flow;
        if flow.window_size < 3 || flow.grid_step == 0 || flow.pyramid_levels == 0 {
            return Err(ConfigError::ValidationFailed("optical flow window, grid and levels must be positive"));
        }

        let norm = &self.feature_fusion.normalization;
        if !(norm.rsi_max > 0.0 && norm.pop_max > 0.0 && norm.flow_max > 0.0 && norm.me_max > 0.0) {
            return Err(ConfigError::ValidationFailed("normalization ceilings must be positive"));
        }

        let an = &self.anomaly_detection;
        if an.fps_threshold < 0.0 || an.fps_trip_secs < 0.0 || an.low_activity_duration <= 0.0 {
            return Err(ConfigError::ValidationFailed("anomaly thresholds out of range"));
        }
        let fb = &an.fallback_mode;
        if fb.pwm_safe_value < pwm.min_duty_cycle || fb.pwm_safe_value > pwm.max_duty_cycle {
            return Err(ConfigError::ValidationFailed("pwm_safe_value must lie within the duty limits"));
        }
        if fb.evaluation_extension < 1.0 || fb.max_t_eval < timing.t_eval {
            return Err(ConfigError::ValidationFailed("evaluation extension must not shorten t_eval"));
        }

        if self.logging.status_interval_secs <= 0.0 {
            return Err(ConfigError::ValidationFailed("status_interval_secs must be positive"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Snapshot store
// ---------------------------------------------------------------------------

/// Copy-on-write holder for the live configuration.
///
/// Readers take an `Arc` snapshot and keep using it for the whole control
/// cycle; writers swap in a new, already validated document.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<SystemConfig>>,
}

impl ConfigStore {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// The snapshot in effect right now.
    pub fn snapshot(&self) -> Arc<SystemConfig> {
        Arc::clone(&self.current.read())
    }

    /// Validate and install a new snapshot.  Existing snapshots are unaffected.
    pub fn replace(&self, config: SystemConfig) -> Result<Arc<SystemConfig>, ConfigError> {
        config.validate()?;
        let next = Arc::new(config);
        *self.current.write() = Arc::clone(&next);
        Ok(next)
    }
}
