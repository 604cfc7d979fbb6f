//! Integration tests for the FeederService → FSM → actuator pipeline.
//!
//! Time is injected explicitly so every test is deterministic: `at(t0, ms)`
//! is the simulated wall clock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use aquafeed::app::{AppCommand, AppEvent, FeederService};
use aquafeed::camera::synthetic::SyntheticCamera;
use aquafeed::config::SystemConfig;
use aquafeed::drivers::{PwmActuator, SimulatedPwmChannel};
use aquafeed::error::{ActuatorError, AnomalyFault, ConfigError, Error, VisionError};
use aquafeed::features::FeatureVector;
use aquafeed::fsm::StateId;
use aquafeed::vision::Frame;
use image::DynamicImage;

use crate::mock_hw::{CollectingSink, MockActuator, in_band_features, small_frame_config, unit_ceiling_config};

const FPS_OK: f32 = 60.0;

fn at(t0: Instant, ms: u64) -> Instant {
    t0 + Duration::from_millis(ms)
}

fn make_service(config: SystemConfig) -> (FeederService, MockActuator, CollectingSink, Instant) {
    let mut svc = FeederService::new(Arc::new(config));
    let hw = MockActuator::new();
    let mut sink = CollectingSink::new();
    let t0 = Instant::now();
    svc.start(t0, &mut sink);
    (svc, hw, sink, t0)
}

/// Feed `features` every `step_ms` over `[from_ms, to_ms]`.
fn drive(
    svc: &mut FeederService,
    hw: &mut MockActuator,
    sink: &mut CollectingSink,
    t0: Instant,
    (from_ms, to_ms, step_ms): (u64, u64, u64),
    features: FeatureVector,
    fps: f32,
) {
    let mut ms = from_ms;
    while ms <= to_ms {
        svc.update(features, fps, at(t0, ms), hw, sink).unwrap();
        ms += step_ms;
    }
}

// ── Lifecycle ─────────────────────────────────────────────────

#[test]
fn starts_in_init_and_feeds_on_first_update() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    assert_eq!(svc.state(), StateId::Init);
    assert_eq!(sink.events[0], AppEvent::Started(StateId::Init));

    let record = svc.update(in_band_features(), FPS_OK, t0, &mut hw, &mut sink).unwrap();
    assert_eq!(record.state, StateId::Feeding);
    assert!((record.h - 0.45).abs() < 1e-5);
    assert_eq!(sink.transitions(), vec![(StateId::Init, StateId::Feeding)]);
    // Output starts at the minimum duty and is held outside EVALUATING.
    assert!((hw.last().unwrap() - 20.0).abs() < f32::EPSILON);
}

#[test]
fn one_full_cycle_in_t_feed_plus_t_eval_plus_t_settle() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    drive(&mut svc, &mut hw, &mut sink, t0, (0, 4_650, 50), in_band_features(), FPS_OK);

    assert_eq!(
        sink.transitions(),
        vec![
            (StateId::Init, StateId::Feeding),
            (StateId::Feeding, StateId::Evaluating),
            (StateId::Evaluating, StateId::Settling),
            (StateId::Settling, StateId::Feeding),
        ]
    );
}

#[test]
fn output_only_moves_while_evaluating() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    let hot = FeatureVector {
        me: 0.0,
        rsi: 1.0,
        pop: 1.0,
        flow: 1.0,
    };
    let mut ms = 0;
    let mut prev_pwm = svc.current_pwm();
    while ms <= 30_000 {
        let record = svc.update(hot, FPS_OK, at(t0, ms), &mut hw, &mut sink).unwrap();
        if (record.pwm - prev_pwm).abs() > f32::EPSILON {
            assert_eq!(record.state, StateId::Evaluating, "PWM moved in {}", record.state);
        }
        prev_pwm = record.pwm;
        ms += 50;
    }
    assert!(svc.current_pwm() > 20.0);
}

// ── Worked example: H = 0.70 pushes PWM up, never past 70 ─────

#[test]
fn high_activity_raises_pwm_monotonically_up_to_max() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    let features = FeatureVector {
        me: 0.1,
        rsi: 0.8,
        pop: 0.9,
        flow: 0.6,
    };

    let mut prev = svc.current_pwm();
    let mut ms = 0;
    while ms <= 300_000 {
        let record = svc.update(features, FPS_OK, at(t0, ms), &mut hw, &mut sink).unwrap();
        assert!((record.h - 0.70).abs() < 1e-5);
        assert!(record.pwm >= prev - f32::EPSILON, "PWM fell from {prev} to {}", record.pwm);
        assert!(record.pwm <= 70.0 + f32::EPSILON);
        assert!(svc.pi_integral() <= 50.0);
        prev = record.pwm;
        ms += 50;
    }
    assert!(svc.current_pwm() > 60.0, "PWM only reached {}", svc.current_pwm());
    assert!(hw.duties.iter().all(|d| (20.0..=70.0).contains(d)));
}

// ── Anomaly trip and recovery ─────────────────────────────────

#[test]
fn low_fps_trips_anomaly_then_recovers_to_evaluating_with_fresh_integral() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    drive(&mut svc, &mut hw, &mut sink, t0, (0, 1_000, 50), in_band_features(), FPS_OK);
    assert_eq!(svc.state(), StateId::Evaluating);
    assert!(svc.pi_integral().abs() > 0.0);

    // Low for exactly the trip time: not yet.
    drive(&mut svc, &mut hw, &mut sink, t0, (1_050, 2_050, 50), in_band_features(), 20.0);
    assert_eq!(svc.state(), StateId::Evaluating);

    svc.update(in_band_features(), 20.0, at(t0, 2_100), &mut hw, &mut sink).unwrap();
    assert_eq!(svc.state(), StateId::Anomaly);
    assert!((hw.last().unwrap() - 30.0).abs() < f32::EPSILON);
    assert!(svc.fault_flags() & AnomalyFault::LowFrameRate.mask() != 0);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::AnomalyDetected(_))), 1);

    svc.update(in_band_features(), FPS_OK, at(t0, 2_150), &mut hw, &mut sink).unwrap();
    assert_eq!(svc.state(), StateId::Evaluating);
    assert!(svc.pi_integral().abs() < 1e-9);
    assert_eq!(svc.fault_flags(), 0);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::AnomalyCleared)), 1);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ControllerReset)), 1);

    // Regulation resumes from the safe duty.
    svc.update(in_band_features(), FPS_OK, at(t0, 2_200), &mut hw, &mut sink).unwrap();
    let last = hw.last().unwrap();
    assert!((last - 30.0).abs() <= 15.0);
}

#[test]
fn idle_ticks_do_not_advance_phases() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    svc.update(in_band_features(), FPS_OK, t0, &mut hw, &mut sink).unwrap();
    for ms in (100..=2_000).step_by(100) {
        svc.idle_tick(FPS_OK, at(t0, ms), &mut hw, &mut sink).unwrap();
    }
    assert_eq!(svc.state(), StateId::Feeding);
}

#[test]
fn idle_ticks_at_low_fps_still_trip_anomaly() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    svc.update(in_band_features(), FPS_OK, t0, &mut hw, &mut sink).unwrap();
    for ms in (100..=1_300).step_by(100) {
        svc.idle_tick(0.0, at(t0, ms), &mut hw, &mut sink).unwrap();
    }
    assert_eq!(svc.state(), StateId::Anomaly);
    assert!((hw.last().unwrap() - 30.0).abs() < f32::EPSILON);
}

#[test]
fn camera_loss_forces_safe_output() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    svc.update(in_band_features(), FPS_OK, t0, &mut hw, &mut sink).unwrap();
    svc.camera_lost(at(t0, 50), &mut hw, &mut sink).unwrap();

    assert_eq!(svc.state(), StateId::Anomaly);
    assert!(svc.fault_flags() & AnomalyFault::CameraLost.mask() != 0);
    assert!((hw.last().unwrap() - 30.0).abs() < f32::EPSILON);
}

// ── Low-activity fallback ─────────────────────────────────────

#[test]
fn sustained_low_activity_compounds_t_eval_up_to_cap() {
    let mut cfg = unit_ceiling_config();
    cfg.anomaly_detection.low_activity_duration = 1.0;
    cfg.anomaly_detection.fallback_mode.max_t_eval = 10.0;
    let (mut svc, mut hw, mut sink, t0) = make_service(cfg);

    drive(&mut svc, &mut hw, &mut sink, t0, (0, 1_000, 100), FeatureVector::default(), FPS_OK);
    assert!((svc.effective_t_eval() - 3.0).abs() < 1e-9);

    drive(&mut svc, &mut hw, &mut sink, t0, (1_100, 1_100, 100), FeatureVector::default(), FPS_OK);
    assert!((svc.effective_t_eval() - 6.0).abs() < 1e-9);

    drive(&mut svc, &mut hw, &mut sink, t0, (1_200, 5_000, 100), FeatureVector::default(), FPS_OK);
    assert!((svc.effective_t_eval() - 10.0).abs() < 1e-9);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::EvaluationExtended { .. })), 2);

    // Low activity is not a fault.
    assert_eq!(svc.fault_flags(), 0);

    svc.reset(at(t0, 5_100), &mut sink);
    assert!((svc.effective_t_eval() - 3.0).abs() < 1e-9);
    assert_eq!(svc.state(), StateId::Init);
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn config_update_applies_at_next_cycle() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    let mut next = unit_ceiling_config();
    next.controller.pi_controller.kp = 5.0;

    svc.handle_command(AppCommand::UpdateConfig(Box::new(next)), t0, &mut sink)
        .unwrap();
    assert!((svc.status().pi.kp - 15.0).abs() < f32::EPSILON);

    svc.update(in_band_features(), FPS_OK, t0, &mut hw, &mut sink).unwrap();
    assert!((svc.status().pi.kp - 5.0).abs() < f32::EPSILON);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigApplied)), 1);
}

#[test]
fn raised_duty_ceiling_reaches_the_hardware() {
    let cfg = unit_ceiling_config();
    let mut pwm = PwmActuator::new(SimulatedPwmChannel::new(), &cfg.hardware.pwm);
    pwm.start(None).unwrap();
    let mut svc = FeederService::new(Arc::new(cfg.clone()));
    let mut sink = CollectingSink::new();
    let t0 = Instant::now();
    svc.start(t0, &mut sink);

    let mut next = cfg;
    next.hardware.pwm.max_duty_cycle = 95.0;
    svc.handle_command(AppCommand::UpdateConfig(Box::new(next)), t0, &mut sink)
        .unwrap();

    // H = 0.9, far above the band: the PI saturates upward.
    let busy = FeatureVector { me: 0.0, rsi: 1.0e6, pop: 1.0e6, flow: 1.0e6 };
    let mut ms = 0;
    while ms <= 300_000 {
        svc.update(busy, FPS_OK, at(t0, ms), &mut pwm, &mut sink).unwrap();
        ms += 100;
    }

    assert_eq!(pwm.limits(), (20.0, 95.0));
    assert!(pwm.current_duty() > 70.0, "duty {}", pwm.current_duty());
    assert!(pwm.current_duty() <= 95.0);

    pwm.emergency_stop().unwrap();
    assert!((pwm.current_duty() - 20.0).abs() < f32::EPSILON);
}

#[test]
fn duty_window_is_pushed_once_per_change() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    let mut kp_only = unit_ceiling_config();
    kp_only.controller.pi_controller.kp = 5.0;
    svc.handle_command(AppCommand::UpdateConfig(Box::new(kp_only.clone())), t0, &mut sink)
        .unwrap();
    svc.update(in_band_features(), FPS_OK, t0, &mut hw, &mut sink).unwrap();
    assert!(hw.limits.is_empty());

    let mut wider = kp_only;
    wider.hardware.pwm.min_duty_cycle = 15.0;
    wider.hardware.pwm.max_duty_cycle = 90.0;
    svc.handle_command(AppCommand::UpdateConfig(Box::new(wider)), t0, &mut sink)
        .unwrap();
    drive(&mut svc, &mut hw, &mut sink, t0, (50, 500, 50), in_band_features(), FPS_OK);
    assert_eq!(hw.limits, vec![(15.0, 90.0)]);
}

#[test]
fn invalid_config_update_is_rejected() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    let mut bad = unit_ceiling_config();
    bad.controller.thresholds.h_lo = 0.9;

    let result = svc.handle_command(AppCommand::UpdateConfig(Box::new(bad)), t0, &mut sink);
    assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));

    svc.update(in_band_features(), FPS_OK, t0, &mut hw, &mut sink).unwrap();
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigApplied)), 0);
}

#[test]
fn reset_controller_returns_to_init() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    drive(&mut svc, &mut hw, &mut sink, t0, (0, 1_500, 50), in_band_features(), FPS_OK);
    assert_eq!(svc.state(), StateId::Evaluating);

    svc.handle_command(AppCommand::ResetController, at(t0, 1_550), &mut sink)
        .unwrap();
    assert_eq!(svc.state(), StateId::Init);
    assert!(svc.pi_integral().abs() < 1e-9);

    let status = svc.status();
    assert!((status.target_h - 0.5).abs() < 1e-6);
    assert!((status.h_hi - 0.65).abs() < f32::EPSILON);
    assert!((status.timing.t_eval - 3.0).abs() < 1e-9);
    assert!(status.pi.anti_windup);
}

#[test]
fn reset_vision_is_acknowledged() {
    let (mut svc, _hw, mut sink, t0) = make_service(unit_ceiling_config());
    svc.handle_command(AppCommand::ResetVision, t0, &mut sink).unwrap();
    assert_eq!(sink.count(|e| matches!(e, AppEvent::VisionReset)), 1);
}

// ── Actuator failures ─────────────────────────────────────────

#[test]
fn failed_write_leaves_command_unchanged() {
    let (mut svc, mut hw, mut sink, t0) = make_service(unit_ceiling_config());
    hw.failing = true;
    let result = svc.update(in_band_features(), FPS_OK, t0, &mut hw, &mut sink);
    assert_eq!(result.unwrap_err(), ActuatorError::PwmWriteFailed);
    assert!((svc.current_pwm() - 20.0).abs() < f32::EPSILON);
}

// ── Full pipeline on rendered frames ──────────────────────────

#[test]
fn synthetic_frames_run_through_the_whole_pipeline() {
    let cfg = small_frame_config();
    let cam = SyntheticCamera::new(cfg.hardware.camera.width, cfg.hardware.camera.height, 60).with_activity(0.8);
    let (mut svc, mut hw, mut sink, t0) = make_service(cfg);

    for n in 1..=8u64 {
        let now = at(t0, n * 17);
        let frame = Frame::new(DynamicImage::ImageLuma8(cam.render(n)), now, n);
        let record = svc.process_frame(&frame, FPS_OK, now, &mut hw, &mut sink).unwrap();
        assert!((0.0..=1.0).contains(&record.h));
        assert!((20.0..=70.0).contains(&record.pwm));
    }

    assert_eq!(svc.frames_processed(), 8);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::Features(_))), 8);
    assert_eq!(sink.cycles().len(), 8);
}

#[test]
fn empty_frame_is_skipped() {
    let (mut svc, mut hw, mut sink, t0) = make_service(small_frame_config());
    let frame = Frame::new(DynamicImage::new_luma8(0, 0), t0, 1);

    let result = svc.process_frame(&frame, FPS_OK, t0, &mut hw, &mut sink);
    assert_eq!(result.unwrap_err(), Error::Vision(VisionError::EmptyRoi));
    assert_eq!(svc.frames_processed(), 0);
    assert!(sink.cycles().is_empty());
}
