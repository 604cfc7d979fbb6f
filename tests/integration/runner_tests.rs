//! ControlLoop runs against the synthetic camera and a mock actuator.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use aquafeed::app::{AppCommand, AppEvent};
use aquafeed::camera::FrameSource;
use aquafeed::camera::synthetic::SyntheticCamera;
use aquafeed::config::{CameraConfig, ConfigStore};
use aquafeed::runner::{ControlLoop, ExitReason, StopHandle};

use crate::mock_hw::{CollectingSink, DeadCamera, MockActuator, small_frame_config};

#[test]
fn runs_for_the_requested_duration_then_shuts_down_safely() {
    let cfg = small_frame_config();
    let mut source = FrameSource::open(SyntheticCamera::from_config, &cfg.hardware.camera).unwrap();
    let store = Arc::new(ConfigStore::new(cfg));
    let mut hw = MockActuator::new();
    let mut sink = CollectingSink::new();

    let mut control = ControlLoop::new(store, StopHandle::new()).with_duration(Duration::from_millis(500));
    let summary = control.run(&mut source, &mut hw, &mut sink);

    assert_eq!(summary.reason, ExitReason::DurationElapsed);
    assert!(summary.joined);
    assert!(summary.frames_processed > 0);
    assert_eq!(hw.emergency_stops, 1);
    assert!(hw.duties.iter().all(|d| (20.0..=70.0).contains(d)));
    assert!(matches!(sink.events[0], AppEvent::Started(_)));
}

#[test]
fn camera_loss_ends_the_run_in_anomaly() {
    let mut cfg = small_frame_config();
    cfg.hardware.camera.max_consecutive_read_failures = 3;
    let mut source = FrameSource::open(|_: &CameraConfig| Ok(DeadCamera), &cfg.hardware.camera).unwrap();
    let store = Arc::new(ConfigStore::new(cfg));
    let mut hw = MockActuator::new();
    let mut sink = CollectingSink::new();

    let mut control = ControlLoop::new(store, StopHandle::new()).with_duration(Duration::from_secs(10));
    let summary = control.run(&mut source, &mut hw, &mut sink);

    assert_eq!(summary.reason, ExitReason::CameraLost);
    assert_eq!(summary.final_state, aquafeed::fsm::StateId::Anomaly);
    assert!((hw.last().unwrap() - 30.0).abs() < f32::EPSILON);
    assert_eq!(hw.emergency_stops, 1);
}

#[test]
fn stop_handle_ends_the_run_before_any_frame() {
    let cfg = small_frame_config();
    let mut source = FrameSource::open(SyntheticCamera::from_config, &cfg.hardware.camera).unwrap();
    let store = Arc::new(ConfigStore::new(cfg));
    let stop = StopHandle::new();
    stop.stop();

    let mut hw = MockActuator::new();
    let mut sink = CollectingSink::new();
    let summary = ControlLoop::new(store, stop).run(&mut source, &mut hw, &mut sink);

    assert_eq!(summary.reason, ExitReason::StopRequested);
    assert_eq!(summary.frames_processed, 0);
    assert!(hw.duties.is_empty());
    assert_eq!(hw.emergency_stops, 1);
}

#[test]
fn queued_commands_reach_the_service() {
    let cfg = small_frame_config();
    let mut source = FrameSource::open(SyntheticCamera::from_config, &cfg.hardware.camera).unwrap();
    let mut next = cfg.clone();
    next.controller.pi_controller.kp = 4.0;
    let store = Arc::new(ConfigStore::new(cfg));

    let (tx, rx) = mpsc::channel();
    tx.send(AppCommand::ResetVision).unwrap();
    tx.send(AppCommand::UpdateConfig(Box::new(next))).unwrap();

    let mut hw = MockActuator::new();
    let mut sink = CollectingSink::new();
    let mut control = ControlLoop::new(Arc::clone(&store), StopHandle::new())
        .with_commands(rx)
        .with_duration(Duration::from_millis(1_500));
    control.run(&mut source, &mut hw, &mut sink);

    assert!((store.snapshot().controller.pi_controller.kp - 4.0).abs() < f32::EPSILON);
    assert!((control.service().status().pi.kp - 4.0).abs() < f32::EPSILON);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::VisionReset)), 1);
    assert_eq!(sink.count(|e| matches!(e, AppEvent::ConfigApplied)), 1);
}
