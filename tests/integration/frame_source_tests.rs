//! FrameSource end-to-end with the synthetic camera.

use std::thread;
use std::time::Duration;

use aquafeed::camera::queue::QUEUE_CAPACITY;
use aquafeed::camera::synthetic::SyntheticCamera;
use aquafeed::camera::{FrameSource, JOIN_TIMEOUT};
use aquafeed::config::CameraConfig;
use aquafeed::error::CameraError;

use crate::mock_hw::DeadCamera;

fn small_camera(fps: u32) -> CameraConfig {
    CameraConfig {
        width: 64,
        height: 48,
        fps,
        max_consecutive_read_failures: 3,
        ..CameraConfig::default()
    }
}

#[test]
fn slow_consumer_sees_only_recent_frames() {
    let mut source = FrameSource::open(SyntheticCamera::from_config, &small_camera(100)).unwrap();
    thread::sleep(Duration::from_millis(400));

    assert!(source.dropped_frames() > 0);
    assert!(source.measured_fps() > 10.0);

    let mut last = 0;
    for _ in 0..QUEUE_CAPACITY {
        let frame = source.next_frame(Duration::from_secs(1)).unwrap();
        assert!(frame.sequence > last);
        assert_eq!(frame.dimensions(), (64, 48));
        last = frame.sequence;
    }
    // The oldest frames were evicted.
    assert!(last > QUEUE_CAPACITY as u64);

    assert!(source.stop(JOIN_TIMEOUT));
}

#[test]
fn stop_closes_the_stream() {
    let mut source = FrameSource::open(SyntheticCamera::from_config, &small_camera(60)).unwrap();
    assert!(source.is_running());
    assert!(source.stop(JOIN_TIMEOUT));
    assert!(!source.is_running());

    let mut drained = 0;
    let end = loop {
        match source.next_frame(Duration::from_millis(50)) {
            Ok(_) => drained += 1,
            Err(e) => break e,
        }
    };
    assert_eq!(end, CameraError::Disconnected);
    assert!(drained <= QUEUE_CAPACITY);
}

#[test]
fn unplugged_camera_reports_disconnected() {
    let source = FrameSource::open(|_: &CameraConfig| Ok(DeadCamera), &small_camera(60)).unwrap();
    assert_eq!(source.next_frame(Duration::from_secs(2)).unwrap_err(), CameraError::Disconnected);
}

#[test]
fn zero_sized_synthetic_camera_fails_to_open() {
    let cfg = CameraConfig {
        width: 0,
        ..small_camera(60)
    };
    let res = FrameSource::open(SyntheticCamera::from_config, &cfg);
    assert!(matches!(res, Err(CameraError::OpenFailed(_))));
}
