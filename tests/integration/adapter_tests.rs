//! Adapters wired to a live FeederService.

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use aquafeed::adapters::csv_log::CSV_HEADER;
use aquafeed::adapters::{CsvCycleLog, FeatureChannelSink, JsonFileConfig, LogEventSink, MultiSink};
use aquafeed::app::FeederService;
use aquafeed::app::ports::ConfigPort;
use aquafeed::camera::synthetic::SyntheticCamera;
use aquafeed::config::ConfigStore;
use aquafeed::vision::Frame;
use image::DynamicImage;

use crate::mock_hw::{MockActuator, in_band_features, small_frame_config, unit_ceiling_config};

#[test]
fn cycle_log_gets_one_row_per_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cycles.csv");

    let mut sink = MultiSink::new()
        .with(LogEventSink::new())
        .with(CsvCycleLog::open_path(&path).unwrap());
    let mut svc = FeederService::new(Arc::new(unit_ceiling_config()));
    let mut hw = MockActuator::new();
    let t0 = Instant::now();
    svc.start(t0, &mut sink);
    for i in 0..20u64 {
        svc.update(in_band_features(), 60.0, t0 + Duration::from_millis(i * 50), &mut hw, &mut sink)
            .unwrap();
    }
    drop(sink);

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some(CSV_HEADER));
    let rows: Vec<Vec<&str>> = lines.map(|l| l.split(',').collect()).collect();
    assert_eq!(rows.len(), 20);
    assert_eq!(rows[0][1], "FEEDING");
    assert_eq!(rows[19][1], "EVALUATING");
    for row in &rows {
        assert_eq!(row.len(), 8);
        let pwm: f32 = row[2].parse().unwrap();
        assert!((20.0..=70.0).contains(&pwm));
        assert_eq!(row[3], "0.4500");
    }
}

#[test]
fn feature_stream_gets_one_line_per_frame() {
    let cfg = small_frame_config();
    let cam = SyntheticCamera::new(cfg.hardware.camera.width, cfg.hardware.camera.height, 60).with_activity(0.5);
    let mut svc = FeederService::new(Arc::new(cfg));
    let mut hw = MockActuator::new();
    let mut sink = FeatureChannelSink::new(Vec::new());
    let t0 = Instant::now();
    svc.start(t0, &mut sink);

    for n in 1..=5u64 {
        let now = t0 + Duration::from_millis(n * 17);
        let frame = Frame::new(DynamicImage::ImageLuma8(cam.render(n)), now, n);
        svc.process_frame(&frame, 60.0, now, &mut hw, &mut sink).unwrap();
    }
    // Feature vectors handed in directly never pass the frame stage.
    svc.update(in_band_features(), 60.0, t0 + Duration::from_millis(200), &mut hw, &mut sink)
        .unwrap();
    assert_eq!(sink.published(), 5);

    let text = String::from_utf8(sink.into_inner()).unwrap();
    for (i, line) in text.lines().enumerate() {
        let v: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(v["seq"], i as u64 + 1);
        assert_eq!(v["data"].as_array().unwrap().len(), 5);
    }
}

#[test]
fn config_file_feeds_the_snapshot_store() {
    let dir = tempfile::tempdir().unwrap();
    let port = JsonFileConfig::new(dir.path().join("aquafeed.json"));

    let mut cfg = unit_ceiling_config();
    cfg.controller.timing.t_settle = 2.5;
    port.save(&cfg).unwrap();

    let store = ConfigStore::new(port.load().unwrap());
    let before = store.snapshot();
    assert!((before.controller.timing.t_settle - 2.5).abs() < 1e-9);

    let mut next = (*before).clone();
    next.controller.timing.t_settle = 0.0;
    assert!(store.replace(next).is_err());
    assert!(Arc::ptr_eq(&before, &store.snapshot()));
}
