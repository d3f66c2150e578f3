//! Full-pipeline integration tests for the end-to-end scenarios that need
//! more than one module cooperating: losing a locked target and recovering
//! it, and patrolling the waypoint list while nothing is tracked.
//!
//! These exercise only `ptz_tracker`'s public API (`FramePipeline`,
//! `CameraStateManager`, `SimulatedDriver`), the same boundary a real
//! detector/camera integration would cross.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use ptz_tracker::calibration::CalibrationTable;
use ptz_tracker::config::{
    ClassListConfig, Config, CsmTuning, MotionGatingTuning, RecoveryTuning, ScanTuning,
    SelectorTuning,
};
use ptz_tracker::csm::{CameraStateManager, CsmConfig};
use ptz_tracker::detection::{BoundingBox, Detection};
use ptz_tracker::driver::SimulatedDriver;
use ptz_tracker::pipeline::FramePipeline;
use ptz_tracker::ptz::PtzPosition;
use ptz_tracker::status::TrackingMode;

fn write_calibration(dir: &std::path::Path, zoom: f64, px_per_unit: f64) -> std::path::PathBuf {
    let path = dir.join("cal.json");
    std::fs::write(
        &path,
        format!(
            r#"{{"calibration_data": [{{"zoom_level": {zoom}, "pixels_for_reference": {px}, "pixels_per_inch": {px}}}]}}"#,
            zoom = zoom,
            px = px_per_unit
        ),
    )
    .unwrap();
    path
}

fn write_scan_file(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("scanning.json");
    std::fs::write(
        &path,
        r#"{"positions": [
            {"id": "1", "name": "north", "position": {"pan": 0, "tilt": 0, "zoom": 10}, "dwell_time_seconds": 0.01, "timestamp": "2026-01-01"},
            {"id": "2", "name": "east", "position": {"pan": 500, "tilt": 100, "zoom": 20}, "dwell_time_seconds": 0.01, "timestamp": "2026-01-01"},
            {"id": "3", "name": "south", "position": {"pan": 1000, "tilt": 0, "zoom": 10}, "dwell_time_seconds": 0.01, "timestamp": "2026-01-01"}
        ]}"#,
    )
    .unwrap();
    path
}

fn base_config(calibration_path: std::path::PathBuf, scanning_path: std::path::PathBuf) -> Config {
    Config {
        p1_classes: ClassListConfig::All,
        p2_classes: ClassListConfig::All,
        frame_width: 2688.0,
        frame_height: 1520.0,
        hard_limits: Default::default(),
        soft_limits: None,
        calibration_path,
        scanning_path,
        selector: SelectorTuning::default(),
        csm: CsmTuning::default(),
        recovery: RecoveryTuning::default(),
        scan: ScanTuning::default(),
        motion_gating: MotionGatingTuning::default(),
    }
}

fn boat(cx: f64, cy: f64, confidence: f64) -> Detection {
    Detection {
        bbox: BoundingBox::new(cx - 200.0, cy - 200.0, cx + 200.0, cy + 200.0),
        class_name: "boat".to_string(),
        confidence,
    }
}

/// S3 - a locked target that vanishes for 61 consecutive frames triggers
/// Recovery, which walks Predicted1 -> ZoomOut -> Predicted2 -> Complete and
/// hands control back to Scanning, gated at every step on the CSM reporting
/// IDLE and the configured minimum phase time having elapsed.
#[tokio::test]
async fn s3_lost_target_runs_full_recovery_cycle_then_resumes_scanning() {
    let dir = tempfile::tempdir().unwrap();
    let calibration_path = write_calibration(dir.path(), 60.0, 20.0);
    let scanning_path = write_scan_file(dir.path());

    let mut config = base_config(calibration_path.clone(), scanning_path);
    config.csm.rate_limit_delay_ms = 0;
    config.csm.settling_delay_ms = 1;
    // Real default (2s) - phase advancement is gated on this much wall-clock
    // time elapsing since the phase started, so the test waits it out rather
    // than faking it.
    let phase_min_time = Duration::from_millis(2050);

    let start = PtzPosition::new(2000, 400, 60);
    let driver = Arc::new(SimulatedDriver::new(start));
    let csm = Arc::new(CameraStateManager::new(
        driver.clone(),
        CsmConfig {
            rate_limit_delay: Duration::from_millis(0),
            settling_delay: Duration::from_millis(1),
            max_command_time: Duration::from_secs(15),
            poll_interval: Duration::from_millis(800),
        },
        Some(start),
    ));

    let calibration = CalibrationTable::load(&calibration_path).unwrap();
    let mut pipeline = FramePipeline::new(csm.clone(), calibration, config).unwrap();

    // The selector re-centers/re-zooms on every frame the target is held,
    // lost or not, so a frame may leave the CSM MOVING; settle it back to
    // IDLE the way the background arrival monitor would in production.
    async fn settle(csm: &CameraStateManager<SimulatedDriver>, driver: &SimulatedDriver) {
        if let Some(t) = csm.get_target() {
            driver.set_position(t);
        }
        csm.poll_once().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        csm.poll_once().await;
    }

    let t0 = Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap();
    pipeline.process_frame(&[boat(1320.0, 760.0, 0.9)], t0).await;
    settle(&csm, &driver).await;
    let t1 = t0 + chrono::Duration::seconds(1);
    pipeline.process_frame(&[boat(1334.0, 760.0, 0.9)], t1).await; // promotes to Lock
    settle(&csm, &driver).await;
    let t2 = t0 + chrono::Duration::seconds(2);
    pipeline.process_frame(&[boat(1344.0, 760.0, 0.9)], t2).await;
    settle(&csm, &driver).await;
    assert!(pipeline.status().tracks[0].is_locked);

    // 61 consecutive frames with nothing detected - lost_frames climbs past
    // the recovery threshold (60) on the 61st.
    let mut t = t2;
    for _ in 0..61 {
        t += chrono::Duration::seconds(1);
        pipeline.process_frame(&[], t).await;
        settle(&csm, &driver).await;
    }
    assert_eq!(pipeline.status().mode, TrackingMode::RecoveryPhase(1));

    // First step of the freshly created planner: sends the Predicted1
    // command, but does not advance (elapsed time since the phase started
    // is under `phase_min_time`).
    t += chrono::Duration::seconds(1);
    pipeline.process_frame(&[], t).await;
    settle(&csm, &driver).await;
    assert_eq!(pipeline.status().mode, TrackingMode::RecoveryPhase(1));

    // Wait out the phase minimum before the next tick so the CSM-idle +
    // elapsed-time gate actually trips.
    tokio::time::sleep(phase_min_time).await;
    t += chrono::Duration::milliseconds(1);
    pipeline.process_frame(&[], t).await;
    settle(&csm, &driver).await;
    assert_eq!(pipeline.status().mode, TrackingMode::RecoveryPhase(2));

    // ZoomOut phase: first tick commands zoom = original_zoom / 2 and waits
    // out phase_min_time again before advancing.
    t += chrono::Duration::seconds(1);
    pipeline.process_frame(&[], t).await;
    settle(&csm, &driver).await;
    assert_eq!(pipeline.status().mode, TrackingMode::RecoveryPhase(2));
    tokio::time::sleep(phase_min_time).await;
    t += chrono::Duration::milliseconds(1);
    pipeline.process_frame(&[], t).await;
    settle(&csm, &driver).await;
    assert_eq!(pipeline.status().mode, TrackingMode::RecoveryPhase(3));

    // Predicted2 phase, same pattern.
    t += chrono::Duration::seconds(1);
    pipeline.process_frame(&[], t).await;
    settle(&csm, &driver).await;
    assert_eq!(pipeline.status().mode, TrackingMode::RecoveryPhase(3));
    tokio::time::sleep(phase_min_time).await;
    t += chrono::Duration::milliseconds(1);
    pipeline.process_frame(&[], t).await;

    // Advancing out of Predicted2 lands on Complete, which resolves
    // immediately back to Scanning in the same tick.
    assert_eq!(pipeline.status().mode, TrackingMode::Scanning);
    assert!(pipeline.status().target_id.is_none());
}

/// S4 - with nothing ever detected, the Scan Controller patrols every
/// waypoint in listed order, dwelling at each and skipping none, gated on
/// the CSM reaching arrival tolerance.
#[tokio::test]
async fn s4_scan_cycle_visits_every_waypoint_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let calibration_path = write_calibration(dir.path(), 30.0, 10.0);
    let scanning_path = write_scan_file(dir.path());

    let mut config = base_config(calibration_path.clone(), scanning_path);
    config.csm.rate_limit_delay_ms = 0;
    config.csm.settling_delay_ms = 1;
    config.scan.decision_interval_ms = 0;

    let start = PtzPosition::new(9999, 9999, 50);
    let driver = Arc::new(SimulatedDriver::new(start));
    let csm = Arc::new(CameraStateManager::new(
        driver.clone(),
        CsmConfig {
            rate_limit_delay: Duration::from_millis(0),
            settling_delay: Duration::from_millis(1),
            max_command_time: Duration::from_secs(15),
            poll_interval: Duration::from_millis(800),
        },
        Some(start),
    ));

    let calibration = CalibrationTable::load(&calibration_path).unwrap();
    let mut pipeline = FramePipeline::new(csm.clone(), calibration, config).unwrap();

    let waypoints = [
        PtzPosition::new(0, 0, 10),
        PtzPosition::new(500, 100, 20),
        PtzPosition::new(1000, 0, 10),
    ];

    let mut t = Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap();
    for expected in waypoints {
        // Drive an empty frame so the scan controller commands this waypoint.
        t += chrono::Duration::milliseconds(10);
        pipeline.process_frame(&[], t).await;
        assert_eq!(pipeline.status().mode, TrackingMode::Scanning);

        // Bring the simulated driver to the commanded target and let it settle.
        if let Some(target) = csm.get_target() {
            driver.set_position(target);
        }
        csm.poll_once().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        csm.poll_once().await;
        assert!(csm.is_idle());
        assert_eq!(csm.current_position(), Some(expected));

        // One more empty frame starts the dwell timer, then lets it expire
        // and advance to the next waypoint.
        t += chrono::Duration::milliseconds(10);
        pipeline.process_frame(&[], t).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        t += chrono::Duration::milliseconds(10);
        pipeline.process_frame(&[], t).await;
    }

    // Cycled back to the first waypoint without skipping any.
    t += chrono::Duration::milliseconds(10);
    pipeline.process_frame(&[], t).await;
    if let Some(target) = csm.get_target() {
        driver.set_position(target);
    }
    csm.poll_once().await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    csm.poll_once().await;
    assert_eq!(csm.current_position(), Some(waypoints[0]));
}
