//! Frame Pipeline: the per-frame entry point wiring the Camera State
//! Manager, Track Store, Target Selector, Scan Controller, and Recovery
//! Planner together.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::calibration::CalibrationTable;
use crate::config::Config;
use crate::csm::CameraStateManager;
use crate::detection::Detection;
use crate::driver::CameraDriver;
use crate::ptz::{HardLimits, PtzPosition, SoftLimits};
use crate::recovery::{RecoveryPhase, RecoveryPlanner, RecoveryStepOutcome};
use crate::scan::{self, ScanController};
use crate::selector::TargetSelector;
use crate::spatial::SpatialMapper;
use crate::status::{LockedTargetHandle, PipelineStatus, TrackingMode};
use crate::track::TrackStore;

pub struct FramePipeline<D: CameraDriver + ?Sized + 'static> {
    csm: Arc<CameraStateManager<D>>,
    store: TrackStore,
    selector: TargetSelector,
    scan: ScanController,
    recovery: Option<RecoveryPlanner>,
    calibration: CalibrationTable,
    mapper: SpatialMapper,
    config: Config,
    last_known_camera: Option<PtzPosition>,
    mode: TrackingMode,
}

impl<D: CameraDriver + ?Sized + 'static> FramePipeline<D> {
    pub fn new(csm: Arc<CameraStateManager<D>>, calibration: CalibrationTable, config: Config) -> crate::error::Result<Self> {
        let waypoints = scan::load(&config.scanning_path)?;
        let mapper = SpatialMapper::new(config.frame_width, config.frame_height);
        let scan = ScanController::new(
            waypoints,
            std::time::Duration::from_millis(config.scan.decision_interval_ms),
            config.scan.pan_tolerance,
            config.scan.tilt_tolerance,
            config.scan.zoom_tolerance,
        );
        Ok(Self {
            csm,
            store: TrackStore::new(),
            selector: TargetSelector::new(),
            scan,
            recovery: None,
            calibration,
            mapper,
            config,
            last_known_camera: None,
            mode: TrackingMode::Scanning,
        })
    }

    fn hard(&self) -> HardLimits {
        self.config.hard_limits()
    }

    fn soft(&self) -> SoftLimits {
        self.config.soft_limits()
    }

    /// Filter out detections that cannot possibly be real (confidence
    /// outside [0,1], a degenerate box). Malformed detections are dropped,
    /// not treated as a frame-level error.
    fn sanitize<'a>(&self, detections: &'a [Detection]) -> Vec<&'a Detection> {
        detections
            .iter()
            .filter(|d| {
                if !(0.0..=1.0).contains(&d.confidence) {
                    warn!(confidence = d.confidence, "dropping detection with out-of-range confidence");
                    return false;
                }
                if d.bbox.area() <= 0.0 {
                    warn!("dropping detection with degenerate bounding box");
                    return false;
                }
                true
            })
            .collect()
    }

    fn handle_camera_movement(&mut self, current: PtzPosition) {
        if let Some(prev) = self.last_known_camera {
            let dpan = (current.pan - prev.pan).abs();
            let dtilt = (current.tilt - prev.tilt).abs();
            let dzoom = (current.zoom - prev.zoom).abs();
            let moved = dpan > 0 || dtilt > 0 || dzoom > 0;
            let significant = dpan > self.config.motion_gating.significant_pan_delta
                || dtilt > self.config.motion_gating.significant_tilt_delta
                || dzoom > self.config.motion_gating.significant_zoom_delta;
            if moved {
                self.store.clear_all_history(!significant);
            }
        }
        self.last_known_camera = Some(current);
    }

    fn recovery_mode(phase: RecoveryPhase) -> TrackingMode {
        let n = match phase {
            RecoveryPhase::Predicted1 => 1,
            RecoveryPhase::ZoomOut => 2,
            RecoveryPhase::Predicted2 => 3,
            RecoveryPhase::Complete => 4,
        };
        TrackingMode::RecoveryPhase(n)
    }

    /// Run one frame. `detections` is the raw input for this batch; an
    /// empty or fully-malformed batch is not an error, it's just a frame
    /// with nothing to match.
    pub async fn process_frame(&mut self, detections: &[Detection], now: DateTime<Utc>) {
        let sanitized = self.sanitize(detections);
        let owned: Vec<Detection> = sanitized.into_iter().cloned().collect();

        let camera_pos = self.csm.current_position().unwrap_or(PtzPosition::new(0, 0, 10));
        self.handle_camera_movement(camera_pos);

        let csm_was_idle = self.csm.is_idle();
        let hard = self.hard();
        let soft = self.soft();

        if let Some(mut recovery) = self.recovery.take() {
            let outcome = recovery
                .step(&self.csm, &self.calibration, &soft, &hard, !owned.is_empty())
                .await;
            match outcome {
                RecoveryStepOutcome::Continue => {
                    self.mode = Self::recovery_mode(recovery.phase());
                    self.recovery = Some(recovery);
                    return;
                }
                RecoveryStepOutcome::Done { success } => {
                    if !success {
                        self.selector.clear_target();
                    }
                    // fall through to normal per-frame processing below
                }
            }
        }

        let outcome = self.selector.process_frame(
            &mut self.store,
            &owned,
            now,
            camera_pos.pan as f64,
            camera_pos.tilt as f64,
            camera_pos.zoom as f64,
            csm_was_idle,
            &self.mapper,
            &self.calibration,
            &hard,
            &self.config,
        );

        if let Some((pan, tilt, zoom)) = outcome.camera_command {
            self.csm.send_command(pan, tilt, zoom, &soft, &hard).await;
        }

        if outcome.recovery_needed {
            if let Some(seed) = outcome.recovery_seed {
                self.recovery = Some(RecoveryPlanner::new(
                    seed,
                    self.config.frame_width,
                    std::time::Duration::from_secs(self.config.recovery.phase_min_time_s),
                    std::time::Duration::from_secs(self.config.recovery.timeout_s),
                ));
                self.mode = Self::recovery_mode(RecoveryPhase::Predicted1);
            }
            return;
        }

        self.mode = outcome.mode;

        if outcome.target_id.is_none() {
            self.scan.step(&self.csm, &soft, &hard).await;
        }
    }

    pub fn status(&self) -> PipelineStatus {
        let tracks = self.store.iter().map(Into::into).collect();
        let pip_handle = self.selector.current_target().and_then(|id| {
            let obj = self.store.get(id)?;
            if matches!(self.mode, TrackingMode::SuperLock | TrackingMode::SuperLockPeople) && obj.p2_count > 0 {
                Some(LockedTargetHandle {
                    target_id: obj.id.clone(),
                    p2_centroid: obj.p2_centroid?,
                })
            } else {
                None
            }
        });

        PipelineStatus {
            mode: self.mode,
            target_id: self.selector.current_target().map(|s| s.to_string()),
            tracks,
            pip_handle,
        }
    }
}
