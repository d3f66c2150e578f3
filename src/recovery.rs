//! Recovery Planner: the three-phase (plus completion) maneuver that tries
//! to re-find a locked target after it's been lost for too long.

use std::time::{Duration, Instant};

use tracing::info;

use crate::calibration::CalibrationTable;
use crate::csm::CameraStateManager;
use crate::driver::CameraDriver;
use crate::ptz::{HardLimits, SoftLimits};
use crate::selector::RecoverySeed;

/// 2x overshoot factor applied to the predicted displacement, per the
/// design notes: better to overshoot toward where the target is headed
/// than undershoot and stay lost.
const OVERSHOOT_FACTOR: f64 = 2.0;
const MAX_DISPLACEMENT_FRAME_WIDTHS: f64 = 1.5;
const PREDICTED_PAN_CLAMP: f64 = 500.0;
const PREDICTED_TILT_CLAMP: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPhase {
    Predicted1,
    ZoomOut,
    Predicted2,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStepOutcome {
    Continue,
    Done { success: bool },
}

pub struct RecoveryPlanner {
    phase: RecoveryPhase,
    seed: RecoverySeed,
    frame_width: f64,
    started_at: Instant,
    phase_started_at: Instant,
    phase_command_sent: bool,
    phase_min_time: Duration,
    timeout: Duration,
}

impl RecoveryPlanner {
    pub fn new(seed: RecoverySeed, frame_width: f64, phase_min_time: Duration, timeout: Duration) -> Self {
        let now = Instant::now();
        info!(last_pixel = ?seed.last_pixel, "recovery started");
        Self {
            phase: RecoveryPhase::Predicted1,
            seed,
            frame_width,
            started_at: now,
            phase_started_at: now,
            phase_command_sent: false,
            phase_min_time,
            timeout,
        }
    }

    pub fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    fn predicted_displacement(&self, elapsed_since_loss: f64) -> (f64, f64) {
        let (dx, dy) = self.seed.direction_avg;
        let magnitude = self.seed.speed_avg * elapsed_since_loss * OVERSHOOT_FACTOR;
        let max_magnitude = MAX_DISPLACEMENT_FRAME_WIDTHS * self.frame_width;
        let magnitude = magnitude.min(max_magnitude);
        (dx * magnitude, dy * magnitude)
    }

    /// Convert a pixel displacement into a pan/tilt delta at the zoom the
    /// target was last seen at, independent of `SpatialMapper`'s own
    /// tighter per-update clamp — Recovery is explicitly allowed larger
    /// single-step moves (pan <=500, tilt <=300) since it's leaping toward
    /// a predicted position rather than nudging a visible one.
    fn displacement_to_target(
        &self,
        dpx: f64,
        dpy: f64,
        calibration: &CalibrationTable,
    ) -> crate::error::Result<(f64, f64)> {
        let px_per_pan = calibration.pixels_per_pan_unit(self.seed.original_zoom)?;
        let px_per_tilt = calibration.pixels_per_tilt_unit(self.seed.original_zoom)?;

        let delta_pan = (dpx / px_per_pan).clamp(-PREDICTED_PAN_CLAMP, PREDICTED_PAN_CLAMP);
        let delta_tilt = (dpy / px_per_tilt).clamp(-PREDICTED_TILT_CLAMP, PREDICTED_TILT_CLAMP);

        let (pan0, tilt0) = self.seed.last_spatial;
        Ok((pan0 + delta_pan, tilt0 + delta_tilt))
    }

    fn advance(&mut self) {
        self.phase = match self.phase {
            RecoveryPhase::Predicted1 => RecoveryPhase::ZoomOut,
            RecoveryPhase::ZoomOut => RecoveryPhase::Predicted2,
            RecoveryPhase::Predicted2 => RecoveryPhase::Complete,
            RecoveryPhase::Complete => RecoveryPhase::Complete,
        };
        self.phase_started_at = Instant::now();
        self.phase_command_sent = false;
        info!(phase = ?self.phase, "recovery phase advanced");
    }

    fn phase_ready_to_advance<D: CameraDriver + ?Sized>(&self, csm: &CameraStateManager<D>) -> bool {
        self.phase_command_sent
            && csm.is_idle()
            && self.phase_started_at.elapsed() >= self.phase_min_time
    }

    /// Run one tick. Checked first: if any detection is present this
    /// frame, recovery exits immediately and normal tracking re-associates
    /// it. If the total recovery timeout has elapsed, force the camera
    /// idle and give up.
    pub async fn step<D: CameraDriver + ?Sized + 'static>(
        &mut self,
        csm: &CameraStateManager<D>,
        calibration: &CalibrationTable,
        soft: &SoftLimits,
        hard: &HardLimits,
        has_any_detection: bool,
    ) -> RecoveryStepOutcome {
        if has_any_detection {
            info!("detection reappeared during recovery; exiting");
            return RecoveryStepOutcome::Done { success: true };
        }
        if self.started_at.elapsed() >= self.timeout {
            csm.force_idle();
            info!("recovery timed out; returning to scanning");
            return RecoveryStepOutcome::Done { success: false };
        }

        match self.phase {
            RecoveryPhase::Predicted1 | RecoveryPhase::Predicted2 => {
                if !self.phase_command_sent {
                    let elapsed_since_loss = self.started_at.elapsed().as_secs_f64();
                    let (dpx, dpy) = self.predicted_displacement(elapsed_since_loss);
                    if let Ok((pan, tilt)) = self.displacement_to_target(dpx, dpy, calibration) {
                        csm.send_command(pan, tilt, self.seed.original_zoom, soft, hard)
                            .await;
                    }
                    self.phase_command_sent = true;
                }
            }
            RecoveryPhase::ZoomOut => {
                if !self.phase_command_sent {
                    let (pan, tilt) = self.seed.last_spatial;
                    csm.send_command(pan, tilt, self.seed.original_zoom * 0.5, soft, hard)
                        .await;
                    self.phase_command_sent = true;
                }
            }
            RecoveryPhase::Complete => {
                return RecoveryStepOutcome::Done { success: false };
            }
        }

        if self.phase_ready_to_advance(csm) {
            self.advance();
            if self.phase == RecoveryPhase::Complete {
                return RecoveryStepOutcome::Done { success: false };
            }
        }

        RecoveryStepOutcome::Continue
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::SimulatedDriver;
    use crate::ptz::{HardLimits as HL, PtzPosition, SoftLimits as SL};
    use std::sync::Arc;

    fn seed() -> RecoverySeed {
        RecoverySeed {
            last_pixel: (1500.0, 800.0),
            last_spatial: (2000.0, 400.0),
            direction_avg: (1.0, 0.0),
            speed_avg: 50.0,
            original_zoom: 60.0,
        }
    }

    fn cal() -> CalibrationTable {
        CalibrationTable::from_samples(&[(60.0, 20.0)], &[(60.0, 20.0)])
    }

    #[tokio::test]
    async fn exits_immediately_on_detection_reappearance() {
        let driver = Arc::new(SimulatedDriver::new(PtzPosition::new(2000, 400, 60)));
        let csm = CameraStateManager::new(driver, Default::default(), Some(PtzPosition::new(2000, 400, 60)));
        let mut planner = RecoveryPlanner::new(seed(), 2688.0, Duration::from_secs(2), Duration::from_secs(30));
        let hard = HL::default();
        let soft = SL::matching(&hard);
        let outcome = planner.step(&csm, &cal(), &soft, &hard, true).await;
        assert_eq!(outcome, RecoveryStepOutcome::Done { success: true });
    }

    #[tokio::test]
    async fn times_out_after_configured_duration() {
        let driver = Arc::new(SimulatedDriver::with_arrival_delay(
            PtzPosition::new(2000, 400, 60),
            1_000_000,
        ));
        let csm = CameraStateManager::new(driver, Default::default(), Some(PtzPosition::new(2000, 400, 60)));
        let mut planner = RecoveryPlanner::new(
            seed(),
            2688.0,
            Duration::from_secs(2),
            Duration::from_millis(5),
        );
        let hard = HL::default();
        let soft = SL::matching(&hard);
        planner.step(&csm, &cal(), &soft, &hard, false).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let outcome = planner.step(&csm, &cal(), &soft, &hard, false).await;
        assert_eq!(outcome, RecoveryStepOutcome::Done { success: false });
    }

    #[tokio::test]
    async fn advances_through_phases_in_order() {
        let target = PtzPosition::new(2000, 400, 60);
        let driver = Arc::new(SimulatedDriver::new(target));
        let csm = Arc::new(CameraStateManager::new(
            driver.clone(),
            crate::csm::CsmConfig {
                settling_delay: Duration::from_millis(1),
                ..Default::default()
            },
            Some(target),
        ));
        let mut planner = RecoveryPlanner::new(
            seed(),
            2688.0,
            Duration::from_millis(5),
            Duration::from_secs(30),
        );
        let hard = HL::default();
        let soft = SL::matching(&hard);

        assert_eq!(planner.phase(), RecoveryPhase::Predicted1);
        planner.step(&csm, &cal(), &soft, &hard, false).await;
        if let Some(t) = csm.get_target() {
            driver.set_position(t);
        }
        csm.poll_once().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        csm.poll_once().await;
        planner.step(&csm, &cal(), &soft, &hard, false).await;
        assert_eq!(planner.phase(), RecoveryPhase::ZoomOut);
    }
}
