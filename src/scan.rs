//! Scan Controller: the waypoint patrol loop that runs whenever no target
//! is held.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info};

use crate::csm::CameraStateManager;
use crate::driver::CameraDriver;
use crate::error::{file_error, Error, Result};
use crate::ptz::{HardLimits, SoftLimits};

#[derive(Debug, Clone, Copy, Deserialize)]
struct RawPosition {
    pan: i32,
    tilt: i32,
    zoom: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct RawWaypoint {
    #[allow(dead_code)]
    id: Option<String>,
    #[allow(dead_code)]
    name: Option<String>,
    position: RawPosition,
    dwell_time_seconds: f64,
    #[allow(dead_code)]
    timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScanFile {
    positions: Vec<RawWaypoint>,
}

#[derive(Debug, Clone, Copy)]
pub struct Waypoint {
    pub pan: i32,
    pub tilt: i32,
    pub zoom: i32,
    pub dwell: Duration,
}

/// Load the scan waypoint file. Absence or malformed content is a fatal
/// configuration error, matching the external-interface contract.
pub fn load(path: &Path) -> Result<Vec<Waypoint>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| file_error("scanning pattern file", path.display().to_string(), e))?;
    let parsed: ScanFile = serde_json::from_str(&text)
        .map_err(|e| file_error("scanning pattern file", path.display().to_string(), e))?;

    if parsed.positions.is_empty() {
        return Err(Error::ConfigInvalid(
            "scanning pattern file has no positions".to_string(),
        ));
    }

    Ok(parsed
        .positions
        .into_iter()
        .map(|w| Waypoint {
            pan: w.position.pan,
            tilt: w.position.tilt,
            zoom: w.position.zoom,
            dwell: Duration::from_secs_f64(w.dwell_time_seconds.max(0.0)),
        })
        .collect())
}

pub struct ScanController {
    waypoints: Vec<Waypoint>,
    index: usize,
    commanded: bool,
    dwell_started: Option<Instant>,
    last_decision: Option<Instant>,
    decision_interval: Duration,
    pan_tolerance: i32,
    tilt_tolerance: i32,
    zoom_tolerance: i32,
}

impl ScanController {
    /// `decision_interval` is the minimum gap between scan decisions
    /// (default 1 s, see `ScanTuning::decision_interval_ms`). The
    /// tolerance fields are the `ScanTuning::{pan,tilt,zoom}_tolerance`
    /// deadbands used by `within_tolerance` to decide a waypoint has been
    /// reached.
    pub fn new(
        waypoints: Vec<Waypoint>,
        decision_interval: Duration,
        pan_tolerance: i32,
        tilt_tolerance: i32,
        zoom_tolerance: i32,
    ) -> Self {
        Self {
            waypoints,
            index: 0,
            commanded: false,
            dwell_started: None,
            last_decision: None,
            decision_interval,
            pan_tolerance,
            tilt_tolerance,
            zoom_tolerance,
        }
    }

    pub fn current_waypoint(&self) -> Waypoint {
        self.waypoints[self.index]
    }

    fn within_tolerance(&self, pan: i32, tilt: i32, zoom: i32) -> bool {
        let w = self.current_waypoint();
        (pan - w.pan).abs() <= self.pan_tolerance
            && (tilt - w.tilt).abs() <= self.tilt_tolerance
            && (zoom - w.zoom).abs() <= self.zoom_tolerance
    }

    /// Run one scan-controller tick. Rate-limited to at most once per
    /// second internally; calling more often than that is a no-op.
    pub async fn step<D: CameraDriver + ?Sized + 'static>(
        &mut self,
        csm: &CameraStateManager<D>,
        soft: &SoftLimits,
        hard: &HardLimits,
    ) {
        let now = Instant::now();
        if let Some(last) = self.last_decision {
            if now.duration_since(last) < self.decision_interval {
                return;
            }
        }
        self.last_decision = Some(now);

        if !self.commanded {
            let w = self.current_waypoint();
            let accepted = csm
                .send_command(w.pan as f64, w.tilt as f64, w.zoom as f64, soft, hard)
                .await;
            if accepted {
                debug!(index = self.index, ?w, "scan waypoint commanded");
                self.commanded = true;
            }
            return;
        }

        let Some(pos) = csm.current_position() else {
            return;
        };
        if csm.is_idle() && self.within_tolerance(pos.pan, pos.tilt, pos.zoom) {
            match self.dwell_started {
                None => self.dwell_started = Some(now),
                Some(since) => {
                    if now.duration_since(since) >= self.current_waypoint().dwell {
                        self.index = (self.index + 1) % self.waypoints.len();
                        self.commanded = false;
                        self.dwell_started = None;
                        info!(index = self.index, "scan advanced to next waypoint");
                    }
                }
            }
        } else {
            self.dwell_started = None;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::SimulatedDriver;
    use crate::ptz::PtzPosition;
    use std::sync::Arc;

    fn waypoints() -> Vec<Waypoint> {
        vec![
            Waypoint {
                pan: 0,
                tilt: 0,
                zoom: 10,
                dwell: Duration::from_millis(5),
            },
            Waypoint {
                pan: 500,
                tilt: 100,
                zoom: 20,
                dwell: Duration::from_millis(5),
            },
        ]
    }

    fn limits() -> (SoftLimits, HardLimits) {
        let hard = HardLimits::default();
        (SoftLimits::matching(&hard), hard)
    }

    #[test]
    fn parses_scanning_json_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanning.json");
        std::fs::write(
            &path,
            r#"{"positions": [
                {"id": "1", "name": "north", "position": {"pan": 0, "tilt": 0, "zoom": 10}, "dwell_time_seconds": 5, "timestamp": "2026-01-01"},
                {"id": "2", "name": "east", "position": {"pan": 900, "tilt": 50, "zoom": 20}, "dwell_time_seconds": 3, "timestamp": "2026-01-01"}
            ]}"#,
        )
        .unwrap();
        let waypoints = load(&path).unwrap();
        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[1].pan, 900);
    }

    #[test]
    fn missing_file_is_fatal() {
        let result = load(Path::new("/nonexistent/scanning.json"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn visits_waypoints_in_order_without_skipping() {
        let driver = Arc::new(SimulatedDriver::new(PtzPosition::new(999, 999, 50)));
        let csm = Arc::new(CameraStateManager::new(
            driver.clone(),
            crate::csm::CsmConfig {
                rate_limit_delay: Duration::from_millis(0),
                settling_delay: Duration::from_millis(1),
                ..Default::default()
            },
            Some(PtzPosition::new(999, 999, 50)),
        ));
        let mut scan = ScanController::new(waypoints(), Duration::from_millis(1), 30, 20, 20);
        let (soft, hard) = limits();

        scan.step(&csm, &soft, &hard).await;
        assert!(scan.commanded);

        driver.set_position(PtzPosition::new(0, 0, 10));
        tokio::time::sleep(Duration::from_millis(2)).await;
        csm.poll_once().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        csm.poll_once().await;
        assert!(csm.is_idle());

        tokio::time::sleep(Duration::from_millis(2)).await;
        scan.step(&csm, &soft, &hard).await; // starts the dwell timer
        assert_eq!(scan.index, 0);

        tokio::time::sleep(Duration::from_millis(10)).await; // dwell (5ms) + decision gap
        scan.step(&csm, &soft, &hard).await; // dwell expired, advances
        assert_eq!(scan.index, 1);
    }
}
