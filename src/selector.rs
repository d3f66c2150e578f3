//! Target Selector / Lock FSM: per-frame detection-to-track association,
//! target promotion/demotion, and the progressive-zoom policy.
//!
//! The per-object state (Candidate/Building/Lock/Super-Lock/Lost) is kept
//! as plain fields on `TrackedObject` rather than a typestate enum — this
//! system's state is small and is read externally (for the mode string)
//! far more often than it's transitioned, so a typestate wrapper would
//! just add indirection at every call site.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::calibration::CalibrationTable;
use crate::config::Config;
use crate::detection::{ClassFilter, Detection};
use crate::id::IdGenerator;
use crate::ptz::HardLimits;
use crate::spatial::SpatialMapper;
use crate::status::TrackingMode;
use crate::track::{TrackStore, TrackedObject};

/// The source system's early-lock fast path (lock after a single detection
/// at >=0.80 confidence) exists below but is wired off here. Do not flip
/// this without a product decision; `early_lock_path_is_dormant` exercises
/// it.
const EARLY_LOCK_ENABLED: bool = false;
const EARLY_LOCK_MIN_CONFIDENCE: f64 = 0.80;

const BBOX_OVERLAP_MIN_IOU: f64 = 0.1;
const PROXIMITY_BASE_PX: f64 = 150.0;
const RAW_DISTANCE_BASE_PX: f64 = 150.0;
const LOCKED_DISTANCE_SCALE: f64 = 3.0;
const PREDICTION_HORIZON_SECONDS: f64 = 1.5;

/// Bridge-zone protection is referenced in the design notes but the
/// predicate is intentionally dormant; it always returns false.
fn is_bridge_zone(_obj: &TrackedObject) -> bool {
    false
}

fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn stability_bonus(obj: &TrackedObject) -> f64 {
    clamp01(1.0 / (1.0 + obj.speed() / 50.0))
}

fn velocity_factor(obj: &TrackedObject) -> f64 {
    (1.0 - obj.speed() / 500.0).clamp(0.3, 1.0)
}

/// Nudge the zoom target toward keeping the P2 cluster's pixel spread
/// within [80, 400] px, using the spread of the currently associated P2
/// detections recorded on the track.
fn p2_zoom_refinement(obj: &TrackedObject) -> f64 {
    if obj.p2_count == 0 {
        return 0.0;
    }
    let mid = 240.0;
    let spread = obj.p2_spread.max(1.0);
    ((mid - spread) / mid) * 10.0
}

fn score(obj: &TrackedObject, frame_center: (f64, f64), max_distance: f64, max_lost_frames: u32) -> f64 {
    let detection_score = (obj.detection_count as f64 / 20.0).min(1.5);
    let confidence = obj.confidence;
    let dist_from_center = obj.distance_to(frame_center.0, frame_center.1);
    let center_score = 1.0 - dist_from_center / max_distance;
    let size_score = (obj.area / 10000.0).min(1.0);
    let stability = stability_bonus(obj);
    let enhancement_bonus = if obj.p2_count > 0 {
        0.5 + 0.2 * obj.p2_count as f64
    } else {
        0.0
    };

    let raw = 0.15 * detection_score
        + 0.15 * confidence
        + 0.10 * center_score
        + 0.25 * size_score
        + 0.15 * stability
        + 0.20 * enhancement_bonus;

    raw * (1.0 - obj.lost_frames as f64 / max_lost_frames as f64)
}

fn meets_lock_criteria(obj: &TrackedObject, cfg: &Config) -> bool {
    if EARLY_LOCK_ENABLED && obj.detection_count >= 1 && obj.confidence >= EARLY_LOCK_MIN_CONFIDENCE {
        return true;
    }
    obj.detection_count >= cfg.selector.min_detections_for_lock
        && obj.confidence >= cfg.selector.p1_min_confidence
}

/// Target zoom and its per-step clamp for the track's current maturity
/// stage, per the progressive-zoom policy.
fn progressive_zoom(
    obj: &TrackedObject,
    current_zoom: f64,
    frame_center: (f64, f64),
    max_distance: f64,
    cfg: &Config,
) -> f64 {
    let stability = stability_bonus(obj);
    let centering = 1.0 - obj.distance_to(frame_center.0, frame_center.1) / max_distance;

    let (raw_target, max_change) = match obj.detection_count {
        0..=3 => (15.0, 5.0),
        4..=6 => {
            let t = 20.0 + 15.0 * clamp01((obj.confidence - 0.3) / 0.7);
            (t, 5.0)
        }
        n if n < cfg.selector.super_lock_detections => {
            let vf = velocity_factor(obj);
            let t = (25.0 + 25.0 * stability + 15.0 * obj.confidence + 10.0 * centering) * vf;
            (t, 15.0)
        }
        _ => {
            let base = 70.0 + 40.0 * stability + 15.0 * obj.confidence + 10.0 * centering;
            (base + p2_zoom_refinement(obj), 25.0)
        }
    };

    let delta = (raw_target - current_zoom).clamp(-max_change, max_change);
    (current_zoom + delta).clamp(10.0, 120.0)
}

fn mode_for(obj: &TrackedObject, cfg: &Config) -> TrackingMode {
    let super_lock = obj.detection_count >= cfg.selector.super_lock_detections;
    let people = obj.p2_count > 0;
    match (obj.is_locked, super_lock, people) {
        (true, true, true) => TrackingMode::SuperLockPeople,
        (true, true, false) => TrackingMode::SuperLock,
        (true, false, true) => TrackingMode::LockPeople,
        (true, false, false) => TrackingMode::Lock,
        (false, _, _) => TrackingMode::TrackingPhase1 {
            n: obj.detection_count,
            k: cfg.selector.min_detections_for_lock,
        },
    }
}

/// Seed carried into the Recovery Planner when a locked target is demoted.
#[derive(Debug, Clone)]
pub struct RecoverySeed {
    pub last_pixel: (f64, f64),
    pub last_spatial: (f64, f64),
    pub direction_avg: (f64, f64),
    pub speed_avg: f64,
    pub original_zoom: f64,
}

/// Result of running one frame through the selector.
#[derive(Debug, Clone)]
pub struct SelectorOutcome {
    pub target_id: Option<String>,
    pub mode: TrackingMode,
    /// Desired absolute (pan, tilt, zoom), if the selector decided the
    /// camera should move this frame. The Frame Pipeline forwards this to
    /// the CSM; the selector itself never talks to the CSM directly so it
    /// stays synchronous and trivially testable.
    pub camera_command: Option<(f64, f64, f64)>,
    pub recovery_needed: bool,
    pub recovery_seed: Option<RecoverySeed>,
}

pub struct TargetSelector {
    current_target: Option<String>,
    frame_counter: u64,
    last_switch_frame: u64,
    id_gen: IdGenerator,
}

impl Default for TargetSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetSelector {
    pub fn new() -> Self {
        Self {
            current_target: None,
            frame_counter: 0,
            last_switch_frame: 0,
            id_gen: IdGenerator::new(),
        }
    }

    pub fn current_target(&self) -> Option<&str> {
        self.current_target.as_deref()
    }

    /// Force the target slot empty, e.g. when the Recovery Planner times
    /// out and control returns to scanning.
    pub fn clear_target(&mut self) {
        self.current_target = None;
    }

    #[allow(clippy::too_many_arguments)]
    pub fn process_frame(
        &mut self,
        store: &mut TrackStore,
        detections: &[Detection],
        now: DateTime<Utc>,
        camera_pan: f64,
        camera_tilt: f64,
        camera_zoom: f64,
        csm_was_idle: bool,
        mapper: &SpatialMapper,
        calibration: &CalibrationTable,
        hard: &HardLimits,
        cfg: &Config,
    ) -> SelectorOutcome {
        self.frame_counter += 1;
        store.age_all();

        let p1_filter = cfg.p1_filter();
        let p2_filter = cfg.p2_filter();

        let (p1_dets, p2_dets): (Vec<&Detection>, Vec<&Detection>) = detections
            .iter()
            .partition(|d| p1_filter.matches(&d.class_name));

        self.match_p1_detections(store, &p1_dets, now, csm_was_idle, cfg);
        self.associate_p2_detections(store, &p2_dets, &p2_filter, cfg);

        store.cleanup(cfg.selector.max_lost_frames);

        let frame_center = mapper.frame_center();
        let max_distance = (frame_center.0.powi(2) + frame_center.1.powi(2)).sqrt();

        let demote = self.current_target.as_ref().is_some_and(|id| {
            store
                .get(id)
                .map(|o| o.is_locked && o.lost_frames > cfg.selector.lost_recovery_threshold)
                .unwrap_or(true)
        });

        if demote {
            let seed = self.current_target.as_ref().and_then(|id| store.get(id)).map(|o| RecoverySeed {
                last_pixel: o.center,
                last_spatial: o.spatial_target.unwrap_or((camera_pan, camera_tilt)),
                direction_avg: o.direction(),
                speed_avg: o.speed(),
                original_zoom: camera_zoom,
            });
            if let Some(id) = &self.current_target {
                info!(target_id = %id, "target lost beyond recovery threshold; demoting");
                if let Some(obj) = store.get_mut(id) {
                    obj.is_locked = false;
                }
            }
            self.current_target = None;
            return SelectorOutcome {
                target_id: None,
                mode: TrackingMode::Scanning,
                camera_command: None,
                recovery_needed: true,
                recovery_seed: seed,
            };
        }

        let keep_current = self.current_target.as_ref().is_some_and(|id| {
            store.get(id).is_some_and(|o| {
                o.is_locked
                    && o.lost_frames <= cfg.selector.lost_recovery_threshold
                    && o.distance_to(frame_center.0, frame_center.1) <= 0.3 * mapper.frame_width
            })
        });

        if !keep_current {
            self.reconsider_target(store, frame_center, max_distance, cfg);
        }

        let Some(target_id) = self.current_target.clone() else {
            return SelectorOutcome {
                target_id: None,
                mode: TrackingMode::Scanning,
                camera_command: None,
                recovery_needed: false,
                recovery_seed: None,
            };
        };

        let mode = store
            .get(&target_id)
            .map(|o| mode_for(o, cfg))
            .unwrap_or(TrackingMode::Scanning);

        let camera_command = self.command_for_target(
            store,
            &target_id,
            camera_pan,
            camera_tilt,
            camera_zoom,
            mapper,
            calibration,
            hard,
            frame_center,
            max_distance,
            cfg,
        );

        SelectorOutcome {
            target_id: Some(target_id),
            mode,
            camera_command,
            recovery_needed: false,
            recovery_seed: None,
        }
    }

    fn match_p1_detections(
        &mut self,
        store: &mut TrackStore,
        p1_dets: &[&Detection],
        now: DateTime<Utc>,
        csm_was_idle: bool,
        cfg: &Config,
    ) {
        let mut matched_this_frame: Vec<String> = Vec::new();

        let mut eligible: Vec<&&Detection> = p1_dets
            .iter()
            .filter(|d| {
                d.bbox.area() >= cfg.selector.min_detection_area
                    && d.bbox.width() > cfg.selector.min_detection_side
                    && d.bbox.height() > cfg.selector.min_detection_side
            })
            .collect();
        eligible.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

        for det in eligible {
            let found = Self::find_match(store, det, &matched_this_frame);
            match found {
                Some(id) => {
                    matched_this_frame.push(id.clone());
                    let was_locked = store.get(&id).map(|o| o.is_locked).unwrap_or(false);
                    if let Some(obj) = store.get_mut(&id) {
                        obj.update_on_match(
                            det.bbox,
                            det.confidence,
                            now,
                            cfg.selector.smoothing_alpha,
                            csm_was_idle,
                        );
                        if !was_locked && meets_lock_criteria(obj, cfg) {
                            obj.is_locked = true;
                            obj.reset_for_lock();
                            info!(target_id = %obj.id, "target locked");
                        }
                    }
                }
                None => {
                    let id = self.id_gen.next_id(now);
                    debug!(track_id = %id, class = %det.class_name, "new track created");
                    store.insert(TrackedObject::new(
                        id,
                        det.class_name.clone(),
                        det.confidence,
                        det.bbox,
                        now,
                        cfg.selector.history_capacity,
                    ));
                }
            }
        }
    }

    fn find_match(store: &TrackStore, det: &Detection, already_matched: &[String]) -> Option<String> {
        let is_free = |id: &str| !already_matched.iter().any(|m| m == id);

        // Tier (a): bounding-box overlap.
        let best_iou = store
            .iter()
            .filter(|o| is_free(&o.id))
            .map(|o| (o.id.clone(), det.bbox.iou(&o.bbox)))
            .filter(|(_, iou)| *iou > BBOX_OVERLAP_MIN_IOU)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        if let Some((id, _)) = best_iou {
            return Some(id);
        }

        let (cx, cy) = det.bbox.center();

        // Tier (b): predicted-position proximity.
        let best_predicted = store
            .iter()
            .filter(|o| is_free(&o.id))
            .map(|o| {
                let (px, py) = o.predicted_center(PREDICTION_HORIZON_SECONDS);
                let dx = px - cx;
                let dy = py - cy;
                let dist = (dx * dx + dy * dy).sqrt();
                let threshold = if o.is_locked {
                    PROXIMITY_BASE_PX * LOCKED_DISTANCE_SCALE
                } else {
                    PROXIMITY_BASE_PX
                };
                (o.id.clone(), dist, threshold)
            })
            .filter(|(_, dist, threshold)| dist <= threshold)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        if let Some((id, _, _)) = best_predicted {
            return Some(id);
        }

        // Tier (c): raw distance to current center.
        let best_raw = store
            .iter()
            .filter(|o| is_free(&o.id))
            .map(|o| {
                let dist = o.distance_to(cx, cy);
                let threshold = if o.is_locked {
                    RAW_DISTANCE_BASE_PX * LOCKED_DISTANCE_SCALE
                } else {
                    RAW_DISTANCE_BASE_PX
                };
                (o.id.clone(), dist, threshold)
            })
            .filter(|(_, dist, threshold)| dist <= threshold)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        best_raw.map(|(id, _, _)| id)
    }

    fn associate_p2_detections(
        &self,
        store: &mut TrackStore,
        p2_dets: &[&Detection],
        p2_filter: &ClassFilter,
        cfg: &Config,
    ) {
        use std::collections::HashMap;

        let mut by_track: HashMap<String, Vec<(f64, f64)>> = HashMap::new();

        for det in p2_dets {
            if !p2_filter.matches(&det.class_name) || det.confidence < cfg.selector.p2_min_confidence {
                continue;
            }
            let (cx, cy) = det.bbox.center();
            let closest = store
                .iter()
                .filter(|o| o.bbox.contains_point(cx, cy))
                .map(|o| (o.id.clone(), o.distance_to(cx, cy)))
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
            if let Some((id, _)) = closest {
                by_track.entry(id).or_default().push((cx, cy));
            }
        }

        for obj in store.iter_mut() {
            match by_track.get(&obj.id) {
                Some(points) => {
                    let count = points.len() as u32;
                    let sum = points.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
                    let centroid = (sum.0 / count as f64, sum.1 / count as f64);
                    let spread = points
                        .iter()
                        .flat_map(|a| points.iter().map(move |b| {
                            let dx = a.0 - b.0;
                            let dy = a.1 - b.1;
                            (dx * dx + dy * dy).sqrt()
                        }))
                        .fold(0.0_f64, f64::max);
                    obj.record_p2(centroid, count, spread);
                    obj.use_p2_target = true;
                }
                None => obj.clear_p2(),
            }
        }
    }

    fn reconsider_target(
        &mut self,
        store: &TrackStore,
        frame_center: (f64, f64),
        max_distance: f64,
        cfg: &Config,
    ) {
        let best = store
            .iter()
            .filter(|o| !is_bridge_zone(o))
            .map(|o| (o.id.clone(), score(o, frame_center, max_distance, cfg.selector.max_lost_frames)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

        let Some((best_id, _)) = best else {
            return;
        };

        match &self.current_target {
            None => {
                self.current_target = Some(best_id);
                self.last_switch_frame = self.frame_counter;
            }
            Some(cur) if *cur != best_id => {
                let elapsed = self.frame_counter.saturating_sub(self.last_switch_frame);
                if elapsed >= cfg.selector.switch_cooldown_frames as u64 {
                    info!(from = %cur, to = %best_id, "switching target");
                    self.current_target = Some(best_id);
                    self.last_switch_frame = self.frame_counter;
                }
            }
            _ => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn command_for_target(
        &self,
        store: &mut TrackStore,
        target_id: &str,
        camera_pan: f64,
        camera_tilt: f64,
        camera_zoom: f64,
        mapper: &SpatialMapper,
        calibration: &CalibrationTable,
        hard: &HardLimits,
        frame_center: (f64, f64),
        max_distance: f64,
        cfg: &Config,
    ) -> Option<(f64, f64, f64)> {
        let obj = store.get_mut(target_id)?;

        let dist_from_center = obj.distance_to(frame_center.0, frame_center.1);
        let zoom_target = progressive_zoom(obj, camera_zoom, frame_center, max_distance, cfg);

        let dist_frac = dist_from_center / mapper.frame_width;
        let zoom_delta = (zoom_target - camera_zoom).abs();
        if dist_frac <= cfg.selector.center_trigger_threshold && zoom_delta < 1.0 {
            return None;
        }

        let mapped = mapper
            .map_pixel_to_target(
                obj.center.0,
                obj.center.1,
                camera_pan,
                camera_tilt,
                camera_zoom,
                calibration,
                hard,
            )
            .ok()?;
        obj.spatial_target = Some((mapped.target_pan, mapped.target_tilt));

        Some((mapped.target_pan, mapped.target_tilt, zoom_target))
    }
}
