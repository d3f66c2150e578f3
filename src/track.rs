//! Tracked Object and Track Store: identity persistence across frames and
//! missed detections.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::detection::BoundingBox;

/// Per-object detection count is monotone but capped; nothing in the
/// scoring or zoom-policy formulas needs it to grow past this.
pub const DETECTION_COUNT_CAP: u32 = 100_000;

/// A locked track's center jumping more than this in one frame is treated
/// as corrupt data, not a real move: the sample is discarded and the
/// track's smoothed state is reset, but the track itself is kept.
pub const TELEPORT_THRESHOLD_PX: f64 = 150.0;

#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub id: String,
    pub p1_class: String,
    pub confidence: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,

    pub center: (f64, f64),
    pub bbox: BoundingBox,
    pub area: f64,
    pub history: VecDeque<(f64, f64)>,
    pub history_capacity: usize,
    /// Pixel velocity, px/s. Only updated from samples taken while the CSM
    /// was IDLE (see invariant: velocity estimation is suspended while the
    /// camera is MOVING).
    pub velocity: (f64, f64),
    last_velocity_sample: Option<(DateTime<Utc>, (f64, f64))>,

    /// Absolute PTZ pan/tilt target for "center this object in frame",
    /// given the camera position at the time it was last computed.
    pub spatial_target: Option<(f64, f64)>,

    pub detection_count: u32,
    pub lost_frames: u32,
    pub is_locked: bool,

    pub p2_count: u32,
    pub p2_centroid: Option<(f64, f64)>,
    /// Largest pairwise pixel distance among this frame's associated P2
    /// detections; feeds the P2 zoom-refinement term.
    pub p2_spread: f64,
    pub use_p2_target: bool,
}

impl TrackedObject {
    pub fn new(
        id: String,
        p1_class: String,
        confidence: f64,
        bbox: BoundingBox,
        now: DateTime<Utc>,
        history_capacity: usize,
    ) -> Self {
        let center = bbox.center();
        let mut history = VecDeque::with_capacity(history_capacity);
        history.push_back(center);
        Self {
            id,
            p1_class,
            confidence,
            first_seen: now,
            last_seen: now,
            center,
            bbox,
            area: bbox.area(),
            history,
            history_capacity,
            velocity: (0.0, 0.0),
            last_velocity_sample: None,
            spatial_target: None,
            detection_count: 1,
            lost_frames: 0,
            is_locked: false,
            p2_count: 0,
            p2_centroid: None,
            p2_spread: 0.0,
            use_p2_target: false,
        }
    }

    fn push_history(&mut self, point: (f64, f64)) {
        self.history.push_back(point);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }

    /// Clear pixel history (used both after a significant camera move and
    /// at the clean-slate lock transition). Velocity is preserved by the
    /// caller when the move was minor; callers clear it explicitly when
    /// appropriate.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.history.push_back(self.center);
    }

    pub fn clear_velocity(&mut self) {
        self.velocity = (0.0, 0.0);
        self.last_velocity_sample = None;
    }

    /// Update this track from a matched detection. For non-locked tracks,
    /// position/size are exponentially smoothed (`alpha`); for locked
    /// tracks, smoothed values are replaced outright with fresh ones.
    ///
    /// `record_velocity_sample` must be false whenever the CSM was MOVING
    /// at the time this detection was captured.
    pub fn update_on_match(
        &mut self,
        bbox: BoundingBox,
        confidence: f64,
        now: DateTime<Utc>,
        alpha: f64,
        record_velocity_sample: bool,
    ) {
        let new_center = bbox.center();
        let new_area = bbox.area();

        if self.is_locked {
            let jump = self.distance_to(new_center.0, new_center.1);
            if jump > TELEPORT_THRESHOLD_PX {
                self.clear_history();
                self.confidence = confidence;
                self.last_seen = now;
                self.lost_frames = 0;
                self.detection_count = (self.detection_count + 1).min(DETECTION_COUNT_CAP);
                return;
            }
            self.center = new_center;
            self.bbox = bbox;
            self.area = new_area;
        } else {
            self.center = (
                alpha * new_center.0 + (1.0 - alpha) * self.center.0,
                alpha * new_center.1 + (1.0 - alpha) * self.center.1,
            );
            self.bbox = bbox;
            self.area = alpha * new_area + (1.0 - alpha) * self.area;
        }

        self.confidence = confidence;
        self.last_seen = now;
        self.lost_frames = 0;
        self.detection_count = (self.detection_count + 1).min(DETECTION_COUNT_CAP);
        self.push_history(self.center);

        if record_velocity_sample {
            if let Some((prev_t, prev_center)) = self.last_velocity_sample {
                let dt = (now - prev_t).num_milliseconds() as f64 / 1000.0;
                if dt > 0.0 {
                    self.velocity = (
                        (self.center.0 - prev_center.0) / dt,
                        (self.center.1 - prev_center.1) / dt,
                    );
                }
            }
            self.last_velocity_sample = Some((now, self.center));
        }
    }

    /// Predicted pixel center `seconds` into the future, using the current
    /// velocity estimate.
    pub fn predicted_center(&self, seconds: f64) -> (f64, f64) {
        (
            self.center.0 + self.velocity.0 * seconds,
            self.center.1 + self.velocity.1 * seconds,
        )
    }

    pub fn speed(&self) -> f64 {
        (self.velocity.0 * self.velocity.0 + self.velocity.1 * self.velocity.1).sqrt()
    }

    /// Unit direction vector of travel; `(0, 0)` when stationary.
    pub fn direction(&self) -> (f64, f64) {
        let s = self.speed();
        if s <= f64::EPSILON {
            (0.0, 0.0)
        } else {
            (self.velocity.0 / s, self.velocity.1 / s)
        }
    }

    /// Reset smoothed pixel state at the moment this track is first
    /// locked, so precision tracking starts fresh (clean slate).
    pub fn reset_for_lock(&mut self) {
        self.clear_history();
    }

    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        let dx = self.center.0 - x;
        let dy = self.center.1 - y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn record_p2(&mut self, centroid: (f64, f64), count: u32, spread: f64) {
        self.p2_count = count;
        self.p2_centroid = Some(centroid);
        self.p2_spread = spread;
    }

    pub fn clear_p2(&mut self) {
        self.p2_count = 0;
        self.p2_centroid = None;
        self.p2_spread = 0.0;
        self.use_p2_target = false;
    }

    pub fn p2_quality(&self) -> f64 {
        if self.p2_count == 0 {
            0.0
        } else {
            (self.p2_count as f64 / 5.0).min(1.0)
        }
    }
}

/// Set of tracked objects keyed by synthetic ID.
#[derive(Debug, Default)]
pub struct TrackStore {
    objects: BTreeMap<String, TrackedObject>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, obj: TrackedObject) {
        self.objects.insert(obj.id.clone(), obj);
    }

    pub fn get(&self, id: &str) -> Option<&TrackedObject> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TrackedObject> {
        self.objects.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<TrackedObject> {
        self.objects.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedObject> {
        self.objects.values_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Increment `lost_frames` for every track (step 1 of the per-frame
    /// selector procedure). Matched tracks have theirs reset to 0 again
    /// once `update_on_match` runs later in the same frame.
    pub fn age_all(&mut self) {
        for obj in self.objects.values_mut() {
            obj.lost_frames += 1;
        }
    }

    /// Remove tracks whose `lost_frames` exceeds `max_lost_frames`.
    pub fn cleanup(&mut self, max_lost_frames: u32) -> Vec<String> {
        let to_remove: Vec<String> = self
            .objects
            .iter()
            .filter(|(_, o)| o.lost_frames > max_lost_frames)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &to_remove {
            self.objects.remove(id);
        }
        to_remove
    }

    pub fn clear_all_history(&mut self, preserve_velocity: bool) {
        for obj in self.objects.values_mut() {
            obj.clear_history();
            if !preserve_velocity {
                obj.clear_velocity();
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    fn bbox(cx: f64, cy: f64) -> BoundingBox {
        BoundingBox::new(cx - 50.0, cy - 50.0, cx + 50.0, cy + 50.0)
    }

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 26, 12, 0, 0).unwrap() + chrono::Duration::seconds(seconds)
    }

    #[test]
    fn lost_frames_zero_iff_matched_last_frame() {
        let mut obj = TrackedObject::new("x".into(), "boat".into(), 0.5, bbox(0.0, 0.0), t(0), 20);
        assert_eq!(obj.lost_frames, 0);
        obj.lost_frames += 1;
        assert_eq!(obj.lost_frames, 1);
        obj.update_on_match(bbox(1.0, 1.0), 0.6, t(1), 0.3, true);
        assert_eq!(obj.lost_frames, 0);
    }

    #[test]
    fn non_locked_smooths_locked_replaces() {
        let mut obj = TrackedObject::new("x".into(), "boat".into(), 0.5, bbox(0.0, 0.0), t(0), 20);
        obj.update_on_match(bbox(100.0, 0.0), 0.6, t(1), 0.3, false);
        assert_abs_diff_eq!(obj.center.0, 30.0, epsilon = 1e-9);

        obj.is_locked = true;
        obj.update_on_match(bbox(150.0, 0.0), 0.6, t(2), 0.3, false);
        assert_abs_diff_eq!(obj.center.0, 150.0, epsilon = 1e-9);
    }

    #[test]
    fn locked_teleport_is_discarded_and_resets_history() {
        let mut obj = TrackedObject::new("x".into(), "boat".into(), 0.5, bbox(0.0, 0.0), t(0), 20);
        obj.is_locked = true;
        obj.update_on_match(bbox(1000.0, 0.0), 0.9, t(1), 0.3, false);
        assert_eq!(obj.center, (0.0, 0.0), "corrupt sample must not move the track");
        assert_eq!(obj.history.len(), 1);
        assert_eq!(obj.lost_frames, 0, "still counts as matched this frame");
        assert_eq!(obj.confidence, 0.9);
    }

    #[test]
    fn velocity_only_recorded_when_requested() {
        let mut obj = TrackedObject::new("x".into(), "boat".into(), 0.5, bbox(0.0, 0.0), t(0), 20);
        obj.update_on_match(bbox(100.0, 0.0), 0.6, t(1), 0.3, false);
        assert_eq!(obj.velocity, (0.0, 0.0));

        let mut obj2 = TrackedObject::new("y".into(), "boat".into(), 0.5, bbox(0.0, 0.0), t(0), 20);
        obj2.update_on_match(bbox(0.0, 0.0), 0.6, t(0), 0.3, true);
        obj2.update_on_match(bbox(100.0, 0.0), 0.6, t(1), 0.3, true);
        assert_abs_diff_eq!(obj2.velocity.0, 100.0, epsilon = 1e-6);
    }

    #[test]
    fn history_capped_at_capacity() {
        let mut obj = TrackedObject::new("x".into(), "boat".into(), 0.5, bbox(0.0, 0.0), t(0), 3);
        for i in 0..10 {
            obj.update_on_match(bbox(i as f64, 0.0), 0.6, t(i), 0.3, false);
        }
        assert_eq!(obj.history.len(), 3);
    }

    #[test]
    fn cleanup_removes_past_max_lost_frames() {
        let mut store = TrackStore::new();
        store.insert(TrackedObject::new(
            "a".into(),
            "boat".into(),
            0.5,
            bbox(0.0, 0.0),
            t(0),
            20,
        ));
        for obj in store.iter_mut() {
            obj.lost_frames = 200;
        }
        let removed = store.cleanup(150);
        assert_eq!(removed, vec!["a".to_string()]);
        assert!(store.is_empty());
    }
}
