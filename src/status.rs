//! Outward-facing status types: the mode string, current target ID, and a
//! read-only tracked-object snapshot list, as named in the external
//! interfaces the core makes available to overlay/PIP/streaming
//! collaborators. Those collaborators themselves remain out of scope; only
//! the plain data they would consume lives here.

use serde::{Deserialize, Serialize};

use crate::track::TrackedObject;

/// Exactly the mode strings named in the external interface contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    Scanning,
    TrackingPhase1 { n: u32, k: u32 },
    Lock,
    SuperLock,
    LockPeople,
    SuperLockPeople,
    RecoveryPhase(u8),
}

impl std::fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingMode::Scanning => write!(f, "SCANNING"),
            TrackingMode::TrackingPhase1 { n, k } => write!(f, "TRACKING PHASE 1 ({n}/{k})"),
            TrackingMode::Lock => write!(f, "LOCK"),
            TrackingMode::SuperLock => write!(f, "SUPER LOCK"),
            TrackingMode::LockPeople => write!(f, "LOCK + PEOPLE"),
            TrackingMode::SuperLockPeople => write!(f, "SUPER LOCK + PEOPLE"),
            TrackingMode::RecoveryPhase(n) => write!(f, "RECOVERY PHASE {n}"),
        }
    }
}

/// Read-only projection of a Tracked Object's public fields, for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedObjectSnapshot {
    pub id: String,
    pub p1_class: String,
    pub confidence: f64,
    pub center: (f64, f64),
    pub area: f64,
    pub detection_count: u32,
    pub lost_frames: u32,
    pub is_locked: bool,
    pub p2_count: u32,
}

impl From<&TrackedObject> for TrackedObjectSnapshot {
    fn from(o: &TrackedObject) -> Self {
        Self {
            id: o.id.clone(),
            p1_class: o.p1_class.clone(),
            confidence: o.confidence,
            center: o.center,
            area: o.area,
            detection_count: o.detection_count,
            lost_frames: o.lost_frames,
            is_locked: o.is_locked,
            p2_count: o.p2_count,
        }
    }
}

/// Handle for Picture-in-Picture tap-off, populated only for a Super-Lock
/// target with an active P2 association.
#[derive(Debug, Clone)]
pub struct LockedTargetHandle {
    pub target_id: String,
    pub p2_centroid: (f64, f64),
}

#[derive(Debug, Clone)]
pub struct PipelineStatus {
    pub mode: TrackingMode,
    pub target_id: Option<String>,
    pub tracks: Vec<TrackedObjectSnapshot>,
    pub pip_handle: Option<LockedTargetHandle>,
}

impl PipelineStatus {
    /// Clean-form target ID: empty string when nothing is targeted, as the
    /// external interface requires ("current target ID (clean form, no
    /// decorations) or empty").
    pub fn target_id_clean(&self) -> &str {
        self.target_id.as_deref().unwrap_or("")
    }
}
