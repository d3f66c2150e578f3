//! Absolute PTZ position and the soft/hard limit clamps applied to it.

use serde::{Deserialize, Serialize};

/// An absolute pan/tilt/zoom position, always integer-valued.
///
/// Fractional targets are a bug: every command and every reported position
/// is rounded to the nearest integer before it is compared or stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtzPosition {
    pub pan: i32,
    pub tilt: i32,
    pub zoom: i32,
}

impl PtzPosition {
    pub fn new(pan: i32, tilt: i32, zoom: i32) -> Self {
        Self { pan, tilt, zoom }
    }
}

/// Hardware-fixed limits. Never user-overridable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardLimits {
    pub min_pan: i32,
    pub max_pan: i32,
    pub min_tilt: i32,
    pub max_tilt: i32,
    pub min_zoom: i32,
    pub max_zoom: i32,
}

impl Default for HardLimits {
    fn default() -> Self {
        Self {
            min_pan: 0,
            max_pan: 3590,
            min_tilt: 0,
            max_tilt: 900,
            min_zoom: 10,
            max_zoom: 120,
        }
    }
}

/// User-overridable limits, always tightened to fit within `HardLimits`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftLimits {
    pub min_pan: i32,
    pub max_pan: i32,
    pub min_tilt: i32,
    pub max_tilt: i32,
    pub min_zoom: i32,
    pub max_zoom: i32,
}

impl SoftLimits {
    pub fn matching(hard: &HardLimits) -> Self {
        Self {
            min_pan: hard.min_pan,
            max_pan: hard.max_pan,
            min_tilt: hard.min_tilt,
            max_tilt: hard.max_tilt,
            min_zoom: hard.min_zoom,
            max_zoom: hard.max_zoom,
        }
    }
}

fn clamp_i32(v: f64, lo: i32, hi: i32) -> i32 {
    (v.round() as i32).clamp(lo, hi)
}

/// Clamp a raw floating-point target first to the soft limits, then to the
/// hard limits, rounding each axis to an integer in the process. This is
/// the only place a target is allowed to cross from `f64` to `PtzPosition`.
pub fn clamp_target(
    pan: f64,
    tilt: f64,
    zoom: f64,
    soft: &SoftLimits,
    hard: &HardLimits,
) -> PtzPosition {
    let pan = pan.clamp(soft.min_pan as f64, soft.max_pan as f64);
    let tilt = tilt.clamp(soft.min_tilt as f64, soft.max_tilt as f64);
    let zoom = zoom.clamp(soft.min_zoom as f64, soft.max_zoom as f64);

    PtzPosition {
        pan: clamp_i32(pan, hard.min_pan, hard.max_pan),
        tilt: clamp_i32(tilt, hard.min_tilt, hard.max_tilt),
        zoom: clamp_i32(zoom, hard.min_zoom, hard.max_zoom),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clamp_rounds_and_clips() {
        let hard = HardLimits::default();
        let soft = SoftLimits::matching(&hard);
        let p = clamp_target(4000.0, -50.0, 9.6, &soft, &hard);
        assert_eq!(p, PtzPosition::new(3590, 0, 10));
    }

    #[test]
    fn clamp_respects_soft_before_hard() {
        let hard = HardLimits::default();
        let soft = SoftLimits {
            max_pan: 1000,
            ..SoftLimits::matching(&hard)
        };
        let p = clamp_target(2000.0, 100.0, 30.0, &soft, &hard);
        assert_eq!(p.pan, 1000);
    }
}
