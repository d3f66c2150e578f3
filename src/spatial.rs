//! Pixel-offset-from-frame-center to PTZ-delta conversion.
//!
//! The frame-center crosshair is the aiming reference: centering a detected
//! object requires moving the camera by the pixel offset scaled by the
//! calibration for the *current* zoom. The calibration is non-linear in
//! zoom, so callers must query the table at the actual zoom of the frame
//! that produced the detection, not some other current zoom.

use tracing::warn;

use crate::calibration::CalibrationTable;
use crate::error::Result;
use crate::ptz::HardLimits;

/// Per-update clamp on how far a single spatial-mapper call may move pan
/// or tilt, independent of the hard PTZ limits.
pub const MAX_DELTA_PER_UPDATE: f64 = 200.0;

pub struct SpatialMapper {
    pub frame_width: f64,
    pub frame_height: f64,
}

/// Result of mapping a pixel position to a PTZ target: the raw (pre-clamp)
/// computed deltas, plus the final clamped absolute target.
#[derive(Debug, Clone, Copy)]
pub struct MappedTarget {
    pub delta_pan: f64,
    pub delta_tilt: f64,
    pub target_pan: f64,
    pub target_tilt: f64,
}

impl SpatialMapper {
    pub fn new(frame_width: f64, frame_height: f64) -> Self {
        Self {
            frame_width,
            frame_height,
        }
    }

    /// Map `(px, py)` in the frame that was captured at `(pan0, tilt0,
    /// zoom0)` to an absolute pan/tilt target (zoom is selected
    /// separately by the progressive-zoom policy). Deltas are clamped to
    /// `MAX_DELTA_PER_UPDATE` and the absolute target is clamped to the
    /// hard PTZ limits; both clamps are logged when they trigger.
    pub fn map_pixel_to_target(
        &self,
        px: f64,
        py: f64,
        pan0: f64,
        tilt0: f64,
        zoom0: f64,
        calibration: &CalibrationTable,
        hard: &HardLimits,
    ) -> Result<MappedTarget> {
        let ox = px - self.frame_width / 2.0;
        let oy = py - self.frame_height / 2.0;

        let px_per_pan = calibration.pixels_per_pan_unit(zoom0)?;
        let px_per_tilt = calibration.pixels_per_tilt_unit(zoom0)?;

        let mut delta_pan = ox / px_per_pan;
        let mut delta_tilt = oy / px_per_tilt;

        if delta_pan.abs() > MAX_DELTA_PER_UPDATE {
            warn!(delta_pan, "spatial mapper clamped oversized pan delta");
            delta_pan = delta_pan.signum() * MAX_DELTA_PER_UPDATE;
        }
        if delta_tilt.abs() > MAX_DELTA_PER_UPDATE {
            warn!(delta_tilt, "spatial mapper clamped oversized tilt delta");
            delta_tilt = delta_tilt.signum() * MAX_DELTA_PER_UPDATE;
        }

        let mut target_pan = pan0 + delta_pan;
        let mut target_tilt = tilt0 + delta_tilt;

        if target_pan < hard.min_pan as f64 || target_pan > hard.max_pan as f64 {
            warn!(target_pan, "spatial mapper clamped target pan to hard limits");
            target_pan = target_pan.clamp(hard.min_pan as f64, hard.max_pan as f64);
        }
        if target_tilt < hard.min_tilt as f64 || target_tilt > hard.max_tilt as f64 {
            warn!(target_tilt, "spatial mapper clamped target tilt to hard limits");
            target_tilt = target_tilt.clamp(hard.min_tilt as f64, hard.max_tilt as f64);
        }

        Ok(MappedTarget {
            delta_pan,
            delta_tilt,
            target_pan,
            target_tilt,
        })
    }

    pub fn frame_center(&self) -> (f64, f64) {
        (self.frame_width / 2.0, self.frame_height / 2.0)
    }
}
