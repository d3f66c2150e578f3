//! Zoom-dependent pixels-per-PTZ-unit calibration.
//!
//! The camera's angular resolution is not linear in zoom, so we never try
//! to fit a closed-form model. Instead we keep the sampled table from
//! `pixels-inches-cal.json` and linearly interpolate between the two
//! nearest samples, clamping outside the sampled range.

use serde::Deserialize;

use crate::error::{file_error, Error, Result};

/// One row of the calibration file as it appears on disk.
#[derive(Debug, Clone, Deserialize)]
struct CalibrationDataPoint {
    zoom_level: f64,
    pixels_for_reference: f64,
    pixels_per_inch: f64,
    #[allow(dead_code)]
    #[serde(default)]
    measurement_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct FrameDimensions {
    #[allow(dead_code)]
    width: f64,
    #[allow(dead_code)]
    height: f64,
}

/// Raw on-disk shape of `pixels-inches-cal.json`, per the external
/// interface contract. Pan and tilt calibrations, when not supplied
/// separately, are derived from the same pixels-per-inch measurement.
#[derive(Debug, Clone, Deserialize)]
struct CalibrationFile {
    #[allow(dead_code)]
    calibration_type: Option<String>,
    #[allow(dead_code)]
    frame_dimensions: Option<FrameDimensions>,
    #[allow(dead_code)]
    reference_distance: Option<f64>,
    #[allow(dead_code)]
    reference_unit: Option<String>,
    calibration_data: Vec<CalibrationDataPoint>,
    /// Present only when pan/tilt calibrations were measured separately;
    /// when absent both axes share `calibration_data`.
    #[serde(default)]
    tilt_calibration_data: Option<Vec<CalibrationDataPoint>>,
}

/// A single interpolatable zoom -> pixels-per-unit curve.
#[derive(Debug, Clone)]
struct Curve {
    /// Sorted ascending by zoom.
    samples: Vec<(f64, f64)>,
}

impl Curve {
    fn from_points(points: &[CalibrationDataPoint]) -> Self {
        let mut samples: Vec<(f64, f64)> = points
            .iter()
            .map(|p| {
                let px_per_unit = if p.pixels_for_reference > 0.0 {
                    p.pixels_for_reference
                } else {
                    p.pixels_per_inch
                };
                (p.zoom_level, px_per_unit)
            })
            .collect();
        samples.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        Self { samples }
    }

    /// Linear interpolation between the two nearest samples; clamp to the
    /// nearest sample outside the sampled range.
    fn lookup(&self, zoom: f64) -> Result<f64> {
        if self.samples.is_empty() {
            return Err(Error::EmptyCalibrationTable);
        }
        if self.samples.len() == 1 {
            return Ok(self.samples[0].1);
        }

        if zoom <= self.samples[0].0 {
            return Ok(self.samples[0].1);
        }
        if zoom >= self.samples[self.samples.len() - 1].0 {
            return Ok(self.samples[self.samples.len() - 1].1);
        }

        let idx = self
            .samples
            .windows(2)
            .position(|w| zoom >= w[0].0 && zoom <= w[1].0)
            .expect("zoom within range must fall in some window");
        let (z0, v0) = self.samples[idx];
        let (z1, v1) = self.samples[idx + 1];
        if (z1 - z0).abs() < f64::EPSILON {
            return Ok(v0);
        }
        let t = (zoom - z0) / (z1 - z0);
        Ok(v0 + t * (v1 - v0))
    }
}

/// Interpolated pixels-per-pan-unit and pixels-per-tilt-unit at any zoom.
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    pan: Curve,
    tilt: Curve,
}

impl CalibrationTable {
    pub fn pixels_per_pan_unit(&self, zoom: f64) -> Result<f64> {
        self.pan.lookup(zoom)
    }

    pub fn pixels_per_tilt_unit(&self, zoom: f64) -> Result<f64> {
        self.tilt.lookup(zoom)
    }

    /// Parse a calibration JSON file into pan/tilt lookup curves.
    ///
    /// When the file carries only one `calibration_data` array, both axes
    /// share the same pixels-per-unit scale (a single measured reference
    /// distance applies equally to pan and tilt motion at a given zoom).
    /// When `tilt_calibration_data` is present, pan and tilt are derived
    /// independently.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| file_error("calibration file", path.display().to_string(), e))?;
        let parsed: CalibrationFile = serde_json::from_str(&text)
            .map_err(|e| file_error("calibration file", path.display().to_string(), e))?;

        let pan = Curve::from_points(&parsed.calibration_data);
        let tilt = match &parsed.tilt_calibration_data {
            Some(points) => Curve::from_points(points),
            None => Curve::from_points(&parsed.calibration_data),
        };

        if pan.samples.is_empty() {
            return Err(Error::EmptyCalibrationTable);
        }

        Ok(Self { pan, tilt })
    }

    #[cfg(test)]
    pub(crate) fn from_samples(pan: &[(f64, f64)], tilt: &[(f64, f64)]) -> Self {
        Self {
            pan: Curve {
                samples: pan.to_vec(),
            },
            tilt: Curve {
                samples: tilt.to_vec(),
            },
        }
    }
}
