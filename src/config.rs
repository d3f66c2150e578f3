//! Process-wide configuration, read once at startup and treated as
//! immutable thereafter — same as the scan waypoint list and calibration
//! table, which are likewise immutable after load.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::detection::ClassFilter;
use crate::error::Result;
use crate::ptz::HardLimits;

fn default_p1_min_confidence() -> f64 {
    0.30
}

fn default_p2_min_confidence() -> f64 {
    0.30
}

fn default_min_detections_for_lock() -> u32 {
    2
}

fn default_super_lock_detections() -> u32 {
    24
}

fn default_max_lost_frames() -> u32 {
    150
}

fn default_lost_recovery_threshold() -> u32 {
    60
}

fn default_switch_cooldown_frames() -> u32 {
    120
}

fn default_center_trigger_threshold() -> f64 {
    0.01
}

fn default_min_detection_area() -> f64 {
    2000.0
}

fn default_min_detection_side() -> f64 {
    50.0
}

fn default_smoothing_alpha() -> f64 {
    0.3
}

fn default_history_capacity() -> usize {
    20
}

fn default_rate_limit_delay_ms() -> u64 {
    100
}

fn default_settling_delay_ms() -> u64 {
    100
}

fn default_max_command_time_s() -> u64 {
    15
}

fn default_poll_interval_ms() -> u64 {
    800
}

fn default_recovery_timeout_s() -> u64 {
    30
}

fn default_recovery_phase_min_time_s() -> u64 {
    2
}

fn default_scan_decision_interval_ms() -> u64 {
    1000
}

fn default_scan_pan_tolerance() -> i32 {
    30
}

fn default_scan_tilt_tolerance() -> i32 {
    20
}

fn default_scan_zoom_tolerance() -> i32 {
    20
}

fn default_significant_pan_move() -> i32 {
    30
}

fn default_significant_tilt_move() -> i32 {
    20
}

fn default_significant_zoom_move() -> i32 {
    15
}

/// Classes eligible for primary tracking (P1) or target-enhancement
/// association (P2). Either list may be "all", meaning every class name
/// observed is accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassListConfig {
    All,
    Named(Vec<String>),
}

impl From<&ClassListConfig> for ClassFilter {
    fn from(c: &ClassListConfig) -> Self {
        match c {
            ClassListConfig::All => ClassFilter::All,
            ClassListConfig::Named(names) => ClassFilter::Named(names.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorTuning {
    #[serde(default = "default_p1_min_confidence")]
    pub p1_min_confidence: f64,
    #[serde(default = "default_p2_min_confidence")]
    pub p2_min_confidence: f64,
    #[serde(default = "default_min_detections_for_lock")]
    pub min_detections_for_lock: u32,
    #[serde(default = "default_super_lock_detections")]
    pub super_lock_detections: u32,
    #[serde(default = "default_max_lost_frames")]
    pub max_lost_frames: u32,
    #[serde(default = "default_lost_recovery_threshold")]
    pub lost_recovery_threshold: u32,
    #[serde(default = "default_switch_cooldown_frames")]
    pub switch_cooldown_frames: u32,
    #[serde(default = "default_center_trigger_threshold")]
    pub center_trigger_threshold: f64,
    #[serde(default = "default_min_detection_area")]
    pub min_detection_area: f64,
    #[serde(default = "default_min_detection_side")]
    pub min_detection_side: f64,
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for SelectorTuning {
    fn default() -> Self {
        Self {
            p1_min_confidence: default_p1_min_confidence(),
            p2_min_confidence: default_p2_min_confidence(),
            min_detections_for_lock: default_min_detections_for_lock(),
            super_lock_detections: default_super_lock_detections(),
            max_lost_frames: default_max_lost_frames(),
            lost_recovery_threshold: default_lost_recovery_threshold(),
            switch_cooldown_frames: default_switch_cooldown_frames(),
            center_trigger_threshold: default_center_trigger_threshold(),
            min_detection_area: default_min_detection_area(),
            min_detection_side: default_min_detection_side(),
            smoothing_alpha: default_smoothing_alpha(),
            history_capacity: default_history_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CsmTuning {
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    #[serde(default = "default_settling_delay_ms")]
    pub settling_delay_ms: u64,
    #[serde(default = "default_max_command_time_s")]
    pub max_command_time_s: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for CsmTuning {
    fn default() -> Self {
        Self {
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            settling_delay_ms: default_settling_delay_ms(),
            max_command_time_s: default_max_command_time_s(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl CsmTuning {
    pub fn to_csm_config(&self) -> crate::csm::CsmConfig {
        crate::csm::CsmConfig {
            rate_limit_delay: Duration::from_millis(self.rate_limit_delay_ms),
            settling_delay: Duration::from_millis(self.settling_delay_ms),
            max_command_time: Duration::from_secs(self.max_command_time_s),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryTuning {
    #[serde(default = "default_recovery_timeout_s")]
    pub timeout_s: u64,
    #[serde(default = "default_recovery_phase_min_time_s")]
    pub phase_min_time_s: u64,
}

impl Default for RecoveryTuning {
    fn default() -> Self {
        Self {
            timeout_s: default_recovery_timeout_s(),
            phase_min_time_s: default_recovery_phase_min_time_s(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanTuning {
    #[serde(default = "default_scan_decision_interval_ms")]
    pub decision_interval_ms: u64,
    #[serde(default = "default_scan_pan_tolerance")]
    pub pan_tolerance: i32,
    #[serde(default = "default_scan_tilt_tolerance")]
    pub tilt_tolerance: i32,
    #[serde(default = "default_scan_zoom_tolerance")]
    pub zoom_tolerance: i32,
}

impl Default for ScanTuning {
    fn default() -> Self {
        Self {
            decision_interval_ms: default_scan_decision_interval_ms(),
            pan_tolerance: default_scan_pan_tolerance(),
            tilt_tolerance: default_scan_tilt_tolerance(),
            zoom_tolerance: default_scan_zoom_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MotionGatingTuning {
    #[serde(default = "default_significant_pan_move")]
    pub significant_pan_delta: i32,
    #[serde(default = "default_significant_tilt_move")]
    pub significant_tilt_delta: i32,
    #[serde(default = "default_significant_zoom_move")]
    pub significant_zoom_delta: i32,
}

impl Default for MotionGatingTuning {
    fn default() -> Self {
        Self {
            significant_pan_delta: default_significant_pan_move(),
            significant_tilt_delta: default_significant_tilt_move(),
            significant_zoom_delta: default_significant_zoom_move(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub p1_classes: ClassListConfig,
    pub p2_classes: ClassListConfig,

    pub frame_width: f64,
    pub frame_height: f64,

    #[serde(default)]
    pub hard_limits: HardLimitsConfig,
    #[serde(default)]
    pub soft_limits: Option<SoftLimitsConfig>,

    pub calibration_path: PathBuf,
    pub scanning_path: PathBuf,

    #[serde(default)]
    pub selector: SelectorTuning,
    #[serde(default)]
    pub csm: CsmTuning,
    #[serde(default)]
    pub recovery: RecoveryTuning,
    #[serde(default)]
    pub scan: ScanTuning,
    #[serde(default)]
    pub motion_gating: MotionGatingTuning,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HardLimitsConfig {
    pub min_pan: i32,
    pub max_pan: i32,
    pub min_tilt: i32,
    pub max_tilt: i32,
    pub min_zoom: i32,
    pub max_zoom: i32,
}

impl Default for HardLimitsConfig {
    fn default() -> Self {
        let d = HardLimits::default();
        Self {
            min_pan: d.min_pan,
            max_pan: d.max_pan,
            min_tilt: d.min_tilt,
            max_tilt: d.max_tilt,
            min_zoom: d.min_zoom,
            max_zoom: d.max_zoom,
        }
    }
}

impl From<&HardLimitsConfig> for HardLimits {
    fn from(c: &HardLimitsConfig) -> Self {
        HardLimits {
            min_pan: c.min_pan,
            max_pan: c.max_pan,
            min_tilt: c.min_tilt,
            max_tilt: c.max_tilt,
            min_zoom: c.min_zoom,
            max_zoom: c.max_zoom,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SoftLimitsConfig {
    pub min_pan: i32,
    pub max_pan: i32,
    pub min_tilt: i32,
    pub max_tilt: i32,
    pub min_zoom: i32,
    pub max_zoom: i32,
}

impl From<&SoftLimitsConfig> for crate::ptz::SoftLimits {
    fn from(c: &SoftLimitsConfig) -> Self {
        crate::ptz::SoftLimits {
            min_pan: c.min_pan,
            max_pan: c.max_pan,
            min_tilt: c.min_tilt,
            max_tilt: c.max_tilt,
            min_zoom: c.min_zoom,
            max_zoom: c.max_zoom,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        Ok(config)
    }

    pub fn hard_limits(&self) -> HardLimits {
        (&self.hard_limits).into()
    }

    pub fn soft_limits(&self) -> crate::ptz::SoftLimits {
        match &self.soft_limits {
            Some(c) => c.into(),
            None => crate::ptz::SoftLimits::matching(&self.hard_limits()),
        }
    }

    pub fn p1_filter(&self) -> ClassFilter {
        (&self.p1_classes).into()
    }

    pub fn p2_filter(&self) -> ClassFilter {
        (&self.p2_classes).into()
    }
}
