//! PTZ camera tracking and lock-on control.
//!
//! A frame pipeline matches per-frame object detections against persistent
//! tracks, promotes a track to a locked target once it's proven stable,
//! and drives a pan/tilt/zoom camera to keep that target centered and
//! appropriately zoomed. When the target is lost, a recovery maneuver
//! tries to re-find it before falling back to a waypoint scan patrol.

pub mod calibration;
pub mod config;
pub mod csm;
pub mod detection;
pub mod driver;
pub mod error;
pub mod id;
pub mod logging;
pub mod pipeline;
pub mod ptz;
pub mod recovery;
pub mod scan;
pub mod selector;
pub mod spatial;
pub mod status;
pub mod track;

pub use error::{Error, Result};
