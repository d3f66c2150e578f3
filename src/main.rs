use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use ptz_tracker::calibration::CalibrationTable;
use ptz_tracker::config::Config;
use ptz_tracker::csm::CameraStateManager;
use ptz_tracker::detection::Detection;
use ptz_tracker::driver::SimulatedDriver;
use ptz_tracker::pipeline::FramePipeline;
use ptz_tracker::ptz::PtzPosition;
use ptz_tracker::{logging, Result};

/// Autonomous PTZ lock-on tracker: reads per-frame detections from stdin
/// (one JSON array per line) and drives a camera toward whichever object it
/// decides to lock onto.
#[derive(Debug, Parser)]
#[command(name = "ptz-tracker", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Starting pan/tilt/zoom for the simulated driver, as "pan,tilt,zoom".
    #[arg(long, default_value = "0,0,10")]
    start_position: String,
}

fn parse_start_position(raw: &str) -> Option<PtzPosition> {
    let mut parts = raw.split(',');
    let pan = parts.next()?.trim().parse().ok()?;
    let tilt = parts.next()?.trim().parse().ok()?;
    let zoom = parts.next()?.trim().parse().ok()?;
    Some(PtzPosition::new(pan, tilt, zoom))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = logging::init();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    let calibration = CalibrationTable::load(&config.calibration_path)?;

    let start = parse_start_position(&cli.start_position).unwrap_or(PtzPosition::new(0, 0, 10));
    // No concrete wire protocol is specified for the camera driver; this
    // binary runs against the simulated driver until a site-specific
    // `CameraDriver` implementation is wired in.
    let driver = Arc::new(SimulatedDriver::new(start));
    let csm = Arc::new(CameraStateManager::new(
        driver,
        config.csm.to_csm_config(),
        Some(start),
    ));
    csm.clone().spawn_arrival_monitor();

    let mut pipeline = FramePipeline::new(csm, calibration, config)?;
    info!("ptz-tracker started");

    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        let n = stdin.read_line(&mut line).unwrap_or(0);
        if n == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let detections: Vec<Detection> = match serde_json::from_str(trimmed) {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "skipping malformed detection line");
                continue;
            }
        };
        pipeline.process_frame(&detections, chrono::Utc::now()).await;
        let status = pipeline.status();
        info!(mode = %status.mode, target = status.target_id_clean(), "frame processed");
    }

    Ok(())
}
