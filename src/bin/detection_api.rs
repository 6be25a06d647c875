//! detection_api - HTTP service form of the hallway detector
//!
//! This daemon:
//! 1. Loads the detector once and shares it across requests
//! 2. Serves the detection API
//! 3. Does NOT read frames on its own

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::{mpsc, Arc};

use hallway_detector::{ApiConfig, ApiServer, DetectionConfig, Pipeline};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Listen address; overrides config and HALLWAY_API_ADDR.
    #[arg(long)]
    addr: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = DetectionConfig::load()?;
    if let Some(addr) = args.addr {
        config.api.addr = addr;
    }

    let pipeline = Arc::new(Pipeline::from_config(&config)?);
    if pipeline.is_degraded() {
        log::warn!("detector unavailable; every request will report no detections");
    }
    let api_config = ApiConfig::from_settings(&config.api, config.thresholds.identity_distance);
    let api_handle = ApiServer::new(api_config, pipeline).spawn()?;
    log::info!("detection_api running on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("detection_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
