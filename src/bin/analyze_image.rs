//! analyze_image - run the detection pipeline once on a local image
//!
//! Prints the same JSON body the detection API returns on success.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use hallway_detector::notify::{build_sink, Notifier};
use hallway_detector::{AnalyzeResponse, DetectionConfig, Frame, IdentityTracker, Pipeline};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file to analyze (JPEG or PNG).
    image: PathBuf,
    /// Detector backend; overrides config.
    #[arg(long)]
    backend: Option<String>,
    /// Send notifications for qualifying people.
    #[arg(long)]
    notify: bool,
    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = DetectionConfig::load()?;
    if let Some(backend) = args.backend {
        config.detector.backend = backend.trim().to_lowercase();
    }

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let frame = Frame::decode(&bytes)
        .with_context(|| format!("invalid image data in {}", args.image.display()))?;

    let backend = hallway_detector::detect::load_backend(&config.detector)?;
    let notifier = if args.notify {
        match build_sink(&config.notify)? {
            Some(sink) => Notifier::inline(sink),
            None => Notifier::disabled(),
        }
    } else {
        Notifier::disabled()
    };
    let pipeline = Pipeline::new(
        Some(backend),
        config.thresholds,
        config.detector.person_class_id,
        notifier,
    );

    let mut tracker = IdentityTracker::new(config.thresholds.identity_distance);
    let report = pipeline.process(&frame, &mut tracker)?;
    let response = AnalyzeResponse::from_report(&report);
    let json = if args.pretty {
        serde_json::to_string_pretty(&response)
    } else {
        serde_json::to_string(&response)
    }
    .map_err(|e| anyhow!("failed to encode response: {}", e))?;
    println!("{}", json);
    Ok(())
}
