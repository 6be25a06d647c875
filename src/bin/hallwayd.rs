//! hallwayd - continuous hallway detection loop
//!
//! This daemon:
//! 1. Reads frames from the configured source (image file, directory, or stub)
//! 2. Runs detection, colour classification and identity dedup on each frame
//! 3. Notifies on the first sighting of each blue- or green-clad person
//! 4. Paces itself to the configured frame rate until Ctrl-C or end of input

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hallway_detector::{DetectionConfig, FileConfig, FileSource, IdentityTracker, Pipeline};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Frame source: image file, image directory, or stub://<name>.
    #[arg(long)]
    source: Option<String>,
    /// Target frames per second.
    #[arg(long)]
    fps: Option<u32>,
    /// Loop the source forever.
    #[arg(long)]
    repeat: bool,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = DetectionConfig::load()?;
    if let Some(source) = args.source {
        config.source.path = source;
    }
    if let Some(fps) = args.fps {
        if fps == 0 {
            return Err(anyhow!("--fps must be >= 1"));
        }
        config.source.target_fps = fps;
    }
    config.source.repeat |= args.repeat;

    let pipeline = Pipeline::from_config(&config)?;
    let mut source = FileSource::new(FileConfig {
        path: config.source.path.clone(),
        repeat: config.source.repeat,
    })?;
    let mut tracker = IdentityTracker::new(config.thresholds.identity_distance);

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let frame_interval = Duration::from_millis(1000 / u64::from(config.source.target_fps));
    let mut last_health_log = Instant::now();
    let mut frames = 0u64;
    let mut sightings = 0usize;

    log::info!(
        "hallwayd running. source={} fps={} backend={}",
        config.source.path,
        config.source.target_fps,
        pipeline.backend_name().unwrap_or("none (degraded)")
    );

    while running.load(Ordering::SeqCst) {
        if args.max_frames.is_some_and(|max| frames >= max) {
            break;
        }
        let started = Instant::now();
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::info!("frame source exhausted");
                break;
            }
            Err(e) => {
                log::warn!("frame read failed: {:#}", e);
                std::thread::sleep(frame_interval);
                continue;
            }
        };
        frames += 1;

        match pipeline.process(&frame, &mut tracker) {
            Ok(report) => {
                sightings += report.new_persons();
                log::debug!(
                    "frame #{}: {} persons, {} new",
                    frames,
                    report.total_persons(),
                    report.new_persons()
                );
            }
            Err(e) => log::error!("frame #{} failed: {:#}", frames, e),
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = source.stats();
            log::info!(
                "source health={} frames={} identities={} path={}",
                source.is_healthy(),
                stats.frames_captured,
                tracker.len(),
                stats.path
            );
            last_health_log = Instant::now();
        }

        if let Some(remaining) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    log::info!(
        "hallwayd stopped after {} frames, {} distinct people seen",
        frames,
        sightings
    );
    Ok(())
}
