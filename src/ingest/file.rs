//! Local image frame source.
//!
//! `FileSource` feeds the continuous loop from:
//! - a single image file (JPEG/PNG),
//! - a directory of image files, read in name order,
//! - `stub://<name>`, a synthetic hallway frame matching `StubBackend::hallway_scene`.
//!
//! With `repeat` set the source cycles forever; otherwise it reports the end
//! of input by returning `None`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

use crate::detect::backends::stub::HALLWAY_SCENE;
use crate::frame::Frame;

const SYNTHETIC_WIDTH: u32 = 640;
const SYNTHETIC_HEIGHT: u32 = 480;
const SYNTHETIC_BACKGROUND: Rgb<u8> = Rgb([128, 128, 128]);
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Image path, directory path, or `stub://<name>`.
    pub path: String,
    /// Cycle back to the first frame after the last one.
    pub repeat: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: "stub://hallway".to_string(),
            repeat: false,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    config: FileConfig,
    backend: FileBackend,
    frame_count: u64,
    last_error: Option<String>,
}

enum FileBackend {
    Synthetic,
    Images { paths: Vec<PathBuf>, next: usize },
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if config.path.trim().is_empty() {
            return Err(anyhow!("frame source path is empty"));
        }
        let backend = if config.path.starts_with("stub://") {
            FileBackend::Synthetic
        } else if config.path.contains("://") {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        } else {
            FileBackend::Images {
                paths: list_images(Path::new(&config.path))?,
                next: 0,
            }
        };
        Ok(Self {
            config,
            backend,
            frame_count: 0,
            last_error: None,
        })
    }

    /// Read the next frame, or `None` once a non-repeating source is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = match &mut self.backend {
            FileBackend::Synthetic => {
                if !self.config.repeat && self.frame_count > 0 {
                    return Ok(None);
                }
                synthetic_frame()
            }
            FileBackend::Images { paths, next } => {
                if *next >= paths.len() {
                    if !self.config.repeat {
                        return Ok(None);
                    }
                    *next = 0;
                }
                let path = &paths[*next];
                *next += 1;
                match load_image(path) {
                    Ok(frame) => frame,
                    Err(err) => {
                        self.last_error = Some(format!("{:#}", err));
                        return Err(err);
                    }
                }
            }
        };
        self.frame_count += 1;
        self.last_error = None;
        Ok(Some(frame))
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        FileStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_captured: u64,
    pub path: String,
}

/// Grey hallway with one solid-coloured figure per `HALLWAY_SCENE` entry.
pub fn synthetic_frame() -> Frame {
    let mut image = RgbImage::from_pixel(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, SYNTHETIC_BACKGROUND);
    let (fw, fh) = (SYNTHETIC_WIDTH as f32, SYNTHETIC_HEIGHT as f32);
    for person in &HALLWAY_SCENE {
        let x0 = ((person.cx - person.w / 2.0) * fw).max(0.0) as u32;
        let y0 = ((person.cy - person.h / 2.0) * fh).max(0.0) as u32;
        let x1 = (((person.cx + person.w / 2.0) * fw) as u32).min(SYNTHETIC_WIDTH);
        let y1 = (((person.cy + person.h / 2.0) * fh) as u32).min(SYNTHETIC_HEIGHT);
        for y in y0..y1 {
            for x in x0..x1 {
                image.put_pixel(x, y, Rgb(person.rgb));
            }
        }
    }
    Frame::from_image(image)
}

fn list_images(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(anyhow!("frame source {} does not exist", path.display()));
    }
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(path)
        .with_context(|| format!("failed to list {}", path.display()))?
    {
        let entry_path = entry?.path();
        let is_image = entry_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);
        if entry_path.is_file() && is_image {
            paths.push(entry_path);
        }
    }
    if paths.is_empty() {
        return Err(anyhow!("no images found in {}", path.display()));
    }
    paths.sort();
    Ok(paths)
}

fn load_image(path: &Path) -> Result<Frame> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Frame::decode(&bytes).with_context(|| format!("failed to decode {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_yields_one_frame_unless_repeating() {
        let mut once = FileSource::new(FileConfig::default()).unwrap();
        assert!(once.next_frame().unwrap().is_some());
        assert!(once.next_frame().unwrap().is_none());

        let mut looping = FileSource::new(FileConfig {
            repeat: true,
            ..FileConfig::default()
        })
        .unwrap();
        for _ in 0..3 {
            assert!(looping.next_frame().unwrap().is_some());
        }
        assert_eq!(looping.stats().frames_captured, 3);
    }

    #[test]
    fn synthetic_frame_paints_scene_figures() {
        let frame = synthetic_frame();
        assert_eq!((frame.width(), frame.height()), (640, 480));
        // centre of the first figure
        assert_eq!(frame.image().get_pixel(160, 240), &Rgb(HALLWAY_SCENE[0].rgb));
        assert_eq!(frame.image().get_pixel(5, 5), &SYNTHETIC_BACKGROUND);
    }

    #[test]
    fn rejects_remote_urls_and_missing_paths() {
        let remote = FileConfig {
            path: "rtsp://camera-1".to_string(),
            repeat: false,
        };
        assert!(FileSource::new(remote).is_err());
        let missing = FileConfig {
            path: "/nonexistent/hallway".to_string(),
            repeat: false,
        };
        assert!(FileSource::new(missing).is_err());
    }

    #[test]
    fn reads_image_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, shade) in [("b.png", 200u8), ("a.png", 10u8)] {
            RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut source = FileSource::new(FileConfig {
            path: dir.path().to_string_lossy().to_string(),
            repeat: false,
        })
        .unwrap();
        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(first.image().get_pixel(0, 0), &Rgb([10, 10, 10]));
        assert_eq!(second.image().get_pixel(0, 0), &Rgb([200, 200, 200]));
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.is_healthy());
    }
}
