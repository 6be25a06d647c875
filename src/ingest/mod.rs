//! Frame ingestion sources.
//!
//! The continuous loop pulls frames from a local source:
//! - Single image files or directories of images
//! - `stub://` synthetic hallway frames (testing and demos)
//!
//! Sources never persist or transmit frames; they only hand them to the pipeline.

pub mod file;

pub use file::{FileConfig, FileSource, FileStats};
