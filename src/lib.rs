//! Hallway person detection.
//!
//! Post-processing for a YOLO-style person detector watching a hallway camera:
//! raw network output is reduced to confident person candidates, overlapping
//! boxes are suppressed, each kept person is labelled by the dominant colour
//! of their clothing, repeat sightings are collapsed into identities, and the
//! first sighting of a blue- or green-clad person raises a notification.
//!
//! # Module Structure
//!
//! - `detect`: detector backends, candidate filtering, non-max suppression
//! - `color`: HSV clothing colour classification
//! - `tracker`: centroid-distance identity dedup, per-session stores
//! - `notify`: notification trigger and delivery sinks
//! - `pipeline`: the per-frame pipeline tying the stages together
//! - `frame`, `ingest`: frame container and local frame sources
//! - `api`: HTTP service form
//! - `config`: file and environment configuration

pub mod api;
pub mod color;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod tracker;

pub use api::{AnalyzeResponse, ApiConfig, ApiHandle, ApiServer};
pub use color::{ColorClassifier, ColorLabel};
pub use config::{DetectionConfig, Thresholds};
pub use detect::{
    BoundingBox, Candidate, CandidateFilter, DetectorBackend, NonMaxSuppressor, PredictionGrid,
    StubBackend,
};
pub use frame::Frame;
pub use ingest::{FileConfig, FileSource};
pub use notify::{Notification, NotificationSink, Notifier};
pub use pipeline::{FrameReport, KeptDetection, Pipeline};
pub use tracker::{IdentityTracker, SessionStore};
