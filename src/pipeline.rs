//! Per-frame detection pipeline.
//!
//! raw network output -> candidate filter -> NMS -> per kept box: crop ->
//! colour -> identity dedup -> notification for new qualifying people.
//!
//! The pipeline itself holds no per-session state. Dedup state lives in the
//! `IdentityTracker` the caller passes in, so the loop form keeps one tracker
//! for the process and the service form scopes trackers per session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::color::{ColorClassifier, ColorLabel};
use crate::config::{DetectionConfig, Thresholds};
use crate::detect::{
    self, BoundingBox, CandidateFilter, DetectorBackend, NonMaxSuppressor,
};
use crate::frame::Frame;
use crate::notify::Notifier;
use crate::tracker::IdentityTracker;

/// A candidate that survived suppression, with its colour and dedup outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct KeptDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
    pub color: ColorLabel,
    /// First sighting of this person in the tracker's session.
    pub is_new: bool,
    /// A notification was issued for this detection.
    pub notified: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub detections: Vec<KeptDetection>,
}

impl FrameReport {
    pub fn total_persons(&self) -> usize {
        self.detections.len()
    }

    pub fn new_persons(&self) -> usize {
        self.detections.iter().filter(|d| d.is_new).count()
    }

    pub fn notifications(&self) -> usize {
        self.detections.iter().filter(|d| d.notified).count()
    }
}

pub struct Pipeline {
    backend: Option<Arc<dyn DetectorBackend>>,
    filter: CandidateFilter,
    nms: NonMaxSuppressor,
    classifier: ColorClassifier,
    notifier: Notifier,
    degraded_reported: AtomicBool,
}

impl Pipeline {
    /// `backend: None` is the degraded state: every run yields no detections.
    pub fn new(
        backend: Option<Arc<dyn DetectorBackend>>,
        thresholds: Thresholds,
        person_class_id: usize,
        notifier: Notifier,
    ) -> Self {
        Self {
            backend,
            filter: CandidateFilter::new(thresholds.confidence, person_class_id),
            nms: NonMaxSuppressor::new(thresholds.score, thresholds.nms_iou),
            classifier: ColorClassifier::new(),
            notifier,
            degraded_reported: AtomicBool::new(false),
        }
    }

    /// Build from configuration. A detector that fails to load leaves the
    /// pipeline degraded instead of failing startup.
    pub fn from_config(cfg: &DetectionConfig) -> Result<Self> {
        let backend = match detect::load_backend(&cfg.detector) {
            Ok(backend) => {
                if let Err(err) = backend.warm_up() {
                    log::warn!("detector warm-up failed: {:#}", err);
                }
                log::info!("detector backend '{}' ready", backend.name());
                Some(backend)
            }
            Err(err) => {
                log::error!(
                    "detector backend '{}' unavailable, running degraded: {:#}",
                    cfg.detector.backend,
                    err
                );
                None
            }
        };
        let notifier = Notifier::from_settings(&cfg.notify)?;
        Ok(Self::new(
            backend,
            cfg.thresholds,
            cfg.detector.person_class_id,
            notifier,
        ))
    }

    pub fn is_degraded(&self) -> bool {
        self.backend.is_none()
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_ref().map(|b| b.name())
    }

    /// Run the full pipeline on one frame against `tracker`.
    pub fn process(&self, frame: &Frame, tracker: &mut IdentityTracker) -> Result<FrameReport> {
        let Some(backend) = self.backend.as_ref() else {
            if !self.degraded_reported.swap(true, Ordering::Relaxed) {
                log::error!("detector not initialised; returning no detections");
            } else {
                log::debug!("detector not initialised; frame skipped");
            }
            return Ok(FrameReport::default());
        };

        let grids = backend.infer(frame)?;
        let candidates = self.filter.filter(&grids, frame.width(), frame.height());
        let kept = self.nms.suppress(&candidates);
        log::debug!(
            "{} candidates, {} kept after suppression",
            candidates.len(),
            kept.len()
        );

        let mut report = FrameReport::default();
        for idx in kept {
            let candidate = &candidates[idx];
            let crop = frame.crop(&candidate.bbox);
            let color = self.classifier.classify(crop.as_ref());
            let is_new = tracker.observe(&candidate.bbox);
            let mut notified = false;
            if is_new {
                let [x, y, w, h] = candidate.bbox.to_pixels();
                log::info!(
                    "Detected: {} at coordinates: ({}, {}, {}, {}) conf={:.2}",
                    color,
                    x,
                    y,
                    w,
                    h,
                    candidate.confidence
                );
                notified = self.notifier.notify(color);
            }
            report.detections.push(KeptDetection {
                bbox: candidate.bbox,
                confidence: candidate.confidence,
                class_id: candidate.class_id,
                color,
                is_new,
                notified,
            });
        }
        Ok(report)
    }
}
