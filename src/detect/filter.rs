//! Candidate filtering over raw network output.

use super::result::{BoundingBox, Candidate, PredictionGrid};

/// Index of the first class score in a prediction row.
const CLASS_SCORES_OFFSET: usize = 5;

/// Turns raw per-cell predictions into person candidates.
#[derive(Clone, Copy, Debug)]
pub struct CandidateFilter {
    confidence_threshold: f32,
    person_class_id: usize,
}

impl CandidateFilter {
    pub fn new(confidence_threshold: f32, person_class_id: usize) -> Self {
        Self {
            confidence_threshold,
            person_class_id,
        }
    }

    /// Scan every row of every grid and keep person candidates.
    ///
    /// A row qualifies when `objectness * best_class_score` is strictly above
    /// the threshold and the best class is the person class. Coordinates are
    /// denormalised against the frame size and converted to a top-left box.
    pub fn filter(&self, grids: &[PredictionGrid], width: u32, height: u32) -> Vec<Candidate> {
        let (width, height) = (width as f32, height as f32);
        let mut candidates = Vec::new();
        for grid in grids {
            if grid.stride() <= CLASS_SCORES_OFFSET {
                log::debug!(
                    "skipping prediction grid with stride {} (no class scores)",
                    grid.stride()
                );
                continue;
            }
            for row in grid.rows() {
                let Some((class_id, class_score)) = best_class(&row[CLASS_SCORES_OFFSET..]) else {
                    continue;
                };
                let confidence = row[4] * class_score;
                // NaN never passes.
                let above_threshold = confidence > self.confidence_threshold;
                if !above_threshold || class_id != self.person_class_id {
                    continue;
                }
                let bbox = BoundingBox::from_center(
                    row[0] * width,
                    row[1] * height,
                    row[2] * width,
                    row[3] * height,
                );
                candidates.push(Candidate {
                    bbox,
                    confidence,
                    class_id,
                });
            }
        }
        candidates
    }
}

/// Argmax over class scores. The first index wins ties.
fn best_class(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        match best {
            Some((_, current)) if score <= current => {}
            _ => best = Some((idx, score)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cx: f32, cy: f32, w: f32, h: f32, obj: f32, scores: &[f32]) -> Vec<f32> {
        let mut r = vec![cx, cy, w, h, obj];
        r.extend_from_slice(scores);
        r
    }

    fn grid(rows: &[Vec<f32>]) -> PredictionGrid {
        PredictionGrid::from_rows(rows).unwrap()
    }

    #[test]
    fn keeps_confident_person_rows() {
        let g = grid(&[row(0.5, 0.5, 0.2, 0.4, 1.0, &[0.9, 0.1])]);
        let out = CandidateFilter::new(0.5, 0).filter(&[g], 200, 100);
        assert_eq!(out.len(), 1);
        let c = &out[0];
        assert!((c.confidence - 0.9).abs() < 1e-6);
        assert_eq!(c.class_id, 0);
        assert_eq!(c.bbox, BoundingBox::new(80.0, 30.0, 40.0, 40.0));
    }

    #[test]
    fn confidence_combines_objectness_and_class_score() {
        // 0.6 * 0.9 = 0.54 passes, 0.5 * 0.9 = 0.45 does not
        let g = grid(&[
            row(0.5, 0.5, 0.1, 0.1, 0.6, &[0.9, 0.0]),
            row(0.5, 0.5, 0.1, 0.1, 0.5, &[0.9, 0.0]),
        ]);
        let out = CandidateFilter::new(0.5, 0).filter(&[g], 100, 100);
        assert_eq!(out.len(), 1);
        assert!((out[0].confidence - 0.54).abs() < 1e-6);
    }

    #[test]
    fn threshold_is_strict() {
        let g = grid(&[row(0.5, 0.5, 0.1, 0.1, 1.0, &[0.5])]);
        assert!(CandidateFilter::new(0.5, 0).filter(&[g], 100, 100).is_empty());
    }

    #[test]
    fn nan_confidence_never_passes() {
        let g = grid(&[
            row(0.5, 0.5, 0.1, 0.1, f32::NAN, &[0.9]),
            row(0.5, 0.5, 0.1, 0.1, 1.0, &[f32::NAN]),
        ]);
        assert!(CandidateFilter::new(0.5, 0).filter(&[g], 100, 100).is_empty());
    }

    #[test]
    fn drops_rows_whose_best_class_is_not_person() {
        let g = grid(&[row(0.5, 0.5, 0.1, 0.1, 1.0, &[0.8, 0.95])]);
        assert!(CandidateFilter::new(0.5, 0).filter(&[g], 100, 100).is_empty());
    }

    #[test]
    fn boxes_are_not_clamped_to_the_frame() {
        let g = grid(&[row(0.0, 0.0, 0.5, 0.5, 1.0, &[1.0])]);
        let out = CandidateFilter::new(0.5, 0).filter(&[g], 100, 100);
        assert_eq!(out[0].bbox, BoundingBox::new(-25.0, -25.0, 50.0, 50.0));
    }

    #[test]
    fn scans_every_grid_and_skips_short_rows() {
        let short = PredictionGrid::new(5, vec![0.5, 0.5, 0.1, 0.1, 1.0]).unwrap();
        let a = grid(&[row(0.2, 0.2, 0.1, 0.1, 1.0, &[0.9])]);
        let b = grid(&[row(0.8, 0.8, 0.1, 0.1, 1.0, &[0.7])]);
        let out = CandidateFilter::new(0.5, 0).filter(&[short, a, b], 100, 100);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn first_class_wins_ties() {
        assert_eq!(best_class(&[0.7, 0.7]), Some((0, 0.7)));
        assert_eq!(best_class(&[]), None);
    }
}
