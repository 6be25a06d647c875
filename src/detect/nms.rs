//! Greedy non-maximum suppression.

use super::result::Candidate;

/// Collapses overlapping candidates for the same person into one box.
#[derive(Clone, Copy, Debug)]
pub struct NonMaxSuppressor {
    score_threshold: f32,
    iou_threshold: f32,
}

impl NonMaxSuppressor {
    pub fn new(score_threshold: f32, iou_threshold: f32) -> Self {
        Self {
            score_threshold,
            iou_threshold,
        }
    }

    /// Returns indices of kept candidates in selection order.
    ///
    /// Candidates at or below the score threshold never participate. A
    /// candidate is suppressed only when its IoU with a kept box is strictly
    /// above the IoU threshold, so every kept pair satisfies
    /// `iou <= iou_threshold`.
    pub fn suppress(&self, candidates: &[Candidate]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..candidates.len())
            .filter(|&i| candidates[i].confidence > self.score_threshold)
            .collect();
        // Stable sort: equal confidences keep input order.
        order.sort_by(|&a, &b| {
            candidates[b]
                .confidence
                .total_cmp(&candidates[a].confidence)
        });

        let mut suppressed = vec![false; candidates.len()];
        let mut kept = Vec::new();
        for (pos, &i) in order.iter().enumerate() {
            if suppressed[i] {
                continue;
            }
            kept.push(i);
            for &j in &order[pos + 1..] {
                if !suppressed[j]
                    && candidates[i].bbox.iou(&candidates[j].bbox) > self.iou_threshold
                {
                    suppressed[j] = true;
                }
            }
        }
        kept
    }
}
