use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::PredictionGrid;
use crate::frame::Frame;

/// Number of class scores in stub rows (COCO layout, person first).
pub const STUB_CLASSES: usize = 80;

/// One figure in the synthetic hallway scene, in normalised coordinates.
#[derive(Clone, Copy, Debug)]
pub struct ScenePerson {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub rgb: [u8; 3],
}

/// Scene rendered by the `stub://` frame source and reported by
/// `StubBackend::hallway_scene`.
pub const HALLWAY_SCENE: [ScenePerson; 2] = [
    ScenePerson {
        cx: 0.25,
        cy: 0.5,
        w: 0.125,
        h: 0.4,
        rgb: [20, 40, 220],
    },
    ScenePerson {
        cx: 0.75,
        cy: 0.5,
        w: 0.125,
        h: 0.4,
        rgb: [30, 190, 40],
    },
];

/// Stub backend for tests and demos. Replays fixed predictions for every frame.
pub struct StubBackend {
    grids: Vec<PredictionGrid>,
}

impl StubBackend {
    pub fn new(grids: Vec<PredictionGrid>) -> Self {
        Self { grids }
    }

    /// Backend that never sees anyone.
    pub fn empty() -> Self {
        Self { grids: Vec::new() }
    }

    /// Predictions for the synthetic hallway scene: each figure reported
    /// twice with slightly shifted boxes, plus one low-confidence ghost.
    pub fn hallway_scene() -> Result<Self> {
        let mut rows = Vec::new();
        for person in &HALLWAY_SCENE {
            rows.push(person_row(person.cx, person.cy, person.w, person.h, 0.92));
            rows.push(person_row(
                person.cx + 0.005,
                person.cy + 0.01,
                person.w,
                person.h,
                0.81,
            ));
        }
        rows.push(person_row(0.5, 0.2, 0.1, 0.1, 0.3));
        Ok(Self::new(vec![PredictionGrid::from_rows(&rows)?]))
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::empty()
    }
}

/// Prediction row for a person with full objectness and the given class score.
pub fn person_row(cx: f32, cy: f32, w: f32, h: f32, score: f32) -> Vec<f32> {
    let mut row = vec![cx, cy, w, h, 1.0];
    row.resize(5 + STUB_CLASSES, 0.0);
    row[5] = score;
    row
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&self, _frame: &Frame) -> Result<Vec<PredictionGrid>> {
        Ok(self.grids.clone())
    }
}
