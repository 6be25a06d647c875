use anyhow::{anyhow, Result};

/// Axis-aligned box in pixel coordinates, top-left origin.
///
/// Boxes are not clamped to the frame: `x`/`y` may be negative and the far
/// edges may run past the frame width/height.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Build a box from a center point and size.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x: cx - w / 2.0,
            y: cy - h / 2.0,
            w,
            h,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn area(&self) -> f32 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn centroid(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Intersection-over-Union with another box, in `[0, 1]`.
    ///
    /// Returns 0 when the union has no area.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let iy = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// Pixel rectangle as integers truncated toward zero.
    pub fn to_pixels(&self) -> [i32; 4] {
        [self.x as i32, self.y as i32, self.w as i32, self.h as i32]
    }
}

/// A person candidate produced from one prediction row.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: usize,
}

/// One output tensor of the detection network, flattened into rows.
///
/// Each row is `[center_x, center_y, width, height, objectness, class scores...]`
/// with coordinates expressed as fractions of the frame size.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PredictionGrid {
    stride: usize,
    values: Vec<f32>,
}

impl PredictionGrid {
    pub fn new(stride: usize, values: Vec<f32>) -> Result<Self> {
        if stride == 0 {
            return Err(anyhow!("prediction stride must be greater than zero"));
        }
        if values.len() % stride != 0 {
            return Err(anyhow!(
                "prediction length {} is not a multiple of stride {}",
                values.len(),
                stride
            ));
        }
        Ok(Self { stride, values })
    }

    /// Build a grid from explicit rows. All rows must share a length.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Ok(Self::default());
        };
        let stride = first.len();
        let mut values = Vec::with_capacity(stride * rows.len());
        for row in rows {
            if row.len() != stride {
                return Err(anyhow!(
                    "prediction rows differ in length ({} vs {})",
                    row.len(),
                    stride
                ));
            }
            values.extend_from_slice(row);
        }
        Self::new(stride, values)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn len(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.values.len() / self.stride
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on a zero chunk size; the default grid has no rows.
        self.values.chunks_exact(self.stride.max(1))
    }
}
