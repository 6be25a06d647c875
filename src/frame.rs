//! Frame container.
//!
//! - `Frame`: owned RGB8 pixels plus dimensions.
//! - Decoding from encoded image bytes (JPEG/PNG) for the service form.
//! - Clipped cropping of detection boxes for colour classification.

use anyhow::{anyhow, Context, Result};
use image::{imageops, RgbImage};

use crate::detect::BoundingBox;

/// An RGB8 frame. Pixels are row-major, three bytes per pixel.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    /// Build a frame from raw RGB bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("pixel buffer does not match {}x{}", width, height))?;
        Ok(Self { image })
    }

    /// Decode an encoded image (JPEG or PNG).
    ///
    /// Empty input and zero-sized images are rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(anyhow!("image data is empty"));
        }
        let image = image::load_from_memory(bytes)
            .context("decode image")?
            .into_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(anyhow!("image has no pixels"));
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Crop the region under `bbox`, clipped to the frame.
    ///
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<RgbImage> {
        let (fw, fh) = (self.width() as i64, self.height() as i64);
        let x0 = (bbox.x as i64).clamp(0, fw);
        let y0 = (bbox.y as i64).clamp(0, fh);
        let x1 = (bbox.right() as i64).clamp(0, fw);
        let y1 = (bbox.bottom() as i64).clamp(0, fh);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        let view = imageops::crop_imm(
            &self.image,
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        );
        Some(view.to_image())
    }
}
