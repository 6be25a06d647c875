//! Garment colour classification over a cropped person region.
//!
//! Pixels are converted to 8-bit HSV (hue halved into `[0, 180)`, saturation
//! and value in `[0, 255]`) and tested against inclusive ranges. Rules are
//! evaluated in order and the first rule with any matching pixel wins, so
//! a crop containing both blue and green pixels is reported as blue.

use image::RgbImage;
use serde::Serialize;

/// Coarse colour attribute of a detected person.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorLabel {
    Blue,
    Green,
    Unknown,
    /// The crop was absent or had zero area.
    NoFrame,
}

impl ColorLabel {
    /// Labels that trigger a notification for a newly seen person.
    pub fn is_qualifying(self) -> bool {
        matches!(self, ColorLabel::Blue | ColorLabel::Green)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColorLabel::Blue => "blue",
            ColorLabel::Green => "green",
            ColorLabel::Unknown => "unknown",
            ColorLabel::NoFrame => "no_frame",
        }
    }
}

impl std::fmt::Display for ColorLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 8-bit HSV pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let (rf, gf, bf) = (r as f32, g as f32, b as f32);
        let max = rf.max(gf).max(bf);
        let min = rf.min(gf).min(bf);
        let delta = max - min;

        let s = if max > 0.0 { 255.0 * delta / max } else { 0.0 };
        let mut h = if delta == 0.0 {
            0.0
        } else if max == rf {
            60.0 * (gf - bf) / delta
        } else if max == gf {
            120.0 + 60.0 * (bf - rf) / delta
        } else {
            240.0 + 60.0 * (rf - gf) / delta
        };
        if h < 0.0 {
            h += 360.0;
        }

        Self {
            h: ((h / 2.0).round() as u16 % 180) as u8,
            s: s.round() as u8,
            v: max as u8,
        }
    }
}

/// Inclusive HSV bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: Hsv,
    pub upper: Hsv,
}

impl HsvRange {
    pub const fn new(lower: (u8, u8, u8), upper: (u8, u8, u8)) -> Self {
        Self {
            lower: Hsv {
                h: lower.0,
                s: lower.1,
                v: lower.2,
            },
            upper: Hsv {
                h: upper.0,
                s: upper.1,
                v: upper.2,
            },
        }
    }

    pub fn contains(&self, px: Hsv) -> bool {
        (self.lower.h..=self.upper.h).contains(&px.h)
            && (self.lower.s..=self.upper.s).contains(&px.s)
            && (self.lower.v..=self.upper.v).contains(&px.v)
    }
}

pub const BLUE_RANGE: HsvRange = HsvRange::new((100, 150, 0), (140, 255, 255));
pub const GREEN_RANGE: HsvRange = HsvRange::new((40, 100, 0), (80, 255, 255));

/// Ordered colour rules.
#[derive(Clone, Debug)]
pub struct ColorClassifier {
    rules: Vec<(ColorLabel, HsvRange)>,
}

impl Default for ColorClassifier {
    fn default() -> Self {
        Self {
            rules: vec![(ColorLabel::Blue, BLUE_RANGE), (ColorLabel::Green, GREEN_RANGE)],
        }
    }
}

impl ColorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&self, crop: Option<&RgbImage>) -> ColorLabel {
        let Some(crop) = crop else {
            return ColorLabel::NoFrame;
        };
        if crop.width() == 0 || crop.height() == 0 {
            return ColorLabel::NoFrame;
        }

        let pixels: Vec<Hsv> = crop
            .pixels()
            .map(|p| Hsv::from_rgb(p[0], p[1], p[2]))
            .collect();
        for (label, range) in &self.rules {
            if pixels.iter().any(|&px| range.contains(px)) {
                return *label;
            }
        }
        ColorLabel::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(r: u8, g: u8, b: u8) -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb([r, g, b]))
    }

    #[test]
    fn hsv_matches_8bit_convention() {
        assert_eq!(Hsv::from_rgb(0, 0, 255), Hsv { h: 120, s: 255, v: 255 });
        assert_eq!(Hsv::from_rgb(0, 255, 0), Hsv { h: 60, s: 255, v: 255 });
        assert_eq!(Hsv::from_rgb(255, 0, 0), Hsv { h: 0, s: 255, v: 255 });
        assert_eq!(Hsv::from_rgb(255, 0, 255), Hsv { h: 150, s: 255, v: 255 });
        assert_eq!(Hsv::from_rgb(128, 128, 128), Hsv { h: 0, s: 0, v: 128 });
        assert_eq!(Hsv::from_rgb(0, 0, 0), Hsv { h: 0, s: 0, v: 0 });
    }

    fn label_of(r: u8, g: u8, b: u8) -> ColorLabel {
        ColorClassifier::new().classify(Some(&solid(r, g, b)))
    }

    #[test]
    fn blue_hue_bounds_are_inclusive() {
        assert_eq!(Hsv::from_rgb(0, 170, 255).h, 100);
        assert_eq!(label_of(0, 170, 255), ColorLabel::Blue);
        assert_eq!(Hsv::from_rgb(170, 0, 255).h, 140);
        assert_eq!(label_of(170, 0, 255), ColorLabel::Blue);

        assert_eq!(Hsv::from_rgb(0, 179, 255).h, 99);
        assert_eq!(label_of(0, 179, 255), ColorLabel::Unknown);
        assert_eq!(Hsv::from_rgb(179, 0, 255).h, 141);
        assert_eq!(label_of(179, 0, 255), ColorLabel::Unknown);
    }

    #[test]
    fn blue_saturation_floor_is_inclusive() {
        assert_eq!(Hsv::from_rgb(105, 105, 255), Hsv { h: 120, s: 150, v: 255 });
        assert_eq!(label_of(105, 105, 255), ColorLabel::Blue);
        assert_eq!(Hsv::from_rgb(106, 106, 255).s, 149);
        assert_eq!(label_of(106, 106, 255), ColorLabel::Unknown);
    }

    #[test]
    fn green_bounds_are_inclusive() {
        assert_eq!(Hsv::from_rgb(170, 255, 0).h, 40);
        assert_eq!(label_of(170, 255, 0), ColorLabel::Green);
        assert_eq!(Hsv::from_rgb(0, 255, 170).h, 80);
        assert_eq!(label_of(0, 255, 170), ColorLabel::Green);
        assert_eq!(Hsv::from_rgb(179, 255, 0).h, 39);
        assert_eq!(label_of(179, 255, 0), ColorLabel::Unknown);
        assert_eq!(Hsv::from_rgb(0, 255, 179).h, 81);
        assert_eq!(label_of(0, 255, 179), ColorLabel::Unknown);

        assert_eq!(Hsv::from_rgb(155, 255, 155), Hsv { h: 60, s: 100, v: 255 });
        assert_eq!(label_of(155, 255, 155), ColorLabel::Green);
        assert_eq!(Hsv::from_rgb(156, 255, 156).s, 99);
        assert_eq!(label_of(156, 255, 156), ColorLabel::Unknown);
    }

    #[test]
    fn classifies_saturated_colours() {
        let classifier = ColorClassifier::new();
        assert_eq!(classifier.classify(Some(&solid(20, 40, 230))), ColorLabel::Blue);
        assert_eq!(classifier.classify(Some(&solid(30, 200, 40))), ColorLabel::Green);
        assert_eq!(classifier.classify(Some(&solid(220, 30, 30))), ColorLabel::Unknown);
    }

    #[test]
    fn washed_out_blue_is_unknown() {
        // hue in range but saturation below 150
        let px = Hsv::from_rgb(150, 170, 230);
        assert!(px.s < 150);
        assert_eq!(
            ColorClassifier::new().classify(Some(&solid(150, 170, 230))),
            ColorLabel::Unknown
        );
    }

    #[test]
    fn blue_takes_precedence_over_green() {
        let mut crop = solid(0, 255, 0);
        crop.put_pixel(7, 7, Rgb([0, 0, 255]));
        assert_eq!(ColorClassifier::new().classify(Some(&crop)), ColorLabel::Blue);
    }

    #[test]
    fn single_green_pixel_is_enough() {
        let mut crop = solid(200, 200, 200);
        crop.put_pixel(3, 4, Rgb([0, 255, 0]));
        assert_eq!(ColorClassifier::new().classify(Some(&crop)), ColorLabel::Green);
    }

    #[test]
    fn empty_crop_is_no_frame_not_unknown() {
        let classifier = ColorClassifier::new();
        assert_eq!(classifier.classify(None), ColorLabel::NoFrame);
        assert_eq!(
            classifier.classify(Some(&RgbImage::new(0, 0))),
            ColorLabel::NoFrame
        );
        assert_ne!(ColorLabel::NoFrame, ColorLabel::Unknown);
    }

    #[test]
    fn only_blue_and_green_qualify() {
        assert!(ColorLabel::Blue.is_qualifying());
        assert!(ColorLabel::Green.is_qualifying());
        assert!(!ColorLabel::Unknown.is_qualifying());
        assert!(!ColorLabel::NoFrame.is_qualifying());
    }
}
