// THEORY:
// The `color_model` module turns a raw `Pixel` into a `ColorSample` (hue, a colour
// magnitude, and a brightness) and measures how far apart two samples are.
//
// Key architectural principles:
// 1.  **One Interface, Several Formulas**: Deployments have used HSI-style
//     saturation, plain chroma, and HSL lightness as the magnitude pair. The
//     `MagnitudeFormula` is chosen once, when the `ColorModel` is built, and the
//     rest of the pipeline never looks at it again.
// 2.  **Circular Hue**: Hue lives on a circle of `HUE_DOMAIN` units. A raw
//     difference larger than half the circle is folded back onto the short arc.
// 3.  **Undefined Hue Is Free**: A gray pixel has no hue. If either sample is
//     achromatic the hue component of the distance is zero.
// 4.  **Three Components, Never Combined**: `ColorDistance` keeps hue, chroma and
//     intensity separate so each can be tested against its own threshold. Only
//     motion detection folds them into a single weighted score.
//
// Domains per formula:
//   hue        [0, 65536) for every formula
//   Saturation chroma = (1 - 3*min/sum) * 65535, intensity = r+g+b (0..765)
//   Chroma     chroma = max - min (0..255),      intensity = mean (0..255)
//   Lightness  chroma = max - min (0..255),      intensity = (max+min)/2 (0..255)

use crate::core_modules::pixel::pixel::Pixel;
use serde::Deserialize;

pub const HUE_DOMAIN: f32 = 65536.0;
const HALF_HUE_DOMAIN: f32 = HUE_DOMAIN / 2.0;
const SATURATION_SCALE: f32 = 65535.0;

/// Which pair of magnitude channels accompanies hue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnitudeFormula {
    /// HSI: saturation = 1 - min/mean, intensity = channel sum.
    #[default]
    Saturation,
    /// Chroma = max - min, intensity = channel mean.
    Chroma,
    /// Chroma = max - min, lightness = (max + min) / 2.
    Lightness,
}

impl MagnitudeFormula {
    /// Upper bound of the chroma/saturation channel.
    pub fn max_chroma(self) -> f32 {
        match self {
            MagnitudeFormula::Saturation => SATURATION_SCALE,
            MagnitudeFormula::Chroma | MagnitudeFormula::Lightness => 255.0,
        }
    }

    /// Upper bound of the intensity/lightness channel.
    pub fn max_intensity(self) -> f32 {
        match self {
            MagnitudeFormula::Saturation => 765.0,
            MagnitudeFormula::Chroma | MagnitudeFormula::Lightness => 255.0,
        }
    }
}

/// A pixel expressed as (hue, chroma, intensity).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorSample {
    pub hue: f32,
    pub chroma: f32,
    pub intensity: f32,
}

impl ColorSample {
    pub fn new(hue: f32, chroma: f32, intensity: f32) -> Self {
        Self {
            hue,
            chroma,
            intensity,
        }
    }

    pub fn is_achromatic(&self) -> bool {
        self.chroma == 0.0
    }
}

/// Per-component distance between two samples.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorDistance {
    pub hue: f32,
    pub chroma: f32,
    pub intensity: f32,
}

impl ColorDistance {
    /// True when every component is at or below its threshold.
    pub fn within(&self, thresholds: &ChannelThresholds) -> bool {
        self.hue <= thresholds.hue
            && self.chroma <= thresholds.chroma
            && self.intensity <= thresholds.intensity
    }

    /// Weighted sum of squares used by motion detection. Only hue is weighted.
    pub fn weighted_magnitude_sq(&self, hue_weight: f32) -> f32 {
        hue_weight * self.hue * self.hue
            + self.chroma * self.chroma
            + self.intensity * self.intensity
    }
}

/// Independent upper bounds for each distance component.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ChannelThresholds {
    pub hue: f32,
    pub chroma: f32,
    pub intensity: f32,
}

impl ChannelThresholds {
    pub fn new(hue: f32, chroma: f32, intensity: f32) -> Self {
        Self {
            hue,
            chroma,
            intensity,
        }
    }

    /// Thresholds that accept any pair of samples under the given formula.
    pub fn permissive(formula: MagnitudeFormula) -> Self {
        Self::new(HUE_DOMAIN, formula.max_chroma(), formula.max_intensity())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorModel {
    formula: MagnitudeFormula,
}

impl ColorModel {
    pub fn new(formula: MagnitudeFormula) -> Self {
        Self { formula }
    }

    pub fn formula(&self) -> MagnitudeFormula {
        self.formula
    }

    pub fn sample(&self, pixel: &Pixel) -> ColorSample {
        let hue = match pixel.hue_sextant() {
            Some(sextant) => {
                let hue = sextant * (HUE_DOMAIN / 6.0);
                if hue >= HUE_DOMAIN { hue - HUE_DOMAIN } else { hue }
            }
            None => 0.0,
        };

        let (chroma, intensity) = match self.formula {
            MagnitudeFormula::Saturation => {
                let sum = pixel.sum() as f32;
                let saturation = if sum == 0.0 {
                    0.0
                } else {
                    (1.0 - (3.0 * pixel.min_channel() as f32) / sum) * SATURATION_SCALE
                };
                (saturation, sum)
            }
            MagnitudeFormula::Chroma => (pixel.chroma() as f32, pixel.sum() as f32 / 3.0),
            MagnitudeFormula::Lightness => (pixel.chroma() as f32, pixel.lightness()),
        };

        ColorSample::new(hue, chroma, intensity)
    }

    pub fn sample_rgb(&self, red: u8, green: u8, blue: u8) -> ColorSample {
        self.sample(&Pixel::opaque(red, green, blue))
    }

    pub fn distance(&self, a: &ColorSample, b: &ColorSample) -> ColorDistance {
        color_distance(a, b)
    }
}

/// Formula-agnostic distance: every formula shares the same hue circle.
pub fn color_distance(a: &ColorSample, b: &ColorSample) -> ColorDistance {
    let hue = if a.is_achromatic() || b.is_achromatic() {
        0.0
    } else {
        let difference = (a.hue - b.hue).abs();
        if difference > HALF_HUE_DOMAIN {
            HUE_DOMAIN - difference
        } else {
            difference
        }
    };

    ColorDistance {
        hue,
        chroma: (a.chroma - b.chroma).abs(),
        intensity: (a.intensity - b.intensity).abs(),
    }
}
