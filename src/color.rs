use std::fmt;

use palette::{Hsl, IntoColor, LinSrgb, Mix, Srgb};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// An opaque 8-bit sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GRAY: Color = Color::rgb(128, 128, 128);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    /// Relative luminance, used to pick readable text on a filled cell.
    pub fn is_dark(self) -> bool {
        let l = 0.2126 * f32::from(self.r) + 0.7152 * f32::from(self.g) + 0.0722 * f32::from(self.b);
        l < 128.0
    }

    fn from_srgb(rgb: Srgb) -> Self {
        let rgb: Srgb<u8> = rgb.into_format();
        Color::rgb(rgb.red, rgb.green, rgb.blue)
    }

    fn to_linear(self) -> LinSrgb {
        Srgb::new(self.r, self.g, self.b)
            .into_format::<f32>()
            .into_linear()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.45);
            let rgb: Srgb = hsl.into_color();
            Color::from_srgb(rgb)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Diverging scale: value in [-limit, limit] → Color
// ---------------------------------------------------------------------------

/// Red (negative) through near-white to blue (positive).
const RED_BLUE: [Color; 11] = [
    Color::rgb(103, 0, 31),
    Color::rgb(178, 24, 43),
    Color::rgb(214, 96, 77),
    Color::rgb(244, 165, 130),
    Color::rgb(253, 219, 199),
    Color::rgb(247, 247, 247),
    Color::rgb(209, 229, 240),
    Color::rgb(146, 197, 222),
    Color::rgb(67, 147, 195),
    Color::rgb(33, 102, 172),
    Color::rgb(5, 48, 97),
];

/// A red-blue scale symmetric around zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DivergingScale {
    /// Values at or beyond `±limit` map to the end colours.
    pub limit: f64,
}

impl DivergingScale {
    /// A scale centered at zero wide enough for every finite value.
    pub fn centered(values: impl IntoIterator<Item = f64>) -> Self {
        let limit = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        DivergingScale {
            limit: if limit > 0.0 { limit } else { 1.0 },
        }
    }

    /// Colour for `value`; NaN maps to gray.
    pub fn color_for(&self, value: f64) -> Color {
        if value.is_nan() {
            return Color::GRAY;
        }
        let t = ((value / self.limit).clamp(-1.0, 1.0) + 1.0) / 2.0;
        let pos = t * (RED_BLUE.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(RED_BLUE.len() - 1);
        let frac = (pos - lo as f64) as f32;
        let mixed = RED_BLUE[lo].to_linear().mix(RED_BLUE[hi].to_linear(), frac);
        Color::from_srgb(Srgb::from_linear(mixed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_has_distinct_colors() {
        let colors = generate_palette(4);
        assert_eq!(colors.len(), 4);
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn diverging_scale_endpoints_and_center() {
        let scale = DivergingScale::centered([0.5, -1.0, f64::NAN]);
        assert_eq!(scale.limit, 1.0);
        assert_eq!(scale.color_for(-1.0), RED_BLUE[0]);
        assert_eq!(scale.color_for(1.0), RED_BLUE[10]);
        assert_eq!(scale.color_for(0.0), RED_BLUE[5]);
        assert_eq!(scale.color_for(f64::NAN), Color::GRAY);
    }

    #[test]
    fn hex_display() {
        assert_eq!(Color::rgb(255, 0, 16).to_string(), "#ff0010");
    }
}
