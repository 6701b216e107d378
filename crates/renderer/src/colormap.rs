//! Diverging color scale for index values.

use image::Rgba;
use serde::{Deserialize, Serialize};

use cropwatch_common::{CropwatchError, CropwatchResult};

/// ColorBrewer RdYlGn, 11 classes, red for bare ground to green for dense
/// vegetation.
const RD_YL_GN: [&str; 11] = [
    "#a50026", "#d73027", "#f46d43", "#fdae61", "#fee08b", "#ffffbf", "#d9ef8b", "#a6d96a",
    "#66bd63", "#1a9850", "#006837",
];

/// A color anchored at a data value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub value: f32,
    pub color: [u8; 4],
}

/// Piecewise-linear colormap over a fixed domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Colormap {
    stops: Vec<ColorStop>,
}

impl Colormap {
    /// Build from stops sorted by strictly increasing value.
    pub fn new(stops: Vec<ColorStop>) -> CropwatchResult<Self> {
        if stops.len() < 2 {
            return Err(CropwatchError::RenderError(
                "a colormap needs at least two stops".to_string(),
            ));
        }
        if stops.windows(2).any(|w| !(w[0].value < w[1].value)) {
            return Err(CropwatchError::RenderError(
                "colormap stops must increase strictly".to_string(),
            ));
        }
        Ok(Self { stops })
    }

    /// RdYlGn spread evenly over [-1, 1].
    pub fn rd_yl_gn() -> Self {
        let last = (RD_YL_GN.len() - 1) as f32;
        let stops = RD_YL_GN
            .iter()
            .enumerate()
            .map(|(i, hex)| ColorStop {
                value: -1.0 + 2.0 * i as f32 / last,
                // table entries are well-formed
                color: parse_hex(hex).unwrap_or([0, 0, 0, 255]),
            })
            .collect();
        Self { stops }
    }

    pub fn stops(&self) -> &[ColorStop] {
        &self.stops
    }

    /// (min, max) of the domain.
    pub fn domain(&self) -> (f32, f32) {
        (self.stops[0].value, self.stops[self.stops.len() - 1].value)
    }

    /// Color for a value; values outside the domain take the end colors.
    pub fn color_at(&self, value: f32) -> Rgba<u8> {
        let (min, max) = self.domain();
        let v = value.clamp(min, max);

        let upper = self
            .stops
            .iter()
            .position(|s| s.value >= v)
            .unwrap_or(self.stops.len() - 1);
        if upper == 0 {
            return Rgba(self.stops[0].color);
        }

        let lo = &self.stops[upper - 1];
        let hi = &self.stops[upper];
        let t = (v - lo.value) / (hi.value - lo.value);
        Rgba(lerp(lo.color, hi.color, t))
    }
}

impl Default for Colormap {
    fn default() -> Self {
        Self::rd_yl_gn()
    }
}

fn lerp(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = (a[i] as f32 + (b[i] as f32 - a[i] as f32) * t).round() as u8;
    }
    out
}

/// Parse `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex(hex: &str) -> CropwatchResult<[u8; 4]> {
    let digits = hex.trim_start_matches('#');
    let invalid = || CropwatchError::InvalidInput(format!("invalid color '{}'", hex));

    if !(digits.len() == 6 || digits.len() == 8) || !digits.is_ascii() {
        return Err(invalid());
    }

    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
    let alpha = if digits.len() == 8 { channel(6)? } else { 255 };
    Ok([channel(0)?, channel(2)?, channel(4)?, alpha])
}
