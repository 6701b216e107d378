//! Vertical colorbar legend with tick labels.

use std::sync::OnceLock;

use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};

use cropwatch_common::{CropwatchError, CropwatchResult};

use crate::Colormap;

// Embedded font for legend labels
const FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

static FONT: OnceLock<Option<Font<'static>>> = OnceLock::new();

/// Tick positions and their labels, top of the bar first.
pub const TICKS: [(f32, &str); 5] = [(1.0, "1"), (0.5, "0.5"), (0.0, "0"), (-0.5, "-0.5"), (-1.0, "-1")];

pub const CAPTION: &str = "NDVI";

/// The label font, parsed once.
pub fn legend_font() -> CropwatchResult<&'static Font<'static>> {
    FONT.get_or_init(|| Font::try_from_bytes(FONT_DATA))
        .as_ref()
        .ok_or_else(|| CropwatchError::RenderError("embedded legend font failed to load".into()))
}

/// Legend geometry.
#[derive(Debug, Clone, Copy)]
pub struct LegendLayout {
    pub bar_width: u32,
    pub tick_len: u32,
    /// Label height in pixels
    pub font_size: f32,
    /// Space between ticks and labels, and below the caption
    pub padding: u32,
}

impl Default for LegendLayout {
    fn default() -> Self {
        Self {
            bar_width: 16,
            tick_len: 4,
            font_size: 13.0,
            padding: 4,
        }
    }
}

impl LegendLayout {
    pub fn scale(&self) -> Scale {
        Scale::uniform(self.font_size)
    }

    /// Height of one line of text, ascent to descent.
    pub fn text_height(&self, font: &Font) -> u32 {
        let v = font.v_metrics(self.scale());
        (v.ascent - v.descent).ceil().max(0.0) as u32
    }

    pub fn text_width(&self, font: &Font, text: &str) -> u32 {
        text_size(self.scale(), font, text).0.max(0) as u32
    }

    /// Space above the bar taken by the caption.
    pub fn caption_height(&self, font: &Font) -> u32 {
        self.text_height(font) + self.padding
    }

    /// Total legend width: bar and ticks plus the widest label.
    pub fn width(&self, font: &Font) -> u32 {
        let widest = TICKS
            .iter()
            .map(|(_, label)| self.text_width(font, label))
            .chain(std::iter::once(self.text_width(font, CAPTION)))
            .max()
            .unwrap_or(0);
        self.bar_width + self.tick_len + self.padding + widest
    }
}

/// Draw the caption, colorbar, ticks and labels.
///
/// `(x, y)` is the top-left of the bar; the caption sits above it.
#[allow(clippy::too_many_arguments)]
pub fn draw_legend(
    img: &mut RgbaImage,
    colormap: &Colormap,
    layout: &LegendLayout,
    font: &Font<'static>,
    x: i32,
    y: i32,
    bar_height: u32,
    ink: Rgba<u8>,
) {
    let (min, max) = colormap.domain();
    let bar_height = bar_height.max(2);
    let span = (bar_height - 1) as f32;
    let scale = layout.scale();

    let caption_y = y - layout.caption_height(font) as i32;
    draw_text_mut(img, ink, x, caption_y, scale, font, CAPTION);

    for row in 0..bar_height {
        let value = max - (max - min) * row as f32 / span;
        let rect = Rect::at(x, y + row as i32).of_size(layout.bar_width, 1);
        draw_filled_rect_mut(img, rect, colormap.color_at(value));
    }
    draw_hollow_rect_mut(img, Rect::at(x, y).of_size(layout.bar_width, bar_height), ink);

    let tick_x0 = (x + layout.bar_width as i32) as f32;
    let tick_x1 = tick_x0 + layout.tick_len as f32;
    let label_x = tick_x1 as i32 + layout.padding as i32;
    let half_line = layout.text_height(font) as i32 / 2;

    for (value, label) in TICKS {
        let ty = y + tick_offset(value, min, max, bar_height) as i32;
        draw_line_segment_mut(img, (tick_x0, ty as f32), (tick_x1, ty as f32), ink);
        draw_text_mut(img, ink, label_x, ty - half_line, scale, font, label);
    }
}

/// Row of a value within the bar, top = max.
pub fn tick_offset(value: f32, min: f32, max: f32, bar_height: u32) -> u32 {
    let span = (bar_height.max(2) - 1) as f32;
    ((max - value) / (max - min) * span).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn inked(img: &RgbaImage, x0: u32, x1: u32, y0: u32, y1: u32) -> usize {
        (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .filter(|&(x, y)| img.get_pixel(x, y)[0] < 128)
            .count()
    }

    #[test]
    fn test_embedded_font_loads() {
        let font = legend_font().unwrap();
        let layout = LegendLayout::default();
        assert!(layout.text_height(font) >= 12);
        // monospace: "-0.5" is wider than "1"
        assert!(layout.text_width(font, "-0.5") > layout.text_width(font, "1"));
    }

    #[test]
    fn test_tick_offsets() {
        assert_eq!(tick_offset(1.0, -1.0, 1.0, 201), 0);
        assert_eq!(tick_offset(0.0, -1.0, 1.0, 201), 100);
        assert_eq!(tick_offset(-1.0, -1.0, 1.0, 201), 200);
    }

    #[test]
    fn test_legend_colors_run_green_to_red() {
        let font = legend_font().unwrap();
        let layout = LegendLayout::default();
        let cmap = Colormap::rd_yl_gn();
        let mut img = RgbaImage::from_pixel(80, 140, PAPER);
        draw_legend(&mut img, &cmap, &layout, font, 2, 24, 101, INK);

        let top = img.get_pixel(2 + 8, 25);
        let bottom = img.get_pixel(2 + 8, 24 + 99);
        assert!(top[1] > top[0], "top of bar is green");
        assert!(bottom[0] > bottom[1], "bottom of bar is red");
    }

    #[test]
    fn test_labels_and_caption_are_drawn() {
        let font = legend_font().unwrap();
        let layout = LegendLayout::default();
        let cmap = Colormap::rd_yl_gn();
        let (x, y) = (2, 24);
        let mut img = RgbaImage::from_pixel(80, 160, PAPER);
        draw_legend(&mut img, &cmap, &layout, font, x, y, 121, INK);

        let label_x = x as u32 + layout.bar_width + layout.tick_len + layout.padding;
        // label column right of the ticks
        assert!(inked(&img, label_x, 80, y as u32, 160) > 0);
        // caption row above the bar
        assert!(inked(&img, x as u32, 80, 0, y as u32) > 0);
    }

    #[test]
    fn test_draw_clips_at_edges() {
        let font = legend_font().unwrap();
        let layout = LegendLayout::default();
        let mut img = RgbaImage::from_pixel(10, 10, PAPER);
        draw_legend(&mut img, &Colormap::rd_yl_gn(), &layout, font, -4, 2, 50, INK);
    }

    #[test]
    fn test_layout_width_fits_labels() {
        let font = legend_font().unwrap();
        let layout = LegendLayout::default();
        assert!(layout.width(font) >= layout.bar_width + layout.text_width(font, "-0.5"));
        assert!(layout.caption_height(font) > layout.text_height(font));
    }
}
