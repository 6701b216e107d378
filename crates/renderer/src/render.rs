//! NDVI grid to PNG panel with legend.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use cropwatch_common::{CropwatchError, CropwatchResult, NdviGrid};

use crate::legend::{draw_legend, legend_font, LegendLayout};
use crate::png::encode_png;
use crate::Colormap;

const MARGIN: u32 = 8;
const GAP: u32 = 12;
const MIN_BAR_HEIGHT: u32 = 100;

/// Rendering options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Target size of the longer panel side, in pixels
    pub panel_size: u32,
    /// RGBA used for no-data pixels
    pub nodata_color: [u8; 4],
    /// RGBA behind the panel and legend
    pub background: [u8; 4],
    /// RGBA for legend outlines and text
    pub ink: [u8; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            panel_size: 320,
            nodata_color: [0, 0, 0, 0],
            background: [255, 255, 255, 255],
            ink: [33, 33, 33, 255],
        }
    }
}

impl RenderConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.panel_size == 0 || self.panel_size > 4096 {
            return Err("render panel_size must be in 1..=4096".to_string());
        }
        Ok(())
    }
}

/// An encoded image ready for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

impl RenderedImage {
    /// `data:<mime>;base64,<payload>`
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// Renders NDVI grids through a diverging colormap.
///
/// Every call draws on its own canvas, so one renderer can be shared
/// between threads.
#[derive(Debug, Clone, Default)]
pub struct NdviRenderer {
    config: RenderConfig,
    colormap: Colormap,
    legend: LegendLayout,
}

impl NdviRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            colormap: Colormap::rd_yl_gn(),
            legend: LegendLayout::default(),
        }
    }

    pub fn with_colormap(mut self, colormap: Colormap) -> Self {
        self.colormap = colormap;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Integer upscale factor for a grid.
    pub fn scale_for(&self, width: usize, height: usize) -> u32 {
        let longest = width.max(height).max(1) as u32;
        (self.config.panel_size / longest).max(1)
    }

    /// Draw the panel and legend onto a fresh canvas.
    pub fn draw(&self, grid: &NdviGrid) -> CropwatchResult<RgbaImage> {
        let (rows, cols) = grid.shape();
        if rows == 0 || cols == 0 {
            return Err(CropwatchError::RenderError(format!(
                "cannot render an empty {}x{} grid",
                rows, cols
            )));
        }

        let scale = self.scale_for(cols, rows);
        let panel_w = u32::try_from(cols)
            .ok()
            .and_then(|c| c.checked_mul(scale))
            .ok_or_else(|| CropwatchError::RenderError(format!("grid too wide: {}", cols)))?;
        let panel_h = u32::try_from(rows)
            .ok()
            .and_then(|r| r.checked_mul(scale))
            .ok_or_else(|| CropwatchError::RenderError(format!("grid too tall: {}", rows)))?;

        let font = legend_font()?;
        let bar_h = panel_h.max(MIN_BAR_HEIGHT);
        let top = MARGIN + self.legend.caption_height(font);
        let width = MARGIN + panel_w + GAP + self.legend.width(font) + MARGIN;
        let height = top + bar_h + MARGIN;

        let mut img = RgbaImage::from_pixel(width, height, Rgba(self.config.background));
        let nodata = Rgba(self.config.nodata_color);

        for row in 0..rows {
            for col in 0..cols {
                let color = match grid.get(row, col) {
                    Some(v) => self.colormap.color_at(v),
                    None => nodata,
                };
                let x0 = MARGIN + col as u32 * scale;
                let y0 = top + row as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        img.put_pixel(x0 + dx, y0 + dy, color);
                    }
                }
            }
        }

        draw_legend(
            &mut img,
            &self.colormap,
            &self.legend,
            font,
            (MARGIN + panel_w + GAP) as i32,
            top as i32,
            bar_h,
            Rgba(self.config.ink),
        );

        Ok(img)
    }

    /// Render to a PNG payload.
    pub fn render(&self, grid: &NdviGrid) -> CropwatchResult<RenderedImage> {
        let img = self.draw(grid)?;
        let (width, height) = img.dimensions();
        let bytes = encode_png(img.as_raw(), width as usize, height as usize)?;

        debug!(
            grid_width = grid.width(),
            grid_height = grid.height(),
            width,
            height,
            bytes = bytes.len(),
            "Rendered NDVI image"
        );

        Ok(RenderedImage {
            bytes,
            mime: "image/png",
            width,
            height,
        })
    }
}
