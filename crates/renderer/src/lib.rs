//! NDVI visualization.
//!
//! Maps index grids through a red-yellow-green colormap, draws a colorbar
//! legend next to the panel, and encodes the result as PNG for embedding
//! as a data URI.

pub mod colormap;
pub mod legend;
pub mod png;
pub mod render;

pub use colormap::{parse_hex, ColorStop, Colormap};
pub use legend::{legend_font, LegendLayout};
pub use png::encode_png;
pub use render::{NdviRenderer, RenderConfig, RenderedImage};
