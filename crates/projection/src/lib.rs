//! Coordinate reference system transformations.
//!
//! Implements the map projections needed to place a geographic query region
//! on a Sentinel-2 raster grid, from scratch without external dependencies.

pub mod mercator;
pub mod transform;
pub mod transverse_mercator;
pub mod window;

pub use mercator::WebMercator;
pub use transform::{reproject, Projection};
pub use transverse_mercator::TransverseMercator;
pub use window::resolve_window;
