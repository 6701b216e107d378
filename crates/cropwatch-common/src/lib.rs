//! Common types and utilities shared across all cropwatch crates.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod geo;
pub mod grid;
pub mod time;

pub use bbox::BoundingBox;
pub use crs::CrsCode;
pub use error::{CropwatchError, CropwatchResult};
pub use geo::{normalize_longitude, GeoPoint, QueryRegion, DEFAULT_MARGIN_DEG};
pub use grid::{BandGrid, GeoTransform, NdviGrid, PixelWindow};
pub use time::{parse_date, SearchWindow, DEFAULT_WINDOW_DAYS};
