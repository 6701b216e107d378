//! Cloud-optimized GeoTIFF reading over byte ranges.

pub mod decode;
pub mod geo;
pub mod reader;
pub mod tiff;

pub use decode::{Compression, Predictor, SampleType};
pub use reader::{CogReader, RasterInfo};
