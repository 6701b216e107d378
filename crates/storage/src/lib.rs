//! Remote raster access for band assets.
//!
//! Provides:
//! - A byte-range reader abstraction over object storage (HTTP, S3, local)
//! - A cloud-optimized GeoTIFF reader that fetches only the blocks a window needs
//! - In-memory backends that record requests, for tests and demos

pub mod cog;
pub mod memory;
pub mod object_store;
pub mod range_reader;
pub mod source;

pub use self::object_store::{parse_href, ObjectRangeReader, ObjectStorageConfig, StoreCache, StoreTarget};
pub use cog::{CogReader, RasterInfo};
pub use memory::{MemoryRangeReader, MemoryRasterSource, RangeRequest};
pub use range_reader::RangeReader;
pub use source::{ObjectStoreSource, RasterSource};
