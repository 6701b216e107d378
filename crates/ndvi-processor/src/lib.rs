//! NDVI pipeline.
//!
//! Ties the catalog search, region reprojection, windowed band reads and
//! rendering together. One call to [`NdviPipeline::run`] takes a point and a
//! start date and produces an NDVI grid plus a PNG of it.

pub mod config;
pub mod index;
pub mod pipeline;
pub mod retry;

pub use config::PipelineConfig;
pub use index::{compute_ndvi, ndvi};
pub use pipeline::{NdviPipeline, NdviProduct, NdviStats};
pub use retry::{with_retry, with_timeout, RetryConfig};
