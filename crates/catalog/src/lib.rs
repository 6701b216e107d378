//! Imagery catalog search.
//!
//! Queries a STAC API for Sentinel-2 scenes intersecting a point within a
//! forward-looking date window and selects one scene per request.

pub mod config;
pub mod memory;
pub mod scene;
pub mod searcher;
pub mod stac;

pub use config::{CatalogConfig, MAX_WINDOW_DAYS};
pub use memory::StaticCatalog;
pub use scene::{AssetRef, Scene};
pub use searcher::{select_last, Catalog, CatalogSearcher};
pub use stac::{parse_item_collection, Comparison, PointGeometry, SearchRequest, StacClient};
