//! Opening band assets by href.

use std::sync::Arc;

use async_trait::async_trait;
use cropwatch_common::{BandGrid, CropwatchResult, PixelWindow};
use tracing::instrument;

use crate::{CogReader, ObjectStorageConfig, StoreCache};

/// Resolves asset hrefs to opened rasters.
#[async_trait]
pub trait RasterSource: Send + Sync {
    /// Open the raster at `href`, reading only its header and block index.
    async fn open(&self, href: &str) -> CropwatchResult<CogReader>;

    /// Open `href` and read one window from it.
    async fn read_window(&self, href: &str, window: &PixelWindow) -> CropwatchResult<BandGrid> {
        self.open(href).await?.read_window(window).await
    }
}

/// Raster source backed by `object_store`.
///
/// Clones share one store cache.
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreSource {
    config: ObjectStorageConfig,
    stores: Arc<StoreCache>,
}

impl ObjectStoreSource {
    pub fn new(config: ObjectStorageConfig) -> Self {
        Self {
            config,
            stores: Arc::new(StoreCache::new()),
        }
    }

    pub fn config(&self) -> &ObjectStorageConfig {
        &self.config
    }

    /// Number of backend stores opened so far.
    pub fn store_count(&self) -> usize {
        self.stores.len()
    }
}

#[async_trait]
impl RasterSource for ObjectStoreSource {
    #[instrument(skip(self))]
    async fn open(&self, href: &str) -> CropwatchResult<CogReader> {
        let reader = self.stores.reader(href, &self.config)?;
        CogReader::open(Arc::new(reader), self.config.header_bytes).await
    }
}
