//! Object storage backends for imagery assets (HTTP, S3, local files).

use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use object_store::{
    aws::AmazonS3Builder, http::HttpBuilder, local::LocalFileSystem, path::Path, ClientOptions,
    ObjectStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use cropwatch_common::{CropwatchError, CropwatchResult};

use crate::RangeReader;

/// Configuration for opening asset hrefs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    /// Bytes fetched up front to parse the TIFF header and first IFD
    pub header_bytes: usize,
    /// AWS region used for `s3://` hrefs
    pub s3_region: String,
    /// Allow plain `http://` hrefs
    pub allow_http: bool,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            header_bytes: 16 * 1024,
            s3_region: "us-west-2".to_string(),
            allow_http: true,
        }
    }
}

/// Range reader over any `object_store` backend.
pub struct ObjectRangeReader {
    store: Arc<dyn ObjectStore>,
    location: Path,
    href: String,
}

impl ObjectRangeReader {
    /// Wrap an existing store and object path.
    pub fn new(store: Arc<dyn ObjectStore>, location: Path, href: impl Into<String>) -> Self {
        Self {
            store,
            location,
            href: href.into(),
        }
    }
}

/// Backend an href lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    S3 { bucket: String },
    /// Scheme and host, e.g. `https://example.com`
    Http { origin: String },
    Local,
}

impl StoreTarget {
    /// Cache key: one store per bucket, origin or the local filesystem.
    pub fn key(&self) -> String {
        match self {
            StoreTarget::S3 { bucket } => format!("s3://{}", bucket),
            StoreTarget::Http { origin } => origin.clone(),
            StoreTarget::Local => "file://".to_string(),
        }
    }

    fn build(&self, config: &ObjectStorageConfig) -> CropwatchResult<Arc<dyn ObjectStore>> {
        match self {
            StoreTarget::S3 { bucket } => {
                let store = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_region(&config.s3_region)
                    .build()
                    .map_err(|e| {
                        CropwatchError::RemoteReadError(format!("Failed to create S3 client: {}", e))
                    })?;
                Ok(Arc::new(store))
            }
            StoreTarget::Http { origin } => {
                let store = HttpBuilder::new()
                    .with_url(origin)
                    .with_client_options(ClientOptions::new().with_allow_http(config.allow_http))
                    .build()
                    .map_err(|e| {
                        CropwatchError::RemoteReadError(format!("Failed to create HTTP client: {}", e))
                    })?;
                Ok(Arc::new(store))
            }
            StoreTarget::Local => Ok(Arc::new(LocalFileSystem::new())),
        }
    }
}

/// Split an href into its backend and object path.
///
/// Accepts `https://`/`http://`, `s3://`, `file://` or a bare filesystem path.
pub fn parse_href(href: &str) -> CropwatchResult<(StoreTarget, Path)> {
    if let Some(rest) = href.strip_prefix("s3://") {
        let (bucket, key) = rest.split_once('/').ok_or_else(|| {
            CropwatchError::InvalidInput(format!("S3 href has no object key: {}", href))
        })?;
        let target = StoreTarget::S3 {
            bucket: bucket.to_string(),
        };
        return Ok((target, parse_path(key)?));
    }

    if href.starts_with("https://") || href.starts_with("http://") {
        let scheme_end = href.find("://").map(|i| i + 3).unwrap_or(0);
        let path_start = href[scheme_end..]
            .find('/')
            .map(|i| i + scheme_end)
            .ok_or_else(|| {
                CropwatchError::InvalidInput(format!("URL has no object path: {}", href))
            })?;
        let target = StoreTarget::Http {
            origin: href[..path_start].to_string(),
        };
        return Ok((target, parse_path(&href[path_start + 1..])?));
    }

    let fs_path = href.strip_prefix("file://").unwrap_or(href);
    let location = Path::from_filesystem_path(fs_path).map_err(|e| {
        CropwatchError::RemoteReadError(format!("Failed to resolve {}: {}", fs_path, e))
    })?;
    Ok((StoreTarget::Local, location))
}

/// Stores built so far, keyed by [`StoreTarget::key`], so every asset on
/// one host shares a client and its connection pool.
#[derive(Debug, Default)]
pub struct StoreCache {
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl StoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader for `href`, building its store on first use.
    pub fn reader(&self, href: &str, config: &ObjectStorageConfig) -> CropwatchResult<ObjectRangeReader> {
        let (target, location) = parse_href(href)?;
        let store = self.store_for(&target, config)?;
        Ok(ObjectRangeReader::new(store, location, href))
    }

    fn store_for(
        &self,
        target: &StoreTarget,
        config: &ObjectStorageConfig,
    ) -> CropwatchResult<Arc<dyn ObjectStore>> {
        let key = target.key();
        let mut stores = self.stores.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(store) = stores.get(&key) {
            return Ok(store.clone());
        }

        let store = target.build(config)?;
        debug!(store = %key, "Created object store");
        counter!("cropwatch_object_stores_created_total").increment(1);
        stores.insert(key, store.clone());
        Ok(store)
    }

    /// Number of distinct stores built.
    pub fn len(&self) -> usize {
        self.stores.lock().map(|s| s.len()).unwrap_or_else(|p| p.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_path(key: &str) -> CropwatchResult<Path> {
    Path::parse(key)
        .map_err(|e| CropwatchError::InvalidInput(format!("invalid object path {}: {}", key, e)))
}

fn read_error(href: &str, err: object_store::Error) -> CropwatchError {
    match err {
        object_store::Error::NotFound { .. } => {
            CropwatchError::RemoteReadError(format!("{} not found", href))
        }
        e => CropwatchError::RemoteReadError(format!("Failed to read {}: {}", href, e)),
    }
}

#[async_trait]
impl RangeReader for ObjectRangeReader {
    fn href(&self) -> &str {
        &self.href
    }

    #[instrument(skip(self), fields(href = %self.href))]
    async fn size(&self) -> CropwatchResult<u64> {
        let meta = self
            .store
            .head(&self.location)
            .await
            .map_err(|e| read_error(&self.href, e))?;
        Ok(meta.size as u64)
    }

    #[instrument(skip(self), fields(href = %self.href))]
    async fn read_range(&self, range: Range<u64>) -> CropwatchResult<Bytes> {
        let start = usize::try_from(range.start)
            .map_err(|_| CropwatchError::RemoteReadError(format!("offset {} too large", range.start)))?;
        let end = usize::try_from(range.end)
            .map_err(|_| CropwatchError::RemoteReadError(format!("offset {} too large", range.end)))?;

        let bytes = self
            .store
            .get_range(&self.location, start..end)
            .await
            .map_err(|e| read_error(&self.href, e))?;

        debug!(start, end, size = bytes.len(), "Read range");
        Ok(bytes)
    }
}
