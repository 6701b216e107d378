//! In-memory range readers and raster source that record every request.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use cropwatch_common::{CropwatchError, CropwatchResult};

use crate::{CogReader, RangeReader, RasterSource};

/// One recorded byte-range request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub href: String,
    pub range: Range<u64>,
}

impl RangeRequest {
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type RequestLog = Arc<Mutex<Vec<RangeRequest>>>;

fn snapshot(log: &RequestLog) -> Vec<RangeRequest> {
    log.lock().map(|l| l.clone()).unwrap_or_else(|p| p.into_inner().clone())
}

fn record(log: &RequestLog, request: RangeRequest) {
    match log.lock() {
        Ok(mut l) => l.push(request),
        Err(poisoned) => poisoned.into_inner().push(request),
    }
}

/// Range reader over a byte buffer.
pub struct MemoryRangeReader {
    href: String,
    data: Bytes,
    log: RequestLog,
}

impl MemoryRangeReader {
    pub fn new(href: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            href: href.into(),
            data: data.into(),
            log: Arc::default(),
        }
    }

    /// Requests served so far, in order.
    pub fn requests(&self) -> Vec<RangeRequest> {
        snapshot(&self.log)
    }
}

#[async_trait]
impl RangeReader for MemoryRangeReader {
    fn href(&self) -> &str {
        &self.href
    }

    async fn size(&self) -> CropwatchResult<u64> {
        Ok(self.data.len() as u64)
    }

    async fn read_range(&self, range: Range<u64>) -> CropwatchResult<Bytes> {
        if range.start > range.end || range.end > self.data.len() as u64 {
            return Err(CropwatchError::RemoteReadError(format!(
                "range {:?} is outside {} ({} bytes)",
                range,
                self.href,
                self.data.len()
            )));
        }

        record(
            &self.log,
            RangeRequest {
                href: self.href.clone(),
                range: range.clone(),
            },
        );

        Ok(self.data.slice(range.start as usize..range.end as usize))
    }
}

/// Raster source serving assets from memory, keyed by href.
#[derive(Default)]
pub struct MemoryRasterSource {
    assets: HashMap<String, Bytes>,
    log: RequestLog,
    opens: AtomicUsize,
    header_bytes: Option<usize>,
}

impl MemoryRasterSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset.
    pub fn with_asset(mut self, href: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.assets.insert(href.into(), data.into());
        self
    }

    /// Override the header prefetch size (defaults to the storage default).
    pub fn with_header_bytes(mut self, header_bytes: usize) -> Self {
        self.header_bytes = Some(header_bytes);
        self
    }

    /// Every range request issued against any asset, in order.
    pub fn requests(&self) -> Vec<RangeRequest> {
        snapshot(&self.log)
    }

    /// Range requests issued against one asset.
    pub fn requests_for(&self, href: &str) -> Vec<RangeRequest> {
        self.requests().into_iter().filter(|r| r.href == href).collect()
    }

    /// Total bytes served.
    pub fn bytes_requested(&self) -> u64 {
        self.requests().iter().map(RangeRequest::len).sum()
    }

    /// Number of `open` calls, including failed ones.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Size of a registered asset.
    pub fn asset_len(&self, href: &str) -> Option<usize> {
        self.assets.get(href).map(Bytes::len)
    }
}

#[async_trait]
impl RasterSource for MemoryRasterSource {
    async fn open(&self, href: &str) -> CropwatchResult<CogReader> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let data = self
            .assets
            .get(href)
            .cloned()
            .ok_or_else(|| CropwatchError::RemoteReadError(format!("{} not found", href)))?;

        let reader = MemoryRangeReader {
            href: href.to_string(),
            data,
            log: Arc::clone(&self.log),
        };
        let header_bytes = self
            .header_bytes
            .unwrap_or_else(|| crate::ObjectStorageConfig::default().header_bytes);

        CogReader::open(Arc::new(reader), header_bytes).await
    }
}
