//! Catalog serving a fixed scene list.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use cropwatch_common::{CropwatchError, CropwatchResult};

use crate::{parse_item_collection, Catalog, SearchRequest, Scene};

/// Returns the same scenes for every request and records what it was asked.
#[derive(Default)]
pub struct StaticCatalog {
    scenes: Vec<Scene>,
    delay: Option<Duration>,
    failures: AtomicUsize,
    calls: AtomicUsize,
    requests: Mutex<Vec<SearchRequest>>,
}

impl StaticCatalog {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self {
            scenes,
            ..Default::default()
        }
    }

    /// Load scenes from a STAC ItemCollection document.
    pub fn from_item_collection(body: &[u8]) -> CropwatchResult<Self> {
        Ok(Self::new(parse_item_collection(body, usize::MAX, &[])?))
    }

    /// Sleep before answering each search.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the first `n` searches with `CatalogUnavailable`.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    /// Number of searches received, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<SearchRequest> {
        match self.requests.lock() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn search(&self, request: &SearchRequest) -> CropwatchResult<Vec<Scene>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.requests.lock() {
            Ok(mut r) => r.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CropwatchError::CatalogUnavailable(
                "search returned HTTP 503 Service Unavailable".to_string(),
            ));
        }

        Ok(self.scenes.clone())
    }
}
