//! Scene search and selection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{info, instrument};

use cropwatch_common::{CropwatchError, CropwatchResult, GeoPoint, SearchWindow};

use crate::{CatalogConfig, SearchRequest, Scene};

/// A queryable imagery catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Run one search, returning candidates in the catalog's order.
    async fn search(&self, request: &SearchRequest) -> CropwatchResult<Vec<Scene>>;
}

/// Pick the last candidate of the returned ordering.
///
/// Catalogs usually return newest first, so with several candidates this
/// prefers the least recent. Not the lowest cloud cover.
pub fn select_last(scenes: Vec<Scene>) -> Option<Scene> {
    scenes.into_iter().last()
}

/// Finds the scene to use for a point and date.
#[derive(Clone)]
pub struct CatalogSearcher {
    catalog: Arc<dyn Catalog>,
    config: CatalogConfig,
}

impl CatalogSearcher {
    pub fn new(catalog: Arc<dyn Catalog>, config: CatalogConfig) -> Self {
        Self { catalog, config }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// The request sent for a point and start date.
    pub fn request_for(&self, point: &GeoPoint, date: NaiveDate) -> CropwatchResult<SearchRequest> {
        let window = SearchWindow::from_date(date, self.config.window_days)?;
        Ok(SearchRequest::new(point, &window, &self.config))
    }

    /// Search and select exactly one scene.
    #[instrument(skip(self), fields(lat = point.lat(), lon = point.lon()))]
    pub async fn search(&self, point: &GeoPoint, date: NaiveDate) -> CropwatchResult<Scene> {
        let request = self.request_for(point, date)?;
        let candidates = self.catalog.search(&request).await?;
        let count = candidates.len();

        let scene = select_last(candidates).ok_or_else(|| {
            CropwatchError::ImageryNotFound(format!(
                "no {} scene at ({:.4}, {:.4}) within {} with cloud cover < {}%",
                self.config.collection,
                point.lat(),
                point.lon(),
                request.datetime,
                self.config.max_cloud_cover
            ))
        })?;

        info!(
            scene = %scene.id,
            datetime = %scene.datetime,
            cloud_cover = ?scene.cloud_cover,
            candidates = count,
            "Selected scene"
        );

        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn scene(id: &str) -> Scene {
        Scene::new(id, Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_select_last() {
        let picked = select_last(vec![scene("A"), scene("B"), scene("C")]).unwrap();
        assert_eq!(picked.id, "C");
        assert!(select_last(vec![]).is_none());
    }

    #[test]
    fn test_request_window() {
        let searcher = CatalogSearcher::new(
            Arc::new(crate::StaticCatalog::new(vec![])),
            CatalogConfig {
                window_days: 3,
                ..Default::default()
            },
        );
        let point = GeoPoint::new(10.0, 370.0).unwrap();
        let request = searcher.request_for(&point, NaiveDate::from_ymd_opt(2024, 12, 30).unwrap())
            .unwrap();

        assert_eq!(request.datetime, "2024-12-30T00:00:00Z/2025-01-02T23:59:59Z");
        assert_eq!(request.intersects.coordinates, [10.0, 10.0]);
    }
}
