//! STAC API item search.
//!
//! Requests follow the STAC API `POST /search` form with an `intersects`
//! point geometry and the `query` extension for the cloud-cover filter.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use cropwatch_common::{CropwatchError, CropwatchResult, GeoPoint, SearchWindow};

use crate::{AssetRef, Catalog, CatalogConfig, Scene};

/// GeoJSON point, coordinates in (lon, lat) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: [f64; 2],
}

impl PointGeometry {
    pub fn new(point: &GeoPoint) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: [point.lon(), point.lat()],
        }
    }
}

/// A property comparison in the STAC query extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub lt: f64,
}

/// Body of a `POST /search` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub collections: Vec<String>,
    pub intersects: PointGeometry,
    pub datetime: String,
    pub limit: usize,
    pub query: BTreeMap<String, Comparison>,
}

impl SearchRequest {
    pub fn new(point: &GeoPoint, window: &SearchWindow, config: &CatalogConfig) -> Self {
        let mut query = BTreeMap::new();
        query.insert(
            "eo:cloud_cover".to_string(),
            Comparison {
                lt: config.max_cloud_cover,
            },
        );

        Self {
            collections: vec![config.collection.clone()],
            intersects: PointGeometry::new(point),
            datetime: window.to_stac_interval(),
            limit: config.max_items,
            query,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ItemCollection {
    #[serde(default)]
    features: Vec<StacItem>,
}

#[derive(Debug, Deserialize)]
struct StacItem {
    id: String,
    properties: ItemProperties,
    #[serde(default)]
    assets: HashMap<String, StacAsset>,
}

#[derive(Debug, Deserialize)]
struct ItemProperties {
    datetime: Option<DateTime<Utc>>,
    #[serde(rename = "eo:cloud_cover")]
    cloud_cover: Option<f64>,
    #[serde(rename = "proj:epsg")]
    epsg: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StacAsset {
    href: String,
    #[serde(rename = "type")]
    media_type: Option<String>,
}

/// Turn a search response into scenes.
///
/// Keeps at most `max_items` features in their returned order. A feature
/// without a datetime or without one of `required_assets` makes the whole
/// response malformed.
pub fn parse_item_collection(
    body: &[u8],
    max_items: usize,
    required_assets: &[&str],
) -> CropwatchResult<Vec<Scene>> {
    let collection: ItemCollection = serde_json::from_slice(body).map_err(|e| {
        CropwatchError::CatalogUnavailable(format!("malformed search response: {}", e))
    })?;

    collection
        .features
        .into_iter()
        .take(max_items)
        .map(|item| {
            let datetime = item.properties.datetime.ok_or_else(|| {
                CropwatchError::CatalogUnavailable(format!("item {} has no datetime", item.id))
            })?;

            if let Some(missing) = required_assets.iter().find(|k| !item.assets.contains_key(**k)) {
                return Err(CropwatchError::CatalogUnavailable(format!(
                    "item {} has no '{}' asset",
                    item.id, missing
                )));
            }

            let assets = item
                .assets
                .into_iter()
                .map(|(key, asset)| {
                    (
                        key,
                        AssetRef {
                            href: asset.href,
                            media_type: asset.media_type,
                        },
                    )
                })
                .collect();

            Ok(Scene {
                id: item.id,
                datetime,
                cloud_cover: item.properties.cloud_cover,
                epsg: item.properties.epsg,
                assets,
            })
        })
        .collect()
}

/// HTTP client for a STAC API.
pub struct StacClient {
    client: Client,
    config: CatalogConfig,
}

impl StacClient {
    pub fn new(config: CatalogConfig) -> CropwatchResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| {
                CropwatchError::CatalogUnavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }
}

fn request_error(err: reqwest::Error) -> CropwatchError {
    if err.is_timeout() {
        CropwatchError::Timeout(format!("catalog search: {}", err))
    } else {
        CropwatchError::CatalogUnavailable(err.to_string())
    }
}

#[async_trait]
impl Catalog for StacClient {
    #[instrument(skip(self, request), fields(url = %self.config.url, datetime = %request.datetime))]
    async fn search(&self, request: &SearchRequest) -> CropwatchResult<Vec<Scene>> {
        let response = self
            .client
            .post(self.config.search_url())
            .json(request)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CropwatchError::CatalogUnavailable(format!(
                "search returned HTTP {}",
                status
            )));
        }

        let body = response.bytes().await.map_err(request_error)?;
        debug!(bytes = body.len(), "Search response received");

        parse_item_collection(
            &body,
            self.config.max_items,
            &[&self.config.red_asset, &self.config.nir_asset],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropwatch_common::parse_date;
    use test_utils::{fixtures, stac_feature_collection, stac_item_json, three_item_collection};

    #[test]
    fn test_request_body() {
        let point = GeoPoint::new(0.0, 100.0).unwrap();
        let window = SearchWindow::parse(fixtures::dates::SUMMER_2025, 13).unwrap();
        let request = SearchRequest::new(&point, &window, &CatalogConfig::default());

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["collections"][0], "sentinel-2-l2a");
        assert_eq!(body["intersects"]["type"], "Point");
        assert_eq!(body["intersects"]["coordinates"][0], 100.0);
        assert_eq!(body["intersects"]["coordinates"][1], 0.0);
        assert_eq!(body["datetime"], fixtures::dates::SUMMER_2025_INTERVAL);
        assert_eq!(body["limit"], 1);
        assert_eq!(body["query"]["eo:cloud_cover"]["lt"], 99.0);
        assert!(body.get("bbox").is_none());
    }

    #[test]
    fn test_parse_keeps_order_and_truncates() {
        let body = serde_json::to_vec(&three_item_collection()).unwrap();

        let all = parse_item_collection(&body, 10, &["red", "nir"]).unwrap();
        let ids: Vec<&str> = all.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["A", "B", "C"]);
        assert_eq!(all[2].band("nir").unwrap().href, "mem://C/B08.tif");
        assert_eq!(all[0].epsg, Some(32647));
        assert_eq!(all[1].cloud_cover, Some(20.0));

        let capped = parse_item_collection(&body, 2, &["red", "nir"]).unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[1].id, "B");
    }

    #[test]
    fn test_parse_empty() {
        let body = serde_json::to_vec(&stac_feature_collection(vec![])).unwrap();
        assert!(parse_item_collection(&body, 1, &["red", "nir"]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_band_asset() {
        let mut item = stac_item_json(
            "S2",
            "2025-07-03T03:45:12Z",
            5.0,
            fixtures::hrefs::RED,
            fixtures::hrefs::NIR,
        );
        item["assets"].as_object_mut().unwrap().remove("nir");
        let body = serde_json::to_vec(&stac_feature_collection(vec![item])).unwrap();

        let err = parse_item_collection(&body, 1, &["red", "nir"]).unwrap_err();
        assert!(matches!(err, CropwatchError::CatalogUnavailable(_)));
    }

    #[test]
    fn test_not_json() {
        let err = parse_item_collection(b"<html>502 Bad Gateway</html>", 1, &[]).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_datetime_parsed() {
        let body = serde_json::to_vec(&three_item_collection()).unwrap();
        let scenes = parse_item_collection(&body, 1, &[]).unwrap();
        assert_eq!(
            scenes[0].datetime.date_naive(),
            parse_date("2025-07-01").unwrap()
        );
    }
}
