//! Scenes returned by a catalog search.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cropwatch_common::{CropwatchError, CropwatchResult};

/// Reference to one band asset of a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl AssetRef {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            media_type: None,
        }
    }
}

/// One satellite acquisition with its band assets keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub datetime: DateTime<Utc>,
    /// Scene-level cloud cover, percent
    pub cloud_cover: Option<f64>,
    /// EPSG code advertised by the catalog, if any. The raster header is
    /// authoritative.
    pub epsg: Option<u32>,
    pub assets: BTreeMap<String, AssetRef>,
}

impl Scene {
    pub fn new(id: impl Into<String>, datetime: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            datetime,
            cloud_cover: None,
            epsg: None,
            assets: BTreeMap::new(),
        }
    }

    pub fn with_cloud_cover(mut self, cloud_cover: f64) -> Self {
        self.cloud_cover = Some(cloud_cover);
        self
    }

    pub fn with_asset(mut self, key: impl Into<String>, href: impl Into<String>) -> Self {
        self.assets.insert(key.into(), AssetRef::new(href));
        self
    }

    /// Look up a band asset.
    pub fn band(&self, key: &str) -> CropwatchResult<&AssetRef> {
        self.assets.get(key).ok_or_else(|| {
            CropwatchError::CatalogUnavailable(format!(
                "scene {} has no '{}' asset",
                self.id, key
            ))
        })
    }
}
