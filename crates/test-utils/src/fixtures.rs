//! Common test fixtures for cropwatch tests.
//!
//! STAC documents shaped like Earth Search responses for Sentinel-2 L2A, and
//! the query points used across the suite.

use serde_json::{json, Value};

/// Query points as (lat, lon).
pub mod points {
    /// Equator, inside WGS84 / UTM 47N (central meridian 99E)
    pub const EQUATOR_100E: (f64, f64) = (0.0, 100.0);

    /// Farmland near Toulouse, UTM 31N
    pub const TOULOUSE: (f64, f64) = (43.6, 1.44);

    /// Southern hemisphere, UTM 20S
    pub const MATO_GROSSO: (f64, f64) = (-12.0, -60.0);
}

/// Dates used in catalog queries.
pub mod dates {
    pub const SUMMER_2025: &str = "2025-07-01";
    pub const SUMMER_2025_INTERVAL: &str = "2025-07-01T00:00:00Z/2025-07-14T23:59:59Z";
}

/// Asset hrefs served by in-memory raster sources.
pub mod hrefs {
    pub const RED: &str = "mem://sentinel-cogs/47/N/QA/2025/7/S2B_47NQA_20250703_0_L2A/B04.tif";
    pub const NIR: &str = "mem://sentinel-cogs/47/N/QA/2025/7/S2B_47NQA_20250703_0_L2A/B08.tif";
}

/// A STAC item with `red` and `nir` assets.
pub fn stac_item_json(id: &str, datetime: &str, cloud_cover: f64, red_href: &str, nir_href: &str) -> Value {
    json!({
        "type": "Feature",
        "stac_version": "1.0.0",
        "id": id,
        "collection": "sentinel-2-l2a",
        "bbox": [99.0, -0.9, 100.0, 0.1],
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[99.0, -0.9], [100.0, -0.9], [100.0, 0.1], [99.0, 0.1], [99.0, -0.9]]]
        },
        "properties": {
            "datetime": datetime,
            "eo:cloud_cover": cloud_cover,
            "proj:epsg": 32647,
            "platform": "sentinel-2b"
        },
        "assets": {
            "red": {
                "href": red_href,
                "type": "image/tiff; application=geotiff; profile=cloud-optimized",
                "title": "Red (band 4) - 10m",
                "roles": ["data", "reflectance"]
            },
            "nir": {
                "href": nir_href,
                "type": "image/tiff; application=geotiff; profile=cloud-optimized",
                "title": "NIR 1 (band 8) - 10m",
                "roles": ["data", "reflectance"]
            },
            "thumbnail": {
                "href": format!("https://example.com/{}/thumbnail.jpg", id),
                "type": "image/jpeg",
                "roles": ["thumbnail"]
            }
        },
        "links": []
    })
}

/// A STAC ItemCollection as returned by `POST /search`.
pub fn stac_feature_collection(items: Vec<Value>) -> Value {
    let returned = items.len();
    json!({
        "type": "FeatureCollection",
        "features": items,
        "numberReturned": returned,
        "links": []
    })
}

/// Items `A`, `B`, `C` in that order, each with distinct band hrefs.
pub fn three_item_collection() -> Value {
    let items = ["A", "B", "C"]
        .iter()
        .enumerate()
        .map(|(i, id)| {
            stac_item_json(
                id,
                &format!("2025-07-0{}T03:45:12Z", i + 1),
                10.0 * (i + 1) as f64,
                &format!("mem://{}/B04.tif", id),
                &format!("mem://{}/B08.tif", id),
            )
        })
        .collect();
    stac_feature_collection(items)
}
