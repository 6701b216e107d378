//! Catalog search configuration.

use serde::{Deserialize, Serialize};

use cropwatch_common::DEFAULT_WINDOW_DAYS;

/// Longest search window accepted, in days.
pub const MAX_WINDOW_DAYS: u32 = 366;

/// Where and how to search for scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// STAC API root; searches go to `{url}/search`
    pub url: String,

    /// Collection identifier
    pub collection: String,

    /// Exclusive upper bound on scene cloud cover, in percent
    pub max_cloud_cover: f64,

    /// Maximum number of items requested and kept
    pub max_items: usize,

    /// Length of the forward-looking search window, in days
    pub window_days: u32,

    /// Asset key of the red band
    pub red_asset: String,

    /// Asset key of the near-infrared band
    pub nir_asset: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: "https://earth-search.aws.element84.com/v1".to_string(),
            collection: "sentinel-2-l2a".to_string(),
            max_cloud_cover: 99.0,
            max_items: 1,
            window_days: DEFAULT_WINDOW_DAYS,
            red_asset: "red".to_string(),
            nir_asset: "nir".to_string(),
        }
    }
}

impl CatalogConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CATALOG_URL") {
            config.url = val;
        }

        if let Ok(val) = std::env::var("CATALOG_COLLECTION") {
            config.collection = val;
        }

        if let Ok(val) = std::env::var("MAX_CLOUD_COVER") {
            if let Ok(pct) = val.parse() {
                config.max_cloud_cover = pct;
            }
        }

        if let Ok(val) = std::env::var("CATALOG_MAX_ITEMS") {
            if let Ok(n) = val.parse() {
                config.max_items = n;
            }
        }

        if let Ok(val) = std::env::var("SEARCH_WINDOW_DAYS") {
            if let Ok(days) = val.parse() {
                config.window_days = days;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("https://") || self.url.starts_with("http://")) {
            return Err(format!("catalog url must be http(s): {}", self.url));
        }

        if self.collection.is_empty() {
            return Err("catalog collection must not be empty".to_string());
        }

        if !(self.max_cloud_cover > 0.0 && self.max_cloud_cover <= 100.0) {
            return Err("max_cloud_cover must be in (0, 100]".to_string());
        }

        if self.max_items == 0 {
            return Err("max_items must be > 0".to_string());
        }

        if self.window_days > MAX_WINDOW_DAYS {
            return Err(format!(
                "window_days must be <= {}, got {}",
                MAX_WINDOW_DAYS, self.window_days
            ));
        }

        if self.red_asset == self.nir_asset {
            return Err("red and nir asset keys must differ".to_string());
        }

        Ok(())
    }

    /// The STAC search endpoint.
    pub fn search_url(&self) -> String {
        format!("{}/search", self.url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CatalogConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_days, 13);
        assert_eq!(
            config.search_url(),
            "https://earth-search.aws.element84.com/v1/search"
        );
    }

    #[test]
    fn test_trailing_slash() {
        let config = CatalogConfig {
            url: "http://localhost:8080/stac/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.search_url(), "http://localhost:8080/stac/search");
    }

    #[test]
    fn test_validate_rejects() {
        let bad_cloud = CatalogConfig {
            max_cloud_cover: 0.0,
            ..Default::default()
        };
        assert!(bad_cloud.validate().is_err());

        let no_items = CatalogConfig {
            max_items: 0,
            ..Default::default()
        };
        assert!(no_items.validate().is_err());

        let same_keys = CatalogConfig {
            nir_asset: "red".to_string(),
            ..Default::default()
        };
        assert!(same_keys.validate().is_err());
    }

    #[test]
    fn test_window_days_bounds() {
        let year = CatalogConfig {
            window_days: MAX_WINDOW_DAYS,
            ..Default::default()
        };
        assert!(year.validate().is_ok());

        let huge = CatalogConfig {
            window_days: 100_000_000,
            ..Default::default()
        };
        assert!(huge.validate().unwrap_err().contains("window_days"));
    }
}
