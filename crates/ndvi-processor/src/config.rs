//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use catalog::CatalogConfig;
use cropwatch_common::{CropwatchError, CropwatchResult, DEFAULT_MARGIN_DEG};
use renderer::RenderConfig;
use storage::ObjectStorageConfig;

use crate::RetryConfig;

/// Everything one pipeline run needs besides its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub catalog: CatalogConfig,

    pub storage: ObjectStorageConfig,

    /// Half-width of the square read region around the point, in degrees.
    pub margin_deg: f64,

    /// Deadline for one catalog search attempt.
    pub catalog_timeout: Duration,

    /// Deadline for one raster open or window read attempt.
    pub read_timeout: Duration,

    pub retry: RetryConfig,

    pub render: RenderConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            storage: ObjectStorageConfig::default(),
            margin_deg: DEFAULT_MARGIN_DEG,
            catalog_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            retry: RetryConfig::default(),
            render: RenderConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self {
            catalog: CatalogConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("REGION_MARGIN_DEG") {
            if let Ok(margin) = val.parse() {
                config.margin_deg = margin;
            }
        }

        if let Ok(val) = std::env::var("COG_HEADER_BYTES") {
            if let Ok(bytes) = val.parse() {
                config.storage.header_bytes = bytes;
            }
        }

        if let Ok(val) = std::env::var("S3_REGION") {
            config.storage.s3_region = val;
        }

        if let Ok(val) = std::env::var("CATALOG_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.catalog_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("READ_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                config.read_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(val) = std::env::var("RETRY_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                config.retry.max_attempts = n;
            }
        }

        if let Ok(val) = std::env::var("RENDER_PANEL_SIZE") {
            if let Ok(size) = val.parse() {
                config.render.panel_size = size;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.catalog.validate()?;
        self.retry.validate()?;
        self.render.validate()?;

        if !(self.margin_deg > 0.0 && self.margin_deg <= 1.0) {
            return Err("margin_deg must be in (0, 1]".to_string());
        }

        if self.storage.header_bytes < 16 {
            return Err("storage header_bytes must be >= 16".to_string());
        }

        if self.catalog_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err("timeouts must be > 0".to_string());
        }

        Ok(())
    }

    /// `validate` as a pipeline error.
    pub fn check(&self) -> CropwatchResult<()> {
        self.validate()
            .map_err(|e| CropwatchError::InvalidInput(format!("invalid configuration: {}", e)))
    }
}
