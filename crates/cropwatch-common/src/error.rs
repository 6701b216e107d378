//! Error types for the NDVI pipeline.

use thiserror::Error;

/// Result type alias using CropwatchError.
pub type CropwatchResult<T> = Result<T, CropwatchError>;

/// Primary error type for pipeline operations.
///
/// Every failure propagates to the caller as one of these variants; the core
/// performs no local recovery.
#[derive(Debug, Error)]
pub enum CropwatchError {
    // === Data conditions ===
    #[error("No imagery found: {0}")]
    ImageryNotFound(String),

    // === Transient infrastructure faults ===
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Remote read failed: {0}")]
    RemoteReadError(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    // === Consistency faults ===
    #[error("Band shape mismatch: red is {red_rows}x{red_cols}, nir is {nir_rows}x{nir_cols}")]
    ShapeMismatch {
        red_rows: usize,
        red_cols: usize,
        nir_rows: usize,
        nir_cols: usize,
    },

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Reprojection failed: {0}")]
    ReprojectionError(String),

    // === Input, format and output errors ===
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported raster format: {0}")]
    UnsupportedFormat(String),

    #[error("Rendering failed: {0}")]
    RenderError(String),
}

impl CropwatchError {
    /// Whether retrying the failed operation may succeed.
    ///
    /// Only network-level faults qualify. A search that matched nothing is a
    /// data condition and is never retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CropwatchError::CatalogUnavailable(_)
                | CropwatchError::RemoteReadError(_)
                | CropwatchError::Timeout(_)
        )
    }

    /// Short message suitable for display next to the map.
    pub fn user_message(&self) -> &'static str {
        match self {
            CropwatchError::ImageryNotFound(_) => {
                "No Sentinel-2 imagery found for this date/location."
            }
            CropwatchError::CatalogUnavailable(_) => {
                "The imagery catalog is unavailable. Try again shortly."
            }
            CropwatchError::RemoteReadError(_) => {
                "Satellite imagery could not be read. Try again shortly."
            }
            CropwatchError::Timeout(_) => "The imagery service took too long to respond.",
            CropwatchError::InvalidInput(_) => "The selected location or date is invalid.",
            _ => "NDVI could not be computed for this location.",
        }
    }

    /// Stable identifier for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            CropwatchError::ImageryNotFound(_) => "imagery_not_found",
            CropwatchError::CatalogUnavailable(_) => "catalog_unavailable",
            CropwatchError::RemoteReadError(_) => "remote_read_error",
            CropwatchError::Timeout(_) => "timeout",
            CropwatchError::ShapeMismatch { .. } => "shape_mismatch",
            CropwatchError::InvalidWindow(_) => "invalid_window",
            CropwatchError::ReprojectionError(_) => "reprojection_error",
            CropwatchError::InvalidInput(_) => "invalid_input",
            CropwatchError::UnsupportedFormat(_) => "unsupported_format",
            CropwatchError::RenderError(_) => "render_error",
        }
    }
}

impl From<std::io::Error> for CropwatchError {
    fn from(err: std::io::Error) -> Self {
        CropwatchError::RemoteReadError(err.to_string())
    }
}

impl From<serde_json::Error> for CropwatchError {
    fn from(err: serde_json::Error) -> Self {
        CropwatchError::CatalogUnavailable(format!("malformed catalog response: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CropwatchError::CatalogUnavailable("503".into()).is_transient());
        assert!(CropwatchError::RemoteReadError("reset".into()).is_transient());
        assert!(CropwatchError::Timeout("catalog search".into()).is_transient());

        assert!(!CropwatchError::ImageryNotFound("none".into()).is_transient());
        assert!(!CropwatchError::InvalidWindow("outside".into()).is_transient());
        assert!(!CropwatchError::ShapeMismatch {
            red_rows: 1,
            red_cols: 1,
            nir_rows: 2,
            nir_cols: 2
        }
        .is_transient());
    }

    #[test]
    fn test_user_message_for_missing_imagery() {
        let err = CropwatchError::ImageryNotFound("no scenes".into());
        assert_eq!(
            err.user_message(),
            "No Sentinel-2 imagery found for this date/location."
        );
        assert_eq!(err.kind(), "imagery_not_found");
    }

    #[test]
    fn test_json_error_maps_to_catalog() {
        let err: CropwatchError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, CropwatchError::CatalogUnavailable(_)));
    }
}
