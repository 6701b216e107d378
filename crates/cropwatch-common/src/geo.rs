//! Geographic query inputs: the selected point and its buffer region.

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, CropwatchError, CropwatchResult};

/// Default half-width of the query buffer, in degrees.
pub const DEFAULT_MARGIN_DEG: f64 = 0.05;

/// Wrap a longitude into [-180, 180].
///
/// Values already inside the interval, including both boundaries, are
/// returned unchanged so the operation is idempotent.
pub fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// A WGS84 point with latitude in [-90, 90] and normalized longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

impl GeoPoint {
    /// Create a point, normalizing longitude and rejecting invalid latitude.
    pub fn new(lat: f64, lon: f64) -> CropwatchResult<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(CropwatchError::InvalidInput(format!(
                "latitude {} outside [-90, 90]",
                lat
            )));
        }
        if !lon.is_finite() {
            return Err(CropwatchError::InvalidInput(format!(
                "longitude {} is not finite",
                lon
            )));
        }

        Ok(Self {
            lat,
            lon: normalize_longitude(lon),
        })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

/// A square geographic buffer around a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryRegion {
    pub center: GeoPoint,
    /// Half-width of the square, in degrees.
    pub margin_deg: f64,
}

impl QueryRegion {
    pub fn new(center: GeoPoint, margin_deg: f64) -> CropwatchResult<Self> {
        if !margin_deg.is_finite() || margin_deg <= 0.0 {
            return Err(CropwatchError::InvalidInput(format!(
                "region margin must be positive, got {}",
                margin_deg
            )));
        }
        Ok(Self { center, margin_deg })
    }

    /// Region with the default 0.05 degree margin.
    pub fn around(center: GeoPoint) -> Self {
        Self {
            center,
            margin_deg: DEFAULT_MARGIN_DEG,
        }
    }

    /// Geographic bounds of the buffer (x = longitude, y = latitude).
    ///
    /// Corners are not re-wrapped: a point at 179.98 yields max_x 180.03,
    /// which projects continuously into the point's own UTM zone.
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.center.lon - self.margin_deg,
            self.center.lat - self.margin_deg,
            self.center.lon + self.margin_deg,
            self.center.lat + self.margin_deg,
        )
    }

    /// The four corners as (lon, lat) pairs, counter-clockwise from south-west.
    pub fn corners(&self) -> [(f64, f64); 4] {
        let b = self.bounds();
        [
            (b.min_x, b.min_y),
            (b.max_x, b.min_y),
            (b.max_x, b.max_y),
            (b.min_x, b.max_y),
        ]
    }
}
