//! Reprojection of geographic query regions into a raster's CRS.

use cropwatch_common::{BoundingBox, CropwatchError, CropwatchResult, CrsCode, QueryRegion};
use tracing::debug;

use crate::{TransverseMercator, WebMercator};

/// A forward projection from WGS84 (lon, lat) into a supported CRS.
///
/// All methods take and return coordinates in (x, y) order, with x the
/// longitude or easting, whatever the target system's declared axis order.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Geographic,
    WebMercator(WebMercator),
    TransverseMercator(TransverseMercator),
}

impl Projection {
    pub fn for_crs(crs: CrsCode) -> Self {
        match crs {
            CrsCode::Epsg4326 => Projection::Geographic,
            CrsCode::Epsg3857 => Projection::WebMercator(WebMercator),
            CrsCode::Utm { zone, north } => {
                Projection::TransverseMercator(TransverseMercator::utm(zone, north))
            }
        }
    }

    /// Project one (lon, lat) point. Fails if the result is not finite.
    pub fn forward(&self, lon: f64, lat: f64) -> CropwatchResult<(f64, f64)> {
        let (x, y) = match self {
            Projection::Geographic => (lon, lat),
            Projection::WebMercator(p) => p.project(lon, lat),
            Projection::TransverseMercator(p) => p.project(lon, lat),
        };

        if !x.is_finite() || !y.is_finite() {
            return Err(CropwatchError::ReprojectionError(format!(
                "({}, {}) has no finite image in the target CRS",
                lon, lat
            )));
        }
        Ok((x, y))
    }
}

/// Reproject a query region into `target`, returning its (x, y) bounds.
///
/// Each of the four corners of the geographic square is projected and the
/// enclosing box of the results is returned.
pub fn reproject(region: &QueryRegion, target: CrsCode) -> CropwatchResult<BoundingBox> {
    let projection = Projection::for_crs(target);

    let projected = region
        .corners()
        .iter()
        .map(|&(lon, lat)| projection.forward(lon, lat))
        .collect::<CropwatchResult<Vec<_>>>()?;

    let bounds = BoundingBox::from_points(projected).ok_or_else(|| {
        CropwatchError::ReprojectionError("query region has no corners".to_string())
    })?;

    debug!(
        crs = %target,
        min_x = bounds.min_x,
        min_y = bounds.min_y,
        max_x = bounds.max_x,
        max_y = bounds.max_y,
        "Reprojected query region"
    );

    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropwatch_common::GeoPoint;

    #[test]
    fn test_geographic_is_identity() {
        let region = QueryRegion::around(GeoPoint::new(45.0, 7.0).unwrap());
        let bounds = reproject(&region, CrsCode::Epsg4326).unwrap();
        assert_eq!(bounds, region.bounds());
    }

    #[test]
    fn test_pole_fails_in_web_mercator() {
        let region = QueryRegion::around(GeoPoint::new(90.0, 0.0).unwrap());
        let err = reproject(&region, CrsCode::Epsg3857).unwrap_err();
        assert!(matches!(err, CropwatchError::ReprojectionError(_)));
    }
}
