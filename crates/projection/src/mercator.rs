//! Spherical (Web) Mercator projection, EPSG:3857.

use std::f64::consts::PI;

/// Radius of the sphere used by EPSG:3857 (the WGS84 semi-major axis).
pub const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude beyond which Web Mercator is conventionally clipped.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WebMercator;

impl WebMercator {
    /// Project (lon, lat) in degrees to (x, y) in meters.
    ///
    /// Latitudes of ±90 map to infinite northings.
    pub fn project(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let x = WEB_MERCATOR_RADIUS * lon_deg.to_radians();
        if lat_deg.abs() >= 90.0 {
            return (x, f64::INFINITY.copysign(lat_deg));
        }
        let y = WEB_MERCATOR_RADIUS * (PI / 4.0 + lat_deg.to_radians() / 2.0).tan().ln();
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin() {
        let (x, y) = WebMercator.project(0.0, 0.0);
        assert_eq!(x, 0.0);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn test_world_extent() {
        let (x, y) = WebMercator.project(180.0, MAX_LATITUDE);
        assert!((x - 20_037_508.342_789_244).abs() < 1e-6);
        assert!((y - 20_037_508.342_789_244).abs() < 1e-3);
    }

    #[test]
    fn test_pole_is_not_finite() {
        let (_, y) = WebMercator.project(0.0, 90.0);
        assert!(!y.is_finite());
    }
}
