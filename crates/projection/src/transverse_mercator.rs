//! Transverse Mercator projection on the WGS84 ellipsoid.
//!
//! Sentinel-2 tiles are distributed on the UTM grid, so every band raster the
//! pipeline reads is in one of the 120 UTM zones. The forward mapping uses
//! Krüger's series in the third flattening `n`, truncated after the n³ term,
//! which is accurate to well under a millimetre within a zone.
//!
//! Parameters:
//! - Central meridian: `6 * zone - 183` degrees
//! - Scale factor on the central meridian (k0): 0.9996
//! - False easting: 500 000 m
//! - False northing: 0 m (north) or 10 000 000 m (south)

use std::f64::consts::PI;

/// WGS84 semi-major axis (meters)
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_SOUTH_FALSE_NORTHING: f64 = 10_000_000.0;

/// Transverse Mercator projection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TransverseMercator {
    /// Central meridian in radians
    pub lon0: f64,
    /// Scale factor on the central meridian
    pub k0: f64,
    pub false_easting: f64,
    pub false_northing: f64,
    /// First eccentricity
    e: f64,
    /// k0 times the rectifying radius
    k0_a: f64,
    /// Krüger series coefficients
    alpha: [f64; 3],
}

impl TransverseMercator {
    /// Create a projection on WGS84 with an arbitrary central meridian.
    pub fn new(lon0_deg: f64, k0: f64, false_easting: f64, false_northing: f64) -> Self {
        let f = WGS84_F;
        let n = f / (2.0 - f);
        let n2 = n * n;
        let n3 = n2 * n;

        // Rectifying radius
        let a_rect = WGS84_A / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0);

        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0,
            61.0 * n3 / 240.0,
        ];

        Self {
            lon0: lon0_deg.to_radians(),
            k0,
            false_easting,
            false_northing,
            e: (f * (2.0 - f)).sqrt(),
            k0_a: k0 * a_rect,
            alpha,
        }
    }

    /// WGS84 / UTM zone projection (EPSG:326zz north, EPSG:327zz south).
    pub fn utm(zone: u8, north: bool) -> Self {
        let lon0 = zone as f64 * 6.0 - 183.0;
        let false_northing = if north { 0.0 } else { UTM_SOUTH_FALSE_NORTHING };
        Self::new(lon0, UTM_K0, UTM_FALSE_EASTING, false_northing)
    }

    /// Central meridian in degrees.
    pub fn central_meridian(&self) -> f64 {
        self.lon0.to_degrees()
    }

    /// Project geographic coordinates (degrees) to (easting, northing) in meters.
    ///
    /// Returns non-finite values at the poles' singular longitudes 90 degrees
    /// away from the central meridian; callers check the result.
    pub fn project(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let phi = lat_deg.to_radians();

        // Longitude difference wrapped to [-π, π]
        let mut dlon = lon_deg.to_radians() - self.lon0;
        while dlon > PI {
            dlon -= 2.0 * PI;
        }
        while dlon < -PI {
            dlon += 2.0 * PI;
        }

        // Conformal latitude expressed through its tangent
        let sin_phi = phi.sin();
        let t = (sin_phi.atanh() - self.e * (self.e * sin_phi).atanh()).sinh();

        let xi_prime = t.atan2(dlon.cos());
        let eta_prime = (dlon.sin() / (1.0 + t * t).sqrt()).atanh();

        let mut xi = xi_prime;
        let mut eta = eta_prime;
        for (j, alpha) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j + 1) as f64;
            xi += alpha * (k * xi_prime).sin() * (k * eta_prime).cosh();
            eta += alpha * (k * xi_prime).cos() * (k * eta_prime).sinh();
        }

        (
            self.false_easting + self.k0_a * eta,
            self.false_northing + self.k0_a * xi,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_central_meridian() {
        assert_eq!(TransverseMercator::utm(47, true).central_meridian(), 99.0);
        assert_eq!(TransverseMercator::utm(1, true).central_meridian(), -177.0);
        assert_eq!(TransverseMercator::utm(60, false).central_meridian(), 177.0);
    }

    #[test]
    fn test_origin_on_central_meridian() {
        let tm = TransverseMercator::utm(31, true);
        let (x, y) = tm.project(3.0, 0.0);
        assert!((x - 500_000.0).abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_equator_one_degree_east() {
        // (100E, 0N) in zone 47N
        let tm = TransverseMercator::utm(47, true);
        let (x, y) = tm.project(100.0, 0.0);
        assert!((x - 611_280.651).abs() < 0.01, "easting {}", x);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_madrid_zone_30() {
        let tm = TransverseMercator::utm(30, true);
        let (x, y) = tm.project(-3.7, 40.4);
        assert!((x - 440_598.079).abs() < 0.01, "easting {}", x);
        assert!((y - 4_472_390.031).abs() < 0.01, "northing {}", y);
    }

    #[test]
    fn test_southern_hemisphere_false_northing() {
        let tm = TransverseMercator::utm(56, false);
        let (x, y) = tm.project(151.2, -33.9);
        assert!((x - 333_568.941).abs() < 0.01, "easting {}", x);
        assert!((y - 6_247_473.337).abs() < 0.01, "northing {}", y);
    }

    #[test]
    fn test_symmetry_about_central_meridian() {
        let tm = TransverseMercator::utm(33, true);
        let (xe, ye) = tm.project(15.5, 48.0);
        let (xw, yw) = tm.project(14.5, 48.0);
        assert!(((xe - 500_000.0) + (xw - 500_000.0)).abs() < 1e-6);
        assert!((ye - yw).abs() < 1e-6);
    }
}
