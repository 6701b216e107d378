//! Coordinate Reference System codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// CRS codes the pipeline can project into.
///
/// Sentinel-2 tiles are delivered in WGS84 / UTM, one zone per tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
    /// WGS84 / UTM zone 1-60, northern (EPSG:326zz) or southern (EPSG:327zz) hemisphere
    Utm { zone: u8, north: bool },
}

impl CrsCode {
    /// Map an EPSG code to a supported CRS.
    pub fn from_epsg(code: u32) -> Result<Self, CrsParseError> {
        match code {
            4326 => Ok(CrsCode::Epsg4326),
            3857 | 900913 => Ok(CrsCode::Epsg3857),
            32601..=32660 => Ok(CrsCode::Utm {
                zone: (code - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(CrsCode::Utm {
                zone: (code - 32700) as u8,
                north: false,
            }),
            _ => Err(CrsParseError::UnsupportedCrs(format!("EPSG:{}", code))),
        }
    }

    /// The EPSG code of this CRS.
    pub fn epsg(&self) -> u32 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg3857 => 3857,
            CrsCode::Utm { zone, north: true } => 32600 + *zone as u32,
            CrsCode::Utm { zone, north: false } => 32700 + *zone as u32,
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_epsg() {
        assert_eq!(CrsCode::from_epsg(4326).unwrap(), CrsCode::Epsg4326);
        assert_eq!(
            CrsCode::from_epsg(32647).unwrap(),
            CrsCode::Utm { zone: 47, north: true }
        );
        assert_eq!(
            CrsCode::from_epsg(32733).unwrap(),
            CrsCode::Utm { zone: 33, north: false }
        );
        assert!(CrsCode::from_epsg(32600).is_err());
        assert!(CrsCode::from_epsg(32661).is_err());
        assert!(CrsCode::from_epsg(2154).is_err());
    }

    #[test]
    fn test_epsg_round_trip_and_display() {
        for code in [4326, 3857, 32601, 32647, 32760] {
            assert_eq!(CrsCode::from_epsg(code).unwrap().epsg(), code);
        }
        assert_eq!(CrsCode::from_epsg(900913).unwrap(), CrsCode::Epsg3857);
        assert_eq!(CrsCode::Utm { zone: 47, north: true }.to_string(), "EPSG:32647");
    }
}
