//! GeoTIFF georeferencing: CRS from GeoKeys, affine transform from model tags.

use cropwatch_common::{CropwatchError, CropwatchResult, CrsCode, GeoTransform};

/// GeoKey ids read by the reader.
pub mod keys {
    pub const GT_MODEL_TYPE: u16 = 1024;
    pub const GT_RASTER_TYPE: u16 = 1025;
    pub const GEOGRAPHIC_TYPE: u16 = 2048;
    pub const PROJECTED_CS_TYPE: u16 = 3072;
}

const USER_DEFINED: u64 = 32767;
const RASTER_PIXEL_IS_POINT: u64 = 2;

/// Short-valued GeoKeys from a GeoKeyDirectory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoKeys {
    entries: Vec<(u16, u64)>,
}

impl GeoKeys {
    /// Parse the u16 GeoKeyDirectory array. Keys stored in other tags
    /// (doubles, ASCII) are skipped.
    pub fn parse(directory: &[u64]) -> CropwatchResult<Self> {
        if directory.len() < 4 {
            return Err(CropwatchError::UnsupportedFormat(
                "GeoKeyDirectory is shorter than its header".to_string(),
            ));
        }
        let count = directory[3] as usize;
        let body = &directory[4..];
        if body.len() < count * 4 {
            return Err(CropwatchError::UnsupportedFormat(format!(
                "GeoKeyDirectory declares {} keys but holds {}",
                count,
                body.len() / 4
            )));
        }

        let entries = body
            .chunks_exact(4)
            .take(count)
            .filter(|k| k[1] == 0)
            .map(|k| (k[0] as u16, k[3]))
            .collect();
        Ok(Self { entries })
    }

    pub fn get(&self, key: u16) -> Option<u64> {
        self.entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    /// Resolve the raster CRS.
    pub fn crs(&self) -> CropwatchResult<CrsCode> {
        let code = self
            .get(keys::PROJECTED_CS_TYPE)
            .filter(|c| *c != USER_DEFINED)
            .or_else(|| self.get(keys::GEOGRAPHIC_TYPE).filter(|c| *c != USER_DEFINED))
            .ok_or_else(|| {
                CropwatchError::ReprojectionError(
                    "raster declares no EPSG coordinate system".to_string(),
                )
            })?;

        CrsCode::from_epsg(code as u32)
            .map_err(|e| CropwatchError::ReprojectionError(format!("raster CRS: {}", e)))
    }

    pub fn pixel_is_point(&self) -> bool {
        self.get(keys::GT_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT)
    }
}

/// Build the affine transform from ModelTransformation, or from
/// ModelPixelScale plus the first ModelTiepoint.
///
/// Point-registered rasters are shifted by half a pixel so the transform
/// always addresses pixel corners.
pub fn geo_transform(
    pixel_scale: Option<&[f64]>,
    tiepoint: Option<&[f64]>,
    transformation: Option<&[f64]>,
    pixel_is_point: bool,
) -> CropwatchResult<GeoTransform> {
    let mut transform = match (transformation, pixel_scale, tiepoint) {
        (Some(m), _, _) if m.len() >= 16 => GeoTransform {
            origin_x: m[3],
            pixel_width: m[0],
            row_rotation: m[1],
            origin_y: m[7],
            col_rotation: m[4],
            pixel_height: m[5],
        },
        (_, Some(scale), Some(tie)) if scale.len() >= 2 && tie.len() >= 6 => {
            let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
            GeoTransform {
                origin_x: x - i * scale[0],
                pixel_width: scale[0],
                row_rotation: 0.0,
                origin_y: y + j * scale[1],
                col_rotation: 0.0,
                pixel_height: -scale[1],
            }
        }
        _ => {
            return Err(CropwatchError::UnsupportedFormat(
                "raster has no georeferencing tags".to_string(),
            ))
        }
    };

    if pixel_is_point {
        let (x, y) = transform.pixel_to_world(-0.5, -0.5);
        transform.origin_x = x;
        transform.origin_y = y;
    }

    Ok(transform)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(keys: &[(u64, u64)]) -> Vec<u64> {
        let mut dir = vec![1, 1, 0, keys.len() as u64];
        for (id, value) in keys {
            dir.extend_from_slice(&[*id, 0, 1, *value]);
        }
        dir
    }

    #[test]
    fn test_projected_crs() {
        let keys = GeoKeys::parse(&directory(&[(1024, 1), (1025, 1), (3072, 32647)])).unwrap();
        assert_eq!(keys.crs().unwrap(), CrsCode::Utm { zone: 47, north: true });
        assert!(!keys.pixel_is_point());
    }

    #[test]
    fn test_geographic_crs() {
        let keys = GeoKeys::parse(&directory(&[(1024, 2), (2048, 4326)])).unwrap();
        assert_eq!(keys.crs().unwrap(), CrsCode::Epsg4326);
    }

    #[test]
    fn test_user_defined_crs_fails() {
        let keys = GeoKeys::parse(&directory(&[(3072, 32767)])).unwrap();
        assert!(matches!(keys.crs(), Err(CropwatchError::ReprojectionError(_))));

        let keys = GeoKeys::parse(&directory(&[(3072, 2154)])).unwrap();
        assert!(matches!(keys.crs(), Err(CropwatchError::ReprojectionError(_))));
    }

    #[test]
    fn test_transform_from_scale_and_tiepoint() {
        let t = geo_transform(
            Some(&[10.0, 10.0, 0.0]),
            Some(&[0.0, 0.0, 0.0, 600000.0, 5000040.0, 0.0]),
            None,
            false,
        )
        .unwrap();
        assert_eq!(t, GeoTransform::north_up(600000.0, 5000040.0, 10.0, 10.0));
    }

    #[test]
    fn test_transform_from_matrix_and_point_shift() {
        let m = [
            20.0, 0.0, 0.0, 1000.0, //
            0.0, -20.0, 0.0, 2000.0, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let t = geo_transform(None, None, Some(&m), true).unwrap();
        assert_eq!(t.origin_x, 990.0);
        assert_eq!(t.origin_y, 2010.0);
        assert_eq!(t.pixel_height, -20.0);
    }

    #[test]
    fn test_missing_georeferencing() {
        assert!(geo_transform(Some(&[10.0, 10.0, 0.0]), None, None, false).is_err());
    }
}
