//! Raster geometry and per-request grids.

use serde::{Deserialize, Serialize};

use crate::{CropwatchError, CropwatchResult};

/// Affine mapping between pixel (col, row) and CRS (x, y) coordinates.
///
/// Coefficients follow the GDAL ordering:
/// `x = origin_x + col * pixel_width + row * row_rotation`
/// `y = origin_y + col * col_rotation + row * pixel_height`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    /// Negative for north-up rasters
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height: -pixel_height.abs(),
        }
    }

    /// Determinant of the linear part; zero means the transform is singular.
    pub fn determinant(&self) -> f64 {
        self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation
    }

    /// Convert pixel coordinates to CRS coordinates.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Convert CRS coordinates to fractional pixel coordinates.
    ///
    /// Returns `None` if the transform is singular or not finite.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < f64::EPSILON {
            return None;
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;
        Some((col, row))
    }

    /// Compare two transforms within a tolerance of 1e-6 CRS units.
    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        const EPS: f64 = 1e-6;
        (self.origin_x - other.origin_x).abs() < EPS
            && (self.pixel_width - other.pixel_width).abs() < EPS
            && (self.row_rotation - other.row_rotation).abs() < EPS
            && (self.origin_y - other.origin_y).abs() < EPS
            && (self.col_rotation - other.col_rotation).abs() < EPS
            && (self.pixel_height - other.pixel_height).abs() < EPS
    }
}

/// A rectangular read window in a raster's native pixel grid.
///
/// Offsets may be negative: windows are never clipped to the raster extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelWindow {
    pub col_off: i64,
    pub row_off: i64,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(col_off: i64, row_off: i64, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    /// Exclusive end column.
    pub fn col_end(&self) -> i64 {
        self.col_off + self.width as i64
    }

    /// Exclusive end row.
    pub fn row_end(&self) -> i64 {
        self.row_off + self.height as i64
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Whether the window lies entirely inside a `width` x `height` raster.
    pub fn fits_within(&self, width: usize, height: usize) -> bool {
        self.col_off >= 0
            && self.row_off >= 0
            && self.col_end() <= width as i64
            && self.row_end() <= height as i64
    }

    /// Whether the window shares at least one pixel with the raster.
    pub fn overlaps(&self, width: usize, height: usize) -> bool {
        self.width > 0
            && self.height > 0
            && self.col_off < width as i64
            && self.row_off < height as i64
            && self.col_end() > 0
            && self.row_end() > 0
    }
}

/// One spectral band read through a window, as floating point values.
#[derive(Debug, Clone, PartialEq)]
pub struct BandGrid {
    /// Values in row-major order, top row first
    data: Vec<f32>,
    width: usize,
    height: usize,
    /// The source raster's nodata value, if declared
    nodata: Option<f32>,
}

impl BandGrid {
    pub fn new(data: Vec<f32>, width: usize, height: usize, nodata: Option<f32>) -> CropwatchResult<Self> {
        if data.len() != width * height {
            return Err(CropwatchError::InvalidInput(format!(
                "band grid of {}x{} needs {} values, got {}",
                height,
                width,
                width * height,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            nodata,
        })
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn nodata(&self) -> Option<f32> {
        self.nodata
    }

    /// Value at (row, col), or `None` outside the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    /// Whether a value equals this band's nodata marker.
    pub fn is_nodata(&self, value: f32) -> bool {
        match self.nodata {
            Some(nd) if nd.is_nan() => value.is_nan(),
            Some(nd) => value == nd,
            None => false,
        }
    }
}

/// Normalized difference index per pixel.
///
/// `None` marks a no-data pixel; every `Some` value lies in [-1, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct NdviGrid {
    values: Vec<Option<f32>>,
    width: usize,
    height: usize,
}

impl NdviGrid {
    pub fn new(values: Vec<Option<f32>>, width: usize, height: usize) -> CropwatchResult<Self> {
        if values.len() != width * height {
            return Err(CropwatchError::InvalidInput(format!(
                "NDVI grid of {}x{} needs {} values, got {}",
                height,
                width,
                width * height,
                values.len()
            )));
        }
        if let Some(bad) = values
            .iter()
            .flatten()
            .find(|v| !v.is_finite() || **v < -1.0 || **v > 1.0)
        {
            return Err(CropwatchError::InvalidInput(format!(
                "NDVI value {} outside [-1, 1]",
                bad
            )));
        }
        Ok(Self {
            values,
            width,
            height,
        })
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[Option<f32>] {
        &self.values
    }

    /// Value at (row, col); `None` outside the grid or for no-data pixels.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.values[row * self.width + col]
    }

    /// Number of pixels carrying a value.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Number of pixels flagged as no-data.
    pub fn nodata_count(&self) -> usize {
        self.values.len() - self.valid_count()
    }

    /// Mean over valid pixels, `None` if there are none.
    pub fn mean(&self) -> Option<f32> {
        let (sum, count) = self
            .values
            .iter()
            .flatten()
            .fold((0.0f64, 0usize), |(s, c), v| (s + *v as f64, c + 1));
        if count == 0 {
            None
        } else {
            Some((sum / count as f64) as f32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_roundtrip() {
        let t = GeoTransform::north_up(600000.0, 10000.0, 10.0, 10.0);
        assert_eq!(t.pixel_height, -10.0);

        let (x, y) = t.pixel_to_world(12.5, 40.0);
        assert_eq!((x, y), (600125.0, 9600.0));

        let (col, row) = t.world_to_pixel(x, y).unwrap();
        assert!((col - 12.5).abs() < 1e-9);
        assert!((row - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_singular_transform() {
        let t = GeoTransform {
            origin_x: 0.0,
            pixel_width: 0.0,
            row_rotation: 0.0,
            origin_y: 0.0,
            col_rotation: 0.0,
            pixel_height: -10.0,
        };
        assert!(t.world_to_pixel(1.0, 1.0).is_none());
    }

    #[test]
    fn test_window_extent_checks() {
        let w = PixelWindow::new(10, 20, 30, 40);
        assert_eq!(w.col_end(), 40);
        assert_eq!(w.row_end(), 60);
        assert_eq!(w.shape(), (40, 30));
        assert!(w.fits_within(40, 60));
        assert!(!w.fits_within(39, 60));

        let partial = PixelWindow::new(-5, 0, 10, 10);
        assert!(!partial.fits_within(100, 100));
        assert!(partial.overlaps(100, 100));

        let outside = PixelWindow::new(200, 0, 10, 10);
        assert!(!outside.overlaps(100, 100));
    }

    #[test]
    fn test_band_grid_shape_and_nodata() {
        let grid = BandGrid::new(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], 3, 2, Some(0.0)).unwrap();
        assert_eq!(grid.shape(), (2, 3));
        assert_eq!(grid.get(1, 2), Some(5.0));
        assert_eq!(grid.get(2, 0), None);
        assert!(grid.is_nodata(0.0));
        assert!(!grid.is_nodata(1.0));

        assert!(BandGrid::new(vec![1.0; 5], 3, 2, None).is_err());
    }

    #[test]
    fn test_ndvi_grid_range_checks() {
        let grid = NdviGrid::new(vec![Some(0.5), None, Some(-0.25), Some(1.0)], 2, 2).unwrap();
        assert_eq!(grid.valid_count(), 3);
        assert_eq!(grid.nodata_count(), 1);
        assert_eq!(grid.get(0, 1), None);
        assert!((grid.mean().unwrap() - 0.416_666_7).abs() < 1e-6);

        assert!(NdviGrid::new(vec![Some(1.5)], 1, 1).is_err());
        assert!(NdviGrid::new(vec![Some(f32::NAN)], 1, 1).is_err());
        assert!(NdviGrid::new(vec![None; 4], 2, 2).unwrap().mean().is_none());
    }
}
