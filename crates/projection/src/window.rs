//! Pixel window resolution from projected bounds.

use cropwatch_common::{BoundingBox, CropwatchError, CropwatchResult, GeoTransform, PixelWindow};
use tracing::debug;

/// Largest window edge, in pixels, that is considered meaningful.
const MAX_WINDOW_EDGE: f64 = (1u64 << 31) as f64;

/// Convert projected bounds into a read window on the raster described by
/// `transform`.
///
/// The bounds' corners are mapped through the inverse affine transform; the
/// fractional offsets and extents are then rounded to the nearest pixel, with
/// each extent at least one pixel. The window is not clipped: offsets may be
/// negative or past the raster edge, and reading it is the reader's concern.
pub fn resolve_window(bounds: &BoundingBox, transform: &GeoTransform) -> CropwatchResult<PixelWindow> {
    if !bounds.is_finite() {
        return Err(CropwatchError::ReprojectionError(format!(
            "bounds are not finite: {:?}",
            bounds
        )));
    }

    let corners = [
        (bounds.min_x, bounds.max_y),
        (bounds.max_x, bounds.max_y),
        (bounds.max_x, bounds.min_y),
        (bounds.min_x, bounds.min_y),
    ];

    let mut pixels = Vec::with_capacity(corners.len());
    for (x, y) in corners {
        let pixel = transform.world_to_pixel(x, y).ok_or_else(|| {
            CropwatchError::ReprojectionError(format!(
                "raster transform is singular: {:?}",
                transform
            ))
        })?;
        pixels.push(pixel);
    }

    let extent = BoundingBox::from_points(pixels).ok_or_else(|| {
        CropwatchError::InvalidWindow("bounds produced no pixel corners".to_string())
    })?;

    let col_off = extent.min_x.round();
    let row_off = extent.min_y.round();
    let width = extent.width().round().max(1.0);
    let height = extent.height().round().max(1.0);

    if [col_off.abs(), row_off.abs(), width, height]
        .iter()
        .any(|v| !v.is_finite() || *v > MAX_WINDOW_EDGE)
    {
        return Err(CropwatchError::InvalidWindow(format!(
            "window {}x{} at ({}, {}) is out of range",
            width, height, col_off, row_off
        )));
    }

    let window = PixelWindow::new(col_off as i64, row_off as i64, width as usize, height as usize);
    debug!(
        col_off = window.col_off,
        row_off = window.row_off,
        width = window.width,
        height = window.height,
        "Resolved pixel window"
    );
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utm_transform() -> GeoTransform {
        GeoTransform::north_up(590_000.0, 15_000.0, 100.0, 100.0)
    }

    #[test]
    fn test_exact_pixel_bounds() {
        let bounds = BoundingBox::new(591_000.0, 13_000.0, 593_000.0, 14_000.0);
        let window = resolve_window(&bounds, &utm_transform()).unwrap();
        assert_eq!(window, PixelWindow::new(10, 10, 20, 10));
    }

    #[test]
    fn test_rounds_to_nearest() {
        let bounds = BoundingBox::new(591_040.0, 12_940.0, 593_060.0, 14_000.0);
        let window = resolve_window(&bounds, &utm_transform()).unwrap();
        // col 10.4 -> 10, width 20.2 -> 20, height 10.6 -> 11
        assert_eq!(window, PixelWindow::new(10, 10, 20, 11));
    }

    #[test]
    fn test_negative_offsets_are_not_clipped() {
        let bounds = BoundingBox::new(580_000.0, 14_000.0, 592_000.0, 16_000.0);
        let window = resolve_window(&bounds, &utm_transform()).unwrap();
        assert_eq!(window.col_off, -100);
        assert_eq!(window.row_off, -10);
        assert_eq!(window.width, 120);
        assert_eq!(window.height, 20);
    }

    #[test]
    fn test_sub_pixel_bounds_yield_one_pixel() {
        let bounds = BoundingBox::new(591_010.0, 13_980.0, 591_020.0, 13_990.0);
        let window = resolve_window(&bounds, &utm_transform()).unwrap();
        assert_eq!((window.width, window.height), (1, 1));
    }

    #[test]
    fn test_singular_transform_fails() {
        let mut transform = utm_transform();
        transform.pixel_width = 0.0;
        let bounds = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(matches!(
            resolve_window(&bounds, &transform),
            Err(CropwatchError::ReprojectionError(_))
        ));
    }

    #[test]
    fn test_non_finite_bounds_fail() {
        let bounds = BoundingBox::new(0.0, f64::NAN, 1.0, 1.0);
        assert!(resolve_window(&bounds, &utm_transform()).is_err());
    }
}
