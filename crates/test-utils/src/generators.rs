//! Synthetic band values with known NDVI.

/// Red and NIR reflectances with `nir + red == total` whose NDVI is `ndvi`.
///
/// # Example
///
/// ```
/// use test_utils::band_pair_for_ndvi;
///
/// let (red, nir) = band_pair_for_ndvi(0.5, 4000.0);
/// assert_eq!((red, nir), (1000.0, 3000.0));
/// ```
pub fn band_pair_for_ndvi(ndvi: f64, total: f64) -> (f64, f64) {
    let red = total * (1.0 - ndvi) / 2.0;
    let nir = total * (1.0 + ndvi) / 2.0;
    (red, nir)
}

/// Value that encodes its own position: `col * 1000 + row`.
///
/// Makes it easy to verify a window was read from the right place by
/// checking that grid[row][col] == col * 1000 + row.
pub fn position_value(col: usize, row: usize) -> f64 {
    (col * 1000 + row) as f64
}

/// NDVI rising linearly from -1 at the left edge to 1 at the right edge.
pub fn ndvi_ramp(width: usize, height: usize) -> Vec<Option<f32>> {
    let span = (width.max(2) - 1) as f32;
    (0..height)
        .flat_map(|_| (0..width).map(move |col| Some(-1.0 + 2.0 * col as f32 / span)))
        .collect()
}
