//! Normalized difference vegetation index.

use rayon::prelude::*;

use cropwatch_common::{BandGrid, CropwatchError, CropwatchResult, NdviGrid};

/// Grids smaller than this are computed on the calling thread.
const PARALLEL_THRESHOLD: usize = 64 * 64;

/// NDVI for one pixel pair, `None` when undefined.
///
/// Undefined means either input is missing, the denominator is zero, or the
/// ratio is not finite. Defined values are clamped to [-1, 1].
#[inline]
pub fn ndvi(nir: f32, red: f32) -> Option<f32> {
    let sum = nir + red;
    if sum == 0.0 {
        return None;
    }

    let value = (nir - red) / sum;
    value.is_finite().then(|| value.clamp(-1.0, 1.0))
}

/// Combine same-shaped near-infrared and red grids.
pub fn compute_ndvi(nir: &BandGrid, red: &BandGrid) -> CropwatchResult<NdviGrid> {
    if nir.shape() != red.shape() {
        let (red_rows, red_cols) = red.shape();
        let (nir_rows, nir_cols) = nir.shape();
        return Err(CropwatchError::ShapeMismatch {
            red_rows,
            red_cols,
            nir_rows,
            nir_cols,
        });
    }

    let pixel = |(n, r): (&f32, &f32)| {
        if nir.is_nodata(*n) || red.is_nodata(*r) {
            None
        } else {
            ndvi(*n, *r)
        }
    };

    let values: Vec<Option<f32>> = if nir.data().len() >= PARALLEL_THRESHOLD {
        nir.data().par_iter().zip(red.data().par_iter()).map(pixel).collect()
    } else {
        nir.data().iter().zip(red.data().iter()).map(pixel).collect()
    };

    NdviGrid::new(values, nir.width(), nir.height())
}
