//! Fixtures and builders for cropwatch tests.
//!
//! - [`CogBuilder`] writes single-band GeoTIFFs in memory, so COG reads can
//!   be tested without network access
//! - `fixtures` holds STAC responses and well-known points and dates
//! - `generators` produces band values with a known NDVI
//!
//! Used as a dev-dependency only; `test-utils = { path = "../test-utils" }`.

pub mod cog;
pub mod fixtures;
pub mod generators;

pub use cog::{BuiltCog, CogBuilder, CogSample};
pub use fixtures::*;
pub use generators::*;

/// Assert `|left - right| <= epsilon`, comparing as `f64`.
///
/// ```
/// test_utils::assert_approx_eq!(0.49999_f32, 0.5, 1e-3);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let (left, right, epsilon) = ($left as f64, $right as f64, $epsilon as f64);
        if !((left - right).abs() <= epsilon) {
            panic!(
                "assertion failed: {} is not within {} of {} (off by {})",
                left,
                epsilon,
                right,
                (left - right).abs()
            );
        }
    }};
}

/// [`assert_approx_eq!`] on both members of an (x, y) pair.
#[macro_export]
macro_rules! assert_coords_approx_eq {
    (($x1:expr, $y1:expr), ($x2:expr, $y2:expr), $epsilon:expr) => {{
        $crate::assert_approx_eq!($x1, $x2, $epsilon);
        $crate::assert_approx_eq!($y1, $y2, $epsilon);
    }};
}

/// Assert that every `Some` value in a slice of `Option<f32>` is within
/// epsilon of `expected`, and that there is at least one.
#[macro_export]
macro_rules! assert_all_valid_approx {
    ($values:expr, $expected:expr, $epsilon:expr) => {{
        let values: &[Option<f32>] = &$values;
        let mut seen = 0usize;
        for (i, v) in values.iter().enumerate() {
            match v {
                Some(v) => {
                    seen += 1;
                    if ((*v as f64) - ($expected as f64)).abs() > ($epsilon as f64) {
                        panic!("value {} at index {} is not within {} of {}", v, i, $epsilon, $expected);
                    }
                }
                None => panic!("index {} is no-data", i),
            }
        }
        assert!(seen > 0, "no values to compare");
    }};
}
