//! Fixtures for the erosivity workspace tests.
//!
//! Small synthetic rasters with known cell values, dated file-name lists for
//! the series checks, temporary folders and an approximate float assertion.
//! Pulled in as a dev-dependency by every crate that needs them.

pub mod fixtures;
pub mod generators;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Assert that two numbers differ by at most `epsilon`.
///
/// Both sides are widened to `f64`, so raster cells (`f32`) can be compared
/// against reference values computed in `f64`.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: |{:?} - {:?}| = {:?} exceeds {:?}",
                left, right, diff, epsilon
            );
        }
    }};
}
