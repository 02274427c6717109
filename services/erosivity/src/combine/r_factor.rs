//! Monthly rainfall erosivity (REM-db regression).

use std::f64::consts::PI;

use erosivity_common::{ErosivityError, RasterGrid, Result};
use grid_processor::AlignmentTolerance;

use super::combine_cells;

/// Seasonal term `f(m)` for calendar month `month` (1-12).
pub fn monthly_factor(month: u32) -> f64 {
    let m = month as f64;
    0.3696 * (1.0 - 1.0888 * (2.0 * PI * m / (2.9048 + m)).cos())
}

/// `R = 0.207 * (P * (f(m) + f_EL))^1.561`.
///
/// Cells where the power is undefined are nodata.
pub fn r_factor(
    rain: &RasterGrid,
    f_el: &RasterGrid,
    month: u32,
    tolerance: &AlignmentTolerance,
) -> Result<RasterGrid> {
    if !(1..=12).contains(&month) {
        return Err(ErosivityError::configuration(format!(
            "month must be 1-12, got {}",
            month
        )));
    }
    let fm = monthly_factor(month);
    combine_cells(&[rain, f_el], "r factor", tolerance, |v| {
        let base = v[0] as f64 * (fm + v[1] as f64);
        Some((0.207 * base.powf(1.561)) as f32)
    })
}
