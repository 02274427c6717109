//! Monthly per-cell arithmetic on congruent rasters.
//!
//! Every function here checks that its inputs share one geometry and the
//! run's nodata convention before touching a cell, and returns a new grid
//! with the geometry of its first input.

pub mod r_factor;
pub mod rain_snow;
pub mod snow_cover;
pub mod snowmelt;
pub mod total;

pub use r_factor::{monthly_factor, r_factor};
pub use rain_snow::{RainSnow, RainSnowAccumulator};
pub use snow_cover::{ndsi_cover, select_bands, storage_cover, BandFiles};
pub use snowmelt::{simulate_snowmelt, SnowmeltMonth};
pub use total::total_factor;

use erosivity_common::{ErosivityError, RasterGrid, Result};
use grid_processor::{check_congruent, AlignmentTolerance};

/// Apply `f` to the values of every cell where no input is nodata.
///
/// `f` returning `None` (or a non-finite value) marks the cell nodata.
pub(crate) fn combine_cells<F>(
    inputs: &[&RasterGrid],
    stage: &str,
    tolerance: &AlignmentTolerance,
    f: F,
) -> Result<RasterGrid>
where
    F: Fn(&[f32]) -> Option<f32>,
{
    let reference = inputs
        .first()
        .ok_or_else(|| ErosivityError::configuration(format!("{}: no input rasters", stage)))?;
    let nodata = reference.nodata();
    for grid in inputs {
        grid.ensure_convention(nodata, stage)?;
        check_congruent(reference, grid, tolerance)?;
    }

    let mut values = Vec::with_capacity(inputs.len());
    let data = (0..reference.data().len())
        .map(|idx| {
            if inputs.iter().any(|g| g.is_nodata_at(idx)) {
                return nodata.value();
            }
            values.clear();
            values.extend(inputs.iter().map(|g| g.data()[idx]));
            match f(&values) {
                Some(v) if v.is_finite() => v,
                _ => nodata.value(),
            }
        })
        .collect();

    reference.with_data(data)
}
