//! Total erosivity: rain erosivity plus weighted snowmelt.

use erosivity_common::{RasterGrid, Result};
use grid_processor::AlignmentTolerance;

use super::combine_cells;

/// `total = r + snow_factor * melt`, nodata where either input is.
pub fn total_factor(
    r: &RasterGrid,
    melt: &RasterGrid,
    snow_factor: f32,
    tolerance: &AlignmentTolerance,
) -> Result<RasterGrid> {
    combine_cells(&[r, melt], "total factor", tolerance, |v| {
        Some(v[0] + snow_factor * v[1])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{raster_from_values, with_nodata_cells};

    #[test]
    fn test_total_factor() {
        let r = raster_from_values(vec![100.0, 40.0, 0.0], 1, 3, 0.0, 10.0, 10.0);
        let melt = with_nodata_cells(
            &raster_from_values(vec![5.0, 0.0, 3.0], 1, 3, 0.0, 10.0, 10.0),
            &[(0, 2)],
        );
        let total = total_factor(&r, &melt, 2.0, &AlignmentTolerance::default()).unwrap();
        assert_eq!(total.data(), &[110.0, 40.0, -9999.0]);
    }
}
