//! Month-to-month snow pack and melt.
//!
//! The pack at the start of the first month is that month's snowfall. A
//! covered cell keeps its pack to the end of the month; an uncovered cell
//! melts all of it. The next month starts from the remaining pack plus its
//! own snowfall.

use tracing::debug;

use erosivity_common::{ErosivityError, RasterGrid, Result};
use grid_processor::{check_congruent, AlignmentTolerance};

/// Pack left at the end of a month and the melt during it.
#[derive(Debug, Clone)]
pub struct SnowmeltMonth {
    pub end_of_month: RasterGrid,
    pub melt: RasterGrid,
}

/// Run the snow pack through consecutive months.
///
/// `snowfall` and `cover` hold one grid per month in the same order. At
/// least two months are required. A cell that is missing in any month stays
/// missing from then on.
pub fn simulate_snowmelt(
    snowfall: &[RasterGrid],
    cover: &[RasterGrid],
    tolerance: &AlignmentTolerance,
) -> Result<Vec<SnowmeltMonth>> {
    if snowfall.len() < 2 {
        return Err(ErosivityError::configuration(format!(
            "snowmelt needs at least two months, got {}",
            snowfall.len()
        )));
    }
    if snowfall.len() != cover.len() {
        return Err(ErosivityError::series_mismatch(format!(
            "{} snowfall rasters but {} snow cover rasters",
            snowfall.len(),
            cover.len()
        )));
    }

    let reference = &snowfall[0];
    let nodata = reference.nodata();
    for grid in snowfall.iter().chain(cover) {
        grid.ensure_convention(nodata, "snowmelt")?;
        check_congruent(reference, grid, tolerance)?;
    }

    let cells = reference.data().len();
    let mut pack: Vec<Option<f32>> = vec![Some(0.0); cells];
    let mut months = Vec::with_capacity(snowfall.len());

    for (k, (fall, covered)) in snowfall.iter().zip(cover).enumerate() {
        let mut end = Vec::with_capacity(cells);
        let mut melt = Vec::with_capacity(cells);

        for (idx, state) in pack.iter_mut().enumerate() {
            let start = match *state {
                Some(p) if !fall.is_nodata_at(idx) && !covered.is_nodata_at(idx) => {
                    p + fall.data()[idx]
                }
                _ => {
                    *state = None;
                    end.push(nodata.value());
                    melt.push(nodata.value());
                    continue;
                }
            };

            let remaining = if covered.data()[idx] > 0.0 { start } else { 0.0 };
            end.push(remaining);
            melt.push(start - remaining);
            *state = Some(remaining);
        }

        debug!(month = k, "Computed snow pack");
        months.push(SnowmeltMonth {
            end_of_month: reference.with_data(end)?,
            melt: reference.with_data(melt)?,
        });
    }

    Ok(months)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{raster_from_values, with_nodata_cells};

    fn grid(values: Vec<f32>) -> RasterGrid {
        raster_from_values(values, 1, 3, 0.0, 10.0, 10.0)
    }

    #[test]
    fn test_pack_carries_until_uncovered() {
        let snowfall = vec![
            grid(vec![10.0, 10.0, 0.0]),
            grid(vec![5.0, 5.0, 2.0]),
            grid(vec![0.0, 1.0, 0.0]),
        ];
        let cover = vec![
            grid(vec![1.0, 0.0, 1.0]),
            grid(vec![1.0, 1.0, 0.0]),
            grid(vec![0.0, 1.0, 0.0]),
        ];

        let months = simulate_snowmelt(&snowfall, &cover, &AlignmentTolerance::default()).unwrap();
        assert_eq!(months.len(), 3);

        assert_eq!(months[0].end_of_month.data(), &[10.0, 0.0, 0.0]);
        assert_eq!(months[0].melt.data(), &[0.0, 10.0, 0.0]);

        assert_eq!(months[1].end_of_month.data(), &[15.0, 5.0, 0.0]);
        assert_eq!(months[1].melt.data(), &[0.0, 0.0, 2.0]);

        assert_eq!(months[2].end_of_month.data(), &[0.0, 6.0, 0.0]);
        assert_eq!(months[2].melt.data(), &[15.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_cell_stays_missing() {
        let snowfall = vec![
            with_nodata_cells(&grid(vec![1.0, 1.0, 1.0]), &[(0, 0)]),
            grid(vec![1.0, 1.0, 1.0]),
        ];
        let cover = vec![grid(vec![1.0, 1.0, 1.0]), grid(vec![0.0, 0.0, 0.0])];

        let months = simulate_snowmelt(&snowfall, &cover, &AlignmentTolerance::default()).unwrap();
        assert_eq!(months[1].melt.data(), &[-9999.0, 2.0, 2.0]);
    }

    #[test]
    fn test_requires_two_months_and_equal_lengths() {
        let one = vec![grid(vec![1.0, 1.0, 1.0])];
        let err = simulate_snowmelt(&one, &one, &AlignmentTolerance::default()).unwrap_err();
        assert!(matches!(err, ErosivityError::Configuration(_)));

        let two = vec![grid(vec![1.0; 3]), grid(vec![1.0; 3])];
        let three = vec![grid(vec![1.0; 3]), grid(vec![1.0; 3]), grid(vec![1.0; 3])];
        let err = simulate_snowmelt(&two, &three, &AlignmentTolerance::default()).unwrap_err();
        assert!(matches!(err, ErosivityError::SeriesMismatch { .. }));
    }
}
