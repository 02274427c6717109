//! Monthly rain and snow totals from paired precipitation and temperature.

use tracing::debug;

use erosivity_common::{ErosivityError, RasterGrid, Result};
use grid_processor::{check_congruent, AlignmentTolerance};

/// Monthly totals on the precipitation grid.
#[derive(Debug, Clone)]
pub struct RainSnow {
    pub rain: RasterGrid,
    pub snow: RasterGrid,
}

/// Accumulates one month of precipitation/temperature pairs.
///
/// Precipitation falls as rain where the temperature is above `t_snow` and
/// as snow where it is below. At exactly `t_snow` it counts as neither. A
/// cell missing in any step is missing in both totals.
#[derive(Debug)]
pub struct RainSnowAccumulator {
    reference: RasterGrid,
    t_snow: f32,
    tolerance: AlignmentTolerance,
    rain: Vec<f32>,
    snow: Vec<f32>,
    missing: Vec<bool>,
    steps: usize,
}

impl RainSnowAccumulator {
    /// Start a month on the geometry of `reference`.
    pub fn new(reference: &RasterGrid, t_snow: f32, tolerance: &AlignmentTolerance) -> Self {
        let cells = reference.data().len();
        Self {
            reference: reference.clone(),
            t_snow,
            tolerance: tolerance.clone(),
            rain: vec![0.0; cells],
            snow: vec![0.0; cells],
            missing: vec![false; cells],
            steps: 0,
        }
    }

    /// Add one time step.
    pub fn add(&mut self, precipitation: &RasterGrid, temperature: &RasterGrid) -> Result<()> {
        let nodata = self.reference.nodata();
        for grid in [precipitation, temperature] {
            grid.ensure_convention(nodata, "rain/snow partition")?;
            check_congruent(&self.reference, grid, &self.tolerance)?;
        }

        let (p, t) = (precipitation.data(), temperature.data());
        for idx in 0..self.missing.len() {
            if precipitation.is_nodata_at(idx) || temperature.is_nodata_at(idx) {
                self.missing[idx] = true;
            } else if t[idx] > self.t_snow {
                self.rain[idx] += p[idx];
            } else if t[idx] < self.t_snow {
                self.snow[idx] += p[idx];
            }
        }
        self.steps += 1;
        Ok(())
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The month's rain and snow totals.
    pub fn finish(self) -> Result<RainSnow> {
        if self.steps == 0 {
            return Err(ErosivityError::series_incomplete(
                "precipitation",
                "no time steps were added for the month",
            ));
        }

        let fill = self.reference.nodata().value();
        let mask = |mut values: Vec<f32>| {
            for (v, missing) in values.iter_mut().zip(&self.missing) {
                if *missing {
                    *v = fill;
                }
            }
            values
        };
        let rain = self.reference.with_data(mask(self.rain))?;
        let snow = self.reference.with_data(mask(self.snow))?;

        debug!(
            steps = self.steps,
            missing = self.missing.iter().filter(|m| **m).count(),
            "Partitioned precipitation into rain and snow"
        );
        Ok(RainSnow { rain, snow })
    }
}
