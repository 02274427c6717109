//! Resampling a coarse raster onto the snap grid inside a boundary.
//!
//! ```text
//! source ─ sample ─► points ─ interpolate ─► snap extent ─ clip ─► boundary ─ reconcile ─► snap grid
//! ```

use std::path::Path;

use tracing::{debug, info};

use erosivity_common::{ErosivityError, Nodata, RasterGrid, Result};
use raster_io::{write_geotiff, Boundary};

use crate::align::{clip_to_boundary, reconcile_with_snap, SnapGrid};
use crate::config::{AlignmentTolerance, GridProcessorConfig, InterpolatorBackend};
use crate::external::GdalGridInterpolator;
use crate::interpolation::{IdwInterpolator, Interpolator, TargetGrid};
use crate::sampling::sample_points;

/// Build the interpolation engine selected by `config`.
pub fn create_interpolator(config: &GridProcessorConfig) -> Box<dyn Interpolator> {
    match config.backend {
        InterpolatorBackend::Idw => Box::new(IdwInterpolator::new(config.idw.clone())),
        InterpolatorBackend::GdalGrid => Box::new(GdalGridInterpolator::new(
            config.gdal_grid_program.clone(),
            config.idw.clone(),
        )),
    }
}

/// Resamples rasters onto one snap grid, clipped to one boundary.
///
/// A `Resampler` holds no mutable state and can be shared across months.
pub struct Resampler {
    snap: SnapGrid,
    boundary: Boundary,
    interpolator: Box<dyn Interpolator>,
    tolerance: AlignmentTolerance,
    nodata: Nodata,
}

impl Resampler {
    pub fn new(
        snap: SnapGrid,
        boundary: Boundary,
        interpolator: Box<dyn Interpolator>,
        tolerance: AlignmentTolerance,
        nodata: Nodata,
    ) -> Self {
        Self {
            snap,
            boundary,
            interpolator,
            tolerance,
            nodata,
        }
    }

    pub fn from_config(
        snap: SnapGrid,
        boundary: Boundary,
        config: &GridProcessorConfig,
        nodata: Nodata,
    ) -> Self {
        Self::new(
            snap,
            boundary,
            create_interpolator(config),
            config.alignment.clone(),
            nodata,
        )
    }

    pub fn snap(&self) -> &SnapGrid {
        &self.snap
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn tolerance(&self) -> &AlignmentTolerance {
        &self.tolerance
    }

    pub fn nodata(&self) -> Nodata {
        self.nodata
    }

    /// Resample `source` onto the snap grid.
    pub fn resample(&self, source: &RasterGrid) -> Result<RasterGrid> {
        source.ensure_convention(self.nodata, "resample input")?;

        let points = sample_points(source);
        if points.is_empty() {
            return Err(ErosivityError::interpolation_degenerate(format!(
                "source raster {} has no valid cells",
                source.extent()
            )));
        }

        let target = TargetGrid::from_extent(self.snap.extent(), self.snap.cell_size())?;
        let interpolated = self.interpolator.interpolate(
            &points,
            &target,
            self.snap.projection(),
            self.nodata,
        )?;
        interpolated.ensure_convention(self.nodata, "interpolation output")?;
        debug!(
            backend = self.interpolator.name(),
            samples = points.len(),
            valid = interpolated.valid_count(),
            "Interpolated onto snap extent"
        );

        let clipped = clip_to_boundary(&interpolated, &self.boundary)?;
        let aligned = reconcile_with_snap(&clipped, &self.snap, &self.tolerance)?;
        aligned.ensure_convention(self.nodata, "resample output")?;

        Ok(aligned)
    }

    /// Resample `source` and write the result to `output`.
    pub fn resample_to_file(&self, source: &RasterGrid, output: &Path) -> Result<RasterGrid> {
        let grid = self.resample(source)?;
        write_geotiff(output, &grid)?;
        info!(
            output = %output.display(),
            valid = grid.valid_count(),
            "Wrote resampled raster"
        );
        Ok(grid)
    }
}
