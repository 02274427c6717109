//! Coarse-to-fine raster resampling for the erosivity pipeline.
//!
//! A coarse raster is turned into point samples, interpolated onto the extent
//! of the snap grid, clipped to the watershed boundary and placed on the snap
//! lattice:
//!
//! ```text
//! RasterGrid (coarse)
//!      │
//!      ▼
//! sample_points()            one sample per valid cell centre
//!      │
//!      ▼
//! Interpolator::interpolate  IDW nearest-neighbour (in-process or gdal_grid)
//!      │
//!      ▼
//! clip_to_boundary()         window snapped to cells, mask outside polygon
//!      │
//!      ▼
//! reconcile_with_snap()      snap rows/cols/geotransform/projection
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{GridProcessorConfig, Resampler, SnapGrid};
//!
//! let snap = SnapGrid::from_raster(&read_geotiff(snap_path)?);
//! let resampler = Resampler::from_config(snap, boundary, &GridProcessorConfig::from_env(), Nodata::default());
//! let fine = resampler.resample(&coarse)?;
//! ```

pub mod align;
pub mod config;
pub mod external;
pub mod interpolation;
pub mod resample;
pub mod sampling;

pub use align::{check_congruent, check_projection, clip_to_boundary, reconcile_with_snap, SnapGrid};
pub use config::{
    AlignmentTolerance, GridProcessorConfig, IdwParams, InterpolatorBackend, ProjectionOverride,
};
pub use external::{run_tool, GdalGridInterpolator, ToolOutput};
pub use interpolation::{IdwInterpolator, Interpolator, TargetGrid};
pub use resample::{create_interpolator, Resampler};
pub use sampling::sample_points;
