//! Common types shared by the erosivity pipeline crates.
//!
//! Geotransform arithmetic, the single-band [`RasterGrid`] with its nodata
//! convention, analysis windows and the error taxonomy all live here so the
//! raster, series and combination layers agree on one vocabulary.

pub mod bbox;
pub mod error;
pub mod geotransform;
pub mod grid;
pub mod points;
pub mod time;

pub use bbox::BoundingBox;
pub use error::{ErosivityError, GeometryMismatchKind, Result};
pub use geotransform::GeoTransform;
pub use grid::{Nodata, RasterGrid};
pub use points::{PointCloud, SamplePoint};
pub use time::{days_in_month, end_of_month, month_label, month_start, AnalysisWindow, Granularity};
