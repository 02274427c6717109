//! Error taxonomy for the erosivity pipeline.
//!
//! Every variant terminates the run. There is no retry: the caller fixes the
//! inputs and re-runs the affected months.

use std::fmt;
use thiserror::Error;

/// Result type alias using ErosivityError.
pub type Result<T> = std::result::Result<T, ErosivityError>;

/// What part of the geometry disagreed between two rasters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryMismatchKind {
    CellSize,
    Dimensions,
    Origin,
    Extent,
    NoOverlap,
    /// Only the projection identifiers differ. Recoverable through an
    /// explicit override.
    Projection,
}

impl fmt::Display for GeometryMismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CellSize => "cell size",
            Self::Dimensions => "dimensions",
            Self::Origin => "origin",
            Self::Extent => "extent",
            Self::NoOverlap => "no overlap",
            Self::Projection => "projection",
        };
        write!(f, "{}", s)
    }
}

fn index_suffix(index: &Option<usize>) -> String {
    index.map(|i| format!(" at index {}", i)).unwrap_or_default()
}

/// Primary error type for pipeline operations.
#[derive(Debug, Error)]
pub enum ErosivityError {
    // === Configuration ===
    #[error("configuration error: {0}")]
    Configuration(String),

    // === Temporal series ===
    #[error("cannot extract date from '{name}': {reason}")]
    DateFormat { name: String, reason: String },

    #[error("series '{series}' incomplete: {detail}")]
    SeriesIncomplete { series: String, detail: String },

    #[error("series mismatch{}: {detail}", index_suffix(.index))]
    SeriesMismatch { index: Option<usize>, detail: String },

    // === Spatial ===
    #[error("geometry mismatch ({kind}): {detail}")]
    GeometryMismatch {
        kind: GeometryMismatchKind,
        detail: String,
    },

    #[error("interpolation degenerate: {0}")]
    InterpolationDegenerate(String),

    // === Plumbing ===
    #[error("I/O error: {0}")]
    Io(String),

    #[error("raster format error: {0}")]
    RasterFormat(String),

    #[error("external tool '{program}' failed (status {status:?}): {stderr}")]
    ExternalTool {
        program: String,
        status: Option<i32>,
        stderr: String,
    },
}

impl ErosivityError {
    /// Create a Configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a DateFormat error.
    pub fn date_format(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DateFormat {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a SeriesIncomplete error.
    pub fn series_incomplete(series: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::SeriesIncomplete {
            series: series.into(),
            detail: detail.into(),
        }
    }

    /// Create a SeriesMismatch error without a position.
    pub fn series_mismatch(detail: impl Into<String>) -> Self {
        Self::SeriesMismatch {
            index: None,
            detail: detail.into(),
        }
    }

    /// Create a SeriesMismatch error for the first differing position.
    pub fn series_mismatch_at(index: usize, detail: impl Into<String>) -> Self {
        Self::SeriesMismatch {
            index: Some(index),
            detail: detail.into(),
        }
    }

    /// Create a GeometryMismatch error.
    pub fn geometry_mismatch(kind: GeometryMismatchKind, detail: impl Into<String>) -> Self {
        Self::GeometryMismatch {
            kind,
            detail: detail.into(),
        }
    }

    /// Create an InterpolationDegenerate error.
    pub fn interpolation_degenerate(msg: impl Into<String>) -> Self {
        Self::InterpolationDegenerate(msg.into())
    }

    /// Create a RasterFormat error.
    pub fn raster_format(msg: impl Into<String>) -> Self {
        Self::RasterFormat(msg.into())
    }

    /// Create an ExternalTool error.
    pub fn external_tool(
        program: impl Into<String>,
        status: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ExternalTool {
            program: program.into(),
            status,
            stderr: stderr.into(),
        }
    }

    /// All pipeline errors stop the run.
    pub fn is_fatal(&self) -> bool {
        true
    }

    /// Projection-only mismatches may be overridden by the operator.
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            Self::GeometryMismatch {
                kind: GeometryMismatchKind::Projection,
                ..
            }
        )
    }

    /// Short category name used in log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::DateFormat { .. } => "date_format",
            Self::SeriesIncomplete { .. } => "series_incomplete",
            Self::SeriesMismatch { .. } => "series_mismatch",
            Self::GeometryMismatch { .. } => "geometry_mismatch",
            Self::InterpolationDegenerate(_) => "interpolation_degenerate",
            Self::Io(_) => "io",
            Self::RasterFormat(_) => "raster_format",
            Self::ExternalTool { .. } => "external_tool",
        }
    }
}

impl From<std::io::Error> for ErosivityError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
