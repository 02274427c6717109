//! Dated raster series: discovery, window filtering and validation.
//!
//! Each input collection goes through the same steps before any raster is
//! read:
//!
//! ```text
//! scan(dir) ─► extract_date(name) ─► filter_to_window ─► validate_cardinality ─► AlignedSeries
//!                    │                                          │
//!                    └── DateFormat error                       └── SeriesIncomplete error
//! ```
//!
//! Series combined cell by cell are additionally checked with
//! [`compare_dates`]. Satellite sensing folders are matched to analysis
//! months with [`month_end_matches`] and [`apply_overrides`].

pub mod artifact;
pub mod dates;
pub mod matching;
pub mod series;

pub use artifact::{scan, scan_subdirs, DatedArtifact};
pub use dates::{extract_date, DatePrecision};
pub use matching::{
    apply_overrides, month_end_matches, nearest_date_match, MONTH_END_TOLERANCE_DAYS,
    OVERRIDE_TOLERANCE_DAYS,
};
pub use series::{compare_dates, files_for_month, filter_to_window, validate_cardinality, AlignedSeries};
