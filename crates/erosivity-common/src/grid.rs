//! Single-band raster grids and the nodata convention.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::bbox::BoundingBox;
use crate::error::{ErosivityError, Result};
use crate::geotransform::GeoTransform;

/// How missing cells are marked in a raster.
///
/// A run uses exactly one convention. Sentinel and NaN are not
/// interchangeable: a sentinel grid must not contain NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NodataRepr", into = "NodataRepr")]
pub enum Nodata {
    Sentinel(f32),
    Nan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum NodataRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<NodataRepr> for Nodata {
    type Error = String;

    fn try_from(repr: NodataRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            NodataRepr::Number(v) if v.is_nan() => Ok(Nodata::Nan),
            NodataRepr::Number(v) if v.is_finite() => Ok(Nodata::Sentinel(v as f32)),
            NodataRepr::Number(v) => Err(format!("nodata sentinel must be finite, got {}", v)),
            NodataRepr::Text(s) => s.parse(),
        }
    }
}

impl From<Nodata> for NodataRepr {
    fn from(nodata: Nodata) -> Self {
        match nodata {
            Nodata::Sentinel(v) => NodataRepr::Number(v as f64),
            Nodata::Nan => NodataRepr::Text("nan".to_string()),
        }
    }
}

impl Nodata {
    /// Check whether a cell value is missing under this convention.
    pub fn is_nodata(&self, value: f32) -> bool {
        match self {
            Nodata::Sentinel(s) => value == *s,
            Nodata::Nan => value.is_nan(),
        }
    }

    /// The value written into missing cells.
    pub fn value(&self) -> f32 {
        match self {
            Nodata::Sentinel(s) => *s,
            Nodata::Nan => f32::NAN,
        }
    }
}

impl Default for Nodata {
    fn default() -> Self {
        Nodata::Sentinel(-9999.0)
    }
}

impl FromStr for Nodata {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('\0');
        if trimmed.eq_ignore_ascii_case("nan") {
            return Ok(Nodata::Nan);
        }
        let value: f64 = trimmed
            .parse()
            .map_err(|_| format!("invalid nodata value '{}'", s))?;
        if value.is_nan() {
            Ok(Nodata::Nan)
        } else if value.is_finite() {
            Ok(Nodata::Sentinel(value as f32))
        } else {
            Err(format!("nodata sentinel must be finite, got '{}'", s))
        }
    }
}

impl fmt::Display for Nodata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Nodata::Sentinel(v) => write!(f, "{}", v),
            Nodata::Nan => write!(f, "nan"),
        }
    }
}

/// A row-major single-band raster with its georeferencing.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
    geotransform: GeoTransform,
    projection: String,
    nodata: Nodata,
}

impl RasterGrid {
    /// Create a grid, checking that `data` holds exactly `rows * cols` values.
    pub fn new(
        data: Vec<f32>,
        rows: usize,
        cols: usize,
        geotransform: GeoTransform,
        projection: impl Into<String>,
        nodata: Nodata,
    ) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(ErosivityError::configuration(format!(
                "raster dimensions must be non-zero, got {}x{}",
                cols, rows
            )));
        }
        if data.len() != rows * cols {
            return Err(ErosivityError::raster_format(format!(
                "raster data length {} does not match {} rows x {} cols",
                data.len(),
                rows,
                cols
            )));
        }

        Ok(Self {
            data,
            rows,
            cols,
            geotransform,
            projection: projection.into(),
            nodata,
        })
    }

    /// A grid where every cell is nodata.
    pub fn filled_with_nodata(
        rows: usize,
        cols: usize,
        geotransform: GeoTransform,
        projection: impl Into<String>,
        nodata: Nodata,
    ) -> Result<Self> {
        Self::new(
            vec![nodata.value(); rows * cols],
            rows,
            cols,
            geotransform,
            projection,
            nodata,
        )
    }

    /// A grid with the same geometry and nodata convention but new values.
    pub fn with_data(&self, data: Vec<f32>) -> Result<Self> {
        Self::new(
            data,
            self.rows,
            self.cols,
            self.geotransform,
            self.projection.clone(),
            self.nodata,
        )
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn geotransform(&self) -> &GeoTransform {
        &self.geotransform
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    pub fn nodata(&self) -> Nodata {
        self.nodata
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Raw value at `(row, col)`, including nodata markers.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.data.get(row * self.cols + col).copied()
    }

    /// Value at `(row, col)` if the cell exists and is not nodata.
    pub fn valid_value(&self, row: usize, col: usize) -> Option<f32> {
        self.get(row, col).filter(|v| !self.nodata.is_nodata(*v))
    }

    /// Whether the value at flat index `idx` is nodata.
    pub fn is_nodata_at(&self, idx: usize) -> bool {
        self.data
            .get(idx)
            .map(|v| self.nodata.is_nodata(*v))
            .unwrap_or(true)
    }

    /// Number of cells holding data.
    pub fn valid_count(&self) -> usize {
        self.data
            .iter()
            .filter(|v| !self.nodata.is_nodata(**v))
            .count()
    }

    /// Map extent of the grid.
    pub fn extent(&self) -> BoundingBox {
        self.geotransform.extent_of(self.cols, self.rows)
    }

    /// Rewrite missing cells into the `target` convention.
    ///
    /// Cells matching the grid's own nodata marker and any stray NaN become
    /// `target`. Returns the converted grid and the number of missing cells.
    pub fn normalize_nodata(self, target: Nodata) -> (Self, usize) {
        let source = self.nodata;
        let mut missing = 0usize;
        let data: Vec<f32> = self
            .data
            .into_iter()
            .map(|v| {
                if source.is_nodata(v) || v.is_nan() {
                    missing += 1;
                    target.value()
                } else {
                    v
                }
            })
            .collect();

        debug!(
            source = %source,
            target = %target,
            missing = missing,
            "Normalized raster nodata"
        );

        (
            Self {
                data,
                nodata: target,
                ..self
            },
            missing,
        )
    }

    /// Fail unless this grid follows the run's nodata convention.
    ///
    /// `stage` names the boundary being crossed in the error message.
    pub fn ensure_convention(&self, expected: Nodata, stage: &str) -> Result<()> {
        if self.nodata != expected {
            return Err(ErosivityError::configuration(format!(
                "{}: raster uses nodata {} but the run convention is {}",
                stage, self.nodata, expected
            )));
        }
        if let Nodata::Sentinel(_) = expected {
            if self.data.iter().any(|v| v.is_nan()) {
                return Err(ErosivityError::configuration(format!(
                    "{}: NaN values found in a raster using sentinel nodata {}",
                    stage, expected
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gt() -> GeoTransform {
        GeoTransform::north_up(0.0, 2.0, 1.0, 1.0).unwrap()
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let result = RasterGrid::new(vec![1.0; 3], 2, 2, gt(), "EPSG:32634", Nodata::default());
        assert!(matches!(result, Err(ErosivityError::RasterFormat(_))));
    }

    #[test]
    fn test_valid_value_and_count() {
        let grid = RasterGrid::new(
            vec![1.0, -9999.0, 3.0, 4.0],
            2,
            2,
            gt(),
            "EPSG:32634",
            Nodata::Sentinel(-9999.0),
        )
        .unwrap();

        assert_eq!(grid.valid_value(0, 0), Some(1.0));
        assert_eq!(grid.valid_value(0, 1), None);
        assert_eq!(grid.valid_value(5, 0), None);
        assert_eq!(grid.valid_count(), 3);
    }

    #[test]
    fn test_normalize_nodata_converts_sentinel_and_nan() {
        let grid = RasterGrid::new(
            vec![1.0, -1.0, f32::NAN, 4.0],
            2,
            2,
            gt(),
            "EPSG:32634",
            Nodata::Sentinel(-1.0),
        )
        .unwrap();

        let (normalized, missing) = grid.normalize_nodata(Nodata::Sentinel(-9999.0));
        assert_eq!(missing, 2);
        assert_eq!(normalized.data(), &[1.0, -9999.0, -9999.0, 4.0]);
        assert!(normalized
            .ensure_convention(Nodata::Sentinel(-9999.0), "test")
            .is_ok());
    }

    #[test]
    fn test_ensure_convention_rejects_mixed_markers() {
        let nan_grid =
            RasterGrid::new(vec![1.0, f32::NAN], 1, 2, gt(), "EPSG:32634", Nodata::Nan).unwrap();
        assert!(nan_grid.ensure_convention(Nodata::Nan, "test").is_ok());
        assert!(nan_grid
            .ensure_convention(Nodata::Sentinel(-9999.0), "test")
            .is_err());

        let dirty = RasterGrid::new(
            vec![1.0, f32::NAN],
            1,
            2,
            gt(),
            "EPSG:32634",
            Nodata::Sentinel(-9999.0),
        )
        .unwrap();
        assert!(dirty
            .ensure_convention(Nodata::Sentinel(-9999.0), "test")
            .is_err());
    }

    #[test]
    fn test_nodata_parse_and_display() {
        assert_eq!("nan".parse::<Nodata>().unwrap(), Nodata::Nan);
        assert_eq!("-9999".parse::<Nodata>().unwrap(), Nodata::Sentinel(-9999.0));
        assert_eq!("-9999\0".parse::<Nodata>().unwrap(), Nodata::Sentinel(-9999.0));
        assert!("inf".parse::<Nodata>().is_err());
        assert_eq!(Nodata::Sentinel(-9999.0).to_string(), "-9999");
        assert_eq!(Nodata::Nan.to_string(), "nan");
    }
}
