//! Configuration for the grid processor.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Inverse-distance weighting parameters with nearest-neighbour limiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdwParams {
    /// Distance weighting exponent.
    pub power: f64,

    /// Smoothing term added to squared distances.
    pub smoothing: f64,

    /// Maximum number of nearest samples used per node (0 = unlimited).
    pub max_points: usize,

    /// Minimum number of samples required, otherwise the node is nodata.
    pub min_points: usize,

    /// Search radius in map units (0 = unlimited).
    pub radius: f64,
}

impl Default for IdwParams {
    fn default() -> Self {
        Self {
            power: 2.0,
            smoothing: 0.0,
            max_points: 12,
            min_points: 1,
            radius: 5000.0,
        }
    }
}

impl IdwParams {
    /// Validate the parameters.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.power.is_finite() && self.power > 0.0) {
            return Err(format!("idw power must be > 0, got {}", self.power));
        }
        if !(self.smoothing.is_finite() && self.smoothing >= 0.0) {
            return Err(format!("idw smoothing must be >= 0, got {}", self.smoothing));
        }
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(format!("idw radius must be >= 0, got {}", self.radius));
        }
        if self.min_points == 0 {
            return Err("idw min_points must be > 0".to_string());
        }
        if self.max_points != 0 && self.min_points > self.max_points {
            return Err(format!(
                "idw min_points ({}) exceeds max_points ({})",
                self.min_points, self.max_points
            ));
        }
        Ok(())
    }

    /// Radius used for neighbour search, `None` when unlimited.
    pub fn search_radius(&self) -> Option<f64> {
        (self.radius > 0.0).then_some(self.radius)
    }

    /// `gdal_grid -a` algorithm string for these parameters.
    pub fn gdal_algorithm(&self, nodata: f32) -> String {
        format!(
            "invdistnn:power={}:smoothing={}:max_points={}:min_points={}:radius={}:nodata={}",
            self.power, self.smoothing, self.max_points, self.min_points, self.radius, nodata
        )
    }
}

/// Operator decision when two rasters differ only in projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionOverride {
    /// Stop with a geometry mismatch.
    #[default]
    Abort,
    /// Log a warning and keep going.
    Continue,
}

impl ProjectionOverride {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "continue" | "yes" | "y" => Self::Continue,
            _ => Self::Abort,
        }
    }
}

/// Tolerances applied when aligning rasters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentTolerance {
    /// Cells a raster may hang over the snap grid before the run fails.
    pub max_cell_overhang: usize,

    /// Maximum origin shift, in cells, between rasters that must be congruent.
    pub max_origin_shift_cells: f64,

    /// What to do on a projection-only mismatch.
    pub projection: ProjectionOverride,
}

impl Default for AlignmentTolerance {
    fn default() -> Self {
        Self {
            max_cell_overhang: 2,
            max_origin_shift_cells: 1.0,
            projection: ProjectionOverride::Abort,
        }
    }
}

/// Which interpolation engine to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolatorBackend {
    /// In-process inverse distance weighting.
    #[default]
    Idw,
    /// Shell out to `gdal_grid`.
    GdalGrid,
}

impl InterpolatorBackend {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gdal_grid" | "gdal-grid" | "gdal" => Self::GdalGrid,
            _ => Self::Idw,
        }
    }
}

impl fmt::Display for InterpolatorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idw => write!(f, "idw"),
            Self::GdalGrid => write!(f, "gdal_grid"),
        }
    }
}

/// Configuration for the grid processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridProcessorConfig {
    /// Interpolation engine.
    pub backend: InterpolatorBackend,

    /// IDW parameters shared by both engines.
    pub idw: IdwParams,

    /// Alignment tolerances.
    pub alignment: AlignmentTolerance,

    /// Executable used by the `gdal_grid` backend.
    pub gdal_grid_program: String,
}

impl Default for GridProcessorConfig {
    fn default() -> Self {
        Self {
            backend: InterpolatorBackend::Idw,
            idw: IdwParams::default(),
            alignment: AlignmentTolerance::default(),
            gdal_grid_program: "gdal_grid".to_string(),
        }
    }
}

impl GridProcessorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Override fields from `GRID_*` / `IDW_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GRID_BACKEND") {
            self.backend = InterpolatorBackend::from_str(&val);
        }

        if let Ok(val) = std::env::var("GDAL_GRID_PROGRAM") {
            self.gdal_grid_program = val;
        }

        if let Some(power) = parse_env("IDW_POWER") {
            self.idw.power = power;
        }

        if let Some(n) = parse_env("IDW_MAX_POINTS") {
            self.idw.max_points = n;
        }

        if let Some(radius) = parse_env("IDW_RADIUS") {
            self.idw.radius = radius;
        }

        if let Ok(val) = std::env::var("GRID_PROJECTION_OVERRIDE") {
            self.alignment.projection = ProjectionOverride::from_str(&val);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.idw.validate()?;

        if !(self.alignment.max_origin_shift_cells.is_finite()
            && self.alignment.max_origin_shift_cells >= 0.0)
        {
            return Err("alignment.max_origin_shift_cells must be >= 0".to_string());
        }

        if self.backend == InterpolatorBackend::GdalGrid && self.gdal_grid_program.trim().is_empty() {
            return Err("gdal_grid_program must be set for the gdal_grid backend".to_string());
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let val = std::env::var(name).ok()?;
    match val.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(var = name, value = %val, "Ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GridProcessorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.idw.max_points, 12);
        assert_eq!(config.idw.radius, 5000.0);
        assert_eq!(config.alignment.max_cell_overhang, 2);
    }

    #[test]
    fn test_gdal_algorithm_string() {
        let params = IdwParams::default();
        assert_eq!(
            params.gdal_algorithm(-9999.0),
            "invdistnn:power=2:smoothing=0:max_points=12:min_points=1:radius=5000:nodata=-9999"
        );
    }

    #[test]
    fn test_validate_rejects_bad_params() {
        let mut params = IdwParams::default();
        params.power = 0.0;
        assert!(params.validate().is_err());

        let mut params = IdwParams::default();
        params.min_points = 20;
        assert!(params.validate().is_err());

        let mut config = GridProcessorConfig::default();
        config.backend = InterpolatorBackend::GdalGrid;
        config.gdal_grid_program = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_and_override_from_str() {
        assert_eq!(InterpolatorBackend::from_str("GDAL_GRID"), InterpolatorBackend::GdalGrid);
        assert_eq!(InterpolatorBackend::from_str("anything"), InterpolatorBackend::Idw);
        assert_eq!(ProjectionOverride::from_str("Continue"), ProjectionOverride::Continue);
        assert_eq!(ProjectionOverride::from_str("abort"), ProjectionOverride::Abort);
    }

    #[test]
    fn test_search_radius_zero_is_unlimited() {
        let mut params = IdwParams::default();
        assert_eq!(params.search_radius(), Some(5000.0));
        params.radius = 0.0;
        assert_eq!(params.search_radius(), None);
    }
}
