//! Pipeline configuration.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use erosivity_common::{AnalysisWindow, Nodata, Result};
use grid_processor::GridProcessorConfig;

use crate::stages::{ArtifactKind, Stage};

/// Top-level configuration of a run.
///
/// Loaded once, validated, then shared read-only by every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Analysis window, `YYYYMM` (or `YYYYMMDD`) at both ends.
    pub window: WindowConfig,

    /// Nodata convention of every raster the run writes.
    #[serde(default)]
    pub nodata: Nodata,

    /// Projection given to ASCII grids, which carry none. Defaults to the
    /// snap raster's.
    #[serde(default)]
    pub projection: Option<String>,

    /// Root folder for computed artifacts, one sub-folder per kind.
    pub output_dir: PathBuf,

    /// Raw inputs.
    pub inputs: InputsConfig,

    /// Folders of existing monthly rasters used instead of computing a kind.
    #[serde(default)]
    pub artifacts: BTreeMap<ArtifactKind, PathBuf>,

    /// Stages to run; their dependencies are added automatically.
    #[serde(default = "default_targets")]
    pub targets: Vec<Stage>,

    #[serde(default)]
    pub rain_snow: RainSnowConfig,

    #[serde(default)]
    pub snow_cover: SnowCoverConfig,

    #[serde(default)]
    pub total: TotalFactorConfig,

    /// Resampling engine and alignment tolerances.
    #[serde(default)]
    pub grid: GridProcessorConfig,

    /// Process the months of a stage in parallel.
    #[serde(default)]
    pub parallel_months: bool,
}

fn default_targets() -> Vec<Stage> {
    vec![Stage::TotalFactor]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputsConfig {
    /// Raster whose grid every output is placed on.
    pub snap_raster: PathBuf,

    /// GeoJSON watershed boundary.
    pub boundary: PathBuf,

    /// Daily, 3-hourly or hourly precipitation grids.
    #[serde(default)]
    pub precipitation_dir: Option<PathBuf>,

    /// Temperature grids matching the precipitation grids one to one.
    #[serde(default)]
    pub temperature_dir: Option<PathBuf>,

    /// Extension of the precipitation, temperature and snow storage grids.
    #[serde(default = "default_climate_extension")]
    pub climate_extension: String,

    /// Folder of `YYYYMMDD` sensing folders with pre-processed bands.
    #[serde(default)]
    pub satellite_dir: Option<PathBuf>,

    /// Monthly snow storage grids of the hydrological model.
    #[serde(default)]
    pub snow_storage_dir: Option<PathBuf>,

    /// Combined erosivity/location factor f(E,L) on the snap grid.
    #[serde(default)]
    pub f_el_raster: Option<PathBuf>,
}

fn default_climate_extension() -> String {
    "txt".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RainSnowConfig {
    /// Temperature separating rain (above) from snow (below).
    pub t_snow: f32,
}

impl Default for RainSnowConfig {
    fn default() -> Self {
        Self { t_snow: 0.0 }
    }
}

/// How snow cover is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverSource {
    /// NDSI from pre-processed satellite bands.
    #[default]
    Satellite,
    /// Snow storage of a hydrological model.
    SnowStorage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnowCoverConfig {
    pub source: CoverSource,

    /// NDSI above which a cell is snow.
    pub ndsi_min: f32,

    /// Blue reflectance above which a cell may be snow.
    pub blue_min: f32,

    /// Snow storage (mm) above which a cell is covered.
    pub storage_threshold_mm: f32,

    /// Sensing dates (`YYYYMMDD`) to use instead of the automatic
    /// month-end picks.
    pub sensing_dates: Vec<String>,
}

impl Default for SnowCoverConfig {
    fn default() -> Self {
        Self {
            source: CoverSource::Satellite,
            ndsi_min: 0.4,
            blue_min: 1800.0,
            storage_threshold_mm: 10.0,
            sensing_dates: Vec::new(),
        }
    }
}

impl SnowCoverConfig {
    /// Parsed sensing date overrides.
    pub fn sensing_dates(&self) -> std::result::Result<Vec<NaiveDate>, String> {
        self.sensing_dates
            .iter()
            .map(|s| {
                NaiveDate::parse_from_str(s.trim(), "%Y%m%d")
                    .map_err(|_| format!("sensing date '{}' is not YYYYMMDD", s))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalFactorConfig {
    /// Weight of snowmelt in the total factor.
    pub snow_factor: f32,
}

impl Default for TotalFactorConfig {
    fn default() -> Self {
        Self { snow_factor: 2.0 }
    }
}

impl PipelineConfig {
    /// A configuration with defaults everywhere except the required fields.
    pub fn new(
        start: impl Into<String>,
        end: impl Into<String>,
        snap_raster: impl Into<PathBuf>,
        boundary: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            window: WindowConfig {
                start: start.into(),
                end: end.into(),
            },
            nodata: Nodata::default(),
            projection: None,
            output_dir: output_dir.into(),
            inputs: InputsConfig {
                snap_raster: snap_raster.into(),
                boundary: boundary.into(),
                precipitation_dir: None,
                temperature_dir: None,
                climate_extension: default_climate_extension(),
                satellite_dir: None,
                snow_storage_dir: None,
                f_el_raster: None,
            },
            artifacts: BTreeMap::new(),
            targets: default_targets(),
            rain_snow: RainSnowConfig::default(),
            snow_cover: SnowCoverConfig::default(),
            total: TotalFactorConfig::default(),
            grid: GridProcessorConfig::default(),
            parallel_months: false,
        }
    }

    /// The analysis window.
    pub fn window(&self) -> Result<AnalysisWindow> {
        AnalysisWindow::parse(&self.window.start, &self.window.end)
    }

    /// Override fields from `EROSIVITY_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("EROSIVITY_START") {
            self.window.start = val;
        }

        if let Ok(val) = env::var("EROSIVITY_END") {
            self.window.end = val;
        }

        if let Ok(val) = env::var("EROSIVITY_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(val);
        }

        if let Some(nodata) = parse_env("EROSIVITY_NODATA") {
            self.nodata = nodata;
        }

        if let Ok(val) = env::var("EROSIVITY_PARALLEL_MONTHS") {
            self.parallel_months = val == "true" || val == "1";
        }

        if let Some(t) = parse_env("EROSIVITY_T_SNOW") {
            self.rain_snow.t_snow = t;
        }

        if let Some(factor) = parse_env("EROSIVITY_SNOW_FACTOR") {
            self.total.snow_factor = factor;
        }

        self.grid.apply_env_overrides();
    }

    /// Make every relative path relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        resolve(&mut self.output_dir);
        resolve(&mut self.inputs.snap_raster);
        resolve(&mut self.inputs.boundary);
        for p in [
            &mut self.inputs.precipitation_dir,
            &mut self.inputs.temperature_dir,
            &mut self.inputs.satellite_dir,
            &mut self.inputs.snow_storage_dir,
            &mut self.inputs.f_el_raster,
        ]
        .into_iter()
        .flatten()
        {
            resolve(p);
        }
        for p in self.artifacts.values_mut() {
            resolve(p);
        }
    }

    /// Validate the configuration.
    ///
    /// Only the values themselves are checked here; whether the referenced
    /// files exist is checked when the run is prepared.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.window().map_err(|e| e.to_string())?;

        if self.targets.is_empty() {
            return Err("at least one target stage is required".to_string());
        }

        if self.inputs.climate_extension.trim_start_matches('.').is_empty() {
            return Err("inputs.climate_extension cannot be empty".to_string());
        }

        if !self.rain_snow.t_snow.is_finite() {
            return Err("rain_snow.t_snow must be finite".to_string());
        }

        if !(-1.0..=1.0).contains(&self.snow_cover.ndsi_min) {
            return Err(format!(
                "snow_cover.ndsi_min must lie in [-1, 1], got {}",
                self.snow_cover.ndsi_min
            ));
        }

        if !self.snow_cover.blue_min.is_finite() || !self.snow_cover.storage_threshold_mm.is_finite() {
            return Err("snow_cover thresholds must be finite".to_string());
        }

        self.snow_cover.sensing_dates()?;

        if !(self.total.snow_factor.is_finite() && self.total.snow_factor >= 0.0) {
            return Err(format!(
                "total.snow_factor must be >= 0, got {}",
                self.total.snow_factor
            ));
        }

        if let Some(p) = &self.projection {
            if p.trim().is_empty() {
                return Err("projection cannot be empty when set".to_string());
            }
        }

        self.grid.validate()
    }
}

/// Parse an environment override, warning when it is set but unparsable.
fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let val = env::var(name).ok()?;
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

    fn config() -> PipelineConfig {
        PipelineConfig::new("201801", "201812", "snap.tif", "boundary.geojson", "out")
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.targets, vec![Stage::TotalFactor]);
        assert_eq!(config.total.snow_factor, 2.0);
        assert_eq!(config.snow_cover.ndsi_min, 0.4);
        assert_eq!(config.snow_cover.blue_min, 1800.0);
        assert_eq!(config.window().unwrap().n_months(), 12);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut c = config();
        c.window.end = "201701".to_string();
        assert!(c.validate().is_err());

        let mut c = config();
        c.snow_cover.sensing_dates = vec!["2018-04-28".to_string()];
        assert!(c.validate().is_err());

        let mut c = config();
        c.total.snow_factor = f32::NAN;
        assert!(c.validate().is_err());

        let mut c = config();
        c.targets.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_unparsable_env_override_is_ignored() {
        std::env::set_var("EROSIVITY_SNOW_FACTOR", "two");
        let mut config = config();
        config.apply_env_overrides();
        std::env::remove_var("EROSIVITY_SNOW_FACTOR");

        assert_eq!(config.total.snow_factor, 2.0);
        assert_eq!(parse_env::<f32>("EROSIVITY_SNOW_FACTOR"), None);
    }

    #[test]
    fn test_resolve_paths() {
        let mut c = config();
        c.inputs.f_el_raster = Some(PathBuf::from("/abs/fel.tif"));
        c.inputs.precipitation_dir = Some(PathBuf::from("P"));
        c.resolve_paths(Path::new("/project"));

        assert_eq!(c.output_dir, PathBuf::from("/project/out"));
        assert_eq!(c.inputs.precipitation_dir, Some(PathBuf::from("/project/P")));
        assert_eq!(c.inputs.f_el_raster, Some(PathBuf::from("/abs/fel.tif")));
    }

    #[test]
    fn test_sensing_dates_parse() {
        let mut c = SnowCoverConfig::default();
        c.sensing_dates = vec!["20161223".to_string()];
        assert_eq!(
            c.sensing_dates().unwrap(),
            vec![NaiveDate::from_ymd_opt(2016, 12, 23).unwrap()]
        );
    }
}
