//! Executes a resolved stage plan month by month.
//!
//! [`Pipeline::prepare`] checks every configured path and loads the snap
//! grid and boundary. [`Pipeline::run`] then validates all raw and supplied
//! series before the first stage starts, so a bad input never leaves half a
//! run behind. Months of a stage run in parallel only when configured, and
//! only after that validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use erosivity_common::{month_label, AnalysisWindow, ErosivityError, Granularity, RasterGrid, Result};
use grid_processor::{reconcile_with_snap, Resampler, SnapGrid};
use raster_io::{read_boundary, read_raster, write_geotiff};
use temporal_series::{
    apply_overrides, compare_dates, files_for_month, filter_to_window, scan, scan_subdirs,
    validate_cardinality, AlignedSeries, DatedArtifact,
};

use crate::combine::{
    ndsi_cover, r_factor, select_bands, simulate_snowmelt, storage_cover, total_factor, BandFiles,
    RainSnowAccumulator,
};
use crate::config::{CoverSource, PipelineConfig};
use crate::stages::{ArtifactKind, Stage, StagePlan};

/// Precipitation and temperature files of one month, date-aligned.
#[derive(Debug, Clone)]
struct RainSnowMonth {
    month: NaiveDate,
    precipitation: Vec<DatedArtifact>,
    temperature: Vec<DatedArtifact>,
}

/// Snow cover source of one month.
#[derive(Debug, Clone)]
enum CoverMonth {
    Satellite {
        month: NaiveDate,
        folder: DatedArtifact,
        bands: BandFiles,
    },
    Storage {
        month: NaiveDate,
        grid: DatedArtifact,
    },
}

/// Everything checked before the first stage runs.
#[derive(Debug, Default)]
struct ValidatedInputs {
    rain_snow: Vec<RainSnowMonth>,
    snow_cover: Vec<CoverMonth>,
    supplied: BTreeMap<ArtifactKind, AlignedSeries>,
}

/// Files written by one stage.
#[derive(Debug, Clone)]
pub struct StageSummary {
    pub stage: Stage,
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stages: Vec<StageSummary>,
}

impl RunSummary {
    pub fn output_count(&self) -> usize {
        self.stages.iter().map(|s| s.outputs.len()).sum()
    }
}

/// A configured run.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    window: AnalysisWindow,
    months: Vec<NaiveDate>,
    plan: StagePlan,
    resampler: Resampler,
    ascii_projection: String,
}

fn require_file(path: &Path, what: &str) -> Result<()> {
    if !path.is_file() {
        return Err(ErosivityError::configuration(format!(
            "{} {} does not exist",
            what,
            path.display()
        )));
    }
    Ok(())
}

fn require_dir(path: Option<&PathBuf>, what: &str) -> Result<PathBuf> {
    let path = path.ok_or_else(|| ErosivityError::configuration(format!("{} is not set", what)))?;
    if !path.is_dir() {
        return Err(ErosivityError::configuration(format!(
            "{} {} does not exist",
            what,
            path.display()
        )));
    }
    Ok(path.clone())
}

impl Pipeline {
    /// Resolve the plan for `targets` and check that every input exists.
    pub fn prepare(config: Arc<PipelineConfig>, targets: &[Stage]) -> Result<Self> {
        let window = config.window()?;
        let months = window.months();
        let plan = StagePlan::resolve(targets, &config)?;

        if plan.contains(Stage::Snowmelt) && months.len() < 2 {
            return Err(ErosivityError::configuration(format!(
                "snowmelt needs at least two months, the window {} has {}",
                window,
                months.len()
            )));
        }

        let inputs = &config.inputs;
        require_file(&inputs.snap_raster, "snap raster")?;
        require_file(&inputs.boundary, "boundary")?;
        for stage in plan.stages() {
            match stage {
                Stage::RainSnow => {
                    require_dir(inputs.precipitation_dir.as_ref(), "inputs.precipitation_dir")?;
                    require_dir(inputs.temperature_dir.as_ref(), "inputs.temperature_dir")?;
                }
                Stage::SnowCover => match config.snow_cover.source {
                    CoverSource::Satellite => {
                        require_dir(inputs.satellite_dir.as_ref(), "inputs.satellite_dir")?;
                    }
                    CoverSource::SnowStorage => {
                        require_dir(inputs.snow_storage_dir.as_ref(), "inputs.snow_storage_dir")?;
                    }
                },
                Stage::RFactor => {
                    let f_el = inputs.f_el_raster.as_ref().ok_or_else(|| {
                        ErosivityError::configuration("inputs.f_el_raster is not set")
                    })?;
                    require_file(f_el, "f(E,L) raster")?;
                }
                Stage::Snowmelt | Stage::TotalFactor => {}
            }
        }
        for (kind, dir) in plan.supplied() {
            require_dir(Some(&dir.to_path_buf()), &format!("artifacts.{}", kind.key()))?;
        }

        let snap_raster = read_raster(
            &inputs.snap_raster,
            config.nodata,
            config.projection.as_deref().unwrap_or_default(),
        )?;
        let snap = SnapGrid::from_raster(&snap_raster);
        let ascii_projection = config
            .projection
            .clone()
            .unwrap_or_else(|| snap.projection().to_string());
        let boundary = read_boundary(&inputs.boundary)?;

        info!(
            window = %window,
            months = months.len(),
            snap_cols = snap.cols(),
            snap_rows = snap.rows(),
            cell_size = snap.cell_size(),
            projection = %snap.projection(),
            backend = %config.grid.backend,
            parallel = config.parallel_months,
            "Prepared pipeline"
        );

        let resampler = Resampler::from_config(snap, boundary, &config.grid, config.nodata);
        Ok(Self {
            config,
            window,
            months,
            plan,
            resampler,
            ascii_projection,
        })
    }

    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    pub fn window(&self) -> &AnalysisWindow {
        &self.window
    }

    pub fn months(&self) -> &[NaiveDate] {
        &self.months
    }

    /// Validate every input without running a stage.
    pub fn check(&self) -> Result<()> {
        let validated = self.validate_inputs()?;
        info!(
            rain_snow_months = validated.rain_snow.len(),
            snow_cover_months = validated.snow_cover.len(),
            supplied = validated.supplied.len(),
            "All inputs validated"
        );
        Ok(())
    }

    /// Validate all inputs, then run every planned stage in order.
    pub fn run(&self) -> Result<RunSummary> {
        let validated = self.validate_inputs()?;
        let mut summary = RunSummary::default();

        for stage in self.plan.stages() {
            let started = Instant::now();
            info!(stage = %stage, "Running stage");

            let outputs = match stage {
                Stage::RainSnow => self.run_rain_snow(&validated.rain_snow)?,
                Stage::SnowCover => self.run_snow_cover(&validated.snow_cover)?,
                Stage::Snowmelt => self.run_snowmelt()?,
                Stage::RFactor => self.run_r_factor()?,
                Stage::TotalFactor => self.run_total_factor()?,
            };

            info!(
                stage = %stage,
                outputs = outputs.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Stage complete"
            );
            summary.stages.push(StageSummary {
                stage: *stage,
                outputs,
            });
        }

        Ok(summary)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn validate_inputs(&self) -> Result<ValidatedInputs> {
        let mut validated = ValidatedInputs::default();

        if self.plan.contains(Stage::RainSnow) {
            validated.rain_snow = self.validate_rain_snow()?;
        }
        if self.plan.contains(Stage::SnowCover) {
            validated.snow_cover = match self.config.snow_cover.source {
                CoverSource::Satellite => self.validate_satellite()?,
                CoverSource::SnowStorage => self.validate_snow_storage()?,
            };
        }
        for (kind, _) in self.plan.supplied() {
            validated.supplied.insert(kind, self.load_series(kind)?);
        }

        Ok(validated)
    }

    fn validate_rain_snow(&self) -> Result<Vec<RainSnowMonth>> {
        let inputs = &self.config.inputs;
        let ext = &inputs.climate_extension;
        let p_dir = require_dir(inputs.precipitation_dir.as_ref(), "inputs.precipitation_dir")?;
        let t_dir = require_dir(inputs.temperature_dir.as_ref(), "inputs.temperature_dir")?;

        let precipitation = filter_to_window(&scan(&p_dir, ext)?, &self.window);
        let temperature = filter_to_window(&scan(&t_dir, ext)?, &self.window);

        self.months
            .iter()
            .map(|month| {
                let p = files_for_month("precipitation", &precipitation, *month)?;
                let t = files_for_month("temperature", &temperature, *month)?;
                compare_dates("precipitation", p.artifacts(), "temperature", t.artifacts())?;
                Ok(RainSnowMonth {
                    month: *month,
                    precipitation: p.into_artifacts(),
                    temperature: t.into_artifacts(),
                })
            })
            .collect()
    }

    fn validate_satellite(&self) -> Result<Vec<CoverMonth>> {
        let dir = require_dir(self.config.inputs.satellite_dir.as_ref(), "inputs.satellite_dir")?;
        let overrides = self
            .config
            .snow_cover
            .sensing_dates()
            .map_err(ErosivityError::configuration)?;

        let folders = scan_subdirs(&dir)?;
        let picks = apply_overrides(&folders, &self.months, &overrides)?;

        self.months
            .iter()
            .zip(picks)
            .map(|(month, folder)| {
                let bands = select_bands(folder.path())?;
                Ok(CoverMonth::Satellite {
                    month: *month,
                    folder,
                    bands,
                })
            })
            .collect()
    }

    fn validate_snow_storage(&self) -> Result<Vec<CoverMonth>> {
        let inputs = &self.config.inputs;
        let dir = require_dir(inputs.snow_storage_dir.as_ref(), "inputs.snow_storage_dir")?;
        let series = self.monthly_series("snow storage", &scan(&dir, &inputs.climate_extension)?)?;

        self.months
            .iter()
            .map(|month| {
                Ok(CoverMonth::Storage {
                    month: *month,
                    grid: single_for_month(&series, *month)?,
                })
            })
            .collect()
    }

    /// One raster per month of the window, in month order.
    fn monthly_series(&self, name: &str, artifacts: &[DatedArtifact]) -> Result<AlignedSeries> {
        let kept = filter_to_window(artifacts, &self.window);
        let series = validate_cardinality(name, &kept, &self.window)?;
        if series.granularity() != Granularity::Monthly {
            return Err(ErosivityError::series_incomplete(
                name,
                format!(
                    "expected one raster per month in {}, found a {} series",
                    self.window,
                    series.granularity()
                ),
            ));
        }
        Ok(series)
    }

    /// The monthly GeoTIFF series of `kind`, computed or supplied.
    fn load_series(&self, kind: ArtifactKind) -> Result<AlignedSeries> {
        let dir = self.plan.dir_of(kind)?;
        self.monthly_series(kind.key(), &scan(dir, "tif")?)
    }

    // ========================================================================
    // Stages
    // ========================================================================

    fn read(&self, path: &Path) -> Result<RasterGrid> {
        read_raster(path, self.config.nodata, &self.ascii_projection)
    }

    fn output_path(&self, kind: ArtifactKind, month: NaiveDate) -> Result<PathBuf> {
        Ok(self.plan.dir_of(kind)?.join(kind.file_name(month)))
    }

    /// Write a monthly raster, leaving supplied artifact folders untouched.
    fn write(
        &self,
        kind: ArtifactKind,
        month: NaiveDate,
        grid: &RasterGrid,
    ) -> Result<Option<PathBuf>> {
        if !self.plan.is_computed(kind) {
            debug!(artifact = %kind, month = %month_label(month), "Skipping supplied artifact");
            return Ok(None);
        }
        let path = self.output_path(kind, month)?;
        write_geotiff(&path, grid)?;
        debug!(
            artifact = %kind,
            month = %month_label(month),
            path = %path.display(),
            valid = grid.valid_count(),
            "Wrote monthly raster"
        );
        Ok(Some(path))
    }

    /// Run `f` for every item, in parallel when configured.
    fn for_each_month<T, F>(&self, items: &[T], f: F) -> Result<Vec<PathBuf>>
    where
        T: Sync,
        F: Fn(&T) -> Result<Vec<PathBuf>> + Sync + Send,
    {
        let outputs: Vec<Vec<PathBuf>> = if self.config.parallel_months {
            items.par_iter().map(&f).collect::<Result<_>>()?
        } else {
            items.iter().map(&f).collect::<Result<_>>()?
        };
        Ok(outputs.into_iter().flatten().collect())
    }

    fn run_rain_snow(&self, months: &[RainSnowMonth]) -> Result<Vec<PathBuf>> {
        let t_snow = self.config.rain_snow.t_snow;
        let tolerance = self.resampler.tolerance();

        self.for_each_month(months, |job| {
            let mut accumulator: Option<RainSnowAccumulator> = None;
            for (p_file, t_file) in job.precipitation.iter().zip(&job.temperature) {
                let p = self.read(p_file.path())?;
                let t = self.read(t_file.path())?;
                accumulator
                    .get_or_insert_with(|| RainSnowAccumulator::new(&p, t_snow, tolerance))
                    .add(&p, &t)?;
            }

            let totals = accumulator
                .ok_or_else(|| {
                    ErosivityError::series_incomplete(
                        "precipitation",
                        format!("no files for {}", month_label(job.month)),
                    )
                })?
                .finish()?;

            info!(month = %month_label(job.month), steps = job.precipitation.len(), "Accumulated rain and snow");
            let mut written = Vec::with_capacity(2);
            for (kind, coarse) in [(ArtifactKind::Rain, &totals.rain), (ArtifactKind::Snow, &totals.snow)] {
                if self.plan.is_computed(kind) {
                    let fine = self.resampler.resample(coarse)?;
                    written.extend(self.write(kind, job.month, &fine)?);
                }
            }
            Ok(written)
        })
    }

    fn run_snow_cover(&self, months: &[CoverMonth]) -> Result<Vec<PathBuf>> {
        let tolerance = self.resampler.tolerance();
        let params = &self.config.snow_cover;

        self.for_each_month(months, |job| {
            let (month, cover) = match job {
                CoverMonth::Satellite {
                    month,
                    folder,
                    bands,
                } => {
                    let blue = self.read(&bands.blue)?;
                    let green = self.read(&bands.green)?;
                    let swir = self.read(&bands.swir)?;
                    let cover = ndsi_cover(&blue, &green, &swir, params, tolerance)?;
                    debug!(month = %month_label(*month), sensing = %folder, "Detected snow from NDSI");
                    (*month, reconcile_with_snap(&cover, self.resampler.snap(), tolerance)?)
                }
                CoverMonth::Storage { month, grid } => {
                    let storage = self.resampler.resample(&self.read(grid.path())?)?;
                    let cover = storage_cover(&storage, params.storage_threshold_mm, tolerance)?;
                    (*month, cover)
                }
            };

            if cover.valid_count() == 0 {
                warn!(month = %month_label(month), "Snow cover has no valid cells");
            }
            Ok(self.write(ArtifactKind::SnowCover, month, &cover)?.into_iter().collect())
        })
    }

    fn run_snowmelt(&self) -> Result<Vec<PathBuf>> {
        let snow = self.load_series(ArtifactKind::Snow)?;
        let cover = self.load_series(ArtifactKind::SnowCover)?;
        compare_dates("snowfall", snow.artifacts(), "snow cover", cover.artifacts())?;

        let snowfall = self.read_all(&snow)?;
        let covered = self.read_all(&cover)?;
        let months = simulate_snowmelt(&snowfall, &covered, self.resampler.tolerance())?;

        let mut outputs = Vec::with_capacity(months.len() * 2);
        for (artifact, month) in snow.artifacts().iter().zip(&months) {
            let date = artifact.date().date();
            outputs.extend(self.write(ArtifactKind::SnowEndMonth, date, &month.end_of_month)?);
            outputs.extend(self.write(ArtifactKind::Snowmelt, date, &month.melt)?);
        }
        Ok(outputs)
    }

    fn run_r_factor(&self) -> Result<Vec<PathBuf>> {
        let rain = self.load_series(ArtifactKind::Rain)?;
        let f_el_path = self
            .config
            .inputs
            .f_el_raster
            .as_ref()
            .ok_or_else(|| ErosivityError::configuration("inputs.f_el_raster is not set"))?;
        let f_el = self.read(f_el_path)?;
        let tolerance = self.resampler.tolerance();

        self.for_each_month(rain.artifacts(), |artifact| {
            let month = artifact.date().date();
            let r = r_factor(&self.read(artifact.path())?, &f_el, month.month(), tolerance)?;
            Ok(self.write(ArtifactKind::RFactor, month, &r)?.into_iter().collect())
        })
    }

    fn run_total_factor(&self) -> Result<Vec<PathBuf>> {
        let r = self.load_series(ArtifactKind::RFactor)?;
        let melt = self.load_series(ArtifactKind::Snowmelt)?;
        compare_dates("r factor", r.artifacts(), "snowmelt", melt.artifacts())?;

        let pairs: Vec<(&DatedArtifact, &DatedArtifact)> =
            r.artifacts().iter().zip(melt.artifacts()).collect();
        let snow_factor = self.config.total.snow_factor;
        let tolerance = self.resampler.tolerance();

        self.for_each_month(&pairs, |(r_file, melt_file)| {
            let month = r_file.date().date();
            let total = total_factor(
                &self.read(r_file.path())?,
                &self.read(melt_file.path())?,
                snow_factor,
                tolerance,
            )?;
            Ok(self.write(ArtifactKind::TotalRFactor, month, &total)?.into_iter().collect())
        })
    }

    fn read_all(&self, series: &AlignedSeries) -> Result<Vec<RasterGrid>> {
        series
            .artifacts()
            .iter()
            .map(|a| self.read(a.path()))
            .collect()
    }
}

fn single_for_month(series: &AlignedSeries, month: NaiveDate) -> Result<DatedArtifact> {
    match series.for_month(month).as_slice() {
        [single] => Ok((*single).clone()),
        other => Err(ErosivityError::series_incomplete(
            series.name(),
            format!("{} rasters for {}, expected one", other.len(), month_label(month)),
        )),
    }
}
