//! Stage graph: which stages run and where every artifact comes from.
//!
//! Each artifact kind is either computed by its producing stage or supplied
//! as a folder of existing monthly rasters. [`StagePlan::resolve`] walks the
//! dependencies of the requested targets and orders the stages so every
//! input exists before it is read.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use erosivity_common::{month_label, ErosivityError, Result};

use crate::config::{CoverSource, PipelineConfig};

/// Monthly raster products exchanged between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Rain,
    Snow,
    SnowCover,
    SnowEndMonth,
    Snowmelt,
    RFactor,
    TotalRFactor,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::Rain,
        ArtifactKind::Snow,
        ArtifactKind::SnowCover,
        ArtifactKind::SnowEndMonth,
        ArtifactKind::Snowmelt,
        ArtifactKind::RFactor,
        ArtifactKind::TotalRFactor,
    ];

    /// Prefix of the output file names.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::SnowCover => "SnowCover",
            Self::SnowEndMonth => "SnowEndMonth",
            Self::Snowmelt => "Snowmelt",
            Self::RFactor => "RFactor",
            Self::TotalRFactor => "TotalRFactor",
        }
    }

    /// Key used in the `artifacts` section of the configuration and as the
    /// output sub-folder.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Rain => "rain",
            Self::Snow => "snow",
            Self::SnowCover => "snow_cover",
            Self::SnowEndMonth => "snow_end_month",
            Self::Snowmelt => "snowmelt",
            Self::RFactor => "r_factor",
            Self::TotalRFactor => "total_r_factor",
        }
    }

    /// `<Kind>_<YYYYMM>.tif`
    pub fn file_name(&self, month: NaiveDate) -> String {
        format!("{}_{}.tif", self.file_prefix(), month_label(month))
    }

    /// Stage that computes this artifact.
    pub fn producer(&self) -> Stage {
        match self {
            Self::Rain | Self::Snow => Stage::RainSnow,
            Self::SnowCover => Stage::SnowCover,
            Self::SnowEndMonth | Self::Snowmelt => Stage::Snowmelt,
            Self::RFactor => Stage::RFactor,
            Self::TotalRFactor => Stage::TotalFactor,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Processing stages of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RainSnow,
    SnowCover,
    Snowmelt,
    RFactor,
    TotalFactor,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RainSnow => "rain_snow",
            Self::SnowCover => "snow_cover",
            Self::Snowmelt => "snowmelt",
            Self::RFactor => "r_factor",
            Self::TotalFactor => "total_factor",
        }
    }

    /// Artifacts read by this stage.
    pub fn requires(&self) -> &'static [ArtifactKind] {
        match self {
            Self::RainSnow | Self::SnowCover => &[],
            Self::Snowmelt => &[ArtifactKind::Snow, ArtifactKind::SnowCover],
            Self::RFactor => &[ArtifactKind::Rain],
            Self::TotalFactor => &[ArtifactKind::RFactor, ArtifactKind::Snowmelt],
        }
    }

    /// Artifacts written by this stage.
    pub fn produces(&self) -> &'static [ArtifactKind] {
        match self {
            Self::RainSnow => &[ArtifactKind::Rain, ArtifactKind::Snow],
            Self::SnowCover => &[ArtifactKind::SnowCover],
            Self::Snowmelt => &[ArtifactKind::SnowEndMonth, ArtifactKind::Snowmelt],
            Self::RFactor => &[ArtifactKind::RFactor],
            Self::TotalFactor => &[ArtifactKind::TotalRFactor],
        }
    }

    /// Configuration keys this stage reads raw inputs from but which are not
    /// set.
    pub fn missing_inputs(&self, config: &PipelineConfig) -> Vec<&'static str> {
        let inputs = &config.inputs;
        let mut missing = Vec::new();
        match self {
            Self::RainSnow => {
                if inputs.precipitation_dir.is_none() {
                    missing.push("inputs.precipitation_dir");
                }
                if inputs.temperature_dir.is_none() {
                    missing.push("inputs.temperature_dir");
                }
            }
            Self::SnowCover => match config.snow_cover.source {
                CoverSource::Satellite if inputs.satellite_dir.is_none() => {
                    missing.push("inputs.satellite_dir")
                }
                CoverSource::SnowStorage if inputs.snow_storage_dir.is_none() => {
                    missing.push("inputs.snow_storage_dir")
                }
                _ => {}
            },
            Self::RFactor => {
                if inputs.f_el_raster.is_none() {
                    missing.push("inputs.f_el_raster");
                }
            }
            Self::Snowmelt | Self::TotalFactor => {}
        }
        missing
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Stage {
    type Err = ErosivityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "rain_snow" => Ok(Self::RainSnow),
            "snow_cover" => Ok(Self::SnowCover),
            "snowmelt" | "snow_melt" => Ok(Self::Snowmelt),
            "r_factor" | "rfactor" => Ok(Self::RFactor),
            "total_factor" | "total" => Ok(Self::TotalFactor),
            other => Err(ErosivityError::configuration(format!(
                "unknown stage '{}', expected rain_snow, snow_cover, snowmelt, r_factor or total_factor",
                other
            ))),
        }
    }
}

/// Where a stage finds one of its artifact kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    /// Written by a stage of this run into the given folder.
    Computed(PathBuf),
    /// Existing rasters supplied by the operator.
    Supplied(PathBuf),
}

impl StageResult {
    pub fn dir(&self) -> &Path {
        match self {
            Self::Computed(p) | Self::Supplied(p) => p,
        }
    }

    pub fn is_supplied(&self) -> bool {
        matches!(self, Self::Supplied(_))
    }
}

/// Ordered stages plus the source of every artifact they touch.
#[derive(Debug, Clone)]
pub struct StagePlan {
    stages: Vec<Stage>,
    sources: BTreeMap<ArtifactKind, StageResult>,
}

impl StagePlan {
    /// Build the dependency closure of `targets` in execution order.
    ///
    /// Targets always run. A required artifact is taken from
    /// `config.artifacts` when supplied there; otherwise its producer joins
    /// the plan, which fails when that producer lacks its raw inputs.
    pub fn resolve(targets: &[Stage], config: &PipelineConfig) -> Result<Self> {
        if targets.is_empty() {
            return Err(ErosivityError::configuration("no target stages requested"));
        }

        let mut plan = Self {
            stages: Vec::new(),
            sources: BTreeMap::new(),
        };
        for target in targets {
            plan.visit(*target, config, &mut Vec::new())?;
        }

        info!(
            stages = ?plan.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            supplied = plan.sources.values().filter(|s| s.is_supplied()).count(),
            "Resolved stage plan"
        );
        Ok(plan)
    }

    fn visit(&mut self, stage: Stage, config: &PipelineConfig, path: &mut Vec<Stage>) -> Result<()> {
        if self.stages.contains(&stage) {
            return Ok(());
        }
        if path.contains(&stage) {
            return Err(ErosivityError::configuration(format!(
                "stage cycle through {}",
                stage
            )));
        }

        let missing = stage.missing_inputs(config);
        if !missing.is_empty() {
            return Err(ErosivityError::configuration(format!(
                "stage {} cannot run: {} not set",
                stage,
                missing.join(", ")
            )));
        }

        path.push(stage);
        for kind in stage.requires() {
            if self.sources.contains_key(kind) {
                continue;
            }
            match config.artifacts.get(kind) {
                Some(dir) => {
                    debug!(artifact = %kind, dir = %dir.display(), "Using supplied artifacts");
                    self.sources.insert(*kind, StageResult::Supplied(dir.clone()));
                }
                None => {
                    let producer = kind.producer();
                    if !producer.missing_inputs(config).is_empty() {
                        return Err(ErosivityError::configuration(format!(
                            "{} is neither supplied (artifacts.{}) nor computable: stage {} needs {}",
                            kind,
                            kind.key(),
                            producer,
                            producer.missing_inputs(config).join(", ")
                        )));
                    }
                    self.visit(producer, config, path)?;
                }
            }
        }
        path.pop();

        for kind in stage.produces() {
            let source = match config.artifacts.get(kind) {
                Some(dir) => {
                    warn!(
                        artifact = %kind,
                        stage = %stage,
                        dir = %dir.display(),
                        "Stage runs for its other outputs, keeping supplied artifacts"
                    );
                    StageResult::Supplied(dir.clone())
                }
                None => StageResult::Computed(config.output_dir.join(kind.key())),
            };
            self.sources.insert(*kind, source);
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Stages in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    /// Source of `kind`, if the plan touches it.
    pub fn source(&self, kind: ArtifactKind) -> Option<&StageResult> {
        self.sources.get(&kind)
    }

    /// Folder holding `kind`, failing when the plan does not touch it.
    pub fn dir_of(&self, kind: ArtifactKind) -> Result<&Path> {
        self.source(kind).map(|s| s.dir()).ok_or_else(|| {
            ErosivityError::configuration(format!("artifact {} is not part of the plan", kind))
        })
    }

    /// Whether `kind` is written by this run.
    pub fn is_computed(&self, kind: ArtifactKind) -> bool {
        matches!(self.source(kind), Some(StageResult::Computed(_)))
    }

    /// Every supplied artifact kind with its folder.
    pub fn supplied(&self) -> impl Iterator<Item = (ArtifactKind, &Path)> + '_ {
        self.sources
            .iter()
            .filter(|(_, s)| s.is_supplied())
            .map(|(k, s)| (*k, s.dir()))
    }
}

impl fmt::Display for StagePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            writeln!(f, "{}. {}", i + 1, stage)?;
            for kind in stage.requires() {
                if let Some(source) = self.sources.get(kind) {
                    let how = if source.is_supplied() { "supplied" } else { "computed" };
                    writeln!(f, "   <- {} ({}, {})", kind, how, source.dir().display())?;
                }
            }
            for kind in stage.produces() {
                if let Some(source) = self.sources.get(kind) {
                    writeln!(f, "   -> {} ({})", kind, source.dir().display())?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::new(
            "201801",
            "201812",
            "/data/snap.tif",
            "/data/boundary.geojson",
            "/out",
        );
        config.inputs.precipitation_dir = Some(PathBuf::from("/data/P"));
        config.inputs.temperature_dir = Some(PathBuf::from("/data/T"));
        config.inputs.satellite_dir = Some(PathBuf::from("/data/si"));
        config.inputs.f_el_raster = Some(PathBuf::from("/data/fel.tif"));
        config
    }

    #[test]
    fn test_full_plan_is_topological() {
        let plan = StagePlan::resolve(&[Stage::TotalFactor], &config()).unwrap();
        assert_eq!(
            plan.stages(),
            &[
                Stage::RainSnow,
                Stage::RFactor,
                Stage::SnowCover,
                Stage::Snowmelt,
                Stage::TotalFactor
            ]
        );
        assert_eq!(
            plan.source(ArtifactKind::Rain),
            Some(&StageResult::Computed(PathBuf::from("/out/rain")))
        );
    }

    #[test]
    fn test_supplied_artifact_prunes_producer() {
        let mut config = config();
        config.inputs.f_el_raster = None;
        config
            .artifacts
            .insert(ArtifactKind::RFactor, PathBuf::from("/old/r"));

        let plan = StagePlan::resolve(&[Stage::TotalFactor], &config).unwrap();
        assert!(!plan.contains(Stage::RFactor));
        assert!(plan.source(ArtifactKind::RFactor).unwrap().is_supplied());
        assert_eq!(plan.supplied().count(), 1);
    }

    #[test]
    fn test_supplied_output_of_running_stage_is_kept() {
        let mut config = config();
        config
            .artifacts
            .insert(ArtifactKind::Snow, PathBuf::from("/operator/snow"));

        let plan = StagePlan::resolve(&[Stage::TotalFactor], &config).unwrap();
        assert!(plan.contains(Stage::RainSnow));
        assert_eq!(
            plan.source(ArtifactKind::Snow),
            Some(&StageResult::Supplied(PathBuf::from("/operator/snow")))
        );
        assert!(plan.is_computed(ArtifactKind::Rain));
        assert!(!plan.is_computed(ArtifactKind::Snow));
    }

    #[test]
    fn test_unsupplied_and_uncomputable_input_fails() {
        let mut config = config();
        config.inputs.satellite_dir = None;

        let err = StagePlan::resolve(&[Stage::Snowmelt], &config).unwrap_err();
        assert!(matches!(err, ErosivityError::Configuration(_)));
        assert!(err.to_string().contains("snow_cover"), "{}", err);
    }

    #[test]
    fn test_target_without_inputs_fails() {
        let mut config = config();
        config.inputs.precipitation_dir = None;
        assert!(StagePlan::resolve(&[Stage::RainSnow], &config).is_err());
        assert!(StagePlan::resolve(&[], &config).is_err());
    }

    #[test]
    fn test_file_names_and_parsing() {
        let month = NaiveDate::from_ymd_opt(2018, 4, 1).unwrap();
        assert_eq!(ArtifactKind::SnowEndMonth.file_name(month), "SnowEndMonth_201804.tif");
        assert_eq!(ArtifactKind::TotalRFactor.file_name(month), "TotalRFactor_201804.tif");
        assert_eq!("total".parse::<Stage>().unwrap(), Stage::TotalFactor);
        assert_eq!("snow-cover".parse::<Stage>().unwrap(), Stage::SnowCover);
        assert!("melt".parse::<Stage>().is_err());
    }

    #[test]
    fn test_every_kind_has_a_producer_that_lists_it() {
        for kind in ArtifactKind::ALL {
            assert!(kind.producer().produces().contains(&kind));
        }
    }
}
