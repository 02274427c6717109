//! Monthly rainfall-erosivity and snowmelt pipeline.
//!
//! A run is described by one [`PipelineConfig`]. Its target stages are
//! resolved into a [`StagePlan`], every input is validated, and then each
//! stage turns monthly rasters into new monthly rasters on the snap grid:
//!
//! ```text
//! precipitation + temperature ─► rain_snow ─► Rain ─────────► r_factor ─► RFactor ─┐
//!                                         └─► Snow ─┐                              ├─► total_factor ─► TotalRFactor
//! satellite bands | snow storage ─► snow_cover ─► SnowCover ─► snowmelt ─► Snowmelt ┘
//! ```

pub mod combine;
pub mod config;
pub mod config_loader;
pub mod runner;
pub mod stages;

pub use config::{CoverSource, PipelineConfig};
pub use config_loader::{load_pipeline_config, parse_pipeline_config};
pub use runner::{Pipeline, RunSummary, StageSummary};
pub use stages::{ArtifactKind, Stage, StagePlan, StageResult};
