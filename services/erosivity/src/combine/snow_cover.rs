//! Binary snow cover from satellite bands or modelled snow storage.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use erosivity_common::{ErosivityError, RasterGrid, Result};
use grid_processor::AlignmentTolerance;

use super::combine_cells;
use crate::config::SnowCoverConfig;

const BLUE: &str = "B02";
const GREEN: &str = "B03";
const SWIR: &str = "B11";

/// Marker in the names of band files already resampled onto the snap grid.
const RESAMPLED_MARKER: &str = "_r";

/// The three band files of one sensing folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandFiles {
    pub blue: PathBuf,
    pub green: PathBuf,
    pub swir: PathBuf,
}

fn is_tif(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

fn pick_band(folder: &Path, names: &[(String, PathBuf)], band: &str) -> Result<PathBuf> {
    let matches: Vec<&PathBuf> = names
        .iter()
        .filter(|(name, _)| name.contains(band) && name.contains(RESAMPLED_MARKER))
        .map(|(_, path)| path)
        .collect();

    match matches.as_slice() {
        [single] => Ok((*single).clone()),
        [] => Err(ErosivityError::configuration(format!(
            "no resampled {} band (name containing '{}' and '{}') in {}",
            band,
            band,
            RESAMPLED_MARKER,
            folder.display()
        ))),
        many => Err(ErosivityError::configuration(format!(
            "{} candidate {} bands in {}, expected exactly one",
            many.len(),
            band,
            folder.display()
        ))),
    }
}

/// Find the blue, green and SWIR bands of a sensing folder.
///
/// Each band must match exactly one `.tif` whose name contains the band id
/// (`B02`, `B03`, `B11`) and `_r`.
pub fn select_bands(folder: &Path) -> Result<BandFiles> {
    let entries = fs::read_dir(folder).map_err(|e| {
        ErosivityError::configuration(format!("cannot list {}: {}", folder.display(), e))
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_tif(&path) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push((name.to_string(), path.clone()));
            }
        }
    }
    names.sort();

    let bands = BandFiles {
        blue: pick_band(folder, &names, BLUE)?,
        green: pick_band(folder, &names, GREEN)?,
        swir: pick_band(folder, &names, SWIR)?,
    };
    debug!(folder = %folder.display(), ?bands, "Selected satellite bands");
    Ok(bands)
}

/// Snow where `NDSI > ndsi_min` and `blue > blue_min`.
///
/// NDSI is `(green - swir) / (green + swir)`; a zero denominator is not snow.
pub fn ndsi_cover(
    blue: &RasterGrid,
    green: &RasterGrid,
    swir: &RasterGrid,
    params: &SnowCoverConfig,
    tolerance: &AlignmentTolerance,
) -> Result<RasterGrid> {
    combine_cells(&[blue, green, swir], "snow cover", tolerance, |v| {
        let (b, g, s) = (v[0], v[1], v[2]);
        let denominator = g + s;
        let snow = denominator != 0.0 && (g - s) / denominator > params.ndsi_min && b > params.blue_min;
        Some(if snow { 1.0 } else { 0.0 })
    })
}

/// Covered where the snow storage exceeds `threshold_mm`.
pub fn storage_cover(
    storage: &RasterGrid,
    threshold_mm: f32,
    tolerance: &AlignmentTolerance,
) -> Result<RasterGrid> {
    combine_cells(&[storage], "snow cover", tolerance, |v| {
        Some(if v[0] > threshold_mm { 1.0 } else { 0.0 })
    })
}
