//! Dated files and folders discovered on disk.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDateTime};
use tracing::{debug, info};
use walkdir::WalkDir;

use erosivity_common::{ErosivityError, Result};

use crate::dates::{extract_date, DatePrecision};

/// A file or folder whose name carries a date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedArtifact {
    path: PathBuf,
    name: String,
    date: NaiveDateTime,
    precision: DatePrecision,
}

impl DatedArtifact {
    /// Build an artifact from `path`, reading the date from `name`.
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (date, precision) = extract_date(&name)?;
        Ok(Self {
            path: path.into(),
            name,
            date,
            precision,
        })
    }

    /// Artifact for a file; the date comes from the file stem.
    pub fn from_file(path: &Path) -> Result<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ErosivityError::date_format(path.display().to_string(), "no file name"))?;
        Self::new(path, stem)
    }

    /// Artifact for a folder; the date comes from the folder name.
    pub fn from_dir(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ErosivityError::date_format(path.display().to_string(), "no folder name"))?;
        Self::new(path, name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date(&self) -> NaiveDateTime {
        self.date
    }

    pub fn precision(&self) -> DatePrecision {
        self.precision
    }

    /// Whether this artifact falls in calendar month `year`-`month`.
    pub fn same_month(&self, year: i32, month: u32) -> bool {
        self.date.year() == year && self.date.month() == month
    }
}

impl fmt::Display for DatedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.date.format("%Y-%m-%d %H:%M"))
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(ErosivityError::configuration(format!(
            "input folder {} does not exist",
            dir.display()
        )));
    }
    Ok(())
}

fn entries(dir: &Path) -> Result<Vec<walkdir::DirEntry>> {
    ensure_dir(dir)?;
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            entry.map_err(|e| ErosivityError::Io(format!("cannot list {}: {}", dir.display(), e)))
        })
        .collect()
}

/// List the files in `dir` with extension `ext`, ordered by name.
///
/// Every matching file must carry a date; one bad name fails the scan.
pub fn scan(dir: &Path, ext: &str) -> Result<Vec<DatedArtifact>> {
    let artifacts = entries(dir)?
        .into_iter()
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .map(|x| x.eq_ignore_ascii_case(ext.trim_start_matches('.')))
                .unwrap_or(false)
        })
        .map(|e| DatedArtifact::from_file(e.path()))
        .collect::<Result<Vec<_>>>()?;

    info!(
        dir = %dir.display(),
        extension = %ext,
        count = artifacts.len(),
        "Scanned dated files"
    );
    Ok(artifacts)
}

/// List the sub-folders of `dir`, ordered by name.
pub fn scan_subdirs(dir: &Path) -> Result<Vec<DatedArtifact>> {
    let artifacts = entries(dir)?
        .into_iter()
        .filter(|e| e.file_type().is_dir())
        .map(|e| DatedArtifact::from_dir(e.path()))
        .collect::<Result<Vec<_>>>()?;

    debug!(dir = %dir.display(), count = artifacts.len(), "Scanned dated folders");
    Ok(artifacts)
}
