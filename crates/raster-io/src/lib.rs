//! Raster and vector I/O for the erosivity pipeline.
//!
//! - [`geotiff`]: single-band Float32 GeoTIFF read/write with explicit nodata
//! - [`ascii_grid`]: legacy ESRI ASCII grids (precipitation, temperature, snow storage)
//! - [`points`]: `x,y,z` CSV + virtual-layer descriptor consumed by `gdal_grid`
//! - [`boundary`]: GeoJSON watershed boundaries
//!
//! [`read_raster`] is the single entry point used by the pipeline stages: it
//! dispatches on the file extension and rewrites the file's nodata marker into
//! the run's convention, so nothing downstream sees a foreign marker.

pub mod ascii_grid;
pub mod boundary;
pub mod geotiff;
pub mod points;

use std::fs::{self, File};
use std::path::Path;

use tracing::debug;

use erosivity_common::{ErosivityError, Nodata, RasterGrid, Result};

pub use ascii_grid::{parse_ascii_grid, read_ascii_grid, AsciiHeader};
pub use boundary::{parse_boundary, read_boundary, Boundary};
pub use geotiff::{read_geotiff, write_geotiff};
pub use points::{vrt_descriptor, write_points_csv, write_vrt_descriptor};

/// Write through a temporary file in the destination directory, then rename
/// it over `path`. Re-running a month overwrites its outputs.
pub fn persist_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .map_err(|e| ErosivityError::Io(format!("cannot create {}: {}", dir.display(), e)))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.persist(path).map_err(|e| {
        ErosivityError::Io(format!("cannot persist {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

/// Read a raster by extension and normalise its nodata into `convention`.
///
/// `.tif`/`.tiff` are GeoTIFF; `.txt`/`.asc` are ASCII grids, which carry no
/// projection and get `ascii_projection`.
pub fn read_raster(path: &Path, convention: Nodata, ascii_projection: &str) -> Result<RasterGrid> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let grid = match ext.as_str() {
        "tif" | "tiff" => read_geotiff(path)?,
        "txt" | "asc" => read_ascii_grid(path, ascii_projection)?,
        other => {
            return Err(ErosivityError::raster_format(format!(
                "{}: unsupported raster extension '{}'",
                path.display(),
                other
            )))
        }
    };

    let (grid, missing) = grid.normalize_nodata(convention);
    debug!(
        path = %path.display(),
        valid = grid.valid_count(),
        missing = missing,
        "Loaded raster"
    );
    Ok(grid)
}
