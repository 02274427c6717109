//! External tool invocation and the `gdal_grid` interpolation backend.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info, warn};

use erosivity_common::{ErosivityError, Nodata, PointCloud, RasterGrid, Result};
use raster_io::{read_geotiff, write_points_csv, write_vrt_descriptor};

use crate::config::IdwParams;
use crate::interpolation::{Interpolator, TargetGrid};

/// Captured result of a successful tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub program: String,
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args` and capture its output.
///
/// A spawn failure or a non-zero exit is an [`ErosivityError::ExternalTool`]
/// carrying the exit status and stderr.
pub fn run_tool(program: &str, args: &[String]) -> Result<ToolOutput> {
    debug!(program = %program, args = ?args, "Running external tool");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| ErosivityError::external_tool(program, None, format!("failed to start: {}", e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        warn!(
            program = %program,
            status = ?output.status.code(),
            stderr = %stderr.trim(),
            "External tool failed"
        );
        return Err(ErosivityError::external_tool(
            program,
            output.status.code(),
            stderr,
        ));
    }

    Ok(ToolOutput {
        program: program.to_string(),
        status: output.status.code().unwrap_or(0),
        stdout,
        stderr,
    })
}

/// Marker written by `gdal_grid` for empty nodes.
const GDAL_GRID_NODATA: f32 = -9999.0;

/// Interpolation through the `gdal_grid` command line tool.
///
/// Every call works inside its own temporary directory, so concurrent months
/// never share scratch files.
#[derive(Debug, Clone)]
pub struct GdalGridInterpolator {
    program: String,
    params: IdwParams,
}

impl GdalGridInterpolator {
    pub fn new(program: impl Into<String>, params: IdwParams) -> Self {
        Self {
            program: program.into(),
            params,
        }
    }

    /// Arguments for one run. Rows are requested north to south.
    pub fn arguments(
        &self,
        target: &TargetGrid,
        projection: &str,
        vrt: &Path,
        output: &Path,
    ) -> Vec<String> {
        let extent = target.extent();
        let mut args = vec![
            "-a".to_string(),
            self.params.gdal_algorithm(GDAL_GRID_NODATA),
            "-txe".to_string(),
            extent.min_x.to_string(),
            extent.max_x.to_string(),
            "-tye".to_string(),
            extent.max_y.to_string(),
            extent.min_y.to_string(),
            "-outsize".to_string(),
            target.cols().to_string(),
            target.rows().to_string(),
            "-of".to_string(),
            "GTiff".to_string(),
            "-ot".to_string(),
            "Float32".to_string(),
        ];
        if !projection.is_empty() {
            args.push("-a_srs".to_string());
            args.push(projection.to_string());
        }
        args.extend([
            "-l".to_string(),
            "points".to_string(),
            vrt.display().to_string(),
            output.display().to_string(),
        ]);
        args
    }
}

impl Interpolator for GdalGridInterpolator {
    fn name(&self) -> &'static str {
        "gdal_grid"
    }

    fn interpolate(
        &self,
        points: &PointCloud,
        target: &TargetGrid,
        projection: &str,
        nodata: Nodata,
    ) -> Result<RasterGrid> {
        if points.is_empty() {
            return Err(ErosivityError::interpolation_degenerate(
                "no valid samples to interpolate from",
            ));
        }

        let scratch = tempfile::Builder::new().prefix("gdal-grid-").tempdir()?;
        let csv = scratch.path().join("points.csv");
        let output = scratch.path().join("grid.tif");

        write_points_csv(&csv, points)?;
        let vrt = write_vrt_descriptor(&csv, projection)?;

        let args = self.arguments(target, projection, &vrt, &output);
        let result = run_tool(&self.program, &args)?;
        debug!(
            program = %result.program,
            stdout = %result.stdout.trim(),
            "gdal_grid finished"
        );

        let grid = read_geotiff(&output)?;
        if grid.rows() != target.rows() || grid.cols() != target.cols() {
            return Err(ErosivityError::raster_format(format!(
                "{} produced {}x{} cells, expected {}x{}",
                self.program,
                grid.cols(),
                grid.rows(),
                target.cols(),
                target.rows()
            )));
        }

        // The tool's marker is fixed by the algorithm string, whatever the
        // file header says.
        let grid = RasterGrid::new(
            grid.into_data(),
            target.rows(),
            target.cols(),
            *target.geotransform(),
            projection,
            Nodata::Sentinel(GDAL_GRID_NODATA),
        )?;
        let (grid, missing) = grid.normalize_nodata(nodata);

        info!(
            samples = points.len(),
            cols = target.cols(),
            rows = target.rows(),
            missing = missing,
            "gdal_grid interpolation finished"
        );
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erosivity_common::BoundingBox;
    use std::path::PathBuf;

    #[test]
    fn test_run_tool_missing_program() {
        let err = run_tool("definitely-not-a-real-program-xyz", &[]).unwrap_err();
        match err {
            ErosivityError::ExternalTool { program, status, .. } => {
                assert_eq!(program, "definitely-not-a-real-program-xyz");
                assert_eq!(status, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_captures_stderr_on_failure() {
        let args = vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()];
        let err = run_tool("sh", &args).unwrap_err();
        match err {
            ErosivityError::ExternalTool { status, stderr, .. } => {
                assert_eq!(status, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_tool_captures_stdout() {
        let args = vec!["-c".to_string(), "echo ok".to_string()];
        let out = run_tool("sh", &args).unwrap();
        assert_eq!(out.status, 0);
        assert_eq!(out.stdout.trim(), "ok");
    }

    #[test]
    fn test_arguments_request_north_up_output() {
        let interp = GdalGridInterpolator::new("gdal_grid", IdwParams::default());
        let target =
            TargetGrid::from_extent(BoundingBox::new(0.0, 0.0, 2000.0, 2000.0), 500.0).unwrap();
        let args = interp.arguments(
            &target,
            "EPSG:32634",
            &PathBuf::from("/tmp/x/points.vrt"),
            &PathBuf::from("/tmp/x/grid.tif"),
        );

        let tye = args.iter().position(|a| a == "-tye").unwrap();
        assert_eq!(args[tye + 1], "2000");
        assert_eq!(args[tye + 2], "0");

        let size = args.iter().position(|a| a == "-outsize").unwrap();
        assert_eq!(&args[size + 1..size + 3], &["4".to_string(), "4".to_string()]);

        assert!(args.contains(&"-a_srs".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/x/grid.tif"));
    }

    #[test]
    fn test_empty_cloud_is_degenerate() {
        let interp = GdalGridInterpolator::new("gdal_grid", IdwParams::default());
        let target =
            TargetGrid::from_extent(BoundingBox::new(0.0, 0.0, 1000.0, 1000.0), 500.0).unwrap();
        let result = interp.interpolate(&PointCloud::default(), &target, "", Nodata::default());
        assert!(matches!(result, Err(ErosivityError::InterpolationDegenerate(_))));
    }
}
