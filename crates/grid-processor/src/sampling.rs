//! Raster to point-cloud sampling.

use tracing::debug;

use erosivity_common::{PointCloud, RasterGrid, SamplePoint};

/// Emit one sample per valid cell, at the cell centre.
///
/// Cells are visited row by row from the top, left to right. Nodata and
/// non-finite cells are skipped. A grid with no valid cells yields an empty
/// cloud; callers decide whether that is fatal.
pub fn sample_points(grid: &RasterGrid) -> PointCloud {
    let gt = grid.geotransform();
    let mut cloud = PointCloud::new(Vec::with_capacity(grid.valid_count()));

    for row in 0..grid.rows() {
        for col in 0..grid.cols() {
            if let Some(value) = grid.valid_value(row, col).filter(|v| v.is_finite()) {
                let (x, y) = gt.cell_center(row, col);
                cloud.push(SamplePoint::new(x, y, value as f64));
            }
        }
    }

    debug!(
        rows = grid.rows(),
        cols = grid.cols(),
        samples = cloud.len(),
        "Sampled raster cells"
    );
    cloud
}
