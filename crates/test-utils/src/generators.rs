//! Synthetic raster generators.
//!
//! These produce small grids with predictable values so tests can check
//! exact cell contents after sampling, interpolation and alignment.

use erosivity_common::{GeoTransform, Nodata, RasterGrid};

use crate::fixtures::PROJECTION;

/// Builds a raster anchored at `(origin_x, origin_y)` with square cells.
///
/// Uses the default `-9999` sentinel and the fixture projection.
///
/// # Panics
///
/// Panics if `values.len() != rows * cols` or the geometry is invalid.
pub fn raster_from_values(
    values: Vec<f32>,
    rows: usize,
    cols: usize,
    origin_x: f64,
    origin_y: f64,
    cell_size: f64,
) -> RasterGrid {
    let gt = GeoTransform::north_up(origin_x, origin_y, cell_size, cell_size)
        .expect("valid test geotransform");
    RasterGrid::new(values, rows, cols, gt, PROJECTION, Nodata::default())
        .expect("valid test raster")
}

/// A raster where every cell holds `value`.
pub fn constant_raster(rows: usize, cols: usize, cell_size: f64, value: f32) -> RasterGrid {
    raster_from_values(
        vec![value; rows * cols],
        rows,
        cols,
        0.0,
        rows as f64 * cell_size,
        cell_size,
    )
}

/// A raster whose cell values equal `a * x + b * y + c` at cell centres.
pub fn plane_raster(rows: usize, cols: usize, cell_size: f64, a: f64, b: f64, c: f64) -> RasterGrid {
    let gt = GeoTransform::north_up(0.0, rows as f64 * cell_size, cell_size, cell_size)
        .expect("valid test geotransform");
    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let (x, y) = gt.cell_center(row, col);
            data.push((a * x + b * y + c) as f32);
        }
    }
    RasterGrid::new(data, rows, cols, gt, PROJECTION, Nodata::default())
        .expect("valid test raster")
}

/// Replace the listed `(row, col)` cells of `grid` with its nodata value.
pub fn with_nodata_cells(grid: &RasterGrid, cells: &[(usize, usize)]) -> RasterGrid {
    let mut data = grid.data().to_vec();
    for &(row, col) in cells {
        data[row * grid.cols() + col] = grid.nodata().value();
    }
    grid.with_data(data).expect("same geometry")
}

/// The 4x4, 250 m source raster used by the end-to-end resampling tests.
///
/// Covers `[0, 1000] x [0, 1000]`, values `1..=16` row-major, with the cell
/// at `(1, 2)` set to nodata.
pub fn sample_source_raster() -> RasterGrid {
    let values: Vec<f32> = (1..=16).map(|v| v as f32).collect();
    let grid = raster_from_values(values, 4, 4, 0.0, 1000.0, 250.0);
    with_nodata_cells(&grid, &[(1, 2)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_raster_values() {
        let grid = plane_raster(2, 2, 10.0, 1.0, 0.0, 0.0);
        assert_eq!(grid.data(), &[5.0, 15.0, 5.0, 15.0]);
    }

    #[test]
    fn test_sample_source_raster() {
        let grid = sample_source_raster();
        assert_eq!(grid.valid_count(), 15);
        assert_eq!(grid.valid_value(1, 2), None);
        assert_eq!(grid.extent().to_extent(), [0.0, 1000.0, 1000.0, 0.0]);
    }
}
