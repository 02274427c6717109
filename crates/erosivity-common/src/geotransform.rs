//! Affine geotransform for north-up rasters.
//!
//! Coefficients follow the GDAL ordering
//! `(originX, pixelWidth, rotationX, originY, rotationY, pixelHeight)` where
//! `(originX, originY)` is the outer corner of the upper-left cell and
//! `pixelHeight` is negative.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{ErosivityError, Result};

/// A validated north-up geotransform (no rotation, positive width, negative height).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    origin_x: f64,
    pixel_width: f64,
    origin_y: f64,
    pixel_height: f64,
}

impl GeoTransform {
    /// Create a geotransform from the upper-left corner and cell sizes.
    ///
    /// `cell_height` is the absolute height; it is stored negated.
    pub fn north_up(origin_x: f64, origin_y: f64, cell_width: f64, cell_height: f64) -> Result<Self> {
        if !(origin_x.is_finite() && origin_y.is_finite()) {
            return Err(ErosivityError::configuration(format!(
                "geotransform origin ({}, {}) is not finite",
                origin_x, origin_y
            )));
        }
        if !(cell_width.is_finite() && cell_width > 0.0) {
            return Err(ErosivityError::configuration(format!(
                "cell width must be positive, got {}",
                cell_width
            )));
        }
        if !(cell_height.is_finite() && cell_height > 0.0) {
            return Err(ErosivityError::configuration(format!(
                "cell height must be positive, got {}",
                cell_height
            )));
        }

        Ok(Self {
            origin_x,
            pixel_width: cell_width,
            origin_y,
            pixel_height: -cell_height,
        })
    }

    /// Validate a raw GDAL-ordered coefficient array.
    pub fn from_gdal(gt: [f64; 6]) -> Result<Self> {
        if gt[2] != 0.0 || gt[4] != 0.0 {
            return Err(ErosivityError::configuration(format!(
                "rotated geotransforms are not supported (rotation {}, {})",
                gt[2], gt[4]
            )));
        }
        if gt[5] >= 0.0 {
            return Err(ErosivityError::configuration(format!(
                "pixel height must be negative for a north-up raster, got {}",
                gt[5]
            )));
        }
        Self::north_up(gt[0], gt[3], gt[1], -gt[5])
    }

    /// Derive the geotransform of a legacy ASCII grid.
    ///
    /// The header anchors the lower-left corner, so the origin is lifted by
    /// `nrows * cellsize`.
    pub fn from_ascii_header(
        ncols: usize,
        nrows: usize,
        xllcorner: f64,
        yllcorner: f64,
        cellsize: f64,
    ) -> Result<Self> {
        if ncols == 0 || nrows == 0 {
            return Err(ErosivityError::configuration(format!(
                "ASCII grid has empty dimensions {}x{}",
                ncols, nrows
            )));
        }
        Self::north_up(
            xllcorner,
            yllcorner + nrows as f64 * cellsize,
            cellsize,
            cellsize,
        )
    }

    /// Geotransform whose upper-left corner is the corner of `extent`.
    pub fn from_extent(extent: &BoundingBox, cell_size: f64) -> Result<Self> {
        Self::north_up(extent.min_x, extent.max_y, cell_size, cell_size)
    }

    /// Coefficients in GDAL order.
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            0.0,
            self.origin_y,
            0.0,
            self.pixel_height,
        ]
    }

    pub fn origin_x(&self) -> f64 {
        self.origin_x
    }

    pub fn origin_y(&self) -> f64 {
        self.origin_y
    }

    /// Signed pixel width (always positive).
    pub fn pixel_width(&self) -> f64 {
        self.pixel_width
    }

    /// Signed pixel height (always negative).
    pub fn pixel_height(&self) -> f64 {
        self.pixel_height
    }

    /// Absolute cell height.
    pub fn cell_height(&self) -> f64 {
        -self.pixel_height
    }

    /// Map coordinates of the centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let x = self.origin_x + col as f64 * self.pixel_width + self.pixel_width / 2.0;
        let y = self.origin_y + row as f64 * self.pixel_height + self.pixel_height / 2.0;
        (x, y)
    }

    /// Extent covered by a `cols` x `rows` raster.
    pub fn extent_of(&self, cols: usize, rows: usize) -> BoundingBox {
        let max_x = self.origin_x + cols as f64 * self.pixel_width;
        let min_y = self.origin_y + rows as f64 * self.pixel_height;
        BoundingBox::new(self.origin_x, min_y, max_x, self.origin_y)
    }

    /// Inverse of [`cell_center`](Self::cell_center): the cell containing `(x, y)`.
    ///
    /// Cells are half-open on their right and bottom edges.
    pub fn coord_to_cell(&self, x: f64, y: f64, cols: usize, rows: usize) -> Option<(usize, usize)> {
        let col_f = ((x - self.origin_x) / self.pixel_width).floor();
        let row_f = ((y - self.origin_y) / self.pixel_height).floor();

        if !(col_f.is_finite() && row_f.is_finite()) || col_f < 0.0 || row_f < 0.0 {
            return None;
        }

        let (row, col) = (row_f as usize, col_f as usize);
        if row >= rows || col >= cols {
            return None;
        }
        Some((row, col))
    }

    /// Compare cell sizes at single precision.
    pub fn same_cell_size(&self, other: &GeoTransform) -> bool {
        self.pixel_width as f32 == other.pixel_width as f32
            && self.pixel_height as f32 == other.pixel_height as f32
    }
}
