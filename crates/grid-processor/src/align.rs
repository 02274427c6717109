//! Raster alignment: boundary clipping, snap-grid reconciliation and
//! congruence checks between rasters that are combined cell by cell.

use tracing::{debug, warn};

use erosivity_common::{
    BoundingBox, ErosivityError, GeoTransform, GeometryMismatchKind, RasterGrid, Result,
};
use raster_io::Boundary;

use crate::config::{AlignmentTolerance, ProjectionOverride};

/// Slack applied when snapping a window onto cell lines.
const EPS: f64 = 1e-9;

/// The reference lattice every output raster is placed on.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapGrid {
    geotransform: GeoTransform,
    cols: usize,
    rows: usize,
    projection: String,
}

impl SnapGrid {
    pub fn new(
        geotransform: GeoTransform,
        cols: usize,
        rows: usize,
        projection: impl Into<String>,
    ) -> Result<Self> {
        if cols == 0 || rows == 0 {
            return Err(ErosivityError::configuration(format!(
                "snap grid dimensions must be non-zero, got {}x{}",
                cols, rows
            )));
        }
        Ok(Self {
            geotransform,
            cols,
            rows,
            projection: projection.into(),
        })
    }

    /// Take the lattice of an existing raster.
    pub fn from_raster(grid: &RasterGrid) -> Self {
        Self {
            geotransform: *grid.geotransform(),
            cols: grid.cols(),
            rows: grid.rows(),
            projection: grid.projection().to_string(),
        }
    }

    pub fn geotransform(&self) -> &GeoTransform {
        &self.geotransform
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn projection(&self) -> &str {
        &self.projection
    }

    pub fn extent(&self) -> BoundingBox {
        self.geotransform.extent_of(self.cols, self.rows)
    }

    /// Nominal cell size (pixel width).
    pub fn cell_size(&self) -> f64 {
        self.geotransform.pixel_width()
    }
}

/// Apply the projection policy to two projection identifiers.
pub fn check_projection(
    actual: &str,
    expected: &str,
    policy: ProjectionOverride,
    context: &str,
) -> Result<()> {
    if actual == expected {
        return Ok(());
    }

    match policy {
        ProjectionOverride::Abort => Err(ErosivityError::geometry_mismatch(
            GeometryMismatchKind::Projection,
            format!("{}: '{}' differs from '{}'", context, actual, expected),
        )),
        ProjectionOverride::Continue => {
            warn!(
                context = %context,
                actual = %actual,
                expected = %expected,
                "Projection mismatch overridden, continuing"
            );
            Ok(())
        }
    }
}

/// Clip `grid` to `boundary`.
///
/// The output window is the boundary's bounding box intersected with the
/// grid extent, widened to whole cells without leaving the grid. Cells whose
/// centre is not strictly inside the boundary become nodata.
pub fn clip_to_boundary(grid: &RasterGrid, boundary: &Boundary) -> Result<RasterGrid> {
    let extent = grid.extent();
    let window = extent.intersection(&boundary.bounds()).ok_or_else(|| {
        ErosivityError::geometry_mismatch(
            GeometryMismatchKind::NoOverlap,
            format!(
                "boundary {} does not overlap raster {}",
                boundary.bounds(),
                extent
            ),
        )
    })?;

    let gt = grid.geotransform();
    let pw = gt.pixel_width();
    let ch = gt.cell_height();

    let col_start = (((window.min_x - gt.origin_x()) / pw) + EPS).floor().max(0.0) as usize;
    let col_end = (((window.max_x - gt.origin_x()) / pw) - EPS).ceil().max(0.0) as usize;
    let row_start = (((gt.origin_y() - window.max_y) / ch) + EPS).floor().max(0.0) as usize;
    let row_end = (((gt.origin_y() - window.min_y) / ch) - EPS).ceil().max(0.0) as usize;

    let col_end = col_end.min(grid.cols());
    let row_end = row_end.min(grid.rows());
    if col_end <= col_start || row_end <= row_start {
        return Err(ErosivityError::geometry_mismatch(
            GeometryMismatchKind::NoOverlap,
            format!("clip window {} covers no whole cell", window),
        ));
    }

    let cols = col_end - col_start;
    let rows = row_end - row_start;
    let clipped_gt = GeoTransform::north_up(
        gt.origin_x() + col_start as f64 * pw,
        gt.origin_y() - row_start as f64 * ch,
        pw,
        ch,
    )?;

    let nodata = grid.nodata().value();
    let mut data = Vec::with_capacity(rows * cols);
    for row in row_start..row_end {
        for col in col_start..col_end {
            let (x, y) = gt.cell_center(row, col);
            let value = match grid.get(row, col) {
                Some(v) if boundary.contains(x, y) => v,
                _ => nodata,
            };
            data.push(value);
        }
    }

    let clipped = RasterGrid::new(
        data,
        rows,
        cols,
        clipped_gt,
        grid.projection(),
        grid.nodata(),
    )?;
    debug!(
        cols = cols,
        rows = rows,
        col_offset = col_start,
        row_offset = row_start,
        valid = clipped.valid_count(),
        "Clipped raster to boundary"
    );
    Ok(clipped)
}

/// Place `grid` on the snap lattice.
///
/// The result always has the snap grid's size, geotransform and projection.
/// Cells the input does not cover are nodata. An input hanging over the snap
/// grid by more than `max_cell_overhang` cells on any side is rejected.
pub fn reconcile_with_snap(
    grid: &RasterGrid,
    snap: &SnapGrid,
    tolerance: &AlignmentTolerance,
) -> Result<RasterGrid> {
    let gt = grid.geotransform();
    let sgt = snap.geotransform();

    if !gt.same_cell_size(sgt) {
        return Err(ErosivityError::geometry_mismatch(
            GeometryMismatchKind::CellSize,
            format!(
                "raster cells {}x{} differ from snap cells {}x{}",
                gt.pixel_width(),
                gt.cell_height(),
                sgt.pixel_width(),
                sgt.cell_height()
            ),
        ));
    }
    check_projection(
        grid.projection(),
        snap.projection(),
        tolerance.projection,
        "snap grid",
    )?;

    let col_shift = (gt.origin_x() - sgt.origin_x()) / sgt.pixel_width();
    let row_shift = (sgt.origin_y() - gt.origin_y()) / sgt.cell_height();
    let col_offset = col_shift.round();
    let row_offset = row_shift.round();

    // Off-lattice origins are snapped to the nearest cell line.
    let residual = (col_shift - col_offset).abs().max((row_shift - row_offset).abs());

    let col_offset = col_offset as i64;
    let row_offset = row_offset as i64;
    let (cols, rows) = (grid.cols() as i64, grid.rows() as i64);
    let (snap_cols, snap_rows) = (snap.cols() as i64, snap.rows() as i64);

    if col_offset >= snap_cols
        || row_offset >= snap_rows
        || col_offset + cols <= 0
        || row_offset + rows <= 0
    {
        return Err(ErosivityError::geometry_mismatch(
            GeometryMismatchKind::NoOverlap,
            format!("raster {} lies outside snap grid {}", grid.extent(), snap.extent()),
        ));
    }

    let overhang = [
        -col_offset,
        -row_offset,
        col_offset + cols - snap_cols,
        row_offset + rows - snap_rows,
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
    .max(0) as usize;

    if overhang > tolerance.max_cell_overhang {
        return Err(ErosivityError::geometry_mismatch(
            GeometryMismatchKind::Extent,
            format!(
                "raster overhangs the snap grid by {} cells (limit {})",
                overhang, tolerance.max_cell_overhang
            ),
        ));
    }

    let nodata = grid.nodata();
    let mut data = vec![nodata.value(); snap.cols() * snap.rows()];
    for row in 0..grid.rows() {
        let snap_row = row as i64 + row_offset;
        if snap_row < 0 || snap_row >= snap_rows {
            continue;
        }
        for col in 0..grid.cols() {
            let snap_col = col as i64 + col_offset;
            if snap_col < 0 || snap_col >= snap_cols {
                continue;
            }
            if let Some(v) = grid.get(row, col) {
                data[snap_row as usize * snap.cols() + snap_col as usize] = v;
            }
        }
    }

    debug!(
        col_offset = col_offset,
        row_offset = row_offset,
        overhang = overhang,
        residual_cells = residual,
        "Reconciled raster with snap grid"
    );

    RasterGrid::new(
        data,
        snap.rows(),
        snap.cols(),
        *sgt,
        snap.projection(),
        nodata,
    )
}

/// Check that two rasters can be combined cell by cell.
pub fn check_congruent(
    reference: &RasterGrid,
    other: &RasterGrid,
    tolerance: &AlignmentTolerance,
) -> Result<()> {
    if reference.rows() != other.rows() || reference.cols() != other.cols() {
        return Err(ErosivityError::geometry_mismatch(
            GeometryMismatchKind::Dimensions,
            format!(
                "{}x{} cells vs {}x{} cells",
                reference.cols(),
                reference.rows(),
                other.cols(),
                other.rows()
            ),
        ));
    }

    let a = reference.geotransform();
    let b = other.geotransform();
    if !a.same_cell_size(b) {
        return Err(ErosivityError::geometry_mismatch(
            GeometryMismatchKind::CellSize,
            format!(
                "cell size {}x{} vs {}x{}",
                a.pixel_width(),
                a.cell_height(),
                b.pixel_width(),
                b.cell_height()
            ),
        ));
    }

    let shift_x = (a.origin_x() - b.origin_x()).abs() / a.pixel_width();
    let shift_y = (a.origin_y() - b.origin_y()).abs() / a.cell_height();
    if shift_x.max(shift_y) > tolerance.max_origin_shift_cells {
        return Err(ErosivityError::geometry_mismatch(
            GeometryMismatchKind::Origin,
            format!(
                "origins ({}, {}) and ({}, {}) differ by {:.3} cells",
                a.origin_x(),
                a.origin_y(),
                b.origin_x(),
                b.origin_y(),
                shift_x.max(shift_y)
            ),
        ));
    }

    check_projection(
        other.projection(),
        reference.projection(),
        tolerance.projection,
        "congruence check",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use erosivity_common::Nodata;
    use raster_io::parse_boundary;

    fn grid(rows: usize, cols: usize, ox: f64, oy: f64, cell: f64) -> RasterGrid {
        let gt = GeoTransform::north_up(ox, oy, cell, cell).unwrap();
        let data = (0..rows * cols).map(|v| v as f32).collect();
        RasterGrid::new(data, rows, cols, gt, "EPSG:32634", Nodata::default()).unwrap()
    }

    fn snap() -> SnapGrid {
        SnapGrid::new(
            GeoTransform::north_up(0.0, 2000.0, 500.0, 500.0).unwrap(),
            4,
            4,
            "EPSG:32634",
        )
        .unwrap()
    }

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Boundary {
        Boundary::from_bbox(&BoundingBox::new(min_x, min_y, max_x, max_y)).unwrap()
    }

    #[test]
    fn test_clip_snaps_window_outward() {
        let g = grid(4, 4, 0.0, 2000.0, 500.0);
        let clipped = clip_to_boundary(&g, &rect(600.0, 600.0, 1400.0, 1400.0)).unwrap();

        assert_eq!(clipped.cols(), 2);
        assert_eq!(clipped.rows(), 2);
        assert_eq!(clipped.geotransform().origin_x(), 500.0);
        assert_eq!(clipped.geotransform().origin_y(), 1500.0);
    }

    #[test]
    fn test_clip_masks_cells_outside_polygon() {
        let g = grid(4, 4, 0.0, 2000.0, 500.0);
        let triangle = parse_boundary(
            r#"{"type":"Polygon","coordinates":[[[0,0],[2000,0],[0,2000],[0,0]]]}"#,
            "triangle",
        )
        .unwrap();
        let clipped = clip_to_boundary(&g, &triangle).unwrap();

        assert_eq!(clipped.cols(), 4);
        assert_eq!(clipped.rows(), 4);
        // (250, 1250) is inside, (1750, 1750) is not.
        assert_eq!(clipped.valid_value(1, 0), Some(4.0));
        assert_eq!(clipped.valid_value(0, 3), None);
        assert_eq!(clipped.valid_value(3, 0), Some(12.0));
    }

    #[test]
    fn test_clip_without_overlap_fails() {
        let g = grid(4, 4, 0.0, 2000.0, 500.0);
        let err = clip_to_boundary(&g, &rect(5000.0, 5000.0, 6000.0, 6000.0)).unwrap_err();
        assert!(matches!(
            err,
            ErosivityError::GeometryMismatch {
                kind: GeometryMismatchKind::NoOverlap,
                ..
            }
        ));
    }

    #[test]
    fn test_reconcile_pads_to_snap_grid() {
        let g = grid(4, 2, 0.0, 2000.0, 500.0);
        let out = reconcile_with_snap(&g, &snap(), &AlignmentTolerance::default()).unwrap();

        assert_eq!(out.cols(), 4);
        assert_eq!(out.rows(), 4);
        assert_eq!(out.geotransform(), snap().geotransform());
        assert_eq!(out.valid_value(0, 1), Some(1.0));
        assert_eq!(out.valid_value(0, 2), None);
        assert_eq!(out.valid_value(3, 3), None);
    }

    #[test]
    fn test_reconcile_places_at_rounded_offset() {
        let g = grid(1, 1, 1010.0, 990.0, 500.0);
        let out = reconcile_with_snap(&g, &snap(), &AlignmentTolerance::default()).unwrap();
        assert_eq!(out.valid_count(), 1);
        assert_eq!(out.valid_value(2, 2), Some(0.0));
    }

    #[test]
    fn test_reconcile_snaps_sub_cell_offset_regardless_of_congruence_limit() {
        let tolerance = AlignmentTolerance {
            max_origin_shift_cells: 0.0,
            ..AlignmentTolerance::default()
        };
        // 0.48 cells right and 0.3 cells down of (1, 1).
        let g = grid(1, 1, 740.0, 1350.0, 500.0);
        let out = reconcile_with_snap(&g, &snap(), &tolerance).unwrap();
        assert_eq!(out.valid_count(), 1);
        assert_eq!(out.valid_value(1, 1), Some(0.0));
    }

    #[test]
    fn test_reconcile_tolerates_small_overhang() {
        let g = grid(4, 6, -500.0, 2000.0, 500.0);
        let out = reconcile_with_snap(&g, &snap(), &AlignmentTolerance::default()).unwrap();
        assert_eq!(out.cols(), 4);
        assert_eq!(out.valid_value(0, 0), Some(1.0));
    }

    #[test]
    fn test_reconcile_rejects_large_overhang() {
        let g = grid(4, 8, -1500.0, 2000.0, 500.0);
        let err = reconcile_with_snap(&g, &snap(), &AlignmentTolerance::default()).unwrap_err();
        assert!(matches!(
            err,
            ErosivityError::GeometryMismatch {
                kind: GeometryMismatchKind::Extent,
                ..
            }
        ));
    }

    #[test]
    fn test_reconcile_rejects_cell_size_mismatch() {
        let g = grid(2, 2, 0.0, 2000.0, 250.0);
        let err = reconcile_with_snap(&g, &snap(), &AlignmentTolerance::default()).unwrap_err();
        assert!(matches!(
            err,
            ErosivityError::GeometryMismatch {
                kind: GeometryMismatchKind::CellSize,
                ..
            }
        ));
    }

    #[test]
    fn test_projection_override_policy() {
        let gt = GeoTransform::north_up(0.0, 2000.0, 500.0, 500.0).unwrap();
        let g = RasterGrid::filled_with_nodata(4, 4, gt, "EPSG:3035", Nodata::default()).unwrap();

        let err = reconcile_with_snap(&g, &snap(), &AlignmentTolerance::default()).unwrap_err();
        assert!(err.is_advisory());

        let tolerance = AlignmentTolerance {
            projection: ProjectionOverride::Continue,
            ..AlignmentTolerance::default()
        };
        let out = reconcile_with_snap(&g, &snap(), &tolerance).unwrap();
        assert_eq!(out.projection(), "EPSG:32634");
    }

    #[test]
    fn test_congruent_requires_rows_and_cols() {
        let tol = AlignmentTolerance::default();
        let a = grid(4, 4, 0.0, 2000.0, 500.0);
        assert!(check_congruent(&a, &a.clone(), &tol).is_ok());

        // Same column count but different rows must still fail.
        let b = grid(3, 4, 0.0, 2000.0, 500.0);
        let err = check_congruent(&a, &b, &tol).unwrap_err();
        assert!(matches!(
            err,
            ErosivityError::GeometryMismatch {
                kind: GeometryMismatchKind::Dimensions,
                ..
            }
        ));
    }

    #[test]
    fn test_congruent_origin_shift_limit() {
        let tol = AlignmentTolerance::default();
        let a = grid(4, 4, 0.0, 2000.0, 500.0);
        assert!(check_congruent(&a, &grid(4, 4, 400.0, 2000.0, 500.0), &tol).is_ok());
        assert!(check_congruent(&a, &grid(4, 4, 1000.0, 2000.0, 500.0), &tol).is_err());
    }
}
