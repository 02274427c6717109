//! Scattered-point interpolation onto a regular grid.
//!
//! The in-process engine is inverse distance weighting limited to the
//! nearest `max_points` samples inside a search radius. For every output
//! node:
//!
//! ```text
//! neighbours = samples within radius, sorted by (distance, input order)
//! if |neighbours| < min_points        -> nodata
//! if nearest distance == 0 (no smoothing) -> that sample's z
//! else z = sum(w_i * z_i) / sum(w_i), w_i = 1 / (d_i^2 + s^2)^(p/2)
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, info};

use erosivity_common::{
    BoundingBox, ErosivityError, GeoTransform, Nodata, PointCloud, RasterGrid, Result, SamplePoint,
};

use crate::config::IdwParams;

/// Output raster definition for an interpolation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetGrid {
    extent: BoundingBox,
    cols: usize,
    rows: usize,
    geotransform: GeoTransform,
}

impl TargetGrid {
    /// Size a grid over `extent` with nominal `cell_size`.
    ///
    /// Column and row counts are truncated (`floor`), and the extent is then
    /// divided evenly, so cells can be slightly larger than `cell_size` when
    /// the extent is not a multiple of it.
    pub fn from_extent(extent: BoundingBox, cell_size: f64) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(ErosivityError::configuration(format!(
                "target cell size must be positive, got {}",
                cell_size
            )));
        }

        let cols = (extent.width() / cell_size).floor();
        let rows = (extent.height() / cell_size).floor();
        if !(cols >= 1.0 && rows >= 1.0) {
            return Err(ErosivityError::configuration(format!(
                "target extent {} is smaller than one {} cell",
                extent, cell_size
            )));
        }

        let (cols, rows) = (cols as usize, rows as usize);
        let geotransform = GeoTransform::north_up(
            extent.min_x,
            extent.max_y,
            extent.width() / cols as f64,
            extent.height() / rows as f64,
        )?;

        Ok(Self {
            extent,
            cols,
            rows,
            geotransform,
        })
    }

    pub fn extent(&self) -> BoundingBox {
        self.extent
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn geotransform(&self) -> &GeoTransform {
        &self.geotransform
    }
}

/// An engine that turns a point cloud into a raster on a target grid.
pub trait Interpolator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Interpolate `points` onto `target`. Cells without enough neighbours
    /// hold `nodata`. An empty cloud is an error.
    fn interpolate(
        &self,
        points: &PointCloud,
        target: &TargetGrid,
        projection: &str,
        nodata: Nodata,
    ) -> Result<RasterGrid>;
}

/// Uniform bucket index over sample positions.
struct PointIndex<'a> {
    points: &'a [SamplePoint],
    radius: Option<f64>,
    buckets: HashMap<(i64, i64), Vec<usize>>,
}

impl<'a> PointIndex<'a> {
    fn build(points: &'a [SamplePoint], radius: Option<f64>) -> Self {
        let mut buckets: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
        if let Some(r) = radius {
            for (i, p) in points.iter().enumerate() {
                buckets.entry(Self::bucket(p.x, p.y, r)).or_default().push(i);
            }
        }
        Self {
            points,
            radius,
            buckets,
        }
    }

    fn bucket(x: f64, y: f64, size: f64) -> (i64, i64) {
        ((x / size).floor() as i64, (y / size).floor() as i64)
    }

    /// `(squared distance, index)` of samples within the radius, nearest
    /// first, ties broken by input order.
    fn neighbours(&self, x: f64, y: f64) -> Vec<(f64, usize)> {
        let d2 = |i: usize| {
            let p = &self.points[i];
            (p.x - x).powi(2) + (p.y - y).powi(2)
        };

        let mut found: Vec<(f64, usize)> = match self.radius {
            None => (0..self.points.len()).map(|i| (d2(i), i)).collect(),
            Some(r) => {
                let r2 = r * r;
                let (bx, by) = Self::bucket(x, y, r);
                let mut found = Vec::new();
                for dx in -1..=1 {
                    for dy in -1..=1 {
                        if let Some(indices) = self.buckets.get(&(bx + dx, by + dy)) {
                            found.extend(
                                indices
                                    .iter()
                                    .map(|&i| (d2(i), i))
                                    .filter(|(d, _)| *d <= r2),
                            );
                        }
                    }
                }
                found
            }
        };

        found.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        found
    }
}

/// In-process IDW with nearest-neighbour limiting.
#[derive(Debug, Clone, Default)]
pub struct IdwInterpolator {
    params: IdwParams,
}

impl IdwInterpolator {
    pub fn new(params: IdwParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &IdwParams {
        &self.params
    }

    fn node_value(&self, index: &PointIndex<'_>, x: f64, y: f64) -> Option<f64> {
        let mut neighbours = index.neighbours(x, y);
        if self.params.max_points > 0 {
            neighbours.truncate(self.params.max_points);
        }
        if neighbours.len() < self.params.min_points {
            return None;
        }

        let s2 = self.params.smoothing * self.params.smoothing;
        if let Some(&(d2, i)) = neighbours.first() {
            if d2 == 0.0 && s2 == 0.0 {
                return Some(index.points[i].z);
            }
        }

        let half_power = self.params.power / 2.0;
        let (weighted, total) = neighbours
            .iter()
            .fold((0.0, 0.0), |(weighted, total), &(d2, i)| {
                let w = 1.0 / (d2 + s2).powf(half_power);
                (weighted + w * index.points[i].z, total + w)
            });

        (total > 0.0).then(|| weighted / total)
    }
}

impl Interpolator for IdwInterpolator {
    fn name(&self) -> &'static str {
        "idw"
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

        let index = PointIndex::build(points.points(), self.params.search_radius());
        let gt = *target.geotransform();
        let cols = target.cols();
        let mut data = vec![nodata.value(); cols * target.rows()];

        data.par_chunks_mut(cols)
            .enumerate()
            .for_each(|(row, out)| {
                for (col, cell) in out.iter_mut().enumerate() {
                    let (x, y) = gt.cell_center(row, col);
                    if let Some(v) = self.node_value(&index, x, y) {
                        *cell = v as f32;
                    }
                }
            });

        let grid = RasterGrid::new(data, target.rows(), cols, gt, projection, nodata)?;
        let filled = grid.valid_count();

        debug!(
            samples = points.len(),
            cols = cols,
            rows = target.rows(),
            power = self.params.power,
            max_points = self.params.max_points,
            radius = self.params.radius,
            "IDW interpolation finished"
        );
        if filled == 0 {
            info!(
                samples = points.len(),
                "No output cell had a sample within the search radius"
            );
        }

        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(points: &[(f64, f64, f64)]) -> PointCloud {
        points
            .iter()
            .map(|&(x, y, z)| SamplePoint::new(x, y, z))
            .collect()
    }

    fn target(min_x: f64, min_y: f64, max_x: f64, max_y: f64, cell: f64) -> TargetGrid {
        TargetGrid::from_extent(BoundingBox::new(min_x, min_y, max_x, max_y), cell).unwrap()
    }

    #[test]
    fn test_target_dimensions_truncate() {
        let t = target(0.0, 0.0, 1000.0, 1000.0, 300.0);
        assert_eq!(t.cols(), 3);
        assert_eq!(t.rows(), 3);
        assert!((t.geotransform().pixel_width() - 1000.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_target_smaller_than_one_cell_is_rejected() {
        let result = TargetGrid::from_extent(BoundingBox::new(0.0, 0.0, 100.0, 100.0), 300.0);
        assert!(matches!(result, Err(ErosivityError::Configuration(_))));
    }

    #[test]
    fn test_empty_cloud_is_degenerate() {
        let idw = IdwInterpolator::default();
        let result = idw.interpolate(
            &PointCloud::default(),
            &target(0.0, 0.0, 1000.0, 1000.0, 500.0),
            "EPSG:32634",
            Nodata::default(),
        );
        assert!(matches!(result, Err(ErosivityError::InterpolationDegenerate(_))));
    }

    #[test]
    fn test_exact_value_at_sample_location() {
        let idw = IdwInterpolator::default();
        let points = cloud(&[(250.0, 750.0, 10.0), (750.0, 250.0, 30.0)]);
        let grid = idw
            .interpolate(&points, &target(0.0, 0.0, 1000.0, 1000.0, 500.0), "", Nodata::default())
            .unwrap();

        assert_eq!(grid.get(0, 0), Some(10.0));
        assert_eq!(grid.get(1, 1), Some(30.0));
        // Equidistant from both samples.
        assert_eq!(grid.get(0, 1), Some(20.0));
    }

    #[test]
    fn test_constant_field_stays_constant() {
        let idw = IdwInterpolator::default();
        let points = cloud(&[(10.0, 10.0, 4.0), (90.0, 20.0, 4.0), (40.0, 80.0, 4.0)]);
        let grid = idw
            .interpolate(&points, &target(0.0, 0.0, 100.0, 100.0, 10.0), "", Nodata::default())
            .unwrap();
        assert!(grid.data().iter().all(|v| (*v - 4.0).abs() < 1e-5));
    }

    #[test]
    fn test_cells_outside_radius_are_nodata() {
        let mut params = IdwParams::default();
        params.radius = 600.0;
        let idw = IdwInterpolator::new(params);
        let points = cloud(&[(250.0, 1750.0, 1.0)]);
        let grid = idw
            .interpolate(&points, &target(0.0, 0.0, 2000.0, 2000.0, 500.0), "", Nodata::default())
            .unwrap();

        assert_eq!(grid.valid_value(0, 0), Some(1.0));
        assert_eq!(grid.valid_value(0, 1), Some(1.0));
        assert_eq!(grid.valid_value(3, 3), None);
        assert_eq!(grid.get(3, 3), Some(-9999.0));
    }

    #[test]
    fn test_max_points_limits_to_nearest() {
        let mut params = IdwParams::default();
        params.max_points = 1;
        let idw = IdwInterpolator::new(params);
        let points = cloud(&[(100.0, 100.0, 1.0), (900.0, 900.0, 9.0)]);
        let grid = idw
            .interpolate(&points, &target(0.0, 0.0, 1000.0, 1000.0, 500.0), "", Nodata::default())
            .unwrap();

        assert_eq!(grid.get(1, 0), Some(1.0));
        assert_eq!(grid.get(0, 1), Some(9.0));
    }

    #[test]
    fn test_min_points_not_met_is_nodata() {
        let mut params = IdwParams::default();
        params.min_points = 3;
        let idw = IdwInterpolator::new(params);
        let points = cloud(&[(100.0, 100.0, 1.0), (900.0, 900.0, 9.0)]);
        let grid = idw
            .interpolate(&points, &target(0.0, 0.0, 1000.0, 1000.0, 500.0), "", Nodata::Nan)
            .unwrap();
        assert_eq!(grid.valid_count(), 0);
    }

    #[test]
    fn test_duplicate_points_first_seen_wins_at_zero_distance() {
        let idw = IdwInterpolator::default();
        let points = cloud(&[(250.0, 250.0, 5.0), (250.0, 250.0, 7.0)]);
        let grid = idw
            .interpolate(&points, &target(0.0, 0.0, 500.0, 500.0, 500.0), "", Nodata::default())
            .unwrap();
        assert_eq!(grid.get(0, 0), Some(5.0));
    }

    #[test]
    fn test_unlimited_radius_uses_all_points() {
        let mut params = IdwParams::default();
        params.radius = 0.0;
        let idw = IdwInterpolator::new(params);
        let points = cloud(&[(0.0, 0.0, 2.0)]);
        let grid = idw
            .interpolate(
                &points,
                &target(0.0, 0.0, 100_000.0, 100_000.0, 50_000.0),
                "",
                Nodata::default(),
            )
            .unwrap();
        assert_eq!(grid.valid_count(), 4);
    }
}
