//! Point samples taken from raster cells.

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;

/// One `(x, y, z)` sample in map units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Ordered collection of samples. Order is preserved end to end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<SamplePoint>,
}

impl PointCloud {
    pub fn new(points: Vec<SamplePoint>) -> Self {
        Self { points }
    }

    pub fn push(&mut self, point: SamplePoint) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[SamplePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding box of all samples, `None` when empty.
    pub fn bounds(&self) -> Option<BoundingBox> {
        let first = self.points.first()?;
        let init = BoundingBox::new(first.x, first.y, first.x, first.y);
        Some(self.points.iter().fold(init, |b, p| {
            BoundingBox::new(b.min_x.min(p.x), b.min_y.min(p.y), b.max_x.max(p.x), b.max_y.max(p.y))
        }))
    }
}

impl FromIterator<SamplePoint> for PointCloud {
    fn from_iter<I: IntoIterator<Item = SamplePoint>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let cloud: PointCloud = vec![
            SamplePoint::new(10.0, 5.0, 1.0),
            SamplePoint::new(-2.0, 8.0, 2.0),
            SamplePoint::new(4.0, -1.0, 3.0),
        ]
        .into_iter()
        .collect();

        assert_eq!(cloud.bounds(), Some(BoundingBox::new(-2.0, -1.0, 10.0, 8.0)));
        assert_eq!(PointCloud::default().bounds(), None);
    }
}
