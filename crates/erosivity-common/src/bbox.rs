//! Rectangular extents in map units.
//!
//! Raster extents are exchanged as `[minX, maxY, maxX, minY]`, the order
//! used by the extent strings handed to the gridding tools.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in projected coordinates (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// From `[minX, maxY, maxX, minY]`.
    pub fn from_extent([min_x, max_y, max_x, min_y]: [f64; 4]) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// As `[minX, maxY, maxX, minY]`.
    pub fn to_extent(&self) -> [f64; 4] {
        [self.min_x, self.max_y, self.max_x, self.min_y]
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Overlapping rectangle, or `None` when the two only share an edge or
    /// are disjoint.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let overlap = BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        (overlap.width() > 0.0 && overlap.height() > 0.0).then_some(overlap)
    }

    /// Closed containment: points on the edge are inside.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.to_extent();
        write!(f, "[{}, {}, {}, {}]", a, b, c, d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_order_round_trips() {
        let bbox = BoundingBox::from_extent([0.0, 2000.0, 1000.0, 0.0]);
        assert_eq!(bbox, BoundingBox::new(0.0, 0.0, 1000.0, 2000.0));
        assert_eq!(bbox.to_extent(), [0.0, 2000.0, 1000.0, 0.0]);
        assert_eq!(bbox.to_string(), "[0, 2000, 1000, 0]");
    }

    #[test]
    fn test_overlap_of_watershed_and_raster() {
        let raster = BoundingBox::new(0.0, 0.0, 2000.0, 2000.0);
        let watershed = BoundingBox::new(500.0, -300.0, 1200.0, 900.0);
        assert_eq!(
            raster.intersection(&watershed),
            Some(BoundingBox::new(500.0, 0.0, 1200.0, 900.0))
        );

        let far = BoundingBox::new(5000.0, 5000.0, 6000.0, 6000.0);
        assert!(raster.intersection(&far).is_none());
    }

    #[test]
    fn test_shared_edge_is_not_an_overlap() {
        let left = BoundingBox::new(0.0, 0.0, 1000.0, 1000.0);
        let right = BoundingBox::new(1000.0, 0.0, 2000.0, 1000.0);
        assert!(left.intersection(&right).is_none());
        assert!(left.contains_point(1000.0, 500.0));
    }
}
