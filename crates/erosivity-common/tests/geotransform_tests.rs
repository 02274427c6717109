//! Geotransform round-trip and extent tests.

use erosivity_common::{BoundingBox, GeoTransform};

// ============================================================================
// Extent round trips
// ============================================================================

#[test]
fn test_extent_round_trip_integer_cells() {
    let gt = GeoTransform::north_up(500_000.0, 4_600_000.0, 500.0, 500.0).unwrap();
    let extent = gt.extent_of(4, 4);
    let rebuilt = GeoTransform::from_extent(&extent, 500.0).unwrap();
    assert_eq!(rebuilt, gt);
}

#[test]
fn test_extent_round_trip_fractional_cells() {
    let gt = GeoTransform::north_up(7_512_345.125, 4_612_001.75, 30.5, 30.5).unwrap();
    let extent = gt.extent_of(123, 77);
    let rebuilt = GeoTransform::from_extent(&extent, 30.5).unwrap();
    assert_eq!(rebuilt.to_gdal(), gt.to_gdal());
    assert_eq!(rebuilt.extent_of(123, 77), extent);
}

#[test]
fn test_extent_from_ascii_header_matches_header_corners() {
    let gt = GeoTransform::from_ascii_header(10, 5, 7_400_000.0, 4_500_000.0, 1000.0).unwrap();
    let extent = gt.extent_of(10, 5);
    assert_eq!(
        extent,
        BoundingBox::new(7_400_000.0, 4_500_000.0, 7_410_000.0, 4_505_000.0)
    );
}

// ============================================================================
// Cell centres
// ============================================================================

#[test]
fn test_cell_centers_lie_inside_extent() {
    let gt = GeoTransform::north_up(0.0, 1000.0, 250.0, 250.0).unwrap();
    let extent = gt.extent_of(4, 4);
    for row in 0..4 {
        for col in 0..4 {
            let (x, y) = gt.cell_center(row, col);
            assert!(extent.contains_point(x, y));
        }
    }
}

#[test]
fn test_rejects_non_positive_cell_size() {
    assert!(GeoTransform::north_up(0.0, 0.0, 0.0, 10.0).is_err());
    assert!(GeoTransform::north_up(0.0, 0.0, 10.0, -10.0).is_err());
    assert!(GeoTransform::north_up(f64::NAN, 0.0, 10.0, 10.0).is_err());
    assert!(GeoTransform::from_ascii_header(0, 4, 0.0, 0.0, 10.0).is_err());
}
