//! Common test fixtures for pipeline tests.

use erosivity_common::GeoTransform;

/// Projection used by all synthetic rasters.
pub const PROJECTION: &str = "EPSG:32634";

/// Snap grid of the end-to-end case: 2000 m x 2000 m at 500 m cells.
pub fn snap_geotransform() -> GeoTransform {
    GeoTransform::north_up(0.0, 2000.0, 500.0, 500.0).expect("valid snap geotransform")
}

/// GeoJSON polygon covering the left half of the snap grid.
pub const LEFT_HALF_BOUNDARY: &str = r#"{
  "type": "FeatureCollection",
  "features": [{
    "type": "Feature",
    "properties": {"name": "left half"},
    "geometry": {
      "type": "Polygon",
      "coordinates": [[[0, 0], [1000, 0], [1000, 2000], [0, 2000], [0, 0]]]
    }
  }]
}"#;

/// File names `{prefix}_{YYYYMM}.{ext}` for `count` consecutive months.
pub fn monthly_file_names(prefix: &str, year: i32, month: u32, count: usize, ext: &str) -> Vec<String> {
    (0..count)
        .map(|i| {
            let offset = (month - 1) as usize + i;
            let y = year + (offset / 12) as i32;
            let m = (offset % 12) + 1;
            format!("{}_{:04}{:02}.{}", prefix, y, m, ext)
        })
        .collect()
}

/// File names `{prefix}_{YYYYMMDD}.{ext}` for every day of one month.
pub fn daily_file_names(prefix: &str, year: i32, month: u32, days: u32, ext: &str) -> Vec<String> {
    (1..=days)
        .map(|d| format!("{}_{:04}{:02}{:02}.{}", prefix, year, month, d, ext))
        .collect()
}
