//! GeoTIFF and dispatch tests against real files on disk.

use erosivity_common::{GeoTransform, Nodata, RasterGrid};
use raster_io::{read_geotiff, read_raster, write_geotiff, write_points_csv, write_vrt_descriptor};
use test_utils::{
    ascii_grid_text, raster_from_values, sample_source_raster, temp_test_dir, write_text_file,
    PROJECTION,
};

// ============================================================================
// GeoTIFF
// ============================================================================

#[test]
fn test_geotiff_preserves_georeferencing_and_nodata() {
    let dir = temp_test_dir();
    let path = dir.path().join("Rain_201804.tif");
    let grid = sample_source_raster();

    write_geotiff(&path, &grid).unwrap();
    let read = read_geotiff(&path).unwrap();

    assert_eq!(read.rows(), 4);
    assert_eq!(read.cols(), 4);
    assert_eq!(read.geotransform(), grid.geotransform());
    assert_eq!(read.projection(), PROJECTION);
    assert_eq!(read.nodata(), Nodata::Sentinel(-9999.0));
    assert_eq!(read.data(), grid.data());
}

#[test]
fn test_geotiff_nan_convention() {
    let dir = temp_test_dir();
    let path = dir.path().join("nan.tif");
    let gt = GeoTransform::north_up(500_000.0, 4_600_000.0, 25.0, 25.0).unwrap();
    let grid = RasterGrid::new(vec![1.0, f32::NAN], 1, 2, gt, "EPSG:32634", Nodata::Nan).unwrap();

    write_geotiff(&path, &grid).unwrap();
    let read = read_geotiff(&path).unwrap();

    assert_eq!(read.nodata(), Nodata::Nan);
    assert_eq!(read.valid_count(), 1);
}

#[test]
fn test_geotiff_overwrite_replaces_previous_output() {
    let dir = temp_test_dir();
    let path = dir.path().join("RFactor_201804.tif");

    write_geotiff(&path, &raster_from_values(vec![1.0; 4], 2, 2, 0.0, 20.0, 10.0)).unwrap();
    write_geotiff(&path, &raster_from_values(vec![7.0; 4], 2, 2, 0.0, 20.0, 10.0)).unwrap();

    let read = read_geotiff(&path).unwrap();
    assert_eq!(read.data(), &[7.0; 4]);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

// ============================================================================
// read_raster dispatch and nodata normalisation
// ============================================================================

#[test]
fn test_read_raster_normalizes_ascii_nodata() {
    let dir = temp_test_dir();
    let text = ascii_grid_text(2, 2, 0.0, 0.0, 1000.0, -1.0, &[3.0, -1.0, 5.0, 6.0]);
    let path = write_text_file(dir.path(), "P_20180401.txt", &text);

    let grid = read_raster(&path, Nodata::Sentinel(-9999.0), PROJECTION).unwrap();
    assert_eq!(grid.nodata(), Nodata::Sentinel(-9999.0));
    assert_eq!(grid.data(), &[3.0, -9999.0, 5.0, 6.0]);
    assert_eq!(grid.projection(), PROJECTION);
}

#[test]
fn test_read_raster_rejects_unknown_extension() {
    let dir = temp_test_dir();
    let path = write_text_file(dir.path(), "grid.nc", "");
    assert!(read_raster(&path, Nodata::default(), PROJECTION).is_err());
}

// ============================================================================
// Point interchange
// ============================================================================

#[test]
fn test_points_csv_and_descriptor_written_side_by_side() {
    let dir = temp_test_dir();
    let csv = dir.path().join("points.csv");
    let cloud = vec![
        erosivity_common::SamplePoint::new(125.0, 875.0, 1.0),
        erosivity_common::SamplePoint::new(375.0, 875.0, 2.5),
    ]
    .into_iter()
    .collect();

    write_points_csv(&csv, &cloud).unwrap();
    let vrt = write_vrt_descriptor(&csv, PROJECTION).unwrap();

    let text = std::fs::read_to_string(&csv).unwrap();
    assert_eq!(text, "x,y,z\n125,875,1\n375,875,2.5\n");
    assert_eq!(vrt, dir.path().join("points.vrt"));
    assert!(std::fs::read_to_string(&vrt).unwrap().contains("points.csv"));
}
