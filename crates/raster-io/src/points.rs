//! Point interchange for external gridding tools.
//!
//! Samples are written as an `x,y,z` CSV with a header row. A companion OGR
//! virtual-layer descriptor binds the columns to a 2.5D point geometry so
//! `gdal_grid` can consume the CSV directly.

use std::io::Write;
use std::path::{Path, PathBuf};

use erosivity_common::{ErosivityError, PointCloud, Result};

use crate::persist_atomically;

/// Write samples as CSV with an `x,y,z` header.
pub fn write_points_csv(path: &Path, cloud: &PointCloud) -> Result<()> {
    persist_atomically(path, |file| {
        let mut writer = std::io::BufWriter::new(file);
        writeln!(writer, "x,y,z")?;
        for p in cloud.points() {
            writeln!(writer, "{},{},{}", p.x, p.y, p.z)?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Render the virtual-layer descriptor for a points CSV.
pub fn vrt_descriptor(csv_path: &Path, srs: &str) -> Result<String> {
    let file_name = csv_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            ErosivityError::configuration(format!(
                "points file {} has no usable name",
                csv_path.display()
            ))
        })?;
    let layer = csv_path
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);

    let mut xml = String::new();
    xml.push_str("<OGRVRTDataSource>\n");
    xml.push_str(&format!("  <OGRVRTLayer name=\"{}\">\n", layer));
    xml.push_str(&format!(
        "    <SrcDataSource relativeToVRT=\"1\">{}</SrcDataSource>\n",
        file_name
    ));
    xml.push_str(&format!("    <SrcLayer>{}</SrcLayer>\n", layer));
    xml.push_str("    <GeometryType>wkbPoint25D</GeometryType>\n");
    if !srs.is_empty() {
        xml.push_str(&format!("    <LayerSRS>{}</LayerSRS>\n", srs));
    }
    xml.push_str("    <GeometryField encoding=\"PointFromColumns\" x=\"x\" y=\"y\" z=\"z\"/>\n");
    xml.push_str("  </OGRVRTLayer>\n");
    xml.push_str("</OGRVRTDataSource>\n");
    Ok(xml)
}

/// Write the descriptor next to the CSV (same stem, `.vrt`) and return its path.
pub fn write_vrt_descriptor(csv_path: &Path, srs: &str) -> Result<PathBuf> {
    let xml = vrt_descriptor(csv_path, srs)?;
    let vrt_path = csv_path.with_extension("vrt");
    persist_atomically(&vrt_path, |file| {
        file.write_all(xml.as_bytes())?;
        Ok(())
    })?;
    Ok(vrt_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_binds_columns_and_srs() {
        let xml = vrt_descriptor(Path::new("/tmp/run/points_201804.csv"), "EPSG:32634").unwrap();
        assert!(xml.contains("<OGRVRTLayer name=\"points_201804\">"));
        assert!(xml.contains("relativeToVRT=\"1\">points_201804.csv</SrcDataSource>"));
        assert!(xml.contains("<LayerSRS>EPSG:32634</LayerSRS>"));
        assert!(xml.contains("x=\"x\" y=\"y\" z=\"z\""));
    }

    #[test]
    fn test_descriptor_without_srs() {
        let xml = vrt_descriptor(Path::new("points.csv"), "").unwrap();
        assert!(!xml.contains("LayerSRS"));
    }
}
