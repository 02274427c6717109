//! Watershed boundary polygons read from GeoJSON.
//!
//! Every polygonal member of the document is merged into one multipolygon.
//! Coordinates are taken as-is; the boundary must already be in the raster
//! projection.

use std::fs;
use std::path::Path;

use geo::{BoundingRect, Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use serde::Deserialize;
use tracing::debug;

use erosivity_common::{BoundingBox, ErosivityError, Result};

type Position = Vec<f64>;
type Ring = Vec<Position>;

/// GeoJSON objects accepted as a boundary.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonObject {
    FeatureCollection {
        features: Vec<GeoJsonObject>,
    },
    Feature {
        geometry: Option<Box<GeoJsonObject>>,
    },
    GeometryCollection {
        geometries: Vec<GeoJsonObject>,
    },
    Polygon {
        coordinates: Vec<Ring>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Ring>>,
    },
}

/// A clip boundary: one or more polygons with holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    shape: MultiPolygon<f64>,
    bounds: BoundingBox,
}

impl Boundary {
    /// Build a boundary from polygons. Fails when there are none.
    pub fn new(polygons: Vec<Polygon<f64>>) -> Result<Self> {
        let shape = MultiPolygon::new(polygons);
        let rect = shape.bounding_rect().ok_or_else(|| {
            ErosivityError::configuration("boundary contains no polygons")
        })?;
        let bounds = BoundingBox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y);
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return Err(ErosivityError::configuration(format!(
                "boundary has an empty footprint {}",
                bounds
            )));
        }
        Ok(Self { shape, bounds })
    }

    /// Axis-aligned rectangle as a boundary.
    pub fn from_bbox(bbox: &BoundingBox) -> Result<Self> {
        let ring = LineString::from(vec![
            (bbox.min_x, bbox.min_y),
            (bbox.max_x, bbox.min_y),
            (bbox.max_x, bbox.max_y),
            (bbox.min_x, bbox.max_y),
            (bbox.min_x, bbox.min_y),
        ]);
        Self::new(vec![Polygon::new(ring, vec![])])
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn polygon_count(&self) -> usize {
        self.shape.0.len()
    }

    /// Point-in-polygon test. Points exactly on an edge are outside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.bounds.contains_point(x, y) && self.shape.contains(&Point::new(x, y))
    }
}

fn ring_to_linestring(ring: &Ring, source: &str) -> Result<LineString<f64>> {
    let coords = ring
        .iter()
        .map(|pos| match pos.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(ErosivityError::configuration(format!(
                "{}: position with fewer than two coordinates",
                source
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    if coords.len() < 4 {
        return Err(ErosivityError::configuration(format!(
            "{}: polygon ring needs at least four positions, found {}",
            source,
            coords.len()
        )));
    }
    Ok(LineString::new(coords))
}

fn rings_to_polygon(rings: &[Ring], source: &str) -> Result<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first().ok_or_else(|| {
        ErosivityError::configuration(format!("{}: polygon without rings", source))
    })?;
    let interiors = interiors
        .iter()
        .map(|r| ring_to_linestring(r, source))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(ring_to_linestring(exterior, source)?, interiors))
}

fn collect_polygons(object: &GeoJsonObject, out: &mut Vec<Polygon<f64>>, source: &str) -> Result<()> {
    match object {
        GeoJsonObject::FeatureCollection { features } => {
            for feature in features {
                collect_polygons(feature, out, source)?;
            }
        }
        GeoJsonObject::Feature { geometry } => {
            if let Some(geometry) = geometry {
                collect_polygons(geometry, out, source)?;
            }
        }
        GeoJsonObject::GeometryCollection { geometries } => {
            for geometry in geometries {
                collect_polygons(geometry, out, source)?;
            }
        }
        GeoJsonObject::Polygon { coordinates } => out.push(rings_to_polygon(coordinates, source)?),
        GeoJsonObject::MultiPolygon { coordinates } => {
            for rings in coordinates {
                out.push(rings_to_polygon(rings, source)?);
            }
        }
    }
    Ok(())
}

/// Parse a GeoJSON document into a boundary.
pub fn parse_boundary(json: &str, source: &str) -> Result<Boundary> {
    let object: GeoJsonObject = serde_json::from_str(json).map_err(|e| {
        ErosivityError::configuration(format!("{}: not a polygonal GeoJSON document: {}", source, e))
    })?;

    let mut polygons = Vec::new();
    collect_polygons(&object, &mut polygons, source)?;
    let boundary = Boundary::new(polygons)?;

    debug!(
        source = %source,
        polygons = boundary.polygon_count(),
        bounds = %boundary.bounds(),
        "Parsed boundary"
    );
    Ok(boundary)
}

/// Read a GeoJSON boundary file.
pub fn read_boundary(path: &Path) -> Result<Boundary> {
    let json = fs::read_to_string(path).map_err(|e| {
        ErosivityError::configuration(format!("cannot read boundary {}: {}", path.display(), e))
    })?;
    parse_boundary(&json, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEFT_HALF: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"name": "basin"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0, 0], [1000, 0], [1000, 2000], [0, 2000], [0, 0]]]
            }
        }]
    }"#;

    #[test]
    fn test_feature_collection_polygon() {
        let boundary = parse_boundary(LEFT_HALF, "left_half").unwrap();
        assert_eq!(boundary.polygon_count(), 1);
        assert_eq!(boundary.bounds(), BoundingBox::new(0.0, 0.0, 1000.0, 2000.0));
        assert!(boundary.contains(250.0, 1750.0));
        assert!(!boundary.contains(1250.0, 1750.0));
    }

    #[test]
    fn test_multipolygon_with_hole() {
        let json = r#"{
            "type": "MultiPolygon",
            "coordinates": [
                [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]],
                 [[4, 4], [6, 4], [6, 6], [4, 6], [4, 4]]],
                [[[20, 0], [30, 0], [30, 10], [20, 10], [20, 0]]]
            ]
        }"#;
        let boundary = parse_boundary(json, "multi").unwrap();
        assert_eq!(boundary.polygon_count(), 2);
        assert!(boundary.contains(1.0, 1.0));
        assert!(!boundary.contains(5.0, 5.0));
        assert!(boundary.contains(25.0, 5.0));
        assert!(!boundary.contains(15.0, 5.0));
    }

    #[test]
    fn test_non_polygonal_geometry_is_rejected() {
        let json = r#"{"type": "Point", "coordinates": [1, 2]}"#;
        assert!(matches!(
            parse_boundary(json, "point"),
            Err(ErosivityError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_collection_is_rejected() {
        let json = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(parse_boundary(json, "empty").is_err());
    }
}
