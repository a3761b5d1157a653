//! Coordinates, NOTAM geometry, and the shape primitives handed to map backends

use geo::{BoundingRect, MultiPoint, Point};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const METERS_PER_NAUTICAL_MILE: f64 = 1852.0;

/// Meters per degree of latitude (mean)
const METERS_PER_DEGREE: f64 = 111_320.0;

/// WGS84 position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    fn to_point(self) -> Point<f64> {
        Point::new(self.lng, self.lat)
    }
}

/// Geographic area attached to a NOTAM
///
/// Unknown `type` tags deserialize to [`Geometry::Unknown`] so that a record with an
/// unsupported shape still loads; the shape itself is never drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    Circle {
        center: Coordinate,
        #[serde(rename = "radiusNm")]
        radius_nm: f64,
    },
    Polygon {
        vertices: Vec<Coordinate>,
    },
    Line {
        vertices: Vec<Coordinate>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("unknown geometry type")]
    UnknownType,
    #[error("{kind} needs at least {need} vertices, got {got}")]
    TooFewVertices {
        kind: &'static str,
        need: usize,
        got: usize,
    },
    #[error("invalid circle radius {0} NM")]
    InvalidRadius(f64),
    #[error("coordinate out of range: {0:?}")]
    InvalidCoordinate(Coordinate),
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Circle { .. } => "circle",
            Geometry::Polygon { .. } => "polygon",
            Geometry::Line { .. } => "line",
            Geometry::Unknown => "unknown",
        }
    }

    /// Convert to a drawable primitive, with distances in meters
    pub fn to_shape(&self) -> Result<ShapePrimitive, GeometryError> {
        match self {
            Geometry::Circle { center, radius_nm } => {
                if !radius_nm.is_finite() || *radius_nm <= 0.0 {
                    return Err(GeometryError::InvalidRadius(*radius_nm));
                }
                check_coordinates(std::slice::from_ref(center))?;
                Ok(ShapePrimitive::Circle {
                    center: *center,
                    radius_m: radius_nm * METERS_PER_NAUTICAL_MILE,
                })
            }
            Geometry::Polygon { vertices } => {
                check_vertex_count("polygon", vertices, 3)?;
                check_coordinates(vertices)?;
                Ok(ShapePrimitive::Polygon {
                    vertices: vertices.clone(),
                })
            }
            Geometry::Line { vertices } => {
                check_vertex_count("line", vertices, 2)?;
                check_coordinates(vertices)?;
                Ok(ShapePrimitive::Polyline {
                    vertices: vertices.clone(),
                })
            }
            Geometry::Unknown => Err(GeometryError::UnknownType),
        }
    }
}

fn check_vertex_count(kind: &'static str, vertices: &[Coordinate], need: usize) -> Result<(), GeometryError> {
    if vertices.len() < need {
        return Err(GeometryError::TooFewVertices {
            kind,
            need,
            got: vertices.len(),
        });
    }
    Ok(())
}

fn check_coordinates(coords: &[Coordinate]) -> Result<(), GeometryError> {
    match coords.iter().find(|c| !c.is_valid()) {
        Some(bad) => Err(GeometryError::InvalidCoordinate(*bad)),
        None => Ok(()),
    }
}

/// A shape in backend units (meters for distances)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum ShapePrimitive {
    Circle { center: Coordinate, radius_m: f64 },
    Polygon { vertices: Vec<Coordinate> },
    Polyline { vertices: Vec<Coordinate> },
    /// Marker cluster summary: centroid plus member count
    Cluster { center: Coordinate, count: usize },
}

impl ShapePrimitive {
    /// Bounding box of the drawn area
    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            ShapePrimitive::Circle { center, radius_m } => Some(Bounds::around(*center, *radius_m)),
            ShapePrimitive::Polygon { vertices } | ShapePrimitive::Polyline { vertices } => {
                Bounds::from_coordinates(vertices)
            }
            ShapePrimitive::Cluster { center, .. } => Bounds::from_coordinates(std::slice::from_ref(center)),
        }
    }
}

/// Axis-aligned lat/lng box
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    /// Smallest box containing all coordinates; `None` when empty
    pub fn from_coordinates(coords: &[Coordinate]) -> Option<Self> {
        let points: MultiPoint<f64> = coords.iter().map(|c| c.to_point()).collect();
        let rect = points.bounding_rect()?;
        Some(Self {
            south: rect.min().y,
            west: rect.min().x,
            north: rect.max().y,
            east: rect.max().x,
        })
    }

    /// Box enclosing a circle of `radius_m` meters around `center`
    pub fn around(center: Coordinate, radius_m: f64) -> Self {
        let dlat = radius_m / METERS_PER_DEGREE;
        let cos_lat = center.lat.to_radians().cos().abs().max(1e-6);
        let dlng = (dlat / cos_lat).min(180.0);
        Self {
            south: (center.lat - dlat).max(-90.0),
            west: (center.lng - dlng).max(-180.0),
            north: (center.lat + dlat).min(90.0),
            east: (center.lng + dlng).min(180.0),
        }
    }

    pub fn contains(&self, c: Coordinate) -> bool {
        c.lat >= self.south && c.lat <= self.north && c.lng >= self.west && c.lng <= self.east
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circle_radius_converted_to_meters() {
        let g = Geometry::Circle {
            center: Coordinate::new(40.64, -73.78),
            radius_nm: 5.0,
        };
        match g.to_shape().unwrap() {
            ShapePrimitive::Circle { radius_m, .. } => assert!((radius_m - 9260.0).abs() < 1e-9),
            other => panic!("unexpected shape {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_degenerate_geometry_rejected() {
        let unknown: Geometry = serde_json::from_str(r#"{"type": "ellipse", "foo": 1}"#).unwrap();
        assert_eq!(unknown, Geometry::Unknown);
        assert_eq!(unknown.to_shape(), Err(GeometryError::UnknownType));

        let line = Geometry::Line {
            vertices: vec![Coordinate::new(1.0, 1.0)],
        };
        assert!(matches!(line.to_shape(), Err(GeometryError::TooFewVertices { need: 2, got: 1, .. })));

        let circle = Geometry::Circle {
            center: Coordinate::new(0.0, 0.0),
            radius_nm: 0.0,
        };
        assert_eq!(circle.to_shape(), Err(GeometryError::InvalidRadius(0.0)));
    }

    #[test]
    fn test_geometry_deserializes_tagged() {
        let g: Geometry = serde_json::from_str(
            r#"{"type": "circle", "center": {"lat": 51.47, "lng": -0.4543}, "radiusNm": 2.0}"#,
        )
        .unwrap();
        assert_eq!(g.kind(), "circle");

        let p: Geometry = serde_json::from_str(
            r#"{"type": "polygon", "vertices": [{"lat": 0, "lng": 0}, {"lat": 1, "lng": 0}, {"lat": 1, "lng": 1}]}"#,
        )
        .unwrap();
        let bounds = p.to_shape().unwrap().bounds().unwrap();
        assert_eq!(bounds.south, 0.0);
        assert_eq!(bounds.north, 1.0);
        assert_eq!(bounds.east, 1.0);
    }

    #[test]
    fn test_bounds() {
        assert!(Bounds::from_coordinates(&[]).is_none());
        let b = Bounds::from_coordinates(&[Coordinate::new(40.0, -74.0), Coordinate::new(51.0, 0.0)]).unwrap();
        assert!(b.contains(Coordinate::new(45.0, -30.0)));
        assert!(!b.contains(Coordinate::new(35.0, -30.0)));

        let around = Bounds::around(Coordinate::new(0.0, 0.0), 111_320.0);
        assert!((around.north - 1.0).abs() < 1e-9);
        assert!((around.east - 1.0).abs() < 1e-9);
    }
}
