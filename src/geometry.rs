//! Boundary polygons and point containment

use crate::types::{BoundingBox, GeoPoint};
use geo::{Area, BoundingRect, Contains, Coord, LineString, Point};
use serde::{Deserialize, Serialize};

/// Polygon with one exterior ring and optional holes, backed by `geo`.
///
/// Rings may be given open or closed. Serialised as lon/lat rings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PolygonRings", into = "PolygonRings")]
pub struct Polygon {
    inner: geo::Polygon<f64>,
}

/// On-disk shape of a polygon
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PolygonRings {
    exterior: Vec<GeoPoint>,
    #[serde(default)]
    holes: Vec<Vec<GeoPoint>>,
}

fn ring(points: &[GeoPoint]) -> LineString<f64> {
    points
        .iter()
        .map(|p| Coord { x: p.lon, y: p.lat })
        .collect()
}

fn points(ring: &LineString<f64>) -> Vec<GeoPoint> {
    ring.coords().map(|c| GeoPoint::new(c.x, c.y)).collect()
}

impl From<PolygonRings> for Polygon {
    fn from(rings: PolygonRings) -> Self {
        Self {
            inner: geo::Polygon::new(
                ring(&rings.exterior),
                rings.holes.iter().map(|h| ring(h)).collect(),
            ),
        }
    }
}

impl From<Polygon> for PolygonRings {
    fn from(polygon: Polygon) -> Self {
        Self {
            exterior: points(polygon.inner.exterior()),
            holes: polygon.inner.interiors().iter().map(points).collect(),
        }
    }
}

impl Polygon {
    pub fn new(exterior: Vec<GeoPoint>) -> Self {
        Self {
            inner: geo::Polygon::new(ring(&exterior), Vec::new()),
        }
    }

    /// Axis-aligned rectangle
    pub fn rectangle(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::new(vec![
            GeoPoint::new(min_lon, min_lat),
            GeoPoint::new(max_lon, min_lat),
            GeoPoint::new(max_lon, max_lat),
            GeoPoint::new(min_lon, max_lat),
        ])
    }

    pub fn with_hole(mut self, hole: Vec<GeoPoint>) -> Self {
        self.inner.interiors_push(ring(&hole));
        self
    }

    pub fn as_geo(&self) -> &geo::Polygon<f64> {
        &self.inner
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.inner.bounding_rect().map(|rect| BoundingBox {
            min_lon: rect.min().x,
            max_lon: rect.max().x,
            min_lat: rect.min().y,
            max_lat: rect.max().y,
        })
    }

    /// Interior containment; points in a hole or on the boundary are outside.
    pub fn contains(&self, point: GeoPoint) -> bool {
        self.inner.contains(&Point::new(point.lon, point.lat))
    }

    /// Planar area, exterior minus holes
    pub fn area(&self) -> f64 {
        self.inner.unsigned_area()
    }
}

impl From<geo::Polygon<f64>> for Polygon {
    fn from(inner: geo::Polygon<f64>) -> Self {
        Self { inner }
    }
}

/// A named administrative or spatial unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub polygon: Polygon,
}

impl Region {
    pub fn new(name: impl Into<String>, polygon: Polygon) -> Self {
        Self {
            name: name.into(),
            polygon,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        self.polygon.contains(point)
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.polygon.bounding_box()
    }
}
