//! Planar road geometries and bounding boxes.
//!
//! All coordinates are in the single working projection of the elevation
//! coverage (a metric CRS such as ETRS89 / UTM 32N), so lengths and sample
//! distances are plain Euclidean distances in metres.

use geo::{
    BoundingRect, Coord, Distance, Euclidean, InterpolatePoint, Length, LineString,
    MultiLineString, Point, Rect,
};
use serde::{Deserialize, Serialize, Serializer};
use wkt::{ToWkt, TryFromWkt};

use crate::error::{HillError, Result};

/// An axis-aligned rectangle in projected coordinates.
///
/// Field order follows the store's spatial index: `(min_x, max_x, min_y, max_y)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Western boundary.
    pub min_x: f64,
    /// Eastern boundary.
    pub max_x: f64,
    /// Southern boundary.
    pub min_y: f64,
    /// Northern boundary.
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a bounding box from its four edges.
    ///
    /// Edges given in the wrong order are swapped.
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            max_x: max_x.max(min_x),
            min_y: min_y.min(max_y),
            max_y: max_y.max(min_y),
        }
    }

    /// Check whether two boxes share at least one point (edges included).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Check whether `other` lies entirely inside this box.
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.min_x
            && self.max_x >= other.max_x
            && self.min_y <= other.min_y
            && self.max_y >= other.max_y
    }

    /// Check whether a point lies inside this box (edges included).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }

    /// Smallest box covering both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self {
            min_x: rect.min().x,
            max_x: rect.max().x,
            min_y: rect.min().y,
            max_y: rect.max().y,
        }
    }
}

/// A road's line geometry: either one line or several disjoint parts.
#[derive(Debug, Clone, PartialEq)]
pub enum RoadGeometry {
    Line(LineString<f64>),
    MultiLine(MultiLineString<f64>),
}

impl RoadGeometry {
    /// The independent parts of this geometry, in order.
    pub fn parts(&self) -> &[LineString<f64>] {
        match self {
            RoadGeometry::Line(line) => std::slice::from_ref(line),
            RoadGeometry::MultiLine(multi) => &multi.0,
        }
    }

    /// Whether the geometry has more than one part.
    pub fn is_multi_part(&self) -> bool {
        self.parts().len() > 1
    }

    /// Total length of all parts in CRS units.
    pub fn length(&self) -> f64 {
        match self {
            RoadGeometry::Line(line) => line.length::<Euclidean>(),
            RoadGeometry::MultiLine(multi) => multi.length::<Euclidean>(),
        }
    }

    /// Bounding box of all parts, or `None` for an empty geometry.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let rect = match self {
            RoadGeometry::Line(line) => line.bounding_rect(),
            RoadGeometry::MultiLine(multi) => multi.bounding_rect(),
        };
        rect.map(BoundingBox::from)
    }

    /// Reject empty geometries and geometries with zero total length.
    pub fn validate(&self) -> Result<()> {
        if self.parts().iter().all(|part| part.0.len() < 2) {
            return Err(HillError::GeometryInvalid {
                reason: "line has fewer than two vertices".to_string(),
            });
        }
        if self.length() <= 0.0 {
            return Err(HillError::GeometryInvalid {
                reason: "line has zero length".to_string(),
            });
        }
        Ok(())
    }

    /// Well-known text representation, e.g. `LINESTRING(0 0,10 0)`.
    pub fn to_wkt(&self) -> String {
        match self {
            RoadGeometry::Line(line) => line.wkt_string(),
            RoadGeometry::MultiLine(multi) => multi.wkt_string(),
        }
    }

    /// Parse a `LINESTRING` or `MULTILINESTRING` from well-known text.
    pub fn from_wkt(text: &str) -> Result<Self> {
        let geometry =
            geo::Geometry::<f64>::try_from_wkt_str(text).map_err(|e| HillError::GeometryInvalid {
                reason: format!("unreadable WKT: {}", e),
            })?;
        Self::try_from(geometry)
    }

    /// Convert to a GeoJSON geometry.
    pub fn to_geojson(&self) -> geojson::Geometry {
        let value = match self {
            RoadGeometry::Line(line) => geojson::Value::from(line),
            RoadGeometry::MultiLine(multi) => geojson::Value::from(multi),
        };
        geojson::Geometry::new(value)
    }

    /// Convert from a GeoJSON geometry, rejecting anything but line types.
    pub fn from_geojson(geometry: geojson::Geometry) -> Result<Self> {
        let geometry = geo::Geometry::<f64>::try_from(geometry.value)?;
        Self::try_from(geometry)
    }
}

/// Serializes as a GeoJSON geometry object.
impl Serialize for RoadGeometry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_geojson().serialize(serializer)
    }
}

impl TryFrom<geo::Geometry<f64>> for RoadGeometry {
    type Error = HillError;

    fn try_from(geometry: geo::Geometry<f64>) -> Result<Self> {
        match geometry {
            geo::Geometry::LineString(line) => Ok(RoadGeometry::Line(line)),
            geo::Geometry::MultiLineString(multi) => Ok(RoadGeometry::MultiLine(multi)),
            geo::Geometry::Line(line) => Ok(RoadGeometry::Line(LineString::from(vec![
                line.start, line.end,
            ]))),
            other => Err(HillError::GeometryInvalid {
                reason: format!("unsupported geometry type {}", geometry_type_name(&other)),
            }),
        }
    }
}

fn geometry_type_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

/// Euclidean length of a line string.
pub fn line_length(line: &LineString<f64>) -> f64 {
    line.length::<Euclidean>()
}

/// Locate the point `distance` units along `line`.
///
/// Distances beyond either end are clamped to the end points. Returns `None`
/// for an empty line.
pub fn point_at_distance(line: &LineString<f64>, distance: f64) -> Option<Coord<f64>> {
    let first = *line.0.first()?;
    if distance <= 0.0 {
        return Some(first);
    }

    let mut travelled = 0.0;
    for segment in line.lines() {
        let (start, end) = (Point::from(segment.start), Point::from(segment.end));
        let seg_len = Euclidean::distance(start, end);
        if seg_len > 0.0 && travelled + seg_len >= distance {
            return Some(Euclidean::point_at_distance_between(start, end, distance - travelled).0);
        }
        travelled += seg_len;
    }

    line.0.last().copied()
}
