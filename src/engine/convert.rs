//! Conversions between `Shape` and `geo` geometries. Only X and Y survive.

use super::model::{Coords, Shape};
use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};

fn line_string(coords: &Coords) -> LineString<f64> {
    LineString::from(coords.iter_xy().collect::<Vec<(f64, f64)>>())
}

fn polygon(rings: &[Coords]) -> Polygon<f64> {
    match rings.split_first() {
        Some((shell, holes)) => Polygon::new(line_string(shell), holes.iter().map(line_string).collect()),
        None => Polygon::new(LineString::new(Vec::new()), Vec::new()),
    }
}

pub(crate) fn to_geo(shape: &Shape) -> Geometry<f64> {
    match shape {
        // geo has no empty point, an empty multipoint carries the same meaning
        Shape::Point(c) if c.is_empty() => Geometry::MultiPoint(MultiPoint(Vec::new())),
        Shape::Point(c) => {
            let (x, y) = c.xy(0);
            Geometry::Point(Point::new(x, y))
        }
        Shape::LineString(c) | Shape::LinearRing(c) => Geometry::LineString(line_string(c)),
        Shape::Polygon(rings) => Geometry::Polygon(polygon(rings)),
        Shape::MultiPoint(members) => Geometry::MultiPoint(MultiPoint(
            members
                .iter()
                .filter(|m| !m.is_empty())
                .filter_map(|m| match m {
                    Shape::Point(c) => {
                        let (x, y) = c.xy(0);
                        Some(Point::new(x, y))
                    }
                    _ => None,
                })
                .collect(),
        )),
        Shape::MultiLineString(members) => Geometry::MultiLineString(MultiLineString(
            members
                .iter()
                .filter_map(|m| match m {
                    Shape::LineString(c) | Shape::LinearRing(c) => Some(line_string(c)),
                    _ => None,
                })
                .collect(),
        )),
        Shape::MultiPolygon(members) => Geometry::MultiPolygon(MultiPolygon(
            members
                .iter()
                .filter_map(|m| match m {
                    Shape::Polygon(rings) => Some(polygon(rings)),
                    _ => None,
                })
                .collect(),
        )),
        Shape::GeometryCollection(members) => {
            Geometry::GeometryCollection(GeometryCollection(members.iter().map(to_geo).collect()))
        }
    }
}

fn coords_of(line: &LineString<f64>) -> Coords {
    Coords::from_xy(line.0.iter().map(|c| (c.x, c.y)))
}

fn polygon_rings(polygon: &Polygon<f64>) -> Vec<Coords> {
    if polygon.exterior().0.is_empty() {
        return Vec::new();
    }
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors().iter())
        .map(coords_of)
        .collect()
}

pub(crate) fn point_shape(c: Coord<f64>) -> Shape {
    Shape::Point(Coords::from_xy([(c.x, c.y)]))
}

pub(crate) fn from_geo(geometry: &Geometry<f64>) -> Shape {
    match geometry {
        Geometry::Point(p) => point_shape(p.0),
        Geometry::Line(l) => Shape::LineString(Coords::from_xy([l.start.x_y(), l.end.x_y()])),
        Geometry::LineString(l) => Shape::LineString(coords_of(l)),
        Geometry::Polygon(p) => Shape::Polygon(polygon_rings(p)),
        Geometry::MultiPoint(mp) => {
            Shape::MultiPoint(mp.0.iter().map(|p| point_shape(p.0)).collect())
        }
        Geometry::MultiLineString(ml) => Shape::MultiLineString(
            ml.0.iter().map(|l| Shape::LineString(coords_of(l))).collect(),
        ),
        Geometry::MultiPolygon(mp) => Shape::MultiPolygon(
            mp.0.iter().map(|p| Shape::Polygon(polygon_rings(p))).collect(),
        ),
        Geometry::GeometryCollection(gc) => {
            Shape::GeometryCollection(gc.0.iter().map(from_geo).collect())
        }
        Geometry::Rect(r) => Shape::Polygon(polygon_rings(&r.to_polygon())),
        Geometry::Triangle(t) => Shape::Polygon(polygon_rings(&t.to_polygon())),
    }
}

/// Collapse a multipolygon result to the narrowest type.
pub(crate) fn areal_result(mp: MultiPolygon<f64>) -> Shape {
    let mut polygons = mp.0;
    match polygons.len() {
        0 => Shape::Polygon(Vec::new()),
        1 => Shape::Polygon(polygon_rings(&polygons.remove(0))),
        _ => Shape::MultiPolygon(
            polygons
                .iter()
                .map(|p| Shape::Polygon(polygon_rings(p)))
                .collect(),
        ),
    }
}

/// Collapse a point set to the narrowest type.
pub(crate) fn puntal_result(points: Vec<Coord<f64>>) -> Shape {
    match points.len() {
        0 => Shape::Point(Coords::empty(2)),
        1 => point_shape(points[0]),
        _ => Shape::MultiPoint(points.into_iter().map(point_shape).collect()),
    }
}

/// Collapse a line set to the narrowest type.
pub(crate) fn lineal_result(lines: Vec<LineString<f64>>) -> Shape {
    match lines.len() {
        0 => Shape::LineString(Coords::empty(2)),
        1 => Shape::LineString(coords_of(&lines[0])),
        _ => Shape::MultiLineString(
            lines
                .iter()
                .map(|l| Shape::LineString(coords_of(l)))
                .collect(),
        ),
    }
}
