//! Buffer construction and buffer parameter objects.

use super::convert::{self, areal_result};
use super::model::Shape;
use super::ops::non_empty;
use super::{Engine, GeomId, ParamsId};
use geo::algorithm::buffer::{BufferStyle as GeoBufferStyle, LineCap, LineJoin};
use geo::{Buffer, Coord, Geometry, Line, LineString, MultiPolygon, Polygon, unary_union};
use std::f64::consts::{FRAC_PI_2, PI};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BufferStyle {
    /// 1 round, 2 flat, 3 square
    pub(crate) end_cap: i32,
    /// 1 round, 2 mitre, 3 bevel
    pub(crate) join: i32,
    pub(crate) mitre_limit: f64,
    pub(crate) quadrant_segments: i32,
    pub(crate) single_sided: bool,
}

impl Default for BufferStyle {
    fn default() -> Self {
        Self {
            end_cap: 1,
            join: 1,
            mitre_limit: 5.0,
            quadrant_segments: 8,
            single_sided: false,
        }
    }
}

pub(crate) struct ParamsNode {
    pub(crate) style: BufferStyle,
}

const ROUND: i32 = 1;
const FLAT: i32 = 2;
const SQUARE: i32 = 3;
const MITRE: i32 = 2;
const BEVEL: i32 = 3;

/// Sharpest corner a mitre join covers before it is cut off. A mitre
/// reaches `1 / sin(angle / 2)` times the buffer distance from its vertex.
fn mitre_angle(limit: f64) -> f64 {
    if limit <= 1.0 {
        PI
    } else {
        2.0 * (1.0 / limit).asin()
    }
}

fn geo_style(width: f64, style: &BufferStyle) -> GeoBufferStyle<f64> {
    let step = FRAC_PI_2 / f64::from(style.quadrant_segments.max(1));
    let cap = match style.end_cap {
        FLAT => LineCap::Butt,
        SQUARE => LineCap::Square,
        _ => LineCap::Round(step),
    };
    let join = match style.join {
        MITRE => LineJoin::Miter(mitre_angle(style.mitre_limit)),
        BEVEL => LineJoin::Bevel,
        _ => LineJoin::Round(step),
    };
    GeoBufferStyle::new(width).line_cap(cap).line_join(join)
}

fn collect_polygons(g: &Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match g {
        Geometry::Polygon(p) => out.push(p.clone()),
        Geometry::MultiPolygon(mp) => out.extend(mp.0.iter().cloned()),
        Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|m| collect_polygons(m, out)),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::Triangle(t) => out.push(t.to_polygon()),
        _ => {}
    }
}

fn collect_lines(g: &Geometry<f64>, out: &mut Vec<LineString<f64>>) -> bool {
    match g {
        Geometry::LineString(l) => out.push(l.clone()),
        Geometry::MultiLineString(ml) => out.extend(ml.0.iter().cloned()),
        Geometry::Line(l) => out.push(LineString::new(vec![l.start, l.end])),
        _ => return false,
    }
    true
}

/// One-sided buffer of lines: left of each line for a positive width, right
/// for a negative one. Outer corners are bevelled.
fn single_sided(lines: &[LineString<f64>], width: f64) -> MultiPolygon<f64> {
    let mut pieces = Vec::new();
    for line in lines {
        let segments: Vec<Line<f64>> = line.lines().filter(|s| s.start != s.end).collect();
        let normals: Vec<Coord<f64>> = segments
            .iter()
            .map(|s| {
                let d = s.delta();
                let length = d.x.hypot(d.y);
                Coord {
                    x: -d.y / length * width,
                    y: d.x / length * width,
                }
            })
            .collect();
        for (s, n) in segments.iter().zip(&normals) {
            pieces.push(Polygon::new(
                LineString::new(vec![s.start, s.end, s.end + *n, s.start + *n, s.start]),
                Vec::new(),
            ));
        }
        for (pair, n) in segments.windows(2).zip(normals.windows(2)) {
            let (d1, d2) = (pair[0].delta(), pair[1].delta());
            let turn = d1.x * d2.y - d1.y * d2.x;
            // the gap opens on the side the line turns away from
            if turn * width < 0.0 {
                let v = pair[1].start;
                pieces.push(Polygon::new(
                    LineString::new(vec![v, v + n[0], v + n[1], v]),
                    Vec::new(),
                ));
            }
        }
    }
    unary_union(&pieces)
}

/// Buffer a detached geometry.
pub(crate) fn buffer(shape: &Shape, width: f64, style: &BufferStyle) -> Result<Shape, String> {
    if !width.is_finite() {
        return Err("IllegalArgumentException: buffer distance must be finite".into());
    }
    let Some(g) = non_empty(&convert::to_geo(shape)) else {
        return Ok(Shape::Polygon(Vec::new()));
    };
    let mut lines = Vec::new();
    let result = if width == 0.0 {
        let mut polygons = Vec::new();
        collect_polygons(&g, &mut polygons);
        unary_union(&polygons)
    } else if style.single_sided && collect_lines(&g, &mut lines) {
        single_sided(&lines, width)
    } else {
        g.buffer_with_style(geo_style(width, style))
    };
    Ok(areal_result(result))
}

impl Engine {
    pub(crate) fn create_buffer_params(&mut self) -> ParamsId {
        ParamsId(self.params.insert(ParamsNode {
            style: BufferStyle::default(),
        }))
    }

    pub(crate) fn destroy_buffer_params(&mut self, params: ParamsId) -> bool {
        if self.params.remove(params.0).is_some() {
            return true;
        }
        self.report("IllegalArgumentException: unknown buffer parameters handle");
        false
    }

    /// Apply `update` after `valid` accepted the new value.
    fn update_style(
        &mut self,
        params: ParamsId,
        valid: bool,
        message: &str,
        update: impl FnOnce(&mut BufferStyle),
    ) -> bool {
        if !valid {
            self.report(message);
            return false;
        }
        match self.params.get_mut(params.0) {
            Some(node) => {
                update(&mut node.style);
                true
            }
            None => {
                self.report("IllegalArgumentException: unknown buffer parameters handle");
                false
            }
        }
    }

    pub(crate) fn params_set_end_cap_style(&mut self, params: ParamsId, style: i32) -> bool {
        self.update_style(
            params,
            (ROUND..=SQUARE).contains(&style),
            "IllegalArgumentException: Invalid buffer endCap style",
            |s| s.end_cap = style,
        )
    }

    pub(crate) fn params_set_join_style(&mut self, params: ParamsId, style: i32) -> bool {
        self.update_style(
            params,
            (ROUND..=BEVEL).contains(&style),
            "IllegalArgumentException: Invalid buffer join style",
            |s| s.join = style,
        )
    }

    pub(crate) fn params_set_mitre_limit(&mut self, params: ParamsId, limit: f64) -> bool {
        self.update_style(
            params,
            limit > 0.0,
            "IllegalArgumentException: mitre limit must be positive",
            |s| s.mitre_limit = limit,
        )
    }

    pub(crate) fn params_set_quadrant_segments(&mut self, params: ParamsId, segments: i32) -> bool {
        self.update_style(params, true, "", |s| s.quadrant_segments = segments)
    }

    pub(crate) fn params_set_single_sided(&mut self, params: ParamsId, single_sided: bool) -> bool {
        self.update_style(params, true, "", |s| s.single_sided = single_sided)
    }

    pub(crate) fn buffer(&mut self, id: GeomId, width: f64, quadrant_segments: i32) -> Option<GeomId> {
        let style = BufferStyle {
            quadrant_segments,
            ..BufferStyle::default()
        };
        self.buffer_with_style(id, width, style)
    }

    pub(crate) fn buffer_with_params(
        &mut self,
        id: GeomId,
        params: ParamsId,
        width: f64,
    ) -> Option<GeomId> {
        let style = match self.params.get(params.0) {
            Some(node) => node.style,
            None => return self.fail("IllegalArgumentException: unknown buffer parameters handle"),
        };
        self.buffer_with_style(id, width, style)
    }

    fn buffer_with_style(&mut self, id: GeomId, width: f64, style: BufferStyle) -> Option<GeomId> {
        let shape = self.export(id)?;
        let srid = self.node(id)?.srid;
        match buffer(&shape, width, &style) {
            Ok(result) => self.create_geom(&result, srid),
            Err(message) => self.fail(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::Coords;
    use geo::Area;

    fn area(shape: &Shape) -> f64 {
        convert::to_geo(shape).unsigned_area()
    }

    #[test]
    fn test_point_buffer_approximates_circle() {
        let point = Shape::Point(Coords::from_xy([(0.0, 0.0)]));
        let result = buffer(&point, 1.0, &BufferStyle::default()).unwrap();
        let a = area(&result);
        assert!(a > 3.0 && a < PI);
        match result {
            Shape::Polygon(rings) => assert_eq!(rings[0].len(), 33),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_square_cap_point() {
        let point = Shape::Point(Coords::from_xy([(0.0, 0.0)]));
        let style = BufferStyle {
            end_cap: SQUARE,
            ..BufferStyle::default()
        };
        let result = buffer(&point, 1.0, &style).unwrap();
        assert!((area(&result) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_line_buffer_is_rectangle() {
        let line = Shape::LineString(Coords::from_xy([(0.0, 0.0), (10.0, 0.0)]));
        let style = BufferStyle {
            end_cap: FLAT,
            ..BufferStyle::default()
        };
        let result = buffer(&line, 1.0, &style).unwrap();
        assert!((area(&result) - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_sided_line_buffer() {
        let line = Shape::LineString(Coords::from_xy([(0.0, 0.0), (10.0, 0.0)]));
        let style = BufferStyle {
            single_sided: true,
            ..BufferStyle::default()
        };
        let left = buffer(&line, 1.0, &style).unwrap();
        assert!((area(&left) - 10.0).abs() < 1e-9);
        let bounds = crate::engine::ops::shape_bounds(&left);
        assert_eq!(bounds[1], 0.0);
        assert_eq!(bounds[3], 1.0);
    }

    #[test]
    fn test_polygon_shrinks_with_negative_width() {
        let square = Shape::Polygon(vec![Coords::from_xy([
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
            (0.0, 0.0),
        ])]);
        let shrunk = buffer(&square, -1.0, &BufferStyle::default()).unwrap();
        assert!((area(&shrunk) - 64.0).abs() < 1e-3);
        let grown = buffer(&square, 1.0, &BufferStyle::default()).unwrap();
        assert!(area(&grown) > 139.0 && area(&grown) < 100.0 + 40.0 + PI);
    }

    #[test]
    fn test_negative_width_on_line_is_empty() {
        let line = Shape::LineString(Coords::from_xy([(0.0, 0.0), (1.0, 0.0)]));
        let result = buffer(&line, -1.0, &BufferStyle::default()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_empty_inputs_buffer_to_empty_polygon() {
        let empties = [
            Shape::empty(crate::types::GeometryTypeId::Point),
            Shape::empty(crate::types::GeometryTypeId::LineString),
            Shape::empty(crate::types::GeometryTypeId::Polygon),
            Shape::GeometryCollection(Vec::new()),
        ];
        for shape in &empties {
            for width in [1.0, 0.0, -1.0] {
                let result = buffer(shape, width, &BufferStyle::default()).unwrap();
                assert_eq!(result, Shape::Polygon(Vec::new()));
            }
        }
    }

    #[test]
    fn test_empty_member_is_skipped() {
        let lines = Shape::MultiLineString(vec![
            Shape::LineString(Coords::empty(2)),
            Shape::LineString(Coords::from_xy([(0.0, 0.0), (1.0, 0.0)])),
        ]);
        let style = BufferStyle {
            end_cap: FLAT,
            ..BufferStyle::default()
        };
        let result = buffer(&lines, 1.0, &style).unwrap();
        assert!((area(&result) - 2.0).abs() < 1e-6);
        let single = BufferStyle {
            single_sided: true,
            ..BufferStyle::default()
        };
        let left = buffer(&lines, 1.0, &single).unwrap();
        assert!((area(&left) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_mitre_angle() {
        assert_eq!(mitre_angle(0.5), PI);
        assert!((mitre_angle(2.0) - PI / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_params_validation() {
        let mut engine = Engine::init();
        let params = engine.create_buffer_params();
        assert!(!engine.params_set_mitre_limit(params, 0.0));
        assert!(!engine.params_set_end_cap_style(params, 7));
        assert!(engine.params_set_join_style(params, MITRE));
        assert!(engine.destroy_buffer_params(params));
        assert_eq!(engine.stats().buffer_params, 0);
    }
}
