//! Geometric operations: predicates, measures, overlay and derivations.

use super::convert::{self, areal_result, lineal_result, point_shape, puntal_result};
use super::model::{Coords, NodeKind, Shape, compare_shapes, compare_xy};
use super::{Engine, GeomId};
use crate::types::GeometryTypeId;
use geo::algorithm::kernels::{Kernel, Orientation, RobustKernel};
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::algorithm::sweep::{Cross, Intersections};
use geo::{
    Area, BooleanOps, Centroid, Closest, ClosestPoint, Contains, ConvexHull, Coord, CoordsIter,
    Densify, Distance, Euclidean, Geometry, GeometryCollection, InteriorPoint, Intersects, Line,
    LineString, LinesIter, MultiLineString, MultiPolygon, Point, Polygon, Relate, Validation,
};
use std::cmp::Ordering;

/// Upper bound on the vertices of a densified geometry.
const MAX_DENSIFIED_VERTICES: f64 = 10_000_000.0;

/// Named spatial predicates evaluated through the DE-9IM matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Predicate {
    Contains,
    CoveredBy,
    Covers,
    Crosses,
    Disjoint,
    Equals,
    Intersects,
    Overlaps,
    Touches,
    Within,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Overlay {
    Intersection,
    Union,
    Difference,
    SymDifference,
}

pub(crate) fn predicate(a: &Geometry<f64>, b: &Geometry<f64>, predicate: Predicate) -> bool {
    if predicate == Predicate::Equals && is_empty_geo(a) && is_empty_geo(b) {
        return true;
    }
    let im = a.relate(b);
    match predicate {
        Predicate::Contains => im.is_contains(),
        Predicate::CoveredBy => im.is_coveredby(),
        Predicate::Covers => im.is_covers(),
        Predicate::Crosses => im.is_crosses(),
        Predicate::Disjoint => im.is_disjoint(),
        Predicate::Equals => im.is_equal_topo(),
        Predicate::Intersects => im.is_intersects(),
        Predicate::Overlaps => im.is_overlaps(),
        Predicate::Touches => im.is_touches(),
        Predicate::Within => im.is_within(),
    }
}

fn is_empty_geo(g: &Geometry<f64>) -> bool {
    g.coords_iter().next().is_none()
}

/// The DE-9IM matrix of `a` and `b` as a nine character string.
pub(crate) fn de9im(a: &Geometry<f64>, b: &Geometry<f64>) -> String {
    let im = a.relate(b);
    (0..9)
        .map(|cell| {
            ['2', '1', '0']
                .into_iter()
                .find(|dim| {
                    let pattern: String = (0..9).map(|i| if i == cell { *dim } else { '*' }).collect();
                    im.matches(&pattern).unwrap_or(false)
                })
                .unwrap_or('F')
        })
        .collect()
}

fn is_pattern(pattern: &str) -> bool {
    pattern.len() == 9
        && pattern
            .chars()
            .all(|c| matches!(c, 'T' | 'F' | '*' | '0' | '1' | '2' | 't' | 'f'))
}

/// Match a DE-9IM matrix string against a pattern.
pub(crate) fn pattern_matches(matrix: &str, pattern: &str) -> bool {
    matrix.chars().zip(pattern.chars()).all(|(m, p)| match p {
        '*' => true,
        'T' | 't' => m != 'F',
        'F' | 'f' => m == 'F',
        _ => m == p,
    })
}

pub(crate) fn signed_area(coords: &Coords) -> f64 {
    let points: Vec<(f64, f64)> = coords.iter_xy().collect();
    let twice: f64 = points
        .windows(2)
        .map(|w| w[0].0 * w[1].1 - w[1].0 * w[0].1)
        .sum();
    twice / 2.0
}

fn shape_length(shape: &Shape) -> f64 {
    fn run(c: &Coords) -> f64 {
        let points: Vec<(f64, f64)> = c.iter_xy().collect();
        points
            .windows(2)
            .map(|w| (w[1].0 - w[0].0).hypot(w[1].1 - w[0].1))
            .sum()
    }
    match shape {
        Shape::Point(_) | Shape::MultiPoint(_) => 0.0,
        Shape::LineString(c) | Shape::LinearRing(c) => run(c),
        Shape::Polygon(rings) => rings.iter().map(run).sum(),
        _ => shape.members().iter().map(shape_length).sum(),
    }
}

/// Bounds as `[min_x, min_y, max_x, max_y]`, inverted infinities when empty.
pub(crate) fn shape_bounds(shape: &Shape) -> [f64; 4] {
    let mut b = [
        f64::INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::NEG_INFINITY,
    ];
    shape.visit_coords(&mut |c| {
        for (x, y) in c.iter_xy() {
            b[0] = b[0].min(x);
            b[1] = b[1].min(y);
            b[2] = b[2].max(x);
            b[3] = b[3].max(y);
        }
    });
    b
}

/// Geometry covering a bounding box: empty point, point or rectangle.
pub(crate) fn bounds_shape(b: [f64; 4]) -> Shape {
    let [min_x, min_y, max_x, max_y] = b;
    if min_x > max_x || min_y > max_y {
        return Shape::Point(Coords::empty(2));
    }
    if min_x == max_x && min_y == max_y {
        return Shape::Point(Coords::from_xy([(min_x, min_y)]));
    }
    Shape::Polygon(vec![Coords::from_xy([
        (min_x, min_y),
        (max_x, min_y),
        (max_x, max_y),
        (min_x, max_y),
        (min_x, min_y),
    ])])
}

fn convex_hull(g: &Geometry<f64>) -> Shape {
    let mut coords: Vec<Coord<f64>> = g.coords_iter().collect();
    coords.sort_by(|a, b| compare_xy(a.x_y(), b.x_y()));
    coords.dedup();
    match coords.len() {
        0 => Shape::GeometryCollection(Vec::new()),
        1 => point_shape(coords[0]),
        _ => {
            let (first, last) = (coords[0], coords[coords.len() - 1]);
            let collinear = coords
                .iter()
                .all(|c| RobustKernel::orient2d(first, last, *c) == Orientation::Collinear);
            if collinear {
                Shape::LineString(Coords::from_xy([first.x_y(), last.x_y()]))
            } else {
                convert::from_geo(&Geometry::Polygon(g.convex_hull()))
            }
        }
    }
}

/// Vertices a densified copy would hold.
fn densified_size(shape: &Shape, tolerance: f64) -> f64 {
    let mut total = 0.0;
    shape.visit_coords(&mut |c| {
        let points: Vec<(f64, f64)> = c.iter_xy().collect();
        if points.is_empty() {
            return;
        }
        total += 1.0;
        total += points
            .windows(2)
            .map(|w| ((w[1].0 - w[0].0).hypot(w[1].1 - w[0].1) / tolerance).ceil().max(1.0))
            .sum::<f64>();
    });
    total
}

fn densify_coords(coords: &Coords, tolerance: f64) -> Coords {
    let line = LineString::from(coords.iter_xy().collect::<Vec<_>>());
    let dense = Euclidean.densify(&line, tolerance);
    Coords::from_xy(dense.0.iter().map(|c| c.x_y()))
}

fn densify_members(members: &[Shape], tolerance: f64) -> Vec<Shape> {
    members.iter().map(|m| densify(m, tolerance)).collect()
}

fn densify(shape: &Shape, tolerance: f64) -> Shape {
    match shape {
        Shape::Point(_) | Shape::MultiPoint(_) => shape.clone(),
        Shape::LineString(c) => Shape::LineString(densify_coords(c, tolerance)),
        Shape::LinearRing(c) => Shape::LinearRing(densify_coords(c, tolerance)),
        Shape::Polygon(rings) => {
            Shape::Polygon(rings.iter().map(|r| densify_coords(r, tolerance)).collect())
        }
        Shape::MultiLineString(m) => Shape::MultiLineString(densify_members(m, tolerance)),
        Shape::MultiPolygon(m) => Shape::MultiPolygon(densify_members(m, tolerance)),
        Shape::GeometryCollection(m) => {
            Shape::GeometryCollection(densify_members(m, tolerance))
        }
    }
}

fn equals_exact(a: &Shape, b: &Shape, tolerance: f64) -> bool {
    fn coords_match(a: &Coords, b: &Coords, tolerance: f64) -> bool {
        a.len() == b.len()
            && a
                .iter_xy()
                .zip(b.iter_xy())
                .all(|(p, q)| (p.0 - q.0).hypot(p.1 - q.1) <= tolerance)
    }
    match (a, b) {
        (Shape::Point(p), Shape::Point(q))
        | (Shape::LineString(p), Shape::LineString(q))
        | (Shape::LinearRing(p), Shape::LinearRing(q)) => coords_match(p, q, tolerance),
        (Shape::Polygon(p), Shape::Polygon(q)) => {
            p.len() == q.len() && p.iter().zip(q).all(|(r, s)| coords_match(r, s, tolerance))
        }
        _ if a.type_id() == b.type_id() && a.type_id().is_collection() => {
            a.members().len() == b.members().len()
                && a
                    .members()
                    .iter()
                    .zip(b.members())
                    .all(|(m, n)| equals_exact(m, n, tolerance))
        }
        _ => false,
    }
}

fn point_intersects(c: Coord<f64>, g: &Geometry<f64>) -> bool {
    Geometry::Point(Point(c)).relate(g).is_intersects()
}

/// `g` without its empty components, `None` when nothing is left.
pub(crate) fn non_empty(g: &Geometry<f64>) -> Option<Geometry<f64>> {
    let kept = match g {
        Geometry::MultiLineString(ml) => Geometry::MultiLineString(MultiLineString(
            ml.0.iter().filter(|l| !l.0.is_empty()).cloned().collect(),
        )),
        Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(MultiPolygon(
            mp.0.iter()
                .filter(|p| !p.exterior().0.is_empty())
                .cloned()
                .collect(),
        )),
        Geometry::GeometryCollection(gc) => Geometry::GeometryCollection(GeometryCollection(
            gc.0.iter().filter_map(non_empty).collect(),
        )),
        other => other.clone(),
    };
    (!is_empty_geo(&kept)).then_some(kept)
}

/// Segment tagged with the input it belongs to.
#[derive(Debug, Clone)]
struct Edge {
    line: Line<f64>,
    first: bool,
}

impl Cross for Edge {
    type Scalar = f64;

    fn line(&self) -> Line<f64> {
        self.line
    }
}

fn collect_edges(g: &Geometry<f64>, out: &mut Vec<Line<f64>>) {
    match g {
        Geometry::Line(l) => out.push(*l),
        Geometry::LineString(l) => out.extend(l.lines_iter()),
        Geometry::MultiLineString(ml) => out.extend(ml.lines_iter()),
        Geometry::Polygon(p) => out.extend(p.lines_iter()),
        Geometry::MultiPolygon(mp) => out.extend(mp.lines_iter()),
        Geometry::Rect(r) => out.extend(r.lines_iter()),
        Geometry::Triangle(t) => out.extend(t.lines_iter()),
        Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|m| collect_edges(m, out)),
        Geometry::Point(_) | Geometry::MultiPoint(_) => {}
    }
}

fn edges(g: &Geometry<f64>, first: bool) -> Vec<Edge> {
    let mut lines = Vec::new();
    collect_edges(g, &mut lines);
    lines
        .into_iter()
        .filter(|l| l.start != l.end)
        .map(|line| Edge { line, first })
        .collect()
}

/// A point shared by two intersecting geometries.
fn contact(a: &Geometry<f64>, b: &Geometry<f64>) -> Option<Coord<f64>> {
    a.coords_iter()
        .find(|c| point_intersects(*c, b))
        .or_else(|| b.coords_iter().find(|c| point_intersects(*c, a)))
        .or_else(|| {
            let mut all = edges(a, true);
            all.extend(edges(b, false));
            Intersections::from_iter(all).find_map(|(s, t, hit)| {
                (s.first != t.first).then_some(match hit {
                    LineIntersection::SinglePoint { intersection, .. } => intersection,
                    LineIntersection::Collinear { intersection } => intersection.start,
                })
            })
        })
}

/// Closest pair between the vertices of `from` and the whole of `to`, with
/// its length.
fn closest_to_vertices(
    from: &Geometry<f64>,
    to: &Geometry<f64>,
) -> Option<(f64, Coord<f64>, Coord<f64>)> {
    from.coords_iter()
        .filter_map(|c| {
            let target = match to.closest_point(&Point(c)) {
                Closest::Intersection(p) | Closest::SinglePoint(p) => p.0,
                // only degenerate segments nearby
                Closest::Indeterminate => to.coords_iter().min_by(|p, q| {
                    Euclidean
                        .distance(*p, c)
                        .total_cmp(&Euclidean.distance(*q, c))
                })?,
            };
            Some((Euclidean.distance(c, target), c, target))
        })
        .min_by(|x, y| x.0.total_cmp(&y.0))
}

/// Closest pair of points, the first on `a` and the second on `b`.
pub(crate) fn nearest_points(
    a: &Geometry<f64>,
    b: &Geometry<f64>,
) -> Option<(Coord<f64>, Coord<f64>)> {
    let (a, b) = (non_empty(a)?, non_empty(b)?);
    if a.intersects(&b) {
        if let Some(c) = contact(&a, &b) {
            return Some((c, c));
        }
    }
    // a closest pair always has a vertex at one end
    let forward = closest_to_vertices(&a, &b);
    let backward = closest_to_vertices(&b, &a).map(|(d, q, p)| (d, p, q));
    match (forward, backward) {
        (Some(f), Some(r)) if r.0 < f.0 => Some((r.1, r.2)),
        (Some(f), _) => Some((f.1, f.2)),
        (None, r) => r.map(|(_, p, q)| (p, q)),
    }
}

/// Zero when either side is empty.
pub(crate) fn distance(a: &Geometry<f64>, b: &Geometry<f64>) -> f64 {
    match (non_empty(a), non_empty(b)) {
        (Some(a), Some(b)) => Euclidean.distance(&a, &b),
        _ => 0.0,
    }
}

/// Flattened components of a geometry by dimension.
#[derive(Default)]
struct Parts {
    points: Vec<Coord<f64>>,
    lines: Vec<LineString<f64>>,
    polygons: Vec<Polygon<f64>>,
}

impl Parts {
    fn of(g: &Geometry<f64>) -> Self {
        let mut parts = Parts::default();
        parts.collect(g);
        parts
    }

    fn collect(&mut self, g: &Geometry<f64>) {
        match g {
            Geometry::Point(p) => self.points.push(p.0),
            Geometry::MultiPoint(mp) => self.points.extend(mp.0.iter().map(|p| p.0)),
            Geometry::Line(l) => self.lines.push(LineString::new(vec![l.start, l.end])),
            Geometry::LineString(l) if !l.0.is_empty() => self.lines.push(l.clone()),
            Geometry::LineString(_) => {}
            Geometry::MultiLineString(ml) => {
                self.lines.extend(ml.0.iter().filter(|l| !l.0.is_empty()).cloned())
            }
            Geometry::Polygon(p) if !p.exterior().0.is_empty() => self.polygons.push(p.clone()),
            Geometry::Polygon(_) => {}
            Geometry::MultiPolygon(mp) => self.polygons.extend(
                mp.0.iter()
                    .filter(|p| !p.exterior().0.is_empty())
                    .cloned(),
            ),
            Geometry::GeometryCollection(gc) => gc.0.iter().for_each(|m| self.collect(m)),
            Geometry::Rect(r) => self.polygons.push(r.to_polygon()),
            Geometry::Triangle(t) => self.polygons.push(t.to_polygon()),
        }
    }

    fn kinds(&self) -> usize {
        [
            !self.points.is_empty(),
            !self.lines.is_empty(),
            !self.polygons.is_empty(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    fn dimension(&self) -> u8 {
        if !self.polygons.is_empty() {
            2
        } else if !self.lines.is_empty() {
            1
        } else {
            0
        }
    }

    fn multi_polygon(&self) -> MultiPolygon<f64> {
        MultiPolygon(self.polygons.clone())
    }

    fn multi_line(&self) -> MultiLineString<f64> {
        MultiLineString(self.lines.clone())
    }

    fn geometry(&self) -> Geometry<f64> {
        let mut members: Vec<Geometry<f64>> = Vec::new();
        members.extend(self.polygons.iter().cloned().map(Geometry::Polygon));
        members.extend(self.lines.iter().cloned().map(Geometry::LineString));
        members.extend(self.points.iter().map(|c| Geometry::Point(Point(*c))));
        Geometry::GeometryCollection(GeometryCollection(members))
    }

    /// Narrowest shape holding every part.
    fn into_shape(self) -> Shape {
        match (self.points.is_empty(), self.lines.is_empty(), self.polygons.is_empty()) {
            (true, true, true) => Shape::GeometryCollection(Vec::new()),
            (false, true, true) => puntal_result(self.points),
            (true, false, true) => lineal_result(self.lines),
            (true, true, false) => areal_result(MultiPolygon(self.polygons)),
            _ => {
                let mut members: Vec<Shape> = Vec::new();
                members.extend(
                    self.polygons
                        .iter()
                        .map(|p| convert::from_geo(&Geometry::Polygon(p.clone()))),
                );
                members.extend(
                    self.lines
                        .iter()
                        .map(|l| convert::from_geo(&Geometry::LineString(l.clone()))),
                );
                members.extend(self.points.into_iter().map(point_shape));
                Shape::GeometryCollection(members)
            }
        }
    }
}

fn dedup_coords(mut coords: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    coords.sort_by(|a, b| compare_xy(a.x_y(), b.x_y()));
    coords.dedup();
    coords
}

fn segment_param(line: Line<f64>, p: Coord<f64>) -> f64 {
    let d = line.delta();
    let len2 = d.x * d.x + d.y * d.y;
    ((p.x - line.start.x) * d.x + (p.y - line.start.y) * d.y) / len2
}

fn lerp(line: Line<f64>, t: f64) -> Coord<f64> {
    line.start + line.delta() * t
}

/// Portions of `a` not overlapped by any segment of `b`.
fn subtract_lines(a: &[LineString<f64>], b: &[LineString<f64>]) -> Vec<LineString<f64>> {
    let others: Vec<Line<f64>> = b.iter().flat_map(|l| l.lines()).collect();
    let mut out = Vec::new();
    for line in a {
        let mut current: Vec<Coord<f64>> = Vec::new();
        for segment in line.lines().filter(|s| s.start != s.end) {
            let mut covered: Vec<(f64, f64)> = others
                .iter()
                .filter_map(|other| match line_intersection(segment, *other)? {
                    LineIntersection::Collinear { intersection } => {
                        let t0 = segment_param(segment, intersection.start);
                        let t1 = segment_param(segment, intersection.end);
                        Some((t0.min(t1), t0.max(t1)))
                    }
                    LineIntersection::SinglePoint { .. } => None,
                })
                .collect();
            covered.sort_by(|x, y| x.0.total_cmp(&y.0));
            let mut pieces = Vec::new();
            let mut t = 0.0;
            for (start, end) in covered {
                if start > t {
                    pieces.push((t, start));
                }
                t = f64::max(t, end);
            }
            if t < 1.0 {
                pieces.push((t, 1.0));
            }
            for (start, end) in pieces.into_iter().filter(|(s, e)| e - s > 1e-12) {
                let (ps, pe) = (lerp(segment, start), lerp(segment, end));
                if current.last() != Some(&ps) {
                    if current.len() > 1 {
                        out.push(LineString::new(std::mem::take(&mut current)));
                    }
                    current = vec![ps];
                }
                current.push(pe);
            }
        }
        if current.len() > 1 {
            out.push(LineString::new(current));
        }
    }
    out
}

fn intersect_lines(a: &[LineString<f64>], b: &[LineString<f64>]) -> Parts {
    let mut parts = Parts::default();
    for s in a.iter().flat_map(|l| l.lines()) {
        for t in b.iter().flat_map(|l| l.lines()) {
            match line_intersection(s, t) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    parts.points.push(intersection)
                }
                Some(LineIntersection::Collinear { intersection }) => parts
                    .lines
                    .push(LineString::new(vec![intersection.start, intersection.end])),
                None => {}
            }
        }
    }
    let lines = parts.multi_line();
    parts.points = dedup_coords(parts.points)
        .into_iter()
        .filter(|c| !point_intersects(*c, &Geometry::MultiLineString(lines.clone())))
        .collect();
    parts
}

/// Overlay two detached geometries.
pub(crate) fn overlay(a: &Shape, b: &Shape, op: Overlay) -> Result<Shape, String> {
    if a.is_empty() || b.is_empty() {
        return Ok(match op {
            Overlay::Intersection => {
                let lower = if dimension_of(a) <= dimension_of(b) { a } else { b };
                Shape::empty(empty_type_for(lower))
            }
            Overlay::Union | Overlay::SymDifference if a.is_empty() => b.clone(),
            _ => a.clone(),
        });
    }
    let (ga, gb) = (convert::to_geo(a), convert::to_geo(b));
    let (pa, pb) = (Parts::of(&ga), Parts::of(&gb));
    if pa.kinds() > 1 || pb.kinds() > 1 {
        return Err("IllegalArgumentException: Overlay input is mixed-dimension".into());
    }
    let result = match (pa.dimension(), pb.dimension()) {
        (2, 2) => {
            let (ma, mb) = (pa.multi_polygon(), pb.multi_polygon());
            areal_result(match op {
                Overlay::Intersection => ma.intersection(&mb),
                Overlay::Union => ma.union(&mb),
                Overlay::Difference => ma.difference(&mb),
                Overlay::SymDifference => ma.xor(&mb),
            })
        }
        (0, 0) => {
            let (xa, xb) = (dedup_coords(pa.points), dedup_coords(pb.points));
            let points = match op {
                Overlay::Intersection => xa.into_iter().filter(|c| xb.contains(c)).collect(),
                Overlay::Union => dedup_coords(xa.into_iter().chain(xb).collect()),
                Overlay::Difference => xa.into_iter().filter(|c| !xb.contains(c)).collect(),
                Overlay::SymDifference => {
                    let left: Vec<Coord<f64>> = xa.iter().filter(|c| !xb.contains(c)).copied().collect();
                    let right = xb.iter().filter(|c| !xa.contains(c)).copied();
                    dedup_coords(left.into_iter().chain(right).collect())
                }
            };
            puntal_result(points)
        }
        (0, _) => {
            let (inside, outside): (Vec<Coord<f64>>, Vec<Coord<f64>>) =
                dedup_coords(pa.points).into_iter().partition(|c| point_intersects(*c, &gb));
            match op {
                Overlay::Intersection => puntal_result(inside),
                Overlay::Difference => puntal_result(outside),
                Overlay::Union | Overlay::SymDifference => Parts {
                    points: outside,
                    ..pb
                }
                .into_shape(),
            }
        }
        (_, 0) => {
            let (inside, outside): (Vec<Coord<f64>>, Vec<Coord<f64>>) =
                dedup_coords(pb.points).into_iter().partition(|c| point_intersects(*c, &ga));
            match op {
                Overlay::Intersection => puntal_result(inside),
                Overlay::Difference => a.clone(),
                Overlay::Union | Overlay::SymDifference => Parts {
                    points: outside,
                    ..pa
                }
                .into_shape(),
            }
        }
        (1, 2) | (2, 1) => {
            let (lines, areas, lines_first) = if pa.dimension() == 1 {
                (pa.multi_line(), pb.multi_polygon(), true)
            } else {
                (pb.multi_line(), pa.multi_polygon(), false)
            };
            match op {
                Overlay::Intersection => lineal_result(areas.clip(&lines, false).0),
                Overlay::Difference if lines_first => lineal_result(areas.clip(&lines, true).0),
                Overlay::Difference => a.clone(),
                Overlay::Union | Overlay::SymDifference => Parts {
                    points: Vec::new(),
                    lines: areas.clip(&lines, true).0,
                    polygons: areas.0,
                }
                .into_shape(),
            }
        }
        _ => match op {
            Overlay::Intersection => intersect_lines(&pa.lines, &pb.lines).into_shape(),
            Overlay::Union => {
                let mut lines = pa.lines.clone();
                lines.extend(subtract_lines(&pb.lines, &pa.lines));
                lineal_result(lines)
            }
            Overlay::Difference => lineal_result(subtract_lines(&pa.lines, &pb.lines)),
            Overlay::SymDifference => {
                let mut lines = subtract_lines(&pa.lines, &pb.lines);
                lines.extend(subtract_lines(&pb.lines, &pa.lines));
                lineal_result(lines)
            }
        },
    };
    Ok(result)
}

fn dimension_of(shape: &Shape) -> u8 {
    match shape.type_id() {
        GeometryTypeId::Point | GeometryTypeId::MultiPoint => 0,
        GeometryTypeId::LineString | GeometryTypeId::LinearRing | GeometryTypeId::MultiLineString => 1,
        GeometryTypeId::Polygon | GeometryTypeId::MultiPolygon => 2,
        GeometryTypeId::GeometryCollection => {
            shape.members().iter().map(dimension_of).max().unwrap_or(0)
        }
    }
}

fn empty_type_for(shape: &Shape) -> GeometryTypeId {
    match dimension_of(shape) {
        0 => GeometryTypeId::Point,
        1 => GeometryTypeId::LineString,
        _ => GeometryTypeId::Polygon,
    }
}

pub(crate) fn unary_union(shape: &Shape) -> Shape {
    if shape.is_empty() {
        return shape.clone();
    }
    let parts = Parts::of(&convert::to_geo(shape));
    let areas = geo::unary_union(&parts.polygons);
    let lines = if areas.0.is_empty() {
        parts.lines
    } else {
        areas.clip(&MultiLineString(parts.lines), true).0
    };
    let mut merged = Parts {
        points: Vec::new(),
        lines,
        polygons: areas.0,
    };
    let covering = merged.geometry();
    merged.points = dedup_coords(parts.points)
        .into_iter()
        .filter(|c| !point_intersects(*c, &covering))
        .collect();
    merged.into_shape()
}

/// First problem found in a geometry. Rings are checked as polygon shells.
fn invalidity(shape: &Shape) -> Option<String> {
    let g = match shape {
        Shape::LinearRing(c) => convert::to_geo(&Shape::Polygon(vec![c.clone()])),
        _ => convert::to_geo(shape),
    };
    g.check_validation().err().map(|problem| problem.to_string())
}

pub(crate) fn validity_reason(shape: &Shape) -> String {
    invalidity(shape).unwrap_or_else(|| "Valid Geometry".to_string())
}

fn rotate_to_min(c: &mut Coords) {
    if !c.is_closed() || c.len() < 4 {
        return;
    }
    let open = c.len() - 1;
    let start = (0..open)
        .min_by(|i, j| compare_xy(c.xy(*i), c.xy(*j)))
        .unwrap_or(0);
    let mut flat = Vec::with_capacity(c.flat.len());
    for k in 0..open {
        flat.extend_from_slice(c.coord((start + k) % open));
    }
    flat.extend_from_slice(c.coord(start));
    c.flat = flat;
}

fn normalize_ring(c: &mut Coords, clockwise: bool) {
    rotate_to_min(c);
    if c.len() >= 4 && (signed_area(c) < 0.0) != clockwise {
        c.reverse();
    }
}

fn normalize_line(c: &mut Coords) {
    if c.is_closed() && c.len() >= 4 {
        normalize_ring(c, true);
        return;
    }
    let n = c.len();
    for i in 0..n / 2 {
        match compare_xy(c.xy(i), c.xy(n - 1 - i)) {
            Ordering::Less => return,
            Ordering::Greater => {
                c.reverse();
                return;
            }
            Ordering::Equal => {}
        }
    }
}

fn polygonize(inputs: &[Shape], valid_only: bool) -> Shape {
    let mut rings: Vec<Vec<Coord<f64>>> = Vec::new();
    let mut open: Vec<Option<Vec<Coord<f64>>>> = Vec::new();
    for input in inputs {
        input.visit_coords(&mut |c| {
            if c.len() < 2 {
                return;
            }
            let line: Vec<Coord<f64>> = c.iter_xy().map(Coord::from).collect();
            if c.is_closed() && c.len() >= 4 {
                rings.push(line);
            } else {
                open.push(Some(line));
            }
        });
    }
    for i in 0..open.len() {
        let Some(mut path) = open[i].take() else {
            continue;
        };
        loop {
            if path.len() >= 4 && path.first() == path.last() {
                rings.push(path);
                break;
            }
            let Some(&end) = path.last() else { break };
            let next = open.iter_mut().find_map(|slot| {
                let forward = slot.as_ref().is_some_and(|l| l.first() == Some(&end));
                let backward = slot.as_ref().is_some_and(|l| l.last() == Some(&end));
                if forward {
                    slot.take()
                } else if backward {
                    slot.take().map(|mut l| {
                        l.reverse();
                        l
                    })
                } else {
                    None
                }
            });
            match next {
                Some(line) => path.extend(line.into_iter().skip(1)),
                None => break,
            }
        }
    }
    let faces: Vec<Polygon<f64>> = rings
        .into_iter()
        .map(|r| Polygon::new(LineString::new(r), Vec::new()))
        .filter(|p| p.unsigned_area() > 0.0)
        .collect();
    let parent: Vec<Option<usize>> = (0..faces.len())
        .map(|j| {
            let inner = faces[j].interior_point()?;
            let area = faces[j].unsigned_area();
            (0..faces.len())
                .filter(|i| *i != j && faces[*i].unsigned_area() > area && faces[*i].contains(&inner))
                .min_by(|a, b| faces[*a].unsigned_area().total_cmp(&faces[*b].unsigned_area()))
        })
        .collect();
    let depth = |mut j: usize| {
        let mut d = 0;
        while let Some(p) = parent[j] {
            d += 1;
            j = p;
        }
        d
    };
    let polygons: Vec<Polygon<f64>> = (0..faces.len())
        .filter(|j| !valid_only || depth(*j) % 2 == 0)
        .map(|j| {
            let holes = (0..faces.len())
                .filter(|k| parent[*k] == Some(j))
                .map(|k| faces[k].exterior().clone())
                .collect();
            Polygon::new(faces[j].exterior().clone(), holes)
        })
        .collect();
    if valid_only {
        if polygons.is_empty() {
            return Shape::GeometryCollection(Vec::new());
        }
        return areal_result(MultiPolygon(polygons));
    }
    Shape::GeometryCollection(
        polygons
            .into_iter()
            .map(|p| convert::from_geo(&Geometry::Polygon(p)))
            .collect(),
    )
}

impl Engine {
    fn derive(&mut self, id: GeomId, result: Result<Shape, String>) -> Option<GeomId> {
        let srid = self.node(id)?.srid;
        match result {
            Ok(shape) => self.create_geom(&shape, srid),
            Err(message) => self.fail(message),
        }
    }

    pub(crate) fn predicate(&self, id: GeomId, other: &Shape, p: Predicate) -> Option<bool> {
        let a = self.export_geo(id)?;
        Some(predicate(&a, &convert::to_geo(other), p))
    }

    pub(crate) fn relate(&self, id: GeomId, other: &Shape) -> Option<String> {
        let a = self.export_geo(id)?;
        Some(de9im(&a, &convert::to_geo(other)))
    }

    pub(crate) fn relate_pattern(&self, id: GeomId, other: &Shape, pattern: &str) -> Option<bool> {
        if !is_pattern(pattern) {
            return self.fail(format!("IllegalArgumentException: invalid DE-9IM pattern '{pattern}'"));
        }
        let matrix = self.relate(id, other)?;
        Some(pattern_matches(&matrix, pattern))
    }

    pub(crate) fn relate_pattern_match(&self, matrix: &str, pattern: &str) -> Option<bool> {
        let well_formed = matrix.len() == 9 && matrix.chars().all(|c| matches!(c, 'F' | '0' | '1' | '2'));
        if !well_formed || !is_pattern(pattern) {
            return self.fail("IllegalArgumentException: invalid intersection matrix or pattern");
        }
        Some(pattern_matches(matrix, pattern))
    }

    pub(crate) fn equals_exact(&self, id: GeomId, other: &Shape, tolerance: f64) -> Option<bool> {
        let a = self.export(id)?;
        Some(equals_exact(&a, other, tolerance))
    }

    pub(crate) fn distance(&self, id: GeomId, other: &Shape) -> Option<f64> {
        let a = self.export_geo(id)?;
        Some(distance(&a, &convert::to_geo(other)))
    }

    pub(crate) fn nearest_points(
        &self,
        id: GeomId,
        other: &Shape,
    ) -> Option<Option<[(f64, f64); 2]>> {
        let a = self.export_geo(id)?;
        Some(nearest_points(&a, &convert::to_geo(other)).map(|(p, q)| [p.x_y(), q.x_y()]))
    }

    pub(crate) fn area(&self, id: GeomId) -> Option<f64> {
        self.export_geo(id).map(|g| g.unsigned_area())
    }

    pub(crate) fn length(&self, id: GeomId) -> Option<f64> {
        self.export(id).map(|shape| shape_length(&shape))
    }

    pub(crate) fn bounds(&self, id: GeomId) -> Option<[f64; 4]> {
        self.export(id).map(|shape| shape_bounds(&shape))
    }

    pub(crate) fn envelope(&mut self, id: GeomId) -> Option<GeomId> {
        let b = self.bounds(id)?;
        self.derive(id, Ok(bounds_shape(b)))
    }

    pub(crate) fn convex_hull(&mut self, id: GeomId) -> Option<GeomId> {
        let g = self.export_geo(id)?;
        self.derive(id, Ok(convex_hull(&g)))
    }

    pub(crate) fn centroid(&mut self, id: GeomId) -> Option<GeomId> {
        let g = self.export_geo(id)?;
        let centroid = match g.centroid() {
            Some(p) => point_shape(p.0),
            None => Shape::Point(Coords::empty(2)),
        };
        self.derive(id, Ok(centroid))
    }

    pub(crate) fn overlay(&mut self, id: GeomId, other: &Shape, op: Overlay) -> Option<GeomId> {
        let a = self.export(id)?;
        self.derive(id, overlay(&a, other, op))
    }

    pub(crate) fn unary_union(&mut self, id: GeomId) -> Option<GeomId> {
        let a = self.export(id)?;
        self.derive(id, Ok(unary_union(&a)))
    }

    pub(crate) fn densify(&mut self, id: GeomId, tolerance: f64) -> Option<GeomId> {
        if !(tolerance > 0.0) {
            return self.fail("IllegalArgumentException: Tolerance must be positive");
        }
        let shape = self.export(id)?;
        // NaN sizes fail too
        if !(densified_size(&shape, tolerance) <= MAX_DENSIFIED_VERTICES) {
            return self.fail("IllegalArgumentException: Tolerance is too small");
        }
        self.derive(id, Ok(densify(&shape, tolerance)))
    }

    pub(crate) fn is_valid(&self, id: GeomId) -> Option<bool> {
        self.export(id).map(|shape| invalidity(&shape).is_none())
    }

    pub(crate) fn is_valid_reason(&self, id: GeomId) -> Option<String> {
        self.export(id).map(|shape| validity_reason(&shape))
    }

    pub(crate) fn polygonize(&mut self, inputs: &[Shape], valid_only: bool) -> Option<GeomId> {
        self.create_geom(&polygonize(inputs, valid_only), 0)
    }

    /// Normalize in place: rings start at their lowest coordinate with shells
    /// clockwise and holes counter-clockwise, components sorted descending.
    pub(crate) fn normalize(&mut self, id: GeomId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        match &node.kind {
            NodeKind::Point(_) => true,
            NodeKind::LineString(seq) | NodeKind::LinearRing(seq) => {
                let seq = *seq;
                match self.seqs.get_mut(seq.0) {
                    Some(seq) => {
                        normalize_line(&mut seq.coords);
                        true
                    }
                    None => false,
                }
            }
            NodeKind::Polygon { shell, holes } => {
                let (shell, holes) = (*shell, holes.clone());
                self.normalize_ring_node(shell, true);
                for hole in &holes {
                    self.normalize_ring_node(*hole, false);
                }
                let sorted = self.sorted_descending(holes);
                if let Some(GeomNodeKindMut::Polygon(holes)) = self.kind_mut(id) {
                    *holes = sorted;
                }
                true
            }
            NodeKind::Collection(_, members) => {
                let members = members.clone();
                let ok = members.iter().all(|m| self.normalize(*m));
                let sorted = self.sorted_descending(members);
                if let Some(GeomNodeKindMut::Collection(members)) = self.kind_mut(id) {
                    *members = sorted;
                }
                ok
            }
        }
    }

    fn normalize_ring_node(&mut self, ring: GeomId, clockwise: bool) {
        let seq = self.geoms.get(ring.0).and_then(|node| node.kind.seq());
        if let Some(seq) = seq.and_then(|seq| self.seqs.get_mut(seq.0)) {
            normalize_ring(&mut seq.coords, clockwise);
        }
    }

    fn sorted_descending(&self, ids: Vec<GeomId>) -> Vec<GeomId> {
        let mut shapes: Vec<(GeomId, Shape)> = ids
            .into_iter()
            .map(|id| {
                let shape = self
                    .export(id)
                    .unwrap_or_else(|| Shape::GeometryCollection(Vec::new()));
                (id, shape)
            })
            .collect();
        shapes.sort_by(|a, b| compare_shapes(&b.1, &a.1));
        shapes.into_iter().map(|(id, _)| id).collect()
    }

    fn kind_mut(&mut self, id: GeomId) -> Option<GeomNodeKindMut<'_>> {
        match &mut self.geoms.get_mut(id.0)?.kind {
            NodeKind::Polygon { holes, .. } => Some(GeomNodeKindMut::Polygon(holes)),
            NodeKind::Collection(_, members) => Some(GeomNodeKindMut::Collection(members)),
            _ => None,
        }
    }
}

/// Mutable view of the child list of a node.
enum GeomNodeKindMut<'a> {
    Polygon(&'a mut Vec<GeomId>),
    Collection(&'a mut Vec<GeomId>),
}

/// Orientation of `p` relative to the directed line `a`->`b`: 1 left, -1
/// right, 0 collinear.
pub(crate) fn orientation_index(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> i32 {
    match RobustKernel::orient2d(Coord::from(a), Coord::from(b), Coord::from(p)) {
        Orientation::CounterClockwise => 1,
        Orientation::Clockwise => -1,
        Orientation::Collinear => 0,
    }
}

/// Intersection point of two segments, if they meet.
pub(crate) fn segment_intersection(
    a: [(f64, f64); 2],
    b: [(f64, f64); 2],
) -> Option<(f64, f64)> {
    let s = Line::new(Coord::from(a[0]), Coord::from(a[1]));
    let t = Line::new(Coord::from(b[0]), Coord::from(b[1]));
    match line_intersection(s, t)? {
        LineIntersection::SinglePoint { intersection, .. } => Some(intersection.x_y()),
        LineIntersection::Collinear { intersection } => Some(intersection.start.x_y()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Shape {
        Shape::Polygon(vec![Coords::from_xy([
            (x, y),
            (x + size, y),
            (x + size, y + size),
            (x, y + size),
            (x, y),
        ])])
    }

    #[test]
    fn test_predicates() {
        let outer = convert::to_geo(&square(0.0, 0.0, 4.0));
        let inner = convert::to_geo(&square(1.0, 1.0, 1.0));
        assert!(predicate(&outer, &inner, Predicate::Contains));
        assert!(predicate(&inner, &outer, Predicate::Within));
        assert!(!predicate(&outer, &inner, Predicate::Touches));
        let empty = convert::to_geo(&Shape::Polygon(Vec::new()));
        let empty_point = convert::to_geo(&Shape::Point(Coords::empty(2)));
        assert!(predicate(&empty, &empty_point, Predicate::Equals));
    }

    #[test]
    fn test_de9im_for_disjoint_squares() {
        let a = convert::to_geo(&square(0.0, 0.0, 1.0));
        let b = convert::to_geo(&square(5.0, 5.0, 1.0));
        assert_eq!(de9im(&a, &b), "FF2FF1212");
        assert!(pattern_matches("FF2FF1212", "FF*FF****"));
        assert!(!pattern_matches("FF2FF1212", "T********"));
    }

    #[test]
    fn test_nearest_points_between_squares() {
        let a = convert::to_geo(&square(0.0, 0.0, 1.0));
        let b = convert::to_geo(&square(2.0, 2.0, 1.0));
        let (p, q) = nearest_points(&a, &b).unwrap();
        assert_eq!(p.x_y(), (1.0, 1.0));
        assert_eq!(q.x_y(), (2.0, 2.0));
        let c = convert::to_geo(&square(2.0, 0.0, 1.0));
        assert_eq!(distance(&a, &c), 1.0);
    }

    #[test]
    fn test_overlay_areal() {
        let a = square(0.0, 0.0, 2.0);
        let b = square(1.0, 1.0, 2.0);
        let union = convert::to_geo(&overlay(&a, &b, Overlay::Union).unwrap());
        assert!((union.unsigned_area() - 7.0).abs() < 1e-9);
        let intersection = convert::to_geo(&overlay(&a, &b, Overlay::Intersection).unwrap());
        assert!((intersection.unsigned_area() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlay_points_and_lines() {
        let line = Shape::LineString(Coords::from_xy([(0.0, 0.0), (4.0, 0.0)]));
        let other = Shape::LineString(Coords::from_xy([(1.0, 0.0), (2.0, 0.0)]));
        let difference = overlay(&line, &other, Overlay::Difference).unwrap();
        assert!(matches!(difference, Shape::MultiLineString(ref m) if m.len() == 2));
        let point = Shape::Point(Coords::from_xy([(1.0, 1.0)]));
        let within = overlay(&point, &square(0.0, 0.0, 2.0), Overlay::Intersection).unwrap();
        assert_eq!(within, point);
    }

    #[test]
    fn test_mixed_overlay_is_rejected() {
        let mixed = Shape::GeometryCollection(vec![
            Shape::Point(Coords::from_xy([(9.0, 9.0)])),
            square(0.0, 0.0, 1.0),
        ]);
        assert!(overlay(&mixed, &square(0.0, 0.0, 1.0), Overlay::Union).is_err());
    }

    #[test]
    fn test_convex_hull_degenerate_cases() {
        let line = convert::to_geo(&Shape::MultiPoint(vec![
            Shape::Point(Coords::from_xy([(0.0, 0.0)])),
            Shape::Point(Coords::from_xy([(1.0, 1.0)])),
            Shape::Point(Coords::from_xy([(2.0, 2.0)])),
        ]));
        assert_eq!(
            convex_hull(&line),
            Shape::LineString(Coords::from_xy([(0.0, 0.0), (2.0, 2.0)]))
        );
    }

    #[test]
    fn test_validity_reasons() {
        let bowtie = Shape::Polygon(vec![Coords::from_xy([
            (0.0, 0.0),
            (2.0, 2.0),
            (2.0, 0.0),
            (0.0, 2.0),
            (0.0, 0.0),
        ])]);
        assert_eq!(validity_reason(&bowtie), "exterior ring has a self-intersection");
        let stub = Shape::LineString(Coords::from_xy([(1.0, 1.0), (1.0, 1.0)]));
        assert_eq!(validity_reason(&stub), "line string must have at least 2 distinct points");
        assert_eq!(validity_reason(&Shape::Polygon(Vec::new())), "Valid Geometry");
        assert_eq!(validity_reason(&square(0.0, 0.0, 1.0)), "Valid Geometry");
    }

    #[test]
    fn test_densify_inserts_vertices() {
        let line = Shape::LineString(Coords::from_xy([(0.0, 0.0), (4.0, 0.0)]));
        assert!(matches!(densify(&line, 1.0), Shape::LineString(ref c) if c.len() == 5));
        assert_eq!(densified_size(&line, 1.0), 5.0);

        let ring = Shape::LinearRing(square_ring(0.0, 2.0));
        assert!(matches!(densify(&ring, 1.0), Shape::LinearRing(ref c) if c.len() == 9));

        let huge = Shape::LineString(Coords::from_xy([(0.0, 0.0), (1e300, 0.0)]));
        assert!(densified_size(&huge, 1e-300).is_infinite());
    }

    #[test]
    fn test_normalize_line_and_ring() {
        let mut line = Coords::from_xy([(2.0, 0.0), (1.0, 0.0)]);
        normalize_line(&mut line);
        assert_eq!(line.xy(0), (1.0, 0.0));

        let mut ring = Coords::from_xy([(1.0, 1.0), (1.0, 0.0), (0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        normalize_ring(&mut ring, true);
        assert_eq!(ring.xy(0), (0.0, 0.0));
        assert!(signed_area(&ring) < 0.0);
    }

    #[test]
    fn test_polygonize_nested_rings() {
        let outer = Shape::LineString(square_ring(0.0, 10.0));
        let inner = Shape::LineString(square_ring(2.0, 4.0));
        let all = polygonize(&[outer.clone(), inner.clone()], false);
        assert_eq!(all.members().len(), 2);
        let valid = polygonize(&[outer, inner], true);
        assert!(matches!(valid, Shape::Polygon(ref rings) if rings.len() == 2));
    }

    #[test]
    fn test_polygonize_chains_open_lines() {
        let pieces = [
            Shape::LineString(Coords::from_xy([(0.0, 0.0), (1.0, 0.0)])),
            Shape::LineString(Coords::from_xy([(1.0, 1.0), (1.0, 0.0)])),
            Shape::LineString(Coords::from_xy([(1.0, 1.0), (0.0, 0.0)])),
        ];
        let result = polygonize(&pieces, false);
        assert_eq!(result.members().len(), 1);
    }

    fn square_ring(origin: f64, size: f64) -> Coords {
        Coords::from_xy([
            (origin, origin),
            (origin + size, origin),
            (origin + size, origin + size),
            (origin, origin + size),
            (origin, origin),
        ])
    }

    #[test]
    fn test_orientation_and_segment_intersection() {
        assert_eq!(orientation_index((0.0, 0.0), (1.0, 0.0), (0.5, 1.0)), 1);
        assert_eq!(orientation_index((0.0, 0.0), (1.0, 0.0), (0.5, -1.0)), -1);
        assert_eq!(
            segment_intersection([(0.0, 0.0), (2.0, 2.0)], [(0.0, 2.0), (2.0, 0.0)]),
            Some((1.0, 1.0))
        );
        assert_eq!(
            segment_intersection([(0.0, 0.0), (1.0, 0.0)], [(0.0, 1.0), (1.0, 1.0)]),
            None
        );
    }
}
