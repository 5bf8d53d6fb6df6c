//! Native node layout and the detached `Shape` value tree used by codecs.

use super::{GeomId, SeqId};
use crate::types::GeometryTypeId;
use std::cmp::Ordering;

/// A flat run of coordinates with 2 (XY), 3 (XYZ) or 4 (XYZM) ordinates each.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Coords {
    pub(crate) dims: u8,
    pub(crate) flat: Vec<f64>,
}

impl Coords {
    pub(crate) fn empty(dims: u8) -> Self {
        Self {
            dims,
            flat: Vec::new(),
        }
    }

    pub(crate) fn from_xy<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Self {
        let mut flat = Vec::new();
        for (x, y) in points {
            flat.push(x);
            flat.push(y);
        }
        Self { dims: 2, flat }
    }

    pub(crate) fn len(&self) -> usize {
        self.flat.len() / self.dims as usize
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    pub(crate) fn coord(&self, index: usize) -> &[f64] {
        let dims = self.dims as usize;
        &self.flat[index * dims..(index + 1) * dims]
    }

    pub(crate) fn xy(&self, index: usize) -> (f64, f64) {
        let c = self.coord(index);
        (c[0], c[1])
    }

    pub(crate) fn iter_xy(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.flat
            .chunks_exact(self.dims as usize)
            .map(|c| (c[0], c[1]))
    }

    /// First and last coordinates coincide in XY.
    pub(crate) fn is_closed(&self) -> bool {
        !self.is_empty() && self.xy(0) == self.xy(self.len() - 1)
    }

    pub(crate) fn reverse(&mut self) {
        let dims = self.dims as usize;
        let reversed: Vec<f64> = self
            .flat
            .chunks_exact(dims)
            .rev()
            .flat_map(|c| c.iter().copied())
            .collect();
        self.flat = reversed;
    }
}

/// Detached geometry value, independent of any engine instance.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Shape {
    Point(Coords),
    LineString(Coords),
    LinearRing(Coords),
    /// Shell first, then holes. No rings means an empty polygon.
    Polygon(Vec<Coords>),
    MultiPoint(Vec<Shape>),
    MultiLineString(Vec<Shape>),
    MultiPolygon(Vec<Shape>),
    GeometryCollection(Vec<Shape>),
}

impl Shape {
    pub(crate) fn empty(type_id: GeometryTypeId) -> Self {
        match type_id {
            GeometryTypeId::Point => Shape::Point(Coords::empty(2)),
            GeometryTypeId::LineString => Shape::LineString(Coords::empty(2)),
            GeometryTypeId::LinearRing => Shape::LinearRing(Coords::empty(2)),
            GeometryTypeId::Polygon => Shape::Polygon(Vec::new()),
            GeometryTypeId::MultiPoint => Shape::MultiPoint(Vec::new()),
            GeometryTypeId::MultiLineString => Shape::MultiLineString(Vec::new()),
            GeometryTypeId::MultiPolygon => Shape::MultiPolygon(Vec::new()),
            GeometryTypeId::GeometryCollection => Shape::GeometryCollection(Vec::new()),
        }
    }

    pub(crate) fn type_id(&self) -> GeometryTypeId {
        match self {
            Shape::Point(_) => GeometryTypeId::Point,
            Shape::LineString(_) => GeometryTypeId::LineString,
            Shape::LinearRing(_) => GeometryTypeId::LinearRing,
            Shape::Polygon(_) => GeometryTypeId::Polygon,
            Shape::MultiPoint(_) => GeometryTypeId::MultiPoint,
            Shape::MultiLineString(_) => GeometryTypeId::MultiLineString,
            Shape::MultiPolygon(_) => GeometryTypeId::MultiPolygon,
            Shape::GeometryCollection(_) => GeometryTypeId::GeometryCollection,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Shape::Point(c) | Shape::LineString(c) | Shape::LinearRing(c) => c.is_empty(),
            Shape::Polygon(rings) => rings.first().is_none_or(Coords::is_empty),
            Shape::MultiPoint(members)
            | Shape::MultiLineString(members)
            | Shape::MultiPolygon(members)
            | Shape::GeometryCollection(members) => members.iter().all(Shape::is_empty),
        }
    }

    pub(crate) fn members(&self) -> &[Shape] {
        match self {
            Shape::MultiPoint(members)
            | Shape::MultiLineString(members)
            | Shape::MultiPolygon(members)
            | Shape::GeometryCollection(members) => members,
            _ => &[],
        }
    }

    /// Highest coordinate dimension found anywhere in the tree.
    pub(crate) fn dims(&self) -> u8 {
        let mut dims = 2;
        self.visit_coords(&mut |c| dims = dims.max(c.dims));
        dims
    }

    pub(crate) fn visit_coords(&self, f: &mut dyn FnMut(&Coords)) {
        match self {
            Shape::Point(c) | Shape::LineString(c) | Shape::LinearRing(c) => f(c),
            Shape::Polygon(rings) => rings.iter().for_each(|r| f(r)),
            _ => self.members().iter().for_each(|m| m.visit_coords(f)),
        }
    }

    pub(crate) fn visit_coords_mut(&mut self, f: &mut dyn FnMut(&mut Coords)) {
        match self {
            Shape::Point(c) | Shape::LineString(c) | Shape::LinearRing(c) => f(c),
            Shape::Polygon(rings) => rings.iter_mut().for_each(|r| f(r)),
            Shape::MultiPoint(members)
            | Shape::MultiLineString(members)
            | Shape::MultiPolygon(members)
            | Shape::GeometryCollection(members) => {
                members.iter_mut().for_each(|m| m.visit_coords_mut(f))
            }
        }
    }

    /// Check construction rules: points hold at most one coordinate, lines
    /// none or at least two, rings none or at least four and closed, and
    /// typed collections only their member type.
    pub(crate) fn check(&self) -> Result<(), String> {
        match self {
            Shape::Point(c) if c.len() > 1 => {
                Err("IllegalArgumentException: Point coordinate list must contain a single element".into())
            }
            Shape::LineString(c) if c.len() == 1 => Err(
                "IllegalArgumentException: point array must contain 0 or >1 elements".into(),
            ),
            Shape::LinearRing(c) => check_ring(c),
            Shape::Polygon(rings) => rings.iter().try_for_each(check_ring),
            Shape::MultiPoint(members) => check_members(members, GeometryTypeId::Point),
            Shape::MultiLineString(members) => check_members(members, GeometryTypeId::LineString),
            Shape::MultiPolygon(members) => check_members(members, GeometryTypeId::Polygon),
            Shape::GeometryCollection(members) => members.iter().try_for_each(Shape::check),
            _ => Ok(()),
        }
    }
}

fn check_ring(ring: &Coords) -> Result<(), String> {
    if ring.is_empty() {
        return Ok(());
    }
    if ring.len() < 4 {
        return Err(format!(
            "IllegalArgumentException: Invalid number of points in LinearRing found {} - must be 0 or >= 4",
            ring.len()
        ));
    }
    if !ring.is_closed() {
        return Err(
            "IllegalArgumentException: Points of LinearRing do not form a closed linestring".into(),
        );
    }
    Ok(())
}

fn check_members(members: &[Shape], expected: GeometryTypeId) -> Result<(), String> {
    for member in members {
        if member.type_id() != expected {
            return Err(format!(
                "IllegalArgumentException: {} cannot hold a {}",
                collection_of(expected),
                member.type_id()
            ));
        }
        member.check()?;
    }
    Ok(())
}

fn collection_of(member: GeometryTypeId) -> &'static str {
    match member {
        GeometryTypeId::Point => "MultiPoint",
        GeometryTypeId::LineString => "MultiLineString",
        _ => "MultiPolygon",
    }
}

/// Total order used when normalizing collections: type first, then
/// coordinates lexicographically.
pub(crate) fn compare_shapes(a: &Shape, b: &Shape) -> Ordering {
    (a.type_id() as u8)
        .cmp(&(b.type_id() as u8))
        .then_with(|| {
            let mut left = Vec::new();
            a.visit_coords(&mut |c| left.extend(c.iter_xy()));
            let mut right = Vec::new();
            b.visit_coords(&mut |c| right.extend(c.iter_xy()));
            for (l, r) in left.iter().zip(right.iter()) {
                let ordering = compare_xy(*l, *r);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            left.len().cmp(&right.len())
        })
}

pub(crate) fn compare_xy(a: (f64, f64), b: (f64, f64)) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.total_cmp(&b.1))
}

/// Native geometry node.
pub(crate) struct GeomNode {
    pub(crate) kind: NodeKind,
    pub(crate) srid: i32,
    /// Set when the node is a component of another geometry.
    pub(crate) owner: Option<GeomId>,
}

pub(crate) enum NodeKind {
    Point(SeqId),
    LineString(SeqId),
    LinearRing(SeqId),
    Polygon { shell: GeomId, holes: Vec<GeomId> },
    Collection(GeometryTypeId, Vec<GeomId>),
}

impl NodeKind {
    pub(crate) fn type_id(&self) -> GeometryTypeId {
        match self {
            NodeKind::Point(_) => GeometryTypeId::Point,
            NodeKind::LineString(_) => GeometryTypeId::LineString,
            NodeKind::LinearRing(_) => GeometryTypeId::LinearRing,
            NodeKind::Polygon { .. } => GeometryTypeId::Polygon,
            NodeKind::Collection(type_id, _) => *type_id,
        }
    }

    pub(crate) fn seq(&self) -> Option<SeqId> {
        match self {
            NodeKind::Point(seq) | NodeKind::LineString(seq) | NodeKind::LinearRing(seq) => {
                Some(*seq)
            }
            _ => None,
        }
    }
}

/// Native coordinate sequence.
pub(crate) struct SeqNode {
    pub(crate) coords: Coords,
    /// Set when the sequence belongs to a geometry.
    pub(crate) owner: Option<GeomId>,
}

/// Metadata fetched in one call and cached by wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GeomInfo {
    pub(crate) type_id: GeometryTypeId,
    pub(crate) num_geometries: usize,
    pub(crate) num_points: usize,
    pub(crate) num_interior_rings: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_rules() {
        let open = Shape::LinearRing(Coords::from_xy([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]));
        assert!(open.check().is_err());
        let short = Shape::LinearRing(Coords::from_xy([(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)]));
        assert!(short.check().is_err());
        let ring = Shape::LinearRing(Coords::from_xy([
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 0.0),
        ]));
        assert!(ring.check().is_ok());
    }

    #[test]
    fn test_typed_collection_rules() {
        let bad = Shape::MultiPoint(vec![Shape::LineString(Coords::empty(2))]);
        assert!(bad.check().is_err());
        let good = Shape::GeometryCollection(vec![
            Shape::Point(Coords::from_xy([(1.0, 2.0)])),
            Shape::Polygon(Vec::new()),
        ]);
        assert!(good.check().is_ok());
    }

    #[test]
    fn test_empty_detection() {
        assert!(Shape::empty(GeometryTypeId::Polygon).is_empty());
        assert!(Shape::MultiPoint(vec![Shape::Point(Coords::empty(2))]).is_empty());
        assert!(!Shape::Point(Coords::from_xy([(0.0, 0.0)])).is_empty());
    }

    #[test]
    fn test_reverse_keeps_ordinates_together() {
        let mut coords = Coords {
            dims: 3,
            flat: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        };
        coords.reverse();
        assert_eq!(coords.flat, vec![4.0, 5.0, 6.0, 1.0, 2.0, 3.0]);
    }
}
