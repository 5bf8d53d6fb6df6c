//! Geometry and coordinate sequence lifecycle, accessors and construction.

use super::convert;
use super::model::{Coords, GeomInfo, GeomNode, NodeKind, SeqNode, Shape};
use super::{Engine, GeomId, SeqId};
use crate::types::GeometryTypeId;

impl Engine {
    pub(super) fn node(&self, id: GeomId) -> Option<&GeomNode> {
        match self.geoms.get(id.0) {
            Some(node) => Some(node),
            None => self.fail("IllegalArgumentException: unknown geometry handle"),
        }
    }

    fn seq_node(&self, seq: SeqId) -> Option<&SeqNode> {
        match self.seqs.get(seq.0) {
            Some(node) => Some(node),
            None => self.fail("IllegalArgumentException: unknown coordinate sequence handle"),
        }
    }

    /// Build a new root geometry from a detached value.
    pub(crate) fn create_geom(&mut self, shape: &Shape, srid: i32) -> Option<GeomId> {
        if let Err(message) = shape.check() {
            return self.fail(message);
        }
        Some(self.import(shape, srid))
    }

    fn import(&mut self, shape: &Shape, srid: i32) -> GeomId {
        let kind = match shape {
            Shape::Point(c) => NodeKind::Point(self.insert_seq(c.clone())),
            Shape::LineString(c) => NodeKind::LineString(self.insert_seq(c.clone())),
            Shape::LinearRing(c) => NodeKind::LinearRing(self.insert_seq(c.clone())),
            Shape::Polygon(rings) => {
                let shell = match rings.first() {
                    Some(shell) => self.import(&Shape::LinearRing(shell.clone()), srid),
                    None => self.import(&Shape::LinearRing(Coords::empty(2)), srid),
                };
                let holes = rings
                    .iter()
                    .skip(1)
                    .map(|hole| self.import(&Shape::LinearRing(hole.clone()), srid))
                    .collect();
                NodeKind::Polygon { shell, holes }
            }
            Shape::MultiPoint(members)
            | Shape::MultiLineString(members)
            | Shape::MultiPolygon(members)
            | Shape::GeometryCollection(members) => NodeKind::Collection(
                shape.type_id(),
                members.iter().map(|m| self.import(m, srid)).collect(),
            ),
        };
        self.insert_node(kind, srid)
    }

    fn insert_seq(&mut self, coords: Coords) -> SeqId {
        SeqId(self.seqs.insert(SeqNode {
            coords,
            owner: None,
        }))
    }

    /// Insert a root node and mark everything it references as owned by it.
    fn insert_node(&mut self, kind: NodeKind, srid: i32) -> GeomId {
        let (seq, children) = match &kind {
            NodeKind::Point(seq) | NodeKind::LineString(seq) | NodeKind::LinearRing(seq) => {
                (Some(*seq), Vec::new())
            }
            NodeKind::Polygon { shell, holes } => {
                (None, std::iter::once(*shell).chain(holes.iter().copied()).collect())
            }
            NodeKind::Collection(_, members) => (None, members.clone()),
        };
        let id = GeomId(self.geoms.insert(GeomNode {
            kind,
            srid,
            owner: None,
        }));
        if let Some(node) = seq.and_then(|seq| self.seqs.get_mut(seq.0)) {
            node.owner = Some(id);
        }
        for child in children {
            if let Some(node) = self.geoms.get_mut(child.0) {
                node.owner = Some(id);
            }
        }
        id
    }

    pub(crate) fn export(&self, id: GeomId) -> Option<Shape> {
        let node = self.node(id)?;
        Some(match &node.kind {
            NodeKind::Point(seq) => Shape::Point(self.seq_node(*seq)?.coords.clone()),
            NodeKind::LineString(seq) => Shape::LineString(self.seq_node(*seq)?.coords.clone()),
            NodeKind::LinearRing(seq) => Shape::LinearRing(self.seq_node(*seq)?.coords.clone()),
            NodeKind::Polygon { shell, holes } => {
                let mut rings = Vec::with_capacity(holes.len() + 1);
                for ring in std::iter::once(shell).chain(holes.iter()) {
                    match self.export(*ring)? {
                        Shape::LinearRing(coords) => rings.push(coords),
                        _ => return self.fail("IllegalStateException: polygon ring is not a LinearRing"),
                    }
                }
                if rings.first().is_some_and(Coords::is_empty) {
                    rings.clear();
                }
                Shape::Polygon(rings)
            }
            NodeKind::Collection(type_id, members) => {
                let members = members
                    .iter()
                    .map(|m| self.export(*m))
                    .collect::<Option<Vec<Shape>>>()?;
                match type_id {
                    GeometryTypeId::MultiPoint => Shape::MultiPoint(members),
                    GeometryTypeId::MultiLineString => Shape::MultiLineString(members),
                    GeometryTypeId::MultiPolygon => Shape::MultiPolygon(members),
                    _ => Shape::GeometryCollection(members),
                }
            }
        })
    }

    pub(crate) fn export_geo(&self, id: GeomId) -> Option<geo::Geometry<f64>> {
        self.export(id).map(|shape| convert::to_geo(&shape))
    }

    pub(crate) fn clone_geom(&mut self, id: GeomId) -> Option<GeomId> {
        let shape = self.export(id)?;
        let srid = self.node(id)?.srid;
        Some(self.import(&shape, srid))
    }

    /// Destroy a root geometry and everything it owns.
    pub(crate) fn destroy_geom(&mut self, id: GeomId) -> bool {
        match self.geoms.get(id.0).map(|node| node.owner.is_some()) {
            None => {
                self.report("IllegalArgumentException: unknown geometry handle");
                false
            }
            Some(true) => {
                self.report("IllegalArgumentException: cannot destroy a geometry owned by another geometry");
                false
            }
            Some(false) => {
                self.remove_tree(id);
                true
            }
        }
    }

    fn remove_tree(&mut self, id: GeomId) {
        let Some(node) = self.geoms.remove(id.0) else {
            return;
        };
        match node.kind {
            NodeKind::Point(seq) | NodeKind::LineString(seq) | NodeKind::LinearRing(seq) => {
                self.seqs.remove(seq.0);
            }
            NodeKind::Polygon { shell, holes } => {
                self.remove_tree(shell);
                holes.into_iter().for_each(|h| self.remove_tree(h));
            }
            NodeKind::Collection(_, members) => {
                members.into_iter().for_each(|m| self.remove_tree(m));
            }
        }
    }

    pub(crate) fn geom_info(&self, id: GeomId) -> Option<GeomInfo> {
        let node = self.node(id)?;
        let type_id = node.kind.type_id();
        let (num_geometries, num_points, num_interior_rings) = match &node.kind {
            NodeKind::LineString(seq) | NodeKind::LinearRing(seq) => {
                (1, self.seq_node(*seq)?.coords.len(), 0)
            }
            NodeKind::Point(_) => (1, 0, 0),
            NodeKind::Polygon { holes, .. } => (1, 0, holes.len()),
            NodeKind::Collection(_, members) => (members.len(), 0, 0),
        };
        Some(GeomInfo {
            type_id,
            num_geometries,
            num_points,
            num_interior_rings,
        })
    }

    /// The `n`th member of a collection, or the geometry itself for n == 0 on
    /// a non-collection. The result is owned by `id`.
    pub(crate) fn geometry_n(&self, id: GeomId, n: usize) -> Option<GeomId> {
        match &self.node(id)?.kind {
            NodeKind::Collection(_, members) => match members.get(n) {
                Some(member) => Some(*member),
                None => self.fail("IllegalArgumentException: Index out of bounds"),
            },
            _ if n == 0 => Some(id),
            _ => self.fail("IllegalArgumentException: Index out of bounds"),
        }
    }

    pub(crate) fn exterior_ring(&self, id: GeomId) -> Option<GeomId> {
        match &self.node(id)?.kind {
            NodeKind::Polygon { shell, .. } => Some(*shell),
            _ => self.fail("IllegalArgumentException: Argument is not a Polygon"),
        }
    }

    pub(crate) fn interior_ring_n(&self, id: GeomId, n: usize) -> Option<GeomId> {
        match &self.node(id)?.kind {
            NodeKind::Polygon { holes, .. } => match holes.get(n) {
                Some(hole) => Some(*hole),
                None => self.fail("IllegalArgumentException: Index out of bounds"),
            },
            _ => self.fail("IllegalArgumentException: Argument is not a Polygon"),
        }
    }

    /// The sequence owned by a point, line string or linear ring.
    pub(crate) fn geom_coord_seq(&self, id: GeomId) -> Option<SeqId> {
        match self.node(id)?.kind.seq() {
            Some(seq) => Some(seq),
            None => self.fail("IllegalArgumentException: Argument is not a Point, LineString or LinearRing"),
        }
    }

    pub(crate) fn srid(&self, id: GeomId) -> Option<i32> {
        self.node(id).map(|node| node.srid)
    }

    pub(crate) fn set_srid(&mut self, id: GeomId, srid: i32) -> bool {
        match self.geoms.get_mut(id.0) {
            Some(node) => {
                node.srid = srid;
                true
            }
            None => {
                self.report("IllegalArgumentException: unknown geometry handle");
                false
            }
        }
    }

    pub(crate) fn is_empty(&self, id: GeomId) -> Option<bool> {
        self.export(id).map(|shape| shape.is_empty())
    }

    pub(crate) fn is_closed(&self, id: GeomId) -> Option<bool> {
        match self.export(id)? {
            Shape::LineString(c) | Shape::LinearRing(c) => Some(c.is_closed()),
            Shape::MultiLineString(members) => Some(members.iter().all(|m| match m {
                Shape::LineString(c) | Shape::LinearRing(c) => c.is_closed(),
                _ => false,
            })),
            _ => self.fail("IllegalArgumentException: Argument is not a LineString or MultiLineString"),
        }
    }

    /// Allocate a new point holding the `n`th vertex of a line.
    pub(crate) fn point_n(&mut self, id: GeomId, n: usize) -> Option<GeomId> {
        let node = self.node(id)?;
        let srid = node.srid;
        let coords = match node.kind {
            NodeKind::LineString(seq) | NodeKind::LinearRing(seq) => &self.seq_node(seq)?.coords,
            _ => return self.fail("IllegalArgumentException: Argument is not a LineString"),
        };
        if n >= coords.len() {
            return self.fail("IllegalArgumentException: Index out of bounds");
        }
        let point = Coords {
            dims: coords.dims,
            flat: coords.coord(n).to_vec(),
        };
        Some(self.import(&Shape::Point(point), srid))
    }

    fn point_ordinate(&self, id: GeomId, ordinate: usize) -> Option<f64> {
        match &self.node(id)?.kind {
            NodeKind::Point(seq) => {
                let coords = &self.seq_node(*seq)?.coords;
                if coords.is_empty() {
                    return self.fail("IllegalArgumentException: Operation not supported on an empty Point");
                }
                Some(coords.coord(0)[ordinate])
            }
            _ => self.fail("IllegalArgumentException: Argument is not a Point"),
        }
    }

    pub(crate) fn get_x(&self, id: GeomId) -> Option<f64> {
        self.point_ordinate(id, 0)
    }

    pub(crate) fn get_y(&self, id: GeomId) -> Option<f64> {
        self.point_ordinate(id, 1)
    }

    /// Build a collection that takes ownership of `members`, which must be
    /// distinct root geometries of a compatible type.
    pub(crate) fn create_collection(
        &mut self,
        type_id: GeometryTypeId,
        members: &[GeomId],
    ) -> Option<GeomId> {
        if !type_id.is_collection() {
            return self.fail(format!("IllegalArgumentException: {type_id} is not a collection type"));
        }
        let expected = match type_id {
            GeometryTypeId::MultiPoint => Some(GeometryTypeId::Point),
            GeometryTypeId::MultiLineString => Some(GeometryTypeId::LineString),
            GeometryTypeId::MultiPolygon => Some(GeometryTypeId::Polygon),
            _ => None,
        };
        for (i, member) in members.iter().enumerate() {
            let node = self.node(*member)?;
            if node.owner.is_some() || members[..i].contains(member) {
                return self.fail("IllegalArgumentException: collection member is already owned");
            }
            if let Some(expected) = expected {
                if node.kind.type_id() != expected {
                    return self.fail(format!(
                        "IllegalArgumentException: {type_id} cannot hold a {}",
                        node.kind.type_id()
                    ));
                }
            }
        }
        Some(self.insert_node(NodeKind::Collection(type_id, members.to_vec()), 0))
    }

    /// Build a line string or linear ring that takes ownership of `seq`.
    pub(crate) fn create_line_from_seq(&mut self, seq: SeqId, ring: bool) -> Option<GeomId> {
        let node = self.seq_node(seq)?;
        if node.owner.is_some() {
            return self.fail("IllegalArgumentException: coordinate sequence is already owned");
        }
        let shape = if ring {
            Shape::LinearRing(node.coords.clone())
        } else {
            Shape::LineString(node.coords.clone())
        };
        if let Err(message) = shape.check() {
            return self.fail(message);
        }
        let kind = if ring {
            NodeKind::LinearRing(seq)
        } else {
            NodeKind::LineString(seq)
        };
        Some(self.insert_node(kind, 0))
    }

    pub(crate) fn create_seq(&mut self, size: usize, dims: u8) -> Option<SeqId> {
        if !(2..=4).contains(&dims) {
            return self.fail(format!(
                "IllegalArgumentException: coordinate dimension must be 2, 3 or 4, got {dims}"
            ));
        }
        Some(self.insert_seq(Coords {
            dims,
            flat: vec![0.0; size * dims as usize],
        }))
    }

    pub(crate) fn create_seq_from_coords(&mut self, coords: Coords) -> Option<SeqId> {
        if !(2..=4).contains(&coords.dims) || coords.flat.len() % coords.dims as usize != 0 {
            return self.fail("IllegalArgumentException: malformed coordinate buffer");
        }
        Some(self.insert_seq(coords))
    }

    pub(crate) fn seq_size(&self, seq: SeqId) -> Option<usize> {
        self.seq_node(seq).map(|node| node.coords.len())
    }

    pub(crate) fn seq_dims(&self, seq: SeqId) -> Option<u8> {
        self.seq_node(seq).map(|node| node.coords.dims)
    }

    pub(crate) fn seq_get(&self, seq: SeqId, index: usize, dim: usize) -> Option<f64> {
        let coords = &self.seq_node(seq)?.coords;
        if index >= coords.len() || dim >= coords.dims as usize {
            return self.fail("IllegalArgumentException: Index out of bounds");
        }
        Some(coords.coord(index)[dim])
    }

    pub(crate) fn seq_set(&mut self, seq: SeqId, index: usize, dim: usize, value: f64) -> bool {
        let Some(node) = self.seqs.get_mut(seq.0) else {
            self.report("IllegalArgumentException: unknown coordinate sequence handle");
            return false;
        };
        let dims = node.coords.dims as usize;
        if index >= node.coords.len() || dim >= dims {
            self.report("IllegalArgumentException: Index out of bounds");
            return false;
        }
        node.coords.flat[index * dims + dim] = value;
        true
    }

    /// Copy every ordinate out in one call.
    pub(crate) fn seq_coords(&self, seq: SeqId) -> Option<Coords> {
        self.seq_node(seq).map(|node| node.coords.clone())
    }

    pub(crate) fn seq_is_ccw(&self, seq: SeqId) -> Option<bool> {
        let coords = &self.seq_node(seq)?.coords;
        if coords.len() < 4 {
            return self.fail(
                "IllegalArgumentException: Ring has fewer than 4 points, so orientation cannot be determined",
            );
        }
        Some(super::ops::signed_area(coords) > 0.0)
    }

    pub(crate) fn clone_seq(&mut self, seq: SeqId) -> Option<SeqId> {
        let coords = self.seq_node(seq)?.coords.clone();
        Some(self.insert_seq(coords))
    }

    pub(crate) fn destroy_seq(&mut self, seq: SeqId) -> bool {
        match self.seqs.get(seq.0).map(|node| node.owner.is_some()) {
            None => {
                self.report("IllegalArgumentException: unknown coordinate sequence handle");
                false
            }
            Some(true) => {
                self.report("IllegalArgumentException: cannot destroy a coordinate sequence owned by a geometry");
                false
            }
            Some(false) => {
                self.seqs.remove(seq.0);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Shape {
        Shape::Polygon(vec![
            Coords::from_xy([(0.0, 0.0), (3.0, 0.0), (3.0, 3.0), (0.0, 3.0), (0.0, 0.0)]),
            Coords::from_xy([(1.0, 1.0), (1.0, 2.0), (2.0, 2.0), (2.0, 1.0), (1.0, 1.0)]),
        ])
    }

    #[test]
    fn test_import_export_round_trip() {
        let mut engine = Engine::init();
        let id = engine.create_geom(&square(), 4326).unwrap();
        assert_eq!(engine.export(id), Some(square()));
        assert_eq!(engine.srid(id), Some(4326));
        let info = engine.geom_info(id).unwrap();
        assert_eq!(info.type_id, GeometryTypeId::Polygon);
        assert_eq!(info.num_interior_rings, 1);
    }

    #[test]
    fn test_destroy_releases_components() {
        let mut engine = Engine::init();
        let id = engine.create_geom(&square(), 0).unwrap();
        let ring = engine.interior_ring_n(id, 0).unwrap();
        assert!(!engine.destroy_geom(ring));
        assert!(engine.destroy_geom(id));
        assert!(engine.export(ring).is_none());
        assert_eq!(engine.stats(), crate::types::EngineStats::default());
    }

    #[test]
    fn test_collection_takes_ownership() {
        let mut engine = Engine::init();
        let a = engine
            .create_geom(&Shape::Point(Coords::from_xy([(0.0, 1.0)])), 0)
            .unwrap();
        let b = engine
            .create_geom(&Shape::Point(Coords::from_xy([(2.0, 3.0)])), 0)
            .unwrap();
        let multi = engine
            .create_collection(GeometryTypeId::MultiPoint, &[a, b])
            .unwrap();
        assert_eq!(engine.stats().geometries, 1);
        assert_eq!(engine.geometry_n(multi, 1), Some(b));
        assert!(engine.create_collection(GeometryTypeId::MultiPoint, &[a]).is_none());
        assert!(engine.destroy_geom(multi));
        assert_eq!(engine.stats().geometries, 0);
    }

    #[test]
    fn test_line_from_seq_takes_ownership() {
        let mut engine = Engine::init();
        let seq = engine
            .create_seq_from_coords(Coords::from_xy([(0.0, 0.0), (1.0, 1.0)]))
            .unwrap();
        let line = engine.create_line_from_seq(seq, false).unwrap();
        assert!(!engine.destroy_seq(seq));
        assert_eq!(engine.geom_coord_seq(line), Some(seq));
        assert!(engine.destroy_geom(line));
        assert_eq!(engine.stats(), crate::types::EngineStats::default());
    }

    #[test]
    fn test_point_n_allocates_root() {
        let mut engine = Engine::init();
        let line = engine
            .create_geom(&Shape::LineString(Coords::from_xy([(0.0, 1.0), (2.0, 3.0)])), 0)
            .unwrap();
        let point = engine.point_n(line, 1).unwrap();
        assert_eq!(engine.get_x(point), Some(2.0));
        assert!(engine.point_n(line, 2).is_none());
        assert_eq!(engine.stats().geometries, 2);
    }
}
