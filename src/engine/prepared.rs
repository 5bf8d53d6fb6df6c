//! Prepared geometries: a cached copy of the source with its bounding box.

use super::convert;
use super::model::Shape;
use super::ops::{self, Predicate};
use super::{Engine, GeomId, PrepId};
use geo::{BoundingRect, Coord, Geometry, Point, Rect, Relate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreparedPredicate {
    Contains,
    ContainsProperly,
    CoveredBy,
    Covers,
    Crosses,
    Disjoint,
    Intersects,
    Overlaps,
    Touches,
    Within,
}

pub(crate) struct PrepNode {
    geometry: Geometry<f64>,
    envelope: Option<Rect<f64>>,
}

fn rects_intersect(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

fn rect_contains(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    outer.min().x <= inner.min().x
        && outer.min().y <= inner.min().y
        && inner.max().x <= outer.max().x
        && inner.max().y <= outer.max().y
}

impl PrepNode {
    fn evaluate(&self, other: &Geometry<f64>, predicate: PreparedPredicate) -> bool {
        let other_envelope = other.bounding_rect();
        // envelope short cuts
        match (predicate, &self.envelope, &other_envelope) {
            (PreparedPredicate::Intersects, Some(a), Some(b)) if !rects_intersect(a, b) => {
                return false;
            }
            (PreparedPredicate::Disjoint, Some(a), Some(b)) if !rects_intersect(a, b) => {
                return true;
            }
            (
                PreparedPredicate::Contains
                | PreparedPredicate::ContainsProperly
                | PreparedPredicate::Covers,
                Some(a),
                Some(b),
            ) if !rect_contains(a, b) => return false,
            _ => {}
        }
        let a = &self.geometry;
        match predicate {
            PreparedPredicate::ContainsProperly => {
                a.relate(other).matches("T**FF*FF*").unwrap_or(false)
            }
            PreparedPredicate::Contains => ops::predicate(a, other, Predicate::Contains),
            PreparedPredicate::CoveredBy => ops::predicate(a, other, Predicate::CoveredBy),
            PreparedPredicate::Covers => ops::predicate(a, other, Predicate::Covers),
            PreparedPredicate::Crosses => ops::predicate(a, other, Predicate::Crosses),
            PreparedPredicate::Disjoint => ops::predicate(a, other, Predicate::Disjoint),
            PreparedPredicate::Intersects => ops::predicate(a, other, Predicate::Intersects),
            PreparedPredicate::Overlaps => ops::predicate(a, other, Predicate::Overlaps),
            PreparedPredicate::Touches => ops::predicate(a, other, Predicate::Touches),
            PreparedPredicate::Within => ops::predicate(a, other, Predicate::Within),
        }
    }
}

impl Engine {
    pub(crate) fn prepare(&mut self, id: GeomId) -> Option<PrepId> {
        let geometry = self.export_geo(id)?;
        let envelope = geometry.bounding_rect();
        Some(PrepId(self.prepared.insert(PrepNode { geometry, envelope })))
    }

    pub(crate) fn destroy_prepared(&mut self, prepared: PrepId) -> bool {
        if self.prepared.remove(prepared.0).is_some() {
            return true;
        }
        self.report("IllegalArgumentException: unknown prepared geometry handle");
        false
    }

    fn prep_node(&self, prepared: PrepId) -> Option<&PrepNode> {
        match self.prepared.get(prepared.0) {
            Some(node) => Some(node),
            None => self.fail("IllegalArgumentException: unknown prepared geometry handle"),
        }
    }

    pub(crate) fn prepared_predicate(
        &self,
        prepared: PrepId,
        other: &Shape,
        predicate: PreparedPredicate,
    ) -> Option<bool> {
        let node = self.prep_node(prepared)?;
        Some(node.evaluate(&convert::to_geo(other), predicate))
    }

    pub(crate) fn prepared_distance_within(
        &self,
        prepared: PrepId,
        other: &Shape,
        distance: f64,
    ) -> Option<bool> {
        let node = self.prep_node(prepared)?;
        let other = convert::to_geo(other);
        Some(match ops::nearest_points(&node.geometry, &other) {
            Some((p, q)) => (p.x - q.x).hypot(p.y - q.y) <= distance,
            None => false,
        })
    }

    pub(crate) fn prepared_nearest_points(
        &self,
        prepared: PrepId,
        other: &Shape,
    ) -> Option<Option<[(f64, f64); 2]>> {
        let node = self.prep_node(prepared)?;
        let other = convert::to_geo(other);
        Some(ops::nearest_points(&node.geometry, &other).map(|(p, q)| [p.x_y(), q.x_y()]))
    }

    pub(crate) fn prepared_xy(
        &self,
        prepared: PrepId,
        x: f64,
        y: f64,
        predicate: PreparedPredicate,
    ) -> Option<bool> {
        let node = self.prep_node(prepared)?;
        let point = Geometry::Point(Point(Coord { x, y }));
        Some(node.evaluate(&point, predicate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::Coords;

    fn unit_square() -> Shape {
        Shape::Polygon(vec![Coords::from_xy([
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 1.0),
            (0.0, 0.0),
        ])])
    }

    #[test]
    fn test_prepared_point_predicates() {
        let mut engine = Engine::init();
        let id = engine.create_geom(&unit_square(), 0).unwrap();
        let prepared = engine.prepare(id).unwrap();
        assert_eq!(
            engine.prepared_xy(prepared, 0.5, 0.5, PreparedPredicate::Contains),
            Some(true)
        );
        assert_eq!(
            engine.prepared_xy(prepared, 1.0, 0.5, PreparedPredicate::Contains),
            Some(false)
        );
        assert_eq!(
            engine.prepared_xy(prepared, 1.0, 0.5, PreparedPredicate::Intersects),
            Some(true)
        );
        assert_eq!(
            engine.prepared_xy(prepared, 5.0, 5.0, PreparedPredicate::Intersects),
            Some(false)
        );
    }

    #[test]
    fn test_contains_properly_excludes_boundary() {
        let mut engine = Engine::init();
        let id = engine.create_geom(&unit_square(), 0).unwrap();
        let prepared = engine.prepare(id).unwrap();
        let touching = Shape::LineString(Coords::from_xy([(0.0, 0.0), (0.5, 0.5)]));
        assert_eq!(
            engine.prepared_predicate(prepared, &touching, PreparedPredicate::Contains),
            Some(true)
        );
        assert_eq!(
            engine.prepared_predicate(prepared, &touching, PreparedPredicate::ContainsProperly),
            Some(false)
        );
    }

    #[test]
    fn test_prepared_survives_source_destruction() {
        let mut engine = Engine::init();
        let id = engine.create_geom(&unit_square(), 0).unwrap();
        let prepared = engine.prepare(id).unwrap();
        engine.destroy_geom(id);
        assert_eq!(
            engine.prepared_distance_within(
                prepared,
                &Shape::Point(Coords::from_xy([(2.0, 0.5)])),
                1.0
            ),
            Some(true)
        );
        assert!(engine.destroy_prepared(prepared));
        assert_eq!(engine.stats(), crate::types::EngineStats::default());
    }
}
