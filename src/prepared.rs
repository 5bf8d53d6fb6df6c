use crate::context::{EngineGuard, LockSet};
use crate::engine::{PrepId, PreparedPredicate, Shape};
use crate::geometry::Geometry;
use std::fmt;

/// A geometry preprocessed for repeated predicate evaluation.
///
/// Keeps its source geometry alive; destroying the source makes every
/// further call panic.
///
/// ```rust
/// use geoctx::Context;
///
/// # fn main() -> geoctx::Result<()> {
/// let ctx = Context::new();
/// let zone = ctx.new_geom_from_wkt("POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0))")?;
/// let prepared = zone.prepare();
///
/// let hits = (0..20)
///     .filter(|i| prepared.contains_xy(*i as f64, 5.0))
///     .count();
/// assert_eq!(hits, 9);
/// # Ok(())
/// # }
/// ```
pub struct PreparedGeometry {
    geometry: Geometry,
    handle: PrepId,
}

impl PreparedGeometry {
    pub(crate) fn new(geometry: &Geometry) -> Self {
        let source = geometry.handle();
        let mut engine = geometry.context().lock();
        let handle = engine.prepare(source);
        let handle = engine.must(handle);
        Self {
            geometry: geometry.clone(),
            handle,
        }
    }

    /// The geometry this was prepared from.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn with_other<T>(
        &self,
        other: &Geometry,
        f: impl FnOnce(&EngineGuard<'_>, PrepId, &Shape) -> T,
    ) -> T {
        self.geometry.handle();
        let other_handle = other.handle();
        let mut locks = LockSet::lock([self.geometry.context(), other.context()]);
        let shape = {
            let engine = locks.guard(other.context());
            engine.must(engine.export(other_handle))
        };
        f(locks.guard(self.geometry.context()), self.handle, &shape)
    }

    fn predicate(&self, other: &Geometry, predicate: PreparedPredicate) -> bool {
        self.with_other(other, |engine, handle, shape| {
            engine.must(engine.prepared_predicate(handle, shape, predicate))
        })
    }

    fn xy(&self, x: f64, y: f64, predicate: PreparedPredicate) -> bool {
        self.geometry.handle();
        let engine = self.geometry.context().lock();
        engine.must(engine.prepared_xy(self.handle, x, y, predicate))
    }

    pub fn contains(&self, other: &Geometry) -> bool {
        self.predicate(other, PreparedPredicate::Contains)
    }

    /// Contains `other` with no boundary contact.
    pub fn contains_properly(&self, other: &Geometry) -> bool {
        self.predicate(other, PreparedPredicate::ContainsProperly)
    }

    pub fn covered_by(&self, other: &Geometry) -> bool {
        self.predicate(other, PreparedPredicate::CoveredBy)
    }

    pub fn covers(&self, other: &Geometry) -> bool {
        self.predicate(other, PreparedPredicate::Covers)
    }

    pub fn crosses(&self, other: &Geometry) -> bool {
        self.predicate(other, PreparedPredicate::Crosses)
    }

    pub fn disjoint(&self, other: &Geometry) -> bool {
        self.predicate(other, PreparedPredicate::Disjoint)
    }

    pub fn intersects(&self, other: &Geometry) -> bool {
        self.predicate(other, PreparedPredicate::Intersects)
    }

    pub fn overlaps(&self, other: &Geometry) -> bool {
        self.predicate(other, PreparedPredicate::Overlaps)
    }

    pub fn touches(&self, other: &Geometry) -> bool {
        self.predicate(other, PreparedPredicate::Touches)
    }

    pub fn within(&self, other: &Geometry) -> bool {
        self.predicate(other, PreparedPredicate::Within)
    }

    pub fn distance_within(&self, other: &Geometry, distance: f64) -> bool {
        self.with_other(other, |engine, handle, shape| {
            engine.must(engine.prepared_distance_within(handle, shape, distance))
        })
    }

    /// Closest points on the prepared geometry and on `other`, `None` if
    /// either is empty.
    pub fn nearest_points(&self, other: &Geometry) -> Option<[[f64; 2]; 2]> {
        let points = self.with_other(other, |engine, handle, shape| {
            engine.must(engine.prepared_nearest_points(handle, shape))
        });
        points.map(|[p, q]| [[p.0, p.1], [q.0, q.1]])
    }

    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        self.xy(x, y, PreparedPredicate::Contains)
    }

    pub fn intersects_xy(&self, x: f64, y: f64) -> bool {
        self.xy(x, y, PreparedPredicate::Intersects)
    }
}

impl Drop for PreparedGeometry {
    fn drop(&mut self) {
        let mut engine = self.geometry.context().lock();
        if !engine.destroy_prepared(self.handle) {
            let message = engine.take_error();
            tracing::warn!(?message, "failed to reclaim prepared geometry");
        }
    }
}

impl fmt::Debug for PreparedGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedGeometry")
            .field("geometry", &self.geometry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::Context;

    #[test]
    fn test_prepared_predicates() {
        let ctx = Context::new();
        let square = ctx
            .new_geom_from_wkt("POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0))")
            .unwrap();
        let prepared = square.prepare();

        let inner = ctx.new_point_from_xy(2.0, 2.0);
        let edge = ctx.new_point_from_xy(4.0, 2.0);
        let outside = ctx.new_point_from_xy(9.0, 9.0);

        assert!(prepared.contains(&inner));
        assert!(prepared.contains_properly(&inner));
        assert!(!prepared.contains_properly(&edge));
        assert!(prepared.covers(&edge));
        assert!(prepared.touches(&edge));
        assert!(prepared.disjoint(&outside));
        assert!(!prepared.intersects(&outside));
        assert!(prepared.intersects_xy(4.0, 4.0));
        assert!(!prepared.contains_xy(4.0, 4.0));
    }

    #[test]
    fn test_prepared_distance() {
        let ctx = Context::new();
        let line = ctx.new_geom_from_wkt("LINESTRING (0 0, 10 0)").unwrap();
        let prepared = line.prepare();
        let point = ctx.new_point_from_xy(5.0, 3.0);
        assert!(prepared.distance_within(&point, 3.0));
        assert!(!prepared.distance_within(&point, 2.0));
        assert_eq!(prepared.nearest_points(&point), Some([[5.0, 0.0], [5.0, 3.0]]));
    }

    #[test]
    fn test_prepared_across_contexts() {
        let ctx1 = Context::new();
        let ctx2 = Context::new();
        let square = ctx1
            .new_geom_from_wkt("POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0))")
            .unwrap();
        let point = ctx2.new_point_from_xy(1.0, 1.0);
        assert!(square.prepare().contains(&point));
    }

    #[test]
    fn test_prepared_keeps_source_alive() {
        let ctx = Context::new();
        let square = ctx
            .new_geom_from_wkt("POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0))")
            .unwrap();
        let prepared = square.prepare();
        drop(square);
        assert_eq!(prepared.geometry().area(), 16.0);
        assert_eq!(ctx.engine_stats().prepared, 1);
        drop(prepared);
        let stats = ctx.engine_stats();
        assert_eq!((stats.prepared, stats.geometries), (0, 0));
    }

    #[test]
    #[should_panic(expected = "destroyed Geometry")]
    fn test_destroyed_source_faults() {
        let ctx = Context::new();
        let point = ctx.new_point_from_xy(0.0, 0.0);
        let prepared = point.prepare();
        point.destroy();
        prepared.contains_xy(0.0, 0.0);
    }
}
