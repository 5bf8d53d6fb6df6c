//! Reference-counted geometry handles.
//!
//! A [`Geometry`] is either a *root*, which owns its native geometry and
//! destroys it exactly once, or a *view* of a component owned by another
//! geometry (a ring of a polygon, a member of a collection). Views keep their
//! owner alive and never free native memory themselves.

use crate::bounds::Bounds;
use crate::bufparams::BufferParams;
use crate::builder::ReclaimedGeometry;
use crate::context::{Context, EngineGuard, LockSet};
use crate::coordseq::CoordSeq;
use crate::engine::{Engine, GeomId, GeomInfo, Overlay, Predicate, Shape};
use crate::error::{CONTEXT_MISMATCH, DESTROYED_GEOMETRY, INDEX_OUT_OF_RANGE, Result, fault};
use crate::prepared::PreparedGeometry;
use crate::types::GeometryTypeId;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

enum Ownership {
    Root,
    View(Geometry),
}

struct GeomInner {
    context: Context,
    handle: GeomId,
    ownership: Ownership,
    live: AtomicBool,
    info: GeomInfo,
}

impl Drop for GeomInner {
    fn drop(&mut self) {
        if !matches!(self.ownership, Ownership::Root) || !*self.live.get_mut() {
            return;
        }
        let context = &self.context.inner;
        if let Some(hook) = &context.hooks.on_geometry_reclaim {
            hook(&ReclaimedGeometry {
                context: context.id(),
                type_id: self.info.type_id,
            });
        }
        let mut engine = context.lock();
        if engine.destroy_geom(self.handle) {
            tracing::trace!(context = %context.id(), type_id = %self.info.type_id, "reclaimed geometry");
        } else {
            let message = engine.take_error();
            tracing::warn!(?message, "failed to reclaim geometry");
        }
    }
}

/// A geometry owned by a [`Context`].
///
/// Cloning shares the same native geometry. Methods taking another geometry
/// accept one from any context.
///
/// # Examples
///
/// ```rust
/// use geoctx::Context;
///
/// # fn main() -> geoctx::Result<()> {
/// let ctx = Context::new();
/// let polygon = ctx.new_geom_from_wkt("POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0), (1 1, 2 1, 2 2, 1 1))")?;
/// assert_eq!(polygon.num_interior_rings(), 1);
///
/// let hole = polygon.interior_ring(0);
/// assert_eq!(hole.to_wkt(), "LINEARRING (1 1, 2 1, 2 2, 1 1)");
/// assert!(hole.parent().is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Geometry {
    inner: Arc<GeomInner>,
}

impl Geometry {
    #[track_caller]
    pub(crate) fn root(context: &Context, engine: &EngineGuard<'_>, handle: GeomId) -> Self {
        let info = engine.must(engine.geom_info(handle));
        Self {
            inner: Arc::new(GeomInner {
                context: context.clone(),
                handle,
                ownership: Ownership::Root,
                live: AtomicBool::new(true),
                info,
            }),
        }
    }

    #[track_caller]
    fn view(&self, engine: &EngineGuard<'_>, handle: GeomId) -> Self {
        let info = engine.must(engine.geom_info(handle));
        Self {
            inner: Arc::new(GeomInner {
                context: self.inner.context.clone(),
                handle,
                ownership: Ownership::View(self.clone()),
                live: AtomicBool::new(true),
                info,
            }),
        }
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// The geometry this one is a component of, if it is a view.
    pub fn parent(&self) -> Option<&Geometry> {
        match &self.inner.ownership {
            Ownership::Root => None,
            Ownership::View(parent) => Some(parent),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.inner.ownership, Ownership::Root)
    }

    /// True once this geometry, or any geometry it is a view of, has been
    /// destroyed.
    pub fn is_destroyed(&self) -> bool {
        if !self.inner.live.load(Ordering::Acquire) {
            return true;
        }
        match &self.inner.ownership {
            Ownership::Root => false,
            Ownership::View(parent) => parent.is_destroyed(),
        }
    }

    #[track_caller]
    pub(crate) fn handle(&self) -> GeomId {
        if self.is_destroyed() {
            fault(DESTROYED_GEOMETRY);
        }
        self.inner.handle
    }

    /// The native handle, or `None` once destroyed.
    pub(crate) fn live_handle(&self) -> Option<GeomId> {
        (!self.is_destroyed()).then_some(self.inner.handle)
    }

    /// Give up native ownership if this is the only reference to a live
    /// root; otherwise hand the wrapper back.
    pub(crate) fn into_handle(self) -> std::result::Result<GeomId, Geometry> {
        if !self.is_root() || self.is_destroyed() {
            return Err(self);
        }
        let handle = self.inner.handle;
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                inner.live.store(false, Ordering::Release);
                Ok(handle)
            }
            Err(inner) => Err(Geometry { inner }),
        }
    }

    /// Free the native geometry now instead of when the last clone is
    /// dropped. Calling it again does nothing.
    ///
    /// Destroying a view only invalidates the view.
    pub fn destroy(&self) {
        if !self.inner.live.swap(false, Ordering::AcqRel) || !self.is_root() {
            return;
        }
        let mut engine = self.inner.context.lock();
        let destroyed = engine.destroy_geom(self.inner.handle);
        engine.must_succeed(destroyed);
        tracing::trace!(context = %self.inner.context.id(), "destroyed geometry");
    }

    #[track_caller]
    fn info(&self) -> &GeomInfo {
        self.handle();
        &self.inner.info
    }

    fn with_engine<T>(&self, f: impl FnOnce(&mut EngineGuard<'_>, GeomId) -> T) -> T {
        let handle = self.handle();
        let mut engine = self.inner.context.lock();
        f(&mut engine, handle)
    }

    /// Run `f` on this geometry's engine with `other` exported as a value.
    /// Both contexts stay locked for the duration.
    fn with_other<T>(
        &self,
        other: &Geometry,
        f: impl FnOnce(&mut EngineGuard<'_>, GeomId, &Shape) -> T,
    ) -> T {
        let handle = self.handle();
        let other_handle = other.handle();
        let mut locks = LockSet::lock([self.context(), other.context()]);
        let shape = {
            let engine = locks.guard(other.context());
            engine.must(engine.export(other_handle))
        };
        f(locks.guard(self.context()), handle, &shape)
    }

    fn derive(&self, f: impl FnOnce(&mut Engine, GeomId) -> Option<GeomId>) -> Geometry {
        self.with_engine(|engine, handle| {
            let derived = f(&mut **engine, handle);
            let derived = engine.must(derived);
            Geometry::root(self.context(), engine, derived)
        })
    }

    fn try_derive(&self, f: impl FnOnce(&mut Engine, GeomId) -> Option<GeomId>) -> Result<Geometry> {
        self.with_engine(|engine, handle| {
            let derived = f(&mut **engine, handle);
            let derived = engine.recover(derived)?;
            Ok(Geometry::root(self.context(), engine, derived))
        })
    }

    fn predicate(&self, other: &Geometry, predicate: Predicate) -> bool {
        self.with_other(other, |engine, handle, shape| {
            engine.must(engine.predicate(handle, shape, predicate))
        })
    }

    fn overlay(&self, other: &Geometry, op: Overlay) -> Result<Geometry> {
        self.with_other(other, |engine, handle, shape| {
            let derived = engine.overlay(handle, shape, op);
            let derived = engine.recover(derived)?;
            Ok(Geometry::root(self.context(), engine, derived))
        })
    }

    // Cached metadata, read without locking.

    pub fn type_id(&self) -> GeometryTypeId {
        self.info().type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.info().type_id.name()
    }

    /// Members of a collection; 1 for any other geometry.
    pub fn num_geometries(&self) -> usize {
        self.info().num_geometries
    }

    pub fn num_interior_rings(&self) -> usize {
        self.info().num_interior_rings
    }

    /// Vertices of a line string or linear ring; 0 for other types.
    pub fn num_points(&self) -> usize {
        self.info().num_points
    }

    // Views

    /// View of the `n`th member.
    #[track_caller]
    pub fn geometry(&self, n: usize) -> Geometry {
        if n >= self.num_geometries() {
            fault(INDEX_OUT_OF_RANGE);
        }
        self.with_engine(|engine, handle| {
            let member = engine.geometry_n(handle, n);
            let member = engine.must(member);
            self.view(engine, member)
        })
    }

    /// View of a polygon's shell.
    #[track_caller]
    pub fn exterior_ring(&self) -> Geometry {
        self.with_engine(|engine, handle| {
            let ring = engine.exterior_ring(handle);
            let ring = engine.must(ring);
            self.view(engine, ring)
        })
    }

    /// View of a polygon's `n`th hole.
    #[track_caller]
    pub fn interior_ring(&self, n: usize) -> Geometry {
        if n >= self.num_interior_rings() {
            fault(INDEX_OUT_OF_RANGE);
        }
        self.with_engine(|engine, handle| {
            let ring = engine.interior_ring_n(handle, n);
            let ring = engine.must(ring);
            self.view(engine, ring)
        })
    }

    /// View of the coordinates of a point, line string or linear ring.
    /// Writes through it change this geometry in place, and every clone and
    /// view of it. A [`PreparedGeometry`] built earlier keeps answering for
    /// the old coordinates; prepare again after editing.
    pub fn coord_seq(&self) -> CoordSeq {
        self.with_engine(|engine, handle| {
            let seq = engine.geom_coord_seq(handle);
            let seq = engine.must(seq);
            CoordSeq::view(self, engine, seq)
        })
    }

    /// New point at the `n`th vertex of a line.
    #[track_caller]
    pub fn point(&self, n: usize) -> Geometry {
        if n >= self.num_points() {
            fault(INDEX_OUT_OF_RANGE);
        }
        self.derive(|engine, handle| engine.point_n(handle, n))
    }

    // Derived roots

    pub fn clone_geom(&self) -> Geometry {
        self.derive(|engine, handle| engine.clone_geom(handle))
    }

    pub fn envelope(&self) -> Geometry {
        self.derive(|engine, handle| engine.envelope(handle))
    }

    pub fn convex_hull(&self) -> Geometry {
        self.derive(|engine, handle| engine.convex_hull(handle))
    }

    pub fn centroid(&self) -> Geometry {
        self.derive(|engine, handle| engine.centroid(handle))
    }

    pub fn unary_union(&self) -> Geometry {
        self.derive(|engine, handle| engine.unary_union(handle))
    }

    /// Buffer by `width` with round caps and joins, using the context's
    /// configured quadrant segments.
    pub fn buffer(&self, width: f64) -> Result<Geometry> {
        let segments = self.context().config().buffer_quadrant_segments;
        self.try_derive(|engine, handle| engine.buffer(handle, width, segments))
    }

    #[track_caller]
    pub fn buffer_with_params(&self, params: &BufferParams, width: f64) -> Result<Geometry> {
        if params.context() != self.context() {
            fault(CONTEXT_MISMATCH);
        }
        let params = params.handle();
        self.try_derive(|engine, handle| engine.buffer_with_params(handle, params, width))
    }

    /// Insert vertices so that no segment is longer than `tolerance`.
    pub fn densify(&self, tolerance: f64) -> Result<Geometry> {
        self.try_derive(|engine, handle| engine.densify(handle, tolerance))
    }

    pub fn intersection(&self, other: &Geometry) -> Result<Geometry> {
        self.overlay(other, Overlay::Intersection)
    }

    pub fn union(&self, other: &Geometry) -> Result<Geometry> {
        self.overlay(other, Overlay::Union)
    }

    pub fn difference(&self, other: &Geometry) -> Result<Geometry> {
        self.overlay(other, Overlay::Difference)
    }

    pub fn sym_difference(&self, other: &Geometry) -> Result<Geometry> {
        self.overlay(other, Overlay::SymDifference)
    }

    /// Rewrite into normal form in place.
    pub fn normalize(&self) -> &Self {
        self.with_engine(|engine, handle| {
            let normalized = engine.normalize(handle);
            engine.must_succeed(normalized);
        });
        self
    }

    /// Snapshot for repeated predicates. Later edits through
    /// [`Geometry::coord_seq`] are not seen by it.
    pub fn prepare(&self) -> PreparedGeometry {
        PreparedGeometry::new(self)
    }

    // Predicates

    pub fn contains(&self, other: &Geometry) -> bool {
        self.predicate(other, Predicate::Contains)
    }

    pub fn covered_by(&self, other: &Geometry) -> bool {
        self.predicate(other, Predicate::CoveredBy)
    }

    pub fn covers(&self, other: &Geometry) -> bool {
        self.predicate(other, Predicate::Covers)
    }

    pub fn crosses(&self, other: &Geometry) -> bool {
        self.predicate(other, Predicate::Crosses)
    }

    pub fn disjoint(&self, other: &Geometry) -> bool {
        self.predicate(other, Predicate::Disjoint)
    }

    /// Topological equality.
    pub fn equals(&self, other: &Geometry) -> bool {
        self.predicate(other, Predicate::Equals)
    }

    /// Same structure with every vertex within `tolerance`.
    pub fn equals_exact(&self, other: &Geometry, tolerance: f64) -> bool {
        self.with_other(other, |engine, handle, shape| {
            engine.must(engine.equals_exact(handle, shape, tolerance))
        })
    }

    pub fn intersects(&self, other: &Geometry) -> bool {
        self.predicate(other, Predicate::Intersects)
    }

    pub fn overlaps(&self, other: &Geometry) -> bool {
        self.predicate(other, Predicate::Overlaps)
    }

    pub fn touches(&self, other: &Geometry) -> bool {
        self.predicate(other, Predicate::Touches)
    }

    pub fn within(&self, other: &Geometry) -> bool {
        self.predicate(other, Predicate::Within)
    }

    /// DE-9IM intersection matrix, e.g. `"FF2F11212"`.
    pub fn relate(&self, other: &Geometry) -> String {
        self.with_other(other, |engine, handle, shape| {
            engine.must(engine.relate(handle, shape))
        })
    }

    #[track_caller]
    pub fn relate_pattern(&self, other: &Geometry, pattern: &str) -> bool {
        self.with_other(other, |engine, handle, shape| {
            engine.must(engine.relate_pattern(handle, shape, pattern))
        })
    }

    // Measures

    pub fn distance(&self, other: &Geometry) -> f64 {
        self.with_other(other, |engine, handle, shape| {
            engine.must(engine.distance(handle, shape))
        })
    }

    /// True when the geometries come within `distance` of each other. Always
    /// false when either is empty.
    pub fn distance_within(&self, other: &Geometry, distance: f64) -> bool {
        match self.nearest_points(other) {
            Some([p, q]) => (p[0] - q[0]).hypot(p[1] - q[1]) <= distance,
            None => false,
        }
    }

    /// Closest point on `self` and on `other`, `None` if either is empty.
    pub fn nearest_points(&self, other: &Geometry) -> Option<[[f64; 2]; 2]> {
        let points = self.with_other(other, |engine, handle, shape| {
            engine.must(engine.nearest_points(handle, shape))
        });
        points.map(|[p, q]| [[p.0, p.1], [q.0, q.1]])
    }

    pub fn area(&self) -> f64 {
        self.with_engine(|engine, handle| engine.must(engine.area(handle)))
    }

    pub fn length(&self) -> f64 {
        self.with_engine(|engine, handle| engine.must(engine.length(handle)))
    }

    /// Bounding box, [`Bounds::empty`] for an empty geometry.
    pub fn bounds(&self) -> Bounds {
        self.with_engine(|engine, handle| Bounds::from_array(engine.must(engine.bounds(handle))))
    }

    // Accessors

    pub fn is_empty(&self) -> bool {
        self.with_engine(|engine, handle| engine.must(engine.is_empty(handle)))
    }

    /// Only defined for line strings, linear rings and their collections.
    #[track_caller]
    pub fn is_closed(&self) -> bool {
        self.with_engine(|engine, handle| engine.must(engine.is_closed(handle)))
    }

    pub fn is_valid(&self) -> bool {
        self.with_engine(|engine, handle| engine.must(engine.is_valid(handle)))
    }

    /// `"Valid Geometry"`, or a description of the first problem found.
    pub fn is_valid_reason(&self) -> String {
        self.with_engine(|engine, handle| engine.must(engine.is_valid_reason(handle)))
    }

    /// X of a non-empty point.
    #[track_caller]
    pub fn x(&self) -> f64 {
        self.with_engine(|engine, handle| engine.must(engine.get_x(handle)))
    }

    /// Y of a non-empty point.
    #[track_caller]
    pub fn y(&self) -> f64 {
        self.with_engine(|engine, handle| engine.must(engine.get_y(handle)))
    }

    pub fn srid(&self) -> i32 {
        self.with_engine(|engine, handle| engine.must(engine.srid(handle)))
    }

    pub fn set_srid(&self, srid: i32) -> &Self {
        self.with_engine(|engine, handle| {
            let updated = engine.set_srid(handle, srid);
            engine.must_succeed(updated);
        });
        self
    }

    // Serialization

    /// Well-known text using the context's WKT settings.
    pub fn to_wkt(&self) -> String {
        self.with_engine(|engine, handle| {
            let writer = engine.wkt_writer();
            engine.must(engine.wkt_write(writer, handle))
        })
    }

    /// Well-known binary using the context's WKB settings.
    pub fn to_wkb(&self) -> Vec<u8> {
        self.with_engine(|engine, handle| {
            let writer = engine.wkb_writer();
            engine.must(engine.wkb_write(writer, handle))
        })
    }

    /// Extended WKB with the SRID embedded, regardless of configuration.
    pub fn to_ewkb_with_srid(&self) -> Vec<u8> {
        self.with_engine(|engine, handle| {
            let writer = engine.ewkb_writer();
            engine.must(engine.wkb_write(writer, handle))
        })
    }

    #[cfg(feature = "geojson")]
    pub(crate) fn geojson_geometry(&self) -> ::geojson::Geometry {
        self.with_engine(|engine, handle| {
            let writer = engine.geojson_writer();
            let geometry = engine.geojson_geometry(writer, handle);
            engine.must(geometry)
        })
    }

    /// GeoJSON geometry object. `None` uses the configured indent, `Some(0)`
    /// forces compact output.
    #[cfg(feature = "geojson")]
    pub fn to_geojson(&self, indent: Option<usize>) -> String {
        self.with_engine(|engine, handle| {
            let indent = indent.or(engine.config().geojson_indent);
            let writer = engine.geojson_writer();
            engine.must(engine.geojson_write(writer, handle, indent))
        })
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wkt())
    }
}

impl fmt::Debug for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Geometry")
            .field("type_id", &self.inner.info.type_id)
            .field("context", &self.inner.context.id())
            .field("root", &self.is_root())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
