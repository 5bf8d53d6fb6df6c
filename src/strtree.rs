//! STR-packed R-tree keyed by caller values.

use crate::bounds::Bounds;
use crate::builder::ReclaimedIndex;
use crate::context::Context;
use crate::engine::{ItemToken, TreeId};
use crate::error::{CONTEXT_MISMATCH, Error, Result, fault};
use crate::geometry::Geometry;
use rustc_hash::FxHashMap;
use std::fmt;
use std::hash::Hash;

/// Spatial index mapping geometry envelopes to values.
///
/// Each value is stored at most once; the index hands the engine an opaque
/// token per value and maps results back. Callbacks run after the context
/// lock has been released, so they may use geometries of the same context.
///
/// ```rust
/// use geoctx::Context;
///
/// # fn main() -> geoctx::Result<()> {
/// let ctx = Context::new();
/// let mut tree = ctx.new_strtree();
/// tree.insert(&ctx.new_point_from_xy(0.0, 0.0), "origin")?;
/// tree.insert(&ctx.new_point_from_xy(5.0, 5.0), "far")?;
///
/// let window = ctx.new_geom_from_wkt("POLYGON ((-1 -1, 1 -1, 1 1, -1 1, -1 -1))")?;
/// let mut hits = Vec::new();
/// tree.query(&window, |value| hits.push(*value));
/// assert_eq!(hits, vec!["origin"]);
/// # Ok(())
/// # }
/// ```
pub struct STRtree<V: Clone + Eq + Hash> {
    context: Context,
    handle: TreeId,
    values: FxHashMap<V, ItemToken>,
    entries: FxHashMap<ItemToken, V>,
    next_token: u64,
}

impl<V: Clone + Eq + Hash> STRtree<V> {
    pub(crate) fn new(context: &Context, handle: TreeId) -> Self {
        Self {
            context: context.clone(),
            handle,
            values: FxHashMap::default(),
            entries: FxHashMap::default(),
            next_token: 0,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.values.contains_key(value)
    }

    pub fn node_capacity(&self) -> usize {
        let engine = self.context.lock();
        engine.must(engine.strtree_node_capacity(self.handle))
    }

    #[track_caller]
    fn check_context(&self, geom: &Geometry) {
        if geom.context() != &self.context {
            fault(CONTEXT_MISMATCH);
        }
    }

    /// Envelope to index under, `None` for an empty geometry.
    fn envelope(bounds: Bounds) -> Option<[f64; 4]> {
        (!bounds.is_empty()).then(|| bounds.to_array())
    }

    /// Index `value` under the envelope of `geom`.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateValue`] if `value` is already indexed; the tree is
    /// left unchanged.
    #[track_caller]
    pub fn insert(&mut self, geom: &Geometry, value: V) -> Result<()> {
        self.check_context(geom);
        if self.values.contains_key(&value) {
            return Err(Error::DuplicateValue);
        }
        let envelope = Self::envelope(geom.bounds());
        let token = ItemToken(self.next_token);
        {
            let mut engine = self.context.lock();
            let inserted = engine.strtree_insert(self.handle, envelope, token);
            engine.must_succeed(inserted);
        }
        self.next_token += 1;
        self.values.insert(value.clone(), token);
        self.entries.insert(token, value);
        Ok(())
    }

    /// Remove `value`, which must have been inserted with a geometry of the
    /// same envelope. Returns false if it was not found.
    #[track_caller]
    pub fn remove(&mut self, geom: &Geometry, value: &V) -> bool {
        self.check_context(geom);
        let Some(token) = self.values.get(value).copied() else {
            return false;
        };
        let envelope = Self::envelope(geom.bounds());
        let removed = {
            let mut engine = self.context.lock();
            let removed = engine.strtree_remove(self.handle, envelope, token);
            engine.must(removed)
        };
        if removed {
            self.values.remove(value);
            self.entries.remove(&token);
        }
        removed
    }

    /// Call `f` with every value whose envelope intersects that of `geom`,
    /// which may belong to any context.
    pub fn query(&self, geom: &Geometry, mut f: impl FnMut(&V)) {
        let Some(envelope) = Self::envelope(geom.bounds()) else {
            return;
        };
        let tokens = {
            let engine = self.context.lock();
            engine.must(engine.strtree_query(self.handle, envelope))
        };
        for token in tokens {
            if let Some(value) = self.entries.get(&token) {
                f(value);
            }
        }
    }

    /// Call `f` with every indexed value, empty geometries included.
    ///
    /// Some engines keep reporting removed entries from iteration; this one
    /// drops them eagerly, and tokens without a live value are skipped.
    pub fn iterate(&self, mut f: impl FnMut(&V)) {
        let tokens = {
            let engine = self.context.lock();
            engine.must(engine.strtree_iterate(self.handle))
        };
        for token in tokens {
            if let Some(value) = self.entries.get(&token) {
                f(value);
            }
        }
    }

    /// Indexed value closest to `value`, whose geometry is `envelope`.
    ///
    /// Candidates are visited in order of envelope distance and `distance`
    /// is asked for the exact distance from `value` to each; a candidate it
    /// returns `None` for is skipped. The search stops once the remaining
    /// envelopes are farther away than the best exact distance, so
    /// `distance` must never be smaller than the envelope distance. `value`
    /// itself is a candidate if it is indexed.
    #[track_caller]
    pub fn nearest(
        &self,
        value: &V,
        envelope: &Geometry,
        mut distance: impl FnMut(&V, &V) -> Option<f64>,
    ) -> Option<&V> {
        self.check_context(envelope);
        let bounds = Self::envelope(envelope.bounds())?;
        let candidates = {
            let engine = self.context.lock();
            engine.must(engine.strtree_nearest_candidates(self.handle, bounds))
        };
        let mut best: Option<(f64, &V)> = None;
        for (lower_bound, token) in candidates {
            if best.is_some_and(|(d, _)| lower_bound > d) {
                break;
            }
            let Some(candidate) = self.entries.get(&token) else {
                continue;
            };
            let Some(d) = distance(value, candidate) else {
                continue;
            };
            if best.is_none_or(|(best_d, _)| d < best_d) {
                best = Some((d, candidate));
            }
        }
        best.map(|(_, candidate)| candidate)
    }
}

impl<V: Clone + Eq + Hash> Drop for STRtree<V> {
    fn drop(&mut self) {
        let context = self.context.inner.id();
        if let Some(hook) = &self.context.inner.hooks.on_strtree_reclaim {
            hook(&ReclaimedIndex {
                context,
                len: self.entries.len(),
            });
        }
        let mut engine = self.context.lock();
        let indexed = engine.strtree_len(self.handle);
        if engine.destroy_strtree(self.handle) {
            tracing::trace!(%context, ?indexed, "reclaimed STRtree");
        } else {
            let message = engine.take_error();
            tracing::warn!(?message, "failed to reclaim STRtree");
        }
    }
}

impl<V: Clone + Eq + Hash> fmt::Debug for STRtree<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("STRtree")
            .field("context", &self.context.id())
            .field("len", &self.entries.len())
            .finish()
    }
}
