use crate::context::{Context, EngineGuard};
use crate::engine::{Coords, SeqId};
use crate::error::{DESTROYED_COORD_SEQ, DIMENSION_OUT_OF_RANGE, INDEX_OUT_OF_RANGE, fault};
use crate::geometry::Geometry;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flatten `coords` into one buffer. Every coordinate must have the same
/// number of ordinates, 2 to 4.
#[track_caller]
pub(crate) fn coords_from<C: AsRef<[f64]>>(coords: &[C]) -> Coords {
    let Some(first) = coords.first() else {
        return Coords::empty(2);
    };
    let dims = first.as_ref().len();
    if !(2..=4).contains(&dims) {
        fault(DIMENSION_OUT_OF_RANGE);
    }
    let mut flat = Vec::with_capacity(coords.len() * dims);
    for coord in coords {
        let coord = coord.as_ref();
        if coord.len() != dims {
            fault(DIMENSION_OUT_OF_RANGE);
        }
        flat.extend_from_slice(coord);
    }
    Coords {
        dims: dims as u8,
        flat,
    }
}

/// A coordinate sequence: either owned, or a view into a point, line string
/// or linear ring.
///
/// Size and dimensions are cached when the sequence is created; indexes are
/// checked against them before the engine is involved, so an out-of-range
/// write panics without changing anything.
pub struct CoordSeq {
    context: Context,
    handle: SeqId,
    owner: Option<Geometry>,
    live: AtomicBool,
    dims: usize,
    size: usize,
}

impl CoordSeq {
    #[track_caller]
    pub(crate) fn root(context: &Context, engine: &EngineGuard<'_>, handle: SeqId) -> Self {
        Self::with_owner(context.clone(), None, engine, handle)
    }

    #[track_caller]
    pub(crate) fn view(owner: &Geometry, engine: &EngineGuard<'_>, handle: SeqId) -> Self {
        Self::with_owner(owner.context().clone(), Some(owner.clone()), engine, handle)
    }

    #[track_caller]
    fn with_owner(
        context: Context,
        owner: Option<Geometry>,
        engine: &EngineGuard<'_>,
        handle: SeqId,
    ) -> Self {
        let dims = engine.must(engine.seq_dims(handle)) as usize;
        let size = engine.must(engine.seq_size(handle));
        Self {
            context,
            handle,
            owner,
            live: AtomicBool::new(true),
            dims,
            size,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// True when this sequence belongs to a geometry.
    pub fn is_view(&self) -> bool {
        self.owner.is_some()
    }

    #[track_caller]
    pub(crate) fn handle(&self) -> SeqId {
        if !self.live.load(Ordering::Acquire) {
            fault(DESTROYED_COORD_SEQ);
        }
        if let Some(owner) = &self.owner {
            owner.handle();
        }
        self.handle
    }

    /// Mark the native sequence as taken over by a geometry.
    pub(crate) fn release(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dimensions(&self) -> usize {
        self.dims
    }

    #[track_caller]
    fn check(&self, index: usize, dim: usize) -> SeqId {
        let handle = self.handle();
        if index >= self.size {
            fault(INDEX_OUT_OF_RANGE);
        }
        if dim >= self.dims {
            fault(DIMENSION_OUT_OF_RANGE);
        }
        handle
    }

    #[track_caller]
    pub fn ordinate(&self, index: usize, dim: usize) -> f64 {
        let handle = self.check(index, dim);
        let engine = self.context.lock();
        engine.must(engine.seq_get(handle, index, dim))
    }

    #[track_caller]
    pub fn x(&self, index: usize) -> f64 {
        self.ordinate(index, 0)
    }

    #[track_caller]
    pub fn y(&self, index: usize) -> f64 {
        self.ordinate(index, 1)
    }

    #[track_caller]
    pub fn z(&self, index: usize) -> f64 {
        self.ordinate(index, 2)
    }

    #[track_caller]
    pub fn set_ordinate(&mut self, index: usize, dim: usize, value: f64) {
        let handle = self.check(index, dim);
        let mut engine = self.context.lock();
        let updated = engine.seq_set(handle, index, dim, value);
        engine.must_succeed(updated);
    }

    #[track_caller]
    pub fn set_x(&mut self, index: usize, value: f64) {
        self.set_ordinate(index, 0, value);
    }

    #[track_caller]
    pub fn set_y(&mut self, index: usize, value: f64) {
        self.set_ordinate(index, 1, value);
    }

    #[track_caller]
    pub fn set_z(&mut self, index: usize, value: f64) {
        self.set_ordinate(index, 2, value);
    }

    /// Orientation of a ring of at least four coordinates.
    #[track_caller]
    pub fn is_ccw(&self) -> bool {
        let handle = self.handle();
        let engine = self.context.lock();
        engine.must(engine.seq_is_ccw(handle))
    }

    /// Independent copy owned by the caller.
    pub fn clone_seq(&self) -> CoordSeq {
        let handle = self.handle();
        let mut engine = self.context.lock();
        let copy = engine.clone_seq(handle);
        let copy = engine.must(copy);
        CoordSeq::root(&self.context, &engine, copy)
    }

    /// Every coordinate, copied out in one engine call.
    pub fn to_coords(&self) -> Vec<Vec<f64>> {
        let handle = self.handle();
        let coords = {
            let engine = self.context.lock();
            engine.must(engine.seq_coords(handle))
        };
        coords
            .flat
            .chunks_exact(coords.dims as usize)
            .map(<[f64]>::to_vec)
            .collect()
    }

    /// Free an owned sequence now. Calling it again, or on a view, only
    /// invalidates the wrapper.
    pub fn destroy(&self) {
        if !self.live.swap(false, Ordering::AcqRel) || self.owner.is_some() {
            return;
        }
        let mut engine = self.context.lock();
        let destroyed = engine.destroy_seq(self.handle);
        engine.must_succeed(destroyed);
    }
}

impl Drop for CoordSeq {
    fn drop(&mut self) {
        if self.owner.is_some() || !*self.live.get_mut() {
            return;
        }
        let mut engine = self.context.lock();
        if !engine.destroy_seq(self.handle) {
            let message = engine.take_error();
            tracing::warn!(?message, "failed to reclaim coordinate sequence");
        }
    }
}

impl fmt::Debug for CoordSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordSeq")
            .field("size", &self.size)
            .field("dimensions", &self.dims)
            .field("view", &self.is_view())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn test_new_sequence_is_zeroed() {
        let ctx = Context::new();
        let seq = ctx.new_coord_seq(2, 3);
        assert_eq!(seq.size(), 2);
        assert_eq!(seq.dimensions(), 3);
        assert_eq!(seq.to_coords(), vec![vec![0.0; 3], vec![0.0; 3]]);
    }

    #[test]
    fn test_set_and_get() {
        let ctx = Context::new();
        let mut seq = ctx.new_coord_seq_from_coords(&[[0.0, 0.0, 1.0], [1.0, 2.0, 3.0]]);
        seq.set_x(0, 5.0);
        seq.set_y(0, 6.0);
        seq.set_z(1, 9.0);
        assert_eq!(seq.x(0), 5.0);
        assert_eq!(seq.y(0), 6.0);
        assert_eq!(seq.z(0), 1.0);
        assert_eq!(seq.ordinate(1, 2), 9.0);
    }

    #[test]
    fn test_out_of_range_write_changes_nothing() {
        let ctx = Context::new();
        let mut seq = ctx.new_coord_seq_from_coords(&[[1.0, 2.0]]);

        let index = catch_unwind(AssertUnwindSafe(|| seq.set_x(1, 9.0)));
        assert!(index.is_err());
        let dim = catch_unwind(AssertUnwindSafe(|| seq.set_z(0, 9.0)));
        assert!(dim.is_err());

        assert_eq!(seq.to_coords(), vec![vec![1.0, 2.0]]);
    }

    #[test]
    #[should_panic(expected = "dimension out of range")]
    fn test_z_of_2d_sequence() {
        let ctx = Context::new();
        let seq = ctx.new_coord_seq(1, 2);
        seq.z(0);
    }

    #[test]
    #[should_panic(expected = "dimension out of range")]
    fn test_mixed_dimensions_rejected() {
        let ctx = Context::new();
        let coords: Vec<Vec<f64>> = vec![vec![0.0, 0.0], vec![1.0, 1.0, 1.0]];
        ctx.new_coord_seq_from_coords(&coords);
    }

    #[test]
    fn test_view_writes_through() {
        let ctx = Context::new();
        let line = ctx.new_line_string(&[[0.0, 0.0], [1.0, 1.0]]).unwrap();
        let mut seq = line.coord_seq();
        assert!(seq.is_view());
        seq.set_y(1, 5.0);
        assert_eq!(line.to_wkt(), "LINESTRING (0 0, 1 5)");

        drop(seq);
        assert_eq!(ctx.engine_stats().coord_seqs, 0);
        assert_eq!(line.num_points(), 2);
    }

    #[test]
    fn test_clone_is_independent() {
        let ctx = Context::new();
        let line = ctx.new_line_string(&[[0.0, 0.0], [1.0, 1.0]]).unwrap();
        let mut copy = line.coord_seq().clone_seq();
        assert!(!copy.is_view());
        copy.set_x(0, 7.0);
        assert_eq!(line.coord_seq().x(0), 0.0);
        assert_eq!(ctx.engine_stats().coord_seqs, 1);
        copy.destroy();
        copy.destroy();
        assert_eq!(ctx.engine_stats().coord_seqs, 0);
    }

    #[test]
    fn test_orientation() {
        let ctx = Context::new();
        let ccw = ctx.new_coord_seq_from_coords(&[
            [0.0, 0.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.0, 0.0],
        ]);
        assert!(ccw.is_ccw());
    }

    #[test]
    #[should_panic(expected = "destroyed CoordSeq")]
    fn test_destroyed_sequence_faults() {
        let ctx = Context::new();
        let seq = ctx.new_coord_seq(1, 2);
        seq.destroy();
        seq.x(0);
    }
}
