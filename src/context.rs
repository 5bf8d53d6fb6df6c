//! Contexts: one engine instance behind one lock.
//!
//! Every wrapper type holds a [`Context`] clone, so the engine lives until the
//! last geometry, sequence, index or writer created from it is gone. All engine
//! calls go through an [`EngineGuard`], which clears the error slot when the
//! lock is taken and turns sentinel returns into faults or errors before the
//! lock is released.

use crate::bounds::Bounds;
use crate::bufparams::BufferParams;
use crate::builder::{ContextBuilder, Hooks};
use crate::codec::{WkbWriter, WktWriter};
use crate::coordseq::{CoordSeq, coords_from};
use crate::engine::{CodecId, Engine, GeomId, WkbSettings, WktSettings};
use crate::error::{
    CONTEXT_MISMATCH, DESTROYED_GEOMETRY, DIMENSION_OUT_OF_RANGE, Error, Format, Result,
    engine_fault, fault,
};
#[cfg(feature = "geojson")]
use crate::feature::{Feature, FeatureCollection};
use crate::geometry::Geometry;
use crate::strtree::STRtree;
use crate::types::{ByteOrder, Config, EngineStats, GeometryTypeId, WkbFlavor};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use std::fmt;
use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use uuid::Uuid;

/// Converters built on first use, at most once per context.
#[derive(Default)]
struct Converters {
    wkt_reader: OnceCell<CodecId>,
    wkt_writer: OnceCell<CodecId>,
    wkb_reader: OnceCell<CodecId>,
    wkb_writer: OnceCell<CodecId>,
    ewkb_writer: OnceCell<CodecId>,
    #[cfg(feature = "geojson")]
    geojson_reader: OnceCell<CodecId>,
    #[cfg(feature = "geojson")]
    geojson_writer: OnceCell<CodecId>,
}

impl Converters {
    fn built(&self) -> impl Iterator<Item = CodecId> + '_ {
        let cells = [
            &self.wkt_reader,
            &self.wkt_writer,
            &self.wkb_reader,
            &self.wkb_writer,
            &self.ewkb_writer,
            #[cfg(feature = "geojson")]
            &self.geojson_reader,
            #[cfg(feature = "geojson")]
            &self.geojson_writer,
        ];
        cells.into_iter().filter_map(|cell| cell.get().copied())
    }
}

pub(crate) struct ContextInner {
    id: Uuid,
    engine: Mutex<Engine>,
    /// Last message reported by the engine since the lock was taken.
    error: Arc<Mutex<Option<String>>>,
    config: Config,
    pub(crate) hooks: Hooks,
    converters: Converters,
}

impl ContextInner {
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn lock(&self) -> EngineGuard<'_> {
        let engine = self.engine.lock();
        self.error.lock().take();
        EngineGuard {
            context: self,
            engine,
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let engine = self.engine.get_mut();
        for codec in self.converters.built() {
            engine.destroy_codec(codec);
        }
        let stats = std::mem::replace(engine, Engine::init()).finish();
        tracing::debug!(context = %self.id, ?stats, "finished engine");
        if let Some(hook) = &self.hooks.on_finish {
            hook(&stats);
        }
    }
}

/// Exclusive access to a context's engine.
pub(crate) struct EngineGuard<'a> {
    context: &'a ContextInner,
    engine: MutexGuard<'a, Engine>,
}

impl<'a> EngineGuard<'a> {
    pub(crate) fn context_id(&self) -> Uuid {
        self.context.id
    }

    pub(crate) fn config(&self) -> &'a Config {
        &self.context.config
    }

    /// Take the message left by the last failed call.
    pub(crate) fn take_error(&self) -> Option<String> {
        self.context.error.lock().take()
    }

    /// Unwrap the result of a call that is not expected to fail.
    #[track_caller]
    pub(crate) fn must<T>(&self, value: Option<T>) -> T {
        match value {
            Some(value) => value,
            None => engine_fault(self.take_error()),
        }
    }

    #[track_caller]
    pub(crate) fn must_succeed(&self, ok: bool) {
        if !ok {
            engine_fault(self.take_error());
        }
    }

    /// Turn a failed call into [`Error::Engine`].
    pub(crate) fn recover<T>(&self, value: Option<T>) -> Result<T> {
        value.ok_or_else(|| {
            Error::Engine(
                self.take_error()
                    .unwrap_or_else(|| "unknown engine error".to_string()),
            )
        })
    }

    /// Turn a failed read into [`Error::Parse`].
    pub(crate) fn parsed<T>(&self, value: Option<T>, format: Format) -> Result<T> {
        value.ok_or_else(|| Error::Parse {
            format,
            message: self
                .take_error()
                .unwrap_or_else(|| "unknown parse error".to_string()),
        })
    }

    pub(crate) fn wkt_reader(&mut self) -> CodecId {
        let context = self.context;
        *context
            .converters
            .wkt_reader
            .get_or_init(|| self.engine.create_wkt_reader())
    }

    pub(crate) fn wkt_writer(&mut self) -> CodecId {
        let context = self.context;
        *context.converters.wkt_writer.get_or_init(|| {
            self.engine
                .create_wkt_writer(wkt_settings(&context.config))
        })
    }

    pub(crate) fn wkb_reader(&mut self) -> CodecId {
        let context = self.context;
        *context
            .converters
            .wkb_reader
            .get_or_init(|| self.engine.create_wkb_reader())
    }

    pub(crate) fn wkb_writer(&mut self) -> CodecId {
        let context = self.context;
        *context.converters.wkb_writer.get_or_init(|| {
            self.engine
                .create_wkb_writer(wkb_settings(&context.config))
        })
    }

    /// Extended little-endian WKB carrying the SRID, used to move geometries
    /// between contexts.
    pub(crate) fn ewkb_writer(&mut self) -> CodecId {
        let context = self.context;
        *context.converters.ewkb_writer.get_or_init(|| {
            self.engine.create_wkb_writer(WkbSettings {
                flavor: WkbFlavor::Extended,
                byte_order: ByteOrder::LittleEndian,
                include_srid: true,
                output_dimension: 4,
            })
        })
    }

    #[cfg(feature = "geojson")]
    pub(crate) fn geojson_reader(&mut self) -> CodecId {
        let context = self.context;
        *context
            .converters
            .geojson_reader
            .get_or_init(|| self.engine.create_geojson_reader())
    }

    #[cfg(feature = "geojson")]
    pub(crate) fn geojson_writer(&mut self) -> CodecId {
        let context = self.context;
        *context
            .converters
            .geojson_writer
            .get_or_init(|| self.engine.create_geojson_writer())
    }
}

impl Deref for EngineGuard<'_> {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        &self.engine
    }
}

impl DerefMut for EngineGuard<'_> {
    fn deref_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}

pub(crate) fn wkt_settings(config: &Config) -> WktSettings {
    WktSettings {
        output_dimension: config.wkt_output_dimension,
        trim: config.wkt_trim,
        rounding_precision: config.wkt_rounding_precision,
    }
}

pub(crate) fn wkb_settings(config: &Config) -> WkbSettings {
    WkbSettings {
        flavor: config.wkb_flavor,
        byte_order: config.wkb_byte_order,
        include_srid: config.wkb_include_srid,
        output_dimension: 4,
    }
}

/// Locks held on several contexts at once.
///
/// Contexts are locked in ascending id order and released in the reverse
/// order, so two threads locking the same pair can never deadlock.
pub(crate) struct LockSet<'a> {
    guards: SmallVec<[EngineGuard<'a>; 2]>,
}

impl<'a> LockSet<'a> {
    pub(crate) fn lock<I>(contexts: I) -> Self
    where
        I: IntoIterator<Item = &'a Context>,
    {
        let mut inners: SmallVec<[&'a ContextInner; 2]> =
            contexts.into_iter().map(|c| &*c.inner).collect();
        inners.sort_by_key(|inner| inner.id);
        inners.dedup_by_key(|inner| inner.id);
        Self {
            guards: inners.into_iter().map(ContextInner::lock).collect(),
        }
    }

    #[track_caller]
    pub(crate) fn guard(&mut self, context: &Context) -> &mut EngineGuard<'a> {
        let id = context.inner.id;
        match self.guards.iter_mut().find(|guard| guard.context.id == id) {
            Some(guard) => guard,
            None => fault(CONTEXT_MISMATCH),
        }
    }
}

impl Drop for LockSet<'_> {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

/// Handle to one engine instance.
///
/// Cloning is cheap and shares the instance. The engine is finalized when the
/// last clone, and every object created from it, has been dropped.
///
/// ```rust
/// use geoctx::Context;
///
/// # fn main() -> geoctx::Result<()> {
/// let ctx = Context::new();
/// let a = ctx.new_geom_from_wkt("POLYGON ((0 0, 2 0, 2 2, 0 2, 0 0))")?;
/// let b = ctx.new_point_from_xy(1.0, 1.0);
/// assert!(a.contains(&b));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Arc<ContextInner>,
}

impl Context {
    /// Create a context with the default configuration.
    pub fn new() -> Self {
        Self::from_parts(Config::default(), Hooks::default())
    }

    /// Create a context with a validated configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        ContextBuilder::new().config(config).build()
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub(crate) fn from_parts(config: Config, hooks: Hooks) -> Self {
        let error = Arc::new(Mutex::new(None));
        let slot = error.clone();
        let mut engine = Engine::init();
        engine.set_error_handler(Box::new(move |message: &str| {
            *slot.lock() = Some(message.to_string());
        }));
        let id = Uuid::new_v4();
        tracing::debug!(context = %id, "created context");
        Self {
            inner: Arc::new(ContextInner {
                id,
                engine: Mutex::new(engine),
                error,
                config,
                hooks,
                converters: Converters::default(),
            }),
        }
    }

    /// Unique id, also the context's position in the lock order.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Number of handles sharing the engine: context clones plus every live
    /// object created from it.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Live native handles per kind, converters included.
    pub fn engine_stats(&self) -> EngineStats {
        self.inner.lock().stats()
    }

    pub(crate) fn lock(&self) -> EngineGuard<'_> {
        self.inner.lock()
    }

    /// Parse well-known text.
    pub fn new_geom_from_wkt(&self, wkt: &str) -> Result<Geometry> {
        let mut engine = self.lock();
        let reader = engine.wkt_reader();
        let handle = engine.wkt_read(reader, wkt);
        let handle = engine.parsed(handle, Format::Wkt)?;
        Ok(Geometry::root(self, &engine, handle))
    }

    /// Parse ISO or extended WKB; an embedded SRID is applied.
    pub fn new_geom_from_wkb(&self, wkb: &[u8]) -> Result<Geometry> {
        let mut engine = self.lock();
        let reader = engine.wkb_reader();
        let handle = engine.wkb_read(reader, wkb);
        let handle = engine.parsed(handle, Format::Wkb)?;
        Ok(Geometry::root(self, &engine, handle))
    }

    /// Parse a GeoJSON geometry, feature or feature collection.
    #[cfg(feature = "geojson")]
    pub fn new_geom_from_geojson(&self, geojson: &str) -> Result<Geometry> {
        let mut engine = self.lock();
        let reader = engine.geojson_reader();
        let handle = engine.geojson_read(reader, geojson);
        let handle = engine.parsed(handle, Format::GeoJson)?;
        Ok(Geometry::root(self, &engine, handle))
    }

    /// Parse a GeoJSON feature collection, a single feature or a bare
    /// geometry into features owned by this context.
    #[cfg(feature = "geojson")]
    pub fn new_features_from_geojson(&self, geojson: &str) -> Result<FeatureCollection> {
        let mut engine = self.lock();
        let reader = engine.geojson_reader();
        let records = engine.geojson_read_features(reader, geojson);
        let records = engine.parsed(records, Format::GeoJson)?;
        let features = records
            .into_iter()
            .map(|record| Feature {
                id: record.id,
                properties: record.properties,
                geometry: record
                    .geometry
                    .map(|handle| Geometry::root(self, &engine, handle)),
            })
            .collect();
        Ok(features)
    }

    /// Deep copy of `geom` owned by this context.
    ///
    /// A geometry from another context is written as extended WKB there and
    /// read back here; the two locks are never held together.
    pub fn clone_geom(&self, geom: &Geometry) -> Geometry {
        if geom.context() == self {
            return geom.clone_geom();
        }
        let ewkb = geom.to_ewkb_with_srid();
        let mut engine = self.lock();
        let reader = engine.wkb_reader();
        let handle = engine.wkb_read(reader, &ewkb);
        let handle = engine.must(handle);
        Geometry::root(self, &engine, handle)
    }

    /// Polygons formed from the linework of `geoms`, which may belong to any
    /// context.
    pub fn polygonize(&self, geoms: &[&Geometry]) -> Geometry {
        self.polygonize_impl(geoms, false)
    }

    /// Like [`polygonize`](Self::polygonize), keeping only polygons that are
    /// valid together.
    pub fn polygonize_valid(&self, geoms: &[&Geometry]) -> Geometry {
        self.polygonize_impl(geoms, true)
    }

    fn polygonize_impl(&self, geoms: &[&Geometry], valid_only: bool) -> Geometry {
        let handles: Vec<GeomId> = geoms.iter().map(|g| g.handle()).collect();
        let mut locks =
            LockSet::lock(std::iter::once(self).chain(geoms.iter().map(|g| g.context())));
        let mut shapes = Vec::with_capacity(geoms.len());
        for (geom, handle) in geoms.iter().zip(&handles) {
            let engine = locks.guard(geom.context());
            shapes.push(engine.must(engine.export(*handle)));
        }
        let engine = locks.guard(self);
        let handle = engine.polygonize(&shapes, valid_only);
        let handle = engine.must(handle);
        Geometry::root(self, engine, handle)
    }

    /// Point from 2, 3 or 4 ordinates.
    #[track_caller]
    pub fn new_point(&self, coord: &[f64]) -> Geometry {
        let coords = coords_from(&[coord]);
        let mut engine = self.lock();
        let handle = engine.create_geom(&crate::engine::Shape::Point(coords), 0);
        let handle = engine.must(handle);
        Geometry::root(self, &engine, handle)
    }

    pub fn new_point_from_xy(&self, x: f64, y: f64) -> Geometry {
        self.new_point(&[x, y])
    }

    /// One point per coordinate, created under a single lock.
    #[track_caller]
    pub fn new_points<C: AsRef<[f64]>>(&self, coords: &[C]) -> Vec<Geometry> {
        let shapes: Vec<_> = coords
            .iter()
            .map(|c| crate::engine::Shape::Point(coords_from(std::slice::from_ref(c))))
            .collect();
        let mut engine = self.lock();
        shapes
            .iter()
            .map(|shape| {
                let handle = engine.create_geom(shape, 0);
                let handle = engine.must(handle);
                Geometry::root(self, &engine, handle)
            })
            .collect()
    }

    /// Line string through `coords`; a single coordinate is rejected.
    #[track_caller]
    pub fn new_line_string<C: AsRef<[f64]>>(&self, coords: &[C]) -> Result<Geometry> {
        self.create(crate::engine::Shape::LineString(coords_from(coords)))
    }

    /// Closed ring through `coords`, at least four coordinates.
    #[track_caller]
    pub fn new_linear_ring<C: AsRef<[f64]>>(&self, coords: &[C]) -> Result<Geometry> {
        self.create(crate::engine::Shape::LinearRing(coords_from(coords)))
    }

    /// Polygon from a shell followed by its holes.
    #[track_caller]
    pub fn new_polygon<C, R>(&self, rings: &[R]) -> Result<Geometry>
    where
        C: AsRef<[f64]>,
        R: AsRef<[C]>,
    {
        let rings = rings.iter().map(|ring| coords_from(ring.as_ref())).collect();
        self.create(crate::engine::Shape::Polygon(rings))
    }

    fn create(&self, shape: crate::engine::Shape) -> Result<Geometry> {
        let mut engine = self.lock();
        let handle = engine.create_geom(&shape, 0);
        let handle = engine.recover(handle)?;
        Ok(Geometry::root(self, &engine, handle))
    }

    /// Collection taking ownership of `geoms`.
    ///
    /// A root of this context that nothing else shares is moved in as is;
    /// views, shared roots and geometries from other contexts are copied.
    /// Afterwards the members are reachable as views through
    /// [`Geometry::geometry`].
    #[track_caller]
    pub fn new_collection(&self, type_id: GeometryTypeId, geoms: Vec<Geometry>) -> Result<Geometry> {
        // Foreign members are serialized before our lock is taken. Nothing
        // below may fault while the lock is held: an unwinding member would
        // take it again on drop.
        let mut members = Vec::with_capacity(geoms.len());
        for geom in geoms {
            if geom.context() == self {
                geom.handle();
                members.push(Member::Local(geom));
            } else {
                members.push(Member::Foreign(geom.to_ewkb_with_srid()));
            }
        }

        let mut keep = Vec::new();
        let mut destroyed = false;
        let mut engine = self.lock();
        let mut handles = Vec::with_capacity(members.len());
        let mut failure = None;
        for member in members {
            let handle = match member {
                Member::Local(geom) => match geom.into_handle() {
                    Ok(handle) => Some(handle),
                    Err(geom) => {
                        // destroyed through an alias since the check above
                        let handle = match geom.live_handle() {
                            Some(handle) => engine.clone_geom(handle),
                            None => {
                                destroyed = true;
                                None
                            }
                        };
                        keep.push(geom);
                        handle
                    }
                },
                Member::Foreign(ewkb) => {
                    let reader = engine.wkb_reader();
                    engine.wkb_read(reader, &ewkb)
                }
            };
            match handle {
                Some(handle) => handles.push(handle),
                None if failure.is_none() && !destroyed => {
                    failure = engine.recover::<GeomId>(None).err()
                }
                None => {}
            }
        }
        let result = match failure {
            None if !destroyed => {
                let collection = engine.create_collection(type_id, &handles);
                engine.recover(collection)
            }
            Some(err) => Err(err),
            None => Err(Error::Engine(DESTROYED_GEOMETRY.to_string())),
        };
        let result = match result {
            Ok(handle) => Ok(Geometry::root(self, &engine, handle)),
            Err(err) => {
                for handle in handles {
                    engine.destroy_geom(handle);
                }
                Err(err)
            }
        };
        drop(engine);
        drop(keep);
        if destroyed {
            fault(DESTROYED_GEOMETRY);
        }
        result
    }

    pub fn new_empty_point(&self) -> Geometry {
        self.new_empty(GeometryTypeId::Point)
    }

    pub fn new_empty_line_string(&self) -> Geometry {
        self.new_empty(GeometryTypeId::LineString)
    }

    pub fn new_empty_polygon(&self) -> Geometry {
        self.new_empty(GeometryTypeId::Polygon)
    }

    /// Empty collection of the given collection type.
    #[track_caller]
    pub fn new_empty_collection(&self, type_id: GeometryTypeId) -> Geometry {
        let mut engine = self.lock();
        let handle = engine.create_collection(type_id, &[]);
        let handle = engine.must(handle);
        Geometry::root(self, &engine, handle)
    }

    fn new_empty(&self, type_id: GeometryTypeId) -> Geometry {
        let mut engine = self.lock();
        let handle = engine.create_geom(&crate::engine::Shape::empty(type_id), 0);
        let handle = engine.must(handle);
        Geometry::root(self, &engine, handle)
    }

    /// Rectangle covering `bounds`: a point when it is degenerate and an
    /// empty point when it is empty.
    pub fn new_geom_from_bounds(&self, bounds: &Bounds) -> Geometry {
        let shape = crate::engine::bounds_shape([
            bounds.min_x,
            bounds.min_y,
            bounds.max_x,
            bounds.max_y,
        ]);
        let mut engine = self.lock();
        let handle = engine.create_geom(&shape, 0);
        let handle = engine.must(handle);
        Geometry::root(self, &engine, handle)
    }

    /// Line string that takes over `seq`.
    pub fn new_line_string_from_coord_seq(&self, seq: CoordSeq) -> Result<Geometry> {
        self.line_from_coord_seq(seq, false)
    }

    /// Linear ring that takes over `seq`, which must be closed.
    pub fn new_linear_ring_from_coord_seq(&self, seq: CoordSeq) -> Result<Geometry> {
        self.line_from_coord_seq(seq, true)
    }

    #[track_caller]
    fn line_from_coord_seq(&self, seq: CoordSeq, ring: bool) -> Result<Geometry> {
        if seq.context() != self {
            fault(CONTEXT_MISMATCH);
        }
        let source = seq.handle();
        let mut engine = self.lock();
        let (handle, adopted) = if seq.is_view() {
            let copy = engine.clone_seq(source);
            (engine.must(copy), false)
        } else {
            (source, true)
        };
        let line = engine.create_line_from_seq(handle, ring);
        let result = match engine.recover(line) {
            Ok(line) => {
                if adopted {
                    seq.release();
                }
                Ok(Geometry::root(self, &engine, line))
            }
            Err(err) => {
                if !adopted {
                    engine.destroy_seq(handle);
                }
                Err(err)
            }
        };
        drop(engine);
        drop(seq);
        result
    }

    /// Sequence of `size` zeroed coordinates with `dims` ordinates each.
    #[track_caller]
    pub fn new_coord_seq(&self, size: usize, dims: usize) -> CoordSeq {
        if !(2..=4).contains(&dims) {
            fault(DIMENSION_OUT_OF_RANGE);
        }
        let mut engine = self.lock();
        let handle = engine.create_seq(size, dims as u8);
        let handle = engine.must(handle);
        CoordSeq::root(self, &engine, handle)
    }

    /// Sequence holding `coords`, which must all have the same dimension.
    #[track_caller]
    pub fn new_coord_seq_from_coords<C: AsRef<[f64]>>(&self, coords: &[C]) -> CoordSeq {
        let coords = coords_from(coords);
        let mut engine = self.lock();
        let handle = engine.create_seq_from_coords(coords);
        let handle = engine.must(handle);
        CoordSeq::root(self, &engine, handle)
    }

    pub fn new_buffer_params(&self) -> BufferParams {
        BufferParams::new(self)
    }

    /// Empty index with the configured node capacity.
    pub fn new_strtree<V: Clone + Eq + Hash>(&self) -> STRtree<V> {
        let mut engine = self.lock();
        let handle = engine.create_strtree(self.inner.config.strtree_node_capacity);
        let handle = engine.must(handle);
        drop(engine);
        STRtree::new(self, handle)
    }

    /// Empty index; `node_capacity` must be at least 2.
    pub fn new_strtree_with_capacity<V: Clone + Eq + Hash>(
        &self,
        node_capacity: usize,
    ) -> Result<STRtree<V>> {
        let mut engine = self.lock();
        let handle = engine.create_strtree(node_capacity);
        let handle = engine.recover(handle)?;
        drop(engine);
        Ok(STRtree::new(self, handle))
    }

    /// WKT writer starting from the context configuration.
    pub fn new_wkt_writer(&self) -> WktWriter {
        WktWriter::new(self)
    }

    /// WKB writer starting from the context configuration.
    pub fn new_wkb_writer(&self) -> WkbWriter {
        WkbWriter::new(self)
    }

    /// Side of `p` relative to the directed line `a`->`b`: 1 left, -1 right,
    /// 0 collinear.
    pub fn orientation_index(&self, a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> i32 {
        let _engine = self.lock();
        crate::engine::orientation_index((a[0], a[1]), (b[0], b[1]), (p[0], p[1]))
    }

    /// Point where segments `a` and `b` meet, if they do.
    pub fn segment_intersection(&self, a: [[f64; 2]; 2], b: [[f64; 2]; 2]) -> Option<[f64; 2]> {
        let _engine = self.lock();
        crate::engine::segment_intersection(
            [(a[0][0], a[0][1]), (a[1][0], a[1][1])],
            [(b[0][0], b[0][1]), (b[1][0], b[1][1])],
        )
        .map(|(x, y)| [x, y])
    }

    /// Match an intersection matrix such as `"212101212"` against a DE-9IM
    /// pattern such as `"T*F**FFF*"`.
    pub fn relate_pattern_match(&self, matrix: &str, pattern: &str) -> Result<bool> {
        let engine = self.lock();
        let matched = engine.relate_pattern_match(matrix, pattern);
        engine.recover(matched)
    }
}

enum Member {
    Local(Geometry),
    Foreign(Vec<u8>),
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converters_are_built_once() {
        let ctx = Context::new();
        assert_eq!(ctx.engine_stats().codecs, 0);

        let a = ctx.new_geom_from_wkt("POINT (1 2)").unwrap();
        let b = ctx.new_geom_from_wkt("POINT (3 4)").unwrap();
        assert_eq!(ctx.engine_stats().codecs, 1);

        let _ = a.to_wkt();
        let _ = b.to_wkt();
        let _ = a.to_wkb();
        assert_eq!(ctx.engine_stats().codecs, 3);
    }

    #[test]
    fn test_error_slot_is_cleared_between_calls() {
        let ctx = Context::new();
        let err = ctx.new_geom_from_wkt("POINT (1").unwrap_err();
        assert!(matches!(err, Error::Parse { format: Format::Wkt, .. }));

        let engine = ctx.lock();
        assert!(engine.take_error().is_none());
    }

    #[test]
    fn test_lock_set_orders_and_dedups() {
        let a = Context::new();
        let b = Context::new();
        let mut locks = LockSet::lock([&b, &a, &b]);
        assert_eq!(locks.guards.len(), 2);
        assert!(locks.guards[0].context_id() < locks.guards[1].context_id());
        assert_eq!(locks.guard(&a).context_id(), a.id());
    }

    #[test]
    #[should_panic(expected = "context mismatch")]
    fn test_lock_set_rejects_unlocked_context() {
        let a = Context::new();
        let b = Context::new();
        let mut locks = LockSet::lock([&a]);
        locks.guard(&b);
    }

    #[test]
    fn test_ref_count_tracks_dependents() {
        let ctx = Context::new();
        assert_eq!(ctx.ref_count(), 1);
        let point = ctx.new_point_from_xy(0.0, 0.0);
        let clone = ctx.clone();
        assert_eq!(ctx.ref_count(), 3);
        drop(point);
        drop(clone);
        assert_eq!(ctx.ref_count(), 1);
    }

    #[test]
    fn test_orientation_and_segments() {
        let ctx = Context::new();
        assert_eq!(ctx.orientation_index([0.0, 0.0], [1.0, 0.0], [0.0, 1.0]), 1);
        assert_eq!(ctx.orientation_index([0.0, 0.0], [1.0, 0.0], [0.0, -1.0]), -1);
        assert_eq!(ctx.orientation_index([0.0, 0.0], [1.0, 0.0], [2.0, 0.0]), 0);
        assert_eq!(
            ctx.segment_intersection([[0.0, 0.0], [2.0, 2.0]], [[0.0, 2.0], [2.0, 0.0]]),
            Some([1.0, 1.0])
        );
        assert_eq!(
            ctx.segment_intersection([[0.0, 0.0], [1.0, 0.0]], [[0.0, 1.0], [1.0, 1.0]]),
            None
        );
    }

    #[test]
    fn test_relate_pattern_match() {
        let ctx = Context::new();
        assert!(ctx.relate_pattern_match("212101212", "T*T***T**").unwrap());
        assert!(!ctx.relate_pattern_match("FF1FF0102", "T********").unwrap());
        assert!(matches!(
            ctx.relate_pattern_match("bogus", "T********"),
            Err(Error::Engine(_))
        ));
    }

    #[test]
    fn test_collection_adopts_unshared_roots() {
        let ctx = Context::new();
        let a = ctx.new_point_from_xy(0.0, 0.0);
        let b = ctx.new_point_from_xy(1.0, 1.0);
        let shared = b.clone();
        let multi = ctx
            .new_collection(GeometryTypeId::MultiPoint, vec![a, b])
            .unwrap();
        assert_eq!(multi.num_geometries(), 2);
        // `a` moved in, `b` copied because `shared` still refers to it
        assert_eq!(ctx.engine_stats().geometries, 2);
        drop(shared);
        assert_eq!(ctx.engine_stats().geometries, 1);
    }

    #[test]
    fn test_collection_rejects_wrong_member_type() {
        let ctx = Context::new();
        let line = ctx.new_line_string(&[[0.0, 0.0], [1.0, 1.0]]).unwrap();
        let err = ctx
            .new_collection(GeometryTypeId::MultiPoint, vec![line])
            .unwrap_err();
        assert!(matches!(err, Error::Engine(_)));
        assert_eq!(ctx.engine_stats().geometries, 0);
    }
}
