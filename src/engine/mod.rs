//! Bundled native geometry engine.
//!
//! A handle-based, non-reentrant engine in the style of a C geometry library:
//! every resource is created and destroyed explicitly through an [`Engine`]
//! instance, failures are reported by sentinel return values (`None`/`false`)
//! after the message has been passed to the installed error handler, and an
//! instance must never be used from two threads at once. The safe wrappers in
//! the rest of the crate serialize access through the owning context's lock.
//!
//! Geometric algorithms are delegated to `geo`, the spatial index to `rstar`.

pub(crate) mod arena;
mod buffer;
mod convert;
#[cfg(feature = "geojson")]
mod geojson;
mod geom;
pub(crate) mod model;
mod ops;
mod prepared;
mod strtree;
mod wkb;
mod wkt;

use crate::types::{ByteOrder, EngineStats, WkbFlavor};
use arena::{Arena, handle};

use buffer::ParamsNode;
#[cfg(feature = "geojson")]
pub(crate) use geojson::write_json;
pub(crate) use model::{Coords, GeomInfo, Shape};
pub(crate) use ops::{Overlay, Predicate, bounds_shape, orientation_index, segment_intersection};
pub(crate) use prepared::PreparedPredicate;

handle!(
    /// Native geometry handle.
    GeomId
);
handle!(
    /// Native coordinate sequence handle.
    SeqId
);
handle!(
    /// Native prepared geometry handle.
    PrepId
);
handle!(
    /// Native buffer parameters handle.
    ParamsId
);
handle!(
    /// Native STR tree handle.
    TreeId
);
handle!(
    /// Native reader or writer handle.
    CodecId
);

/// Opaque item stored in a native STR tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ItemToken(pub(crate) u64);

/// Receives the message of every failed call.
pub(crate) type ErrorHandler = Box<dyn Fn(&str) + Send>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WktSettings {
    pub(crate) output_dimension: u8,
    pub(crate) trim: bool,
    pub(crate) rounding_precision: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WkbSettings {
    pub(crate) flavor: WkbFlavor,
    pub(crate) byte_order: ByteOrder,
    pub(crate) include_srid: bool,
    pub(crate) output_dimension: u8,
}

pub(crate) enum CodecNode {
    WktReader,
    WktWriter(WktSettings),
    WkbReader,
    WkbWriter(WkbSettings),
    #[cfg(feature = "geojson")]
    GeoJsonReader,
    #[cfg(feature = "geojson")]
    GeoJsonWriter,
}

pub(crate) struct Engine {
    geoms: Arena<model::GeomNode>,
    seqs: Arena<model::SeqNode>,
    prepared: Arena<prepared::PrepNode>,
    params: Arena<ParamsNode>,
    trees: Arena<strtree::TreeNode>,
    codecs: Arena<CodecNode>,
    handler: Option<ErrorHandler>,
}

impl Engine {
    pub(crate) fn init() -> Self {
        Self {
            geoms: Arena::new(),
            seqs: Arena::new(),
            prepared: Arena::new(),
            params: Arena::new(),
            trees: Arena::new(),
            codecs: Arena::new(),
            handler: None,
        }
    }

    pub(crate) fn set_error_handler(&mut self, handler: ErrorHandler) {
        self.handler = Some(handler);
    }

    /// Tear the instance down. Handles still alive at this point leak into
    /// the returned statistics.
    pub(crate) fn finish(self) -> EngineStats {
        self.stats()
    }

    pub(crate) fn stats(&self) -> EngineStats {
        EngineStats {
            geometries: self
                .geoms
                .keys()
                .filter(|k| self.geoms.get(*k).is_some_and(|n| n.owner.is_none()))
                .count(),
            coord_seqs: self
                .seqs
                .keys()
                .filter(|k| self.seqs.get(*k).is_some_and(|n| n.owner.is_none()))
                .count(),
            prepared: self.prepared.len(),
            buffer_params: self.params.len(),
            strtrees: self.trees.len(),
            codecs: self.codecs.len(),
        }
    }

    fn report(&self, message: &str) {
        if let Some(handler) = &self.handler {
            handler(message);
        }
    }

    /// Report `message` and return the failure sentinel.
    fn fail<T>(&self, message: impl AsRef<str>) -> Option<T> {
        self.report(message.as_ref());
        None
    }

    pub(crate) fn create_wkt_reader(&mut self) -> CodecId {
        CodecId(self.codecs.insert(CodecNode::WktReader))
    }

    pub(crate) fn create_wkt_writer(&mut self, settings: WktSettings) -> CodecId {
        CodecId(self.codecs.insert(CodecNode::WktWriter(settings)))
    }

    pub(crate) fn create_wkb_reader(&mut self) -> CodecId {
        CodecId(self.codecs.insert(CodecNode::WkbReader))
    }

    pub(crate) fn create_wkb_writer(&mut self, settings: WkbSettings) -> CodecId {
        CodecId(self.codecs.insert(CodecNode::WkbWriter(settings)))
    }

    #[cfg(feature = "geojson")]
    pub(crate) fn create_geojson_reader(&mut self) -> CodecId {
        CodecId(self.codecs.insert(CodecNode::GeoJsonReader))
    }

    #[cfg(feature = "geojson")]
    pub(crate) fn create_geojson_writer(&mut self) -> CodecId {
        CodecId(self.codecs.insert(CodecNode::GeoJsonWriter))
    }

    pub(crate) fn wkt_writer_settings(&mut self, codec: CodecId) -> Option<&mut WktSettings> {
        if !matches!(self.codecs.get(codec.0), Some(CodecNode::WktWriter(_))) {
            return self.fail("IllegalArgumentException: handle is not a WKT writer");
        }
        match self.codecs.get_mut(codec.0) {
            Some(CodecNode::WktWriter(settings)) => Some(settings),
            _ => None,
        }
    }

    pub(crate) fn wkb_writer_settings(&mut self, codec: CodecId) -> Option<&mut WkbSettings> {
        if !matches!(self.codecs.get(codec.0), Some(CodecNode::WkbWriter(_))) {
            return self.fail("IllegalArgumentException: handle is not a WKB writer");
        }
        match self.codecs.get_mut(codec.0) {
            Some(CodecNode::WkbWriter(settings)) => Some(settings),
            _ => None,
        }
    }

    pub(crate) fn destroy_codec(&mut self, codec: CodecId) -> bool {
        if self.codecs.remove(codec.0).is_some() {
            return true;
        }
        self.report("IllegalArgumentException: unknown reader/writer handle");
        false
    }

    fn codec(&self, codec: CodecId) -> Option<&CodecNode> {
        match self.codecs.get(codec.0) {
            Some(node) => Some(node),
            None => self.fail("IllegalArgumentException: unknown reader/writer handle"),
        }
    }
}
