//! Process-wide default context and shortcuts that use it.
//!
//! Every function here locks the same context, so heavily threaded code
//! should create its own [`Context`] per worker instead.

use crate::context::Context;
use crate::coordseq::CoordSeq;
use crate::error::Result;
use crate::geometry::Geometry;
use crate::strtree::STRtree;
use crate::types::GeometryTypeId;
use once_cell::sync::Lazy;
use std::hash::Hash;

static DEFAULT_CONTEXT: Lazy<Context> = Lazy::new(|| {
    tracing::debug!("creating default context");
    Context::new()
});

/// The shared context, created on first use with the default configuration.
pub fn default_context() -> &'static Context {
    &DEFAULT_CONTEXT
}

pub fn new_geom_from_wkt(wkt: &str) -> Result<Geometry> {
    default_context().new_geom_from_wkt(wkt)
}

pub fn new_geom_from_wkb(wkb: &[u8]) -> Result<Geometry> {
    default_context().new_geom_from_wkb(wkb)
}

#[cfg(feature = "geojson")]
pub fn new_geom_from_geojson(geojson: &str) -> Result<Geometry> {
    default_context().new_geom_from_geojson(geojson)
}

#[track_caller]
pub fn new_point(coord: &[f64]) -> Geometry {
    default_context().new_point(coord)
}

pub fn new_point_from_xy(x: f64, y: f64) -> Geometry {
    default_context().new_point_from_xy(x, y)
}

pub fn new_line_string<C: AsRef<[f64]>>(coords: &[C]) -> Result<Geometry> {
    default_context().new_line_string(coords)
}

pub fn new_polygon<C, R>(rings: &[R]) -> Result<Geometry>
where
    C: AsRef<[f64]>,
    R: AsRef<[C]>,
{
    default_context().new_polygon(rings)
}

pub fn new_collection(type_id: GeometryTypeId, geoms: Vec<Geometry>) -> Result<Geometry> {
    default_context().new_collection(type_id, geoms)
}

#[track_caller]
pub fn new_coord_seq(size: usize, dims: usize) -> CoordSeq {
    default_context().new_coord_seq(size, dims)
}

pub fn new_strtree<V: Clone + Eq + Hash>() -> STRtree<V> {
    default_context().new_strtree()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_context_is_shared() {
        let a = new_point_from_xy(1.0, 2.0);
        let b = new_geom_from_wkt("POINT (1 2)").unwrap();
        assert_eq!(a.context(), b.context());
        assert_eq!(a.context(), default_context());
        assert!(a.equals(&b));
    }

    #[test]
    fn test_shortcuts() {
        let line = new_line_string(&[[0.0, 0.0], [3.0, 4.0]]).unwrap();
        assert_eq!(line.length(), 5.0);

        let square = new_polygon(&[[[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0], [0.0, 0.0]]])
            .unwrap();
        assert_eq!(square.area(), 4.0);

        let multi = new_collection(
            GeometryTypeId::MultiPoint,
            vec![new_point(&[0.0, 0.0]), new_point(&[1.0, 1.0])],
        )
        .unwrap();
        assert_eq!(multi.num_geometries(), 2);

        let wkb = multi.to_wkb();
        assert!(new_geom_from_wkb(&wkb).unwrap().equals(&multi));

        assert_eq!(new_coord_seq(3, 2).size(), 3);
        let mut tree = new_strtree();
        tree.insert(&line, "line").unwrap();
        assert_eq!(tree.len(), 1);
    }
}
