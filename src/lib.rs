//! # geoctx - safe, shareable contexts around a native geometry engine
//!
//! geoctx wraps a handle-based geometry engine that must never be entered by
//! two threads at once. Each [`Context`] owns one engine instance behind a
//! lock; geometries, coordinate sequences, prepared geometries, buffer
//! parameters and STR trees keep their context alive and release their
//! native resources when dropped.
//!
//! ## Features
//!
//! - **Reference-counted lifetimes**: the engine is torn down only after the
//!   last object created from it is gone
//! - **Thread-safe**: contexts are `Send + Sync`; operations spanning two
//!   contexts lock them in a fixed order
//! - **Views**: sub-geometries and coordinate sequences borrowed from a
//!   parent keep the parent alive instead of copying it
//! - **Formats**: WKT, WKB/EWKB and (with the `geojson` feature) GeoJSON
//!   geometries and features
//! - **Spatial index**: an STR tree keyed by arbitrary hashable values
//!
//! ## Quick Start
//!
//! ```rust
//! use geoctx::Context;
//!
//! # fn main() -> geoctx::Result<()> {
//! let ctx = Context::new();
//!
//! let park = ctx.new_geom_from_wkt("POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0))")?;
//! let bench = ctx.new_point_from_xy(3.0, 4.0);
//! assert!(park.contains(&bench));
//!
//! let path = ctx.new_line_string(&[[-5.0, 5.0], [15.0, 5.0]])?;
//! let inside = park.intersection(&path)?;
//! assert!((inside.length() - 10.0).abs() < 1e-9);
//!
//! // Geometries from different contexts can be combined directly.
//! let other = Context::new();
//! let far = other.new_point_from_xy(20.0, 0.0);
//! assert_eq!(park.distance(&far), 10.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Sharing a context between threads
//!
//! ```rust
//! use geoctx::Context;
//! use std::thread;
//!
//! let ctx = Context::new();
//! let handles: Vec<_> = (0..4)
//!     .map(|i| {
//!         let ctx = ctx.clone();
//!         thread::spawn(move || ctx.new_point_from_xy(i as f64, 0.0).buffer(1.0).map(|b| b.area()))
//!     })
//!     .collect();
//! for handle in handles {
//!     assert!(handle.join().unwrap().unwrap() > 3.0);
//! }
//! ```

mod engine;

pub mod bounds;
pub mod bufparams;
pub mod builder;
pub mod codec;
pub mod context;
pub mod coordseq;
pub mod default_context;
pub mod error;
#[cfg(feature = "geojson")]
pub mod feature;
pub mod geometry;
pub mod prepared;
pub mod strtree;
pub mod types;

pub use bounds::Bounds;
pub use bufparams::BufferParams;
pub use builder::{ContextBuilder, ReclaimedGeometry, ReclaimedIndex};
pub use codec::{WkbWriter, WktWriter};
pub use context::Context;
pub use coordseq::CoordSeq;
pub use default_context::default_context;
pub use error::{Error, Format, Result};
#[cfg(feature = "geojson")]
pub use feature::{Feature, FeatureCollection};
pub use geometry::Geometry;
pub use prepared::PreparedGeometry;
pub use strtree::STRtree;
pub use types::{
    BufCapStyle, BufJoinStyle, ByteOrder, Config, EngineStats, GeometryTypeId, WkbFlavor,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        Bounds, Context, CoordSeq, Error, Geometry, GeometryTypeId, PreparedGeometry, Result,
        STRtree,
    };
}
