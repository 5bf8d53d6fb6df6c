//! Standalone WKT and WKB writers with their own settings.
//!
//! `Geometry::to_wkt` and `Geometry::to_wkb` share one writer per context,
//! configured once from [`Config`](crate::Config). These writers start from
//! the same configuration and can then be adjusted independently.

use crate::context::{Context, wkb_settings, wkt_settings};
use crate::engine::{CodecId, WkbSettings, WktSettings};
use crate::error::{CONTEXT_MISMATCH, DIMENSION_OUT_OF_RANGE, fault};
use crate::geometry::Geometry;
use crate::types::{ByteOrder, WkbFlavor};
use std::fmt;

#[track_caller]
fn check_dimension(dimension: u8) {
    if !(2..=4).contains(&dimension) {
        fault(DIMENSION_OUT_OF_RANGE);
    }
}

#[track_caller]
fn check_context(context: &Context, geom: &Geometry) {
    if geom.context() != context {
        fault(CONTEXT_MISMATCH);
    }
}

fn reclaim(context: &Context, codec: CodecId, what: &str) {
    let mut engine = context.lock();
    if !engine.destroy_codec(codec) {
        let message = engine.take_error();
        tracing::warn!(?message, writer = what, "failed to reclaim writer");
    }
}

/// Well-known text writer.
///
/// ```rust
/// use geoctx::Context;
///
/// # fn main() -> geoctx::Result<()> {
/// let ctx = Context::new();
/// let point = ctx.new_point(&[1.0, 2.0, 3.0]);
///
/// let mut writer = ctx.new_wkt_writer();
/// assert_eq!(writer.write(&point), "POINT Z (1 2 3)");
/// writer.set_output_dimension(2).set_rounding_precision(Some(1)).set_trim(false);
/// assert_eq!(writer.write(&point), "POINT (1.0 2.0)");
/// # Ok(())
/// # }
/// ```
pub struct WktWriter {
    context: Context,
    handle: CodecId,
    settings: WktSettings,
}

impl WktWriter {
    pub(crate) fn new(context: &Context) -> Self {
        let settings = wkt_settings(context.config());
        let handle = context.lock().create_wkt_writer(settings);
        Self {
            context: context.clone(),
            handle,
            settings,
        }
    }

    #[track_caller]
    fn update(&mut self, f: impl FnOnce(&mut WktSettings)) {
        let mut engine = self.context.lock();
        let updated = engine.wkt_writer_settings(self.handle).map(|settings| {
            f(settings);
            *settings
        });
        self.settings = engine.must(updated);
    }

    /// Maximum ordinates per coordinate, 2 to 4.
    #[track_caller]
    pub fn set_output_dimension(&mut self, dimension: u8) -> &mut Self {
        check_dimension(dimension);
        self.update(|s| s.output_dimension = dimension);
        self
    }

    pub fn set_trim(&mut self, trim: bool) -> &mut Self {
        self.update(|s| s.trim = trim);
        self
    }

    /// Fixed number of decimals, or `None` for shortest round-trip output.
    pub fn set_rounding_precision(&mut self, precision: Option<u32>) -> &mut Self {
        self.update(|s| s.rounding_precision = precision);
        self
    }

    pub fn output_dimension(&self) -> u8 {
        self.settings.output_dimension
    }

    pub fn trim(&self) -> bool {
        self.settings.trim
    }

    pub fn rounding_precision(&self) -> Option<u32> {
        self.settings.rounding_precision
    }

    #[track_caller]
    pub fn write(&self, geom: &Geometry) -> String {
        check_context(&self.context, geom);
        let handle = geom.handle();
        let engine = self.context.lock();
        engine.must(engine.wkt_write(self.handle, handle))
    }
}

impl Drop for WktWriter {
    fn drop(&mut self) {
        reclaim(&self.context, self.handle, "wkt");
    }
}

impl fmt::Debug for WktWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WktWriter")
            .field("output_dimension", &self.settings.output_dimension)
            .field("trim", &self.settings.trim)
            .field("rounding_precision", &self.settings.rounding_precision)
            .finish()
    }
}

/// Well-known binary writer.
pub struct WkbWriter {
    context: Context,
    handle: CodecId,
    settings: WkbSettings,
}

impl WkbWriter {
    pub(crate) fn new(context: &Context) -> Self {
        let settings = wkb_settings(context.config());
        let handle = context.lock().create_wkb_writer(settings);
        Self {
            context: context.clone(),
            handle,
            settings,
        }
    }

    #[track_caller]
    fn update(&mut self, f: impl FnOnce(&mut WkbSettings)) {
        let mut engine = self.context.lock();
        let updated = engine.wkb_writer_settings(self.handle).map(|settings| {
            f(settings);
            *settings
        });
        self.settings = engine.must(updated);
    }

    #[track_caller]
    pub fn set_output_dimension(&mut self, dimension: u8) -> &mut Self {
        check_dimension(dimension);
        self.update(|s| s.output_dimension = dimension);
        self
    }

    pub fn set_flavor(&mut self, flavor: WkbFlavor) -> &mut Self {
        self.update(|s| s.flavor = flavor);
        self
    }

    pub fn set_byte_order(&mut self, byte_order: ByteOrder) -> &mut Self {
        self.update(|s| s.byte_order = byte_order);
        self
    }

    /// Embed the SRID; only the extended flavor has room for it.
    pub fn set_include_srid(&mut self, include_srid: bool) -> &mut Self {
        self.update(|s| s.include_srid = include_srid);
        self
    }

    pub fn output_dimension(&self) -> u8 {
        self.settings.output_dimension
    }

    pub fn flavor(&self) -> WkbFlavor {
        self.settings.flavor
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.settings.byte_order
    }

    pub fn include_srid(&self) -> bool {
        self.settings.include_srid
    }

    #[track_caller]
    pub fn write(&self, geom: &Geometry) -> Vec<u8> {
        check_context(&self.context, geom);
        let handle = geom.handle();
        let engine = self.context.lock();
        engine.must(engine.wkb_write(self.handle, handle))
    }
}

impl Drop for WkbWriter {
    fn drop(&mut self) {
        reclaim(&self.context, self.handle, "wkb");
    }
}

impl fmt::Debug for WkbWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WkbWriter")
            .field("output_dimension", &self.settings.output_dimension)
            .field("flavor", &self.settings.flavor)
            .field("byte_order", &self.settings.byte_order)
            .field("include_srid", &self.settings.include_srid)
            .finish()
    }
}
