use crate::context::Context;
use crate::engine::ParamsId;
use crate::types::{BufCapStyle, BufJoinStyle};
use std::fmt;

/// Parameters for [`Geometry::buffer_with_params`](crate::Geometry::buffer_with_params).
///
/// Setters are validated by the engine; a rejected value panics.
///
/// ```rust
/// use geoctx::{BufCapStyle, Context};
///
/// # fn main() -> geoctx::Result<()> {
/// let ctx = Context::new();
/// let line = ctx.new_geom_from_wkt("LINESTRING (0 0, 10 0)")?;
///
/// let mut params = ctx.new_buffer_params();
/// params.set_end_cap_style(BufCapStyle::Flat);
/// let strip = line.buffer_with_params(&params, 1.0)?;
/// assert!((strip.area() - 20.0).abs() < 1e-9);
/// # Ok(())
/// # }
/// ```
pub struct BufferParams {
    context: Context,
    handle: ParamsId,
    end_cap_style: BufCapStyle,
    join_style: BufJoinStyle,
    mitre_limit: f64,
    quadrant_segments: i32,
    single_sided: bool,
}

impl BufferParams {
    pub(crate) fn new(context: &Context) -> Self {
        let quadrant_segments = context.config().buffer_quadrant_segments;
        let mut engine = context.lock();
        let handle = engine.create_buffer_params();
        let updated = engine.params_set_quadrant_segments(handle, quadrant_segments);
        engine.must_succeed(updated);
        Self {
            context: context.clone(),
            handle,
            end_cap_style: BufCapStyle::Round,
            join_style: BufJoinStyle::Round,
            mitre_limit: 5.0,
            quadrant_segments,
            single_sided: false,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn handle(&self) -> ParamsId {
        self.handle
    }

    #[track_caller]
    fn apply(&self, update: impl FnOnce(&mut crate::engine::Engine, ParamsId) -> bool) {
        let mut engine = self.context.lock();
        let updated = update(&mut *engine, self.handle);
        engine.must_succeed(updated);
    }

    pub fn set_end_cap_style(&mut self, style: BufCapStyle) -> &mut Self {
        self.apply(|engine, handle| engine.params_set_end_cap_style(handle, style as i32));
        self.end_cap_style = style;
        self
    }

    pub fn set_join_style(&mut self, style: BufJoinStyle) -> &mut Self {
        self.apply(|engine, handle| engine.params_set_join_style(handle, style as i32));
        self.join_style = style;
        self
    }

    /// Ratio limiting how far a mitre join may extend; must be positive.
    #[track_caller]
    pub fn set_mitre_limit(&mut self, limit: f64) -> &mut Self {
        self.apply(|engine, handle| engine.params_set_mitre_limit(handle, limit));
        self.mitre_limit = limit;
        self
    }

    /// Segments used to approximate a quarter circle.
    pub fn set_quadrant_segments(&mut self, segments: i32) -> &mut Self {
        self.apply(|engine, handle| engine.params_set_quadrant_segments(handle, segments));
        self.quadrant_segments = segments;
        self
    }

    /// Buffer only the left side of lines (right for negative widths).
    pub fn set_single_sided(&mut self, single_sided: bool) -> &mut Self {
        self.apply(|engine, handle| engine.params_set_single_sided(handle, single_sided));
        self.single_sided = single_sided;
        self
    }

    pub fn end_cap_style(&self) -> BufCapStyle {
        self.end_cap_style
    }

    pub fn join_style(&self) -> BufJoinStyle {
        self.join_style
    }

    pub fn mitre_limit(&self) -> f64 {
        self.mitre_limit
    }

    pub fn quadrant_segments(&self) -> i32 {
        self.quadrant_segments
    }

    pub fn single_sided(&self) -> bool {
        self.single_sided
    }
}

impl Drop for BufferParams {
    fn drop(&mut self) {
        let mut engine = self.context.lock();
        if !engine.destroy_buffer_params(self.handle) {
            let message = engine.take_error();
            tracing::warn!(?message, "failed to reclaim buffer parameters");
        }
    }
}

impl fmt::Debug for BufferParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferParams")
            .field("end_cap_style", &self.end_cap_style)
            .field("join_style", &self.join_style)
            .field("mitre_limit", &self.mitre_limit)
            .field("quadrant_segments", &self.quadrant_segments)
            .field("single_sided", &self.single_sided)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_chain() {
        let ctx = Context::new();
        let mut params = ctx.new_buffer_params();
        params
            .set_end_cap_style(BufCapStyle::Square)
            .set_join_style(BufJoinStyle::Mitre)
            .set_mitre_limit(2.0)
            .set_quadrant_segments(4)
            .set_single_sided(true);
        assert_eq!(params.end_cap_style(), BufCapStyle::Square);
        assert_eq!(params.join_style(), BufJoinStyle::Mitre);
        assert_eq!(params.mitre_limit(), 2.0);
        assert_eq!(params.quadrant_segments(), 4);
        assert!(params.single_sided());
    }

    #[test]
    #[should_panic(expected = "mitre limit must be positive")]
    fn test_rejected_mitre_limit() {
        let ctx = Context::new();
        ctx.new_buffer_params().set_mitre_limit(0.0);
    }

    #[test]
    fn test_square_caps_extend_lines() {
        let ctx = Context::new();
        let line = ctx.new_geom_from_wkt("LINESTRING (0 0, 10 0)").unwrap();
        let mut params = ctx.new_buffer_params();
        params.set_end_cap_style(BufCapStyle::Square);
        let buffered = line.buffer_with_params(&params, 1.0).unwrap();
        assert!((buffered.area() - 24.0).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "context mismatch")]
    fn test_params_from_other_context() {
        let ctx1 = Context::new();
        let ctx2 = Context::new();
        let params = ctx2.new_buffer_params();
        let point = ctx1.new_point_from_xy(0.0, 0.0);
        let _ = point.buffer_with_params(&params, 1.0);
    }

    #[test]
    fn test_params_are_reclaimed() {
        let ctx = Context::new();
        let params = ctx.new_buffer_params();
        assert_eq!(ctx.engine_stats().buffer_params, 1);
        drop(params);
        assert_eq!(ctx.engine_stats().buffer_params, 0);
    }
}
