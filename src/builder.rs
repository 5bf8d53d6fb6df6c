//! Context builder with configuration and reclamation hooks
//!
//! This module provides a builder pattern for creating contexts with a
//! custom [`Config`] and diagnostic callbacks that fire when native
//! resources are reclaimed.

use crate::context::Context;
use crate::error::Result;
use crate::types::{Config, EngineStats, GeometryTypeId};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Snapshot handed to the geometry reclamation hook.
///
/// A plain value: it carries no reference to the geometry being reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimedGeometry {
    pub context: Uuid,
    pub type_id: GeometryTypeId,
}

/// Snapshot handed to the STR tree reclamation hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimedIndex {
    pub context: Uuid,
    /// Entries still indexed when the tree was dropped
    pub len: usize,
}

type Hook<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) on_geometry_reclaim: Option<Hook<ReclaimedGeometry>>,
    pub(crate) on_strtree_reclaim: Option<Hook<ReclaimedIndex>>,
    pub(crate) on_finish: Option<Hook<EngineStats>>,
}

/// Builder for creating contexts with custom configuration.
///
/// Hooks are invoked without the context lock held, so they may call back
/// into the context (for example [`Context::engine_stats`]).
///
/// # Examples
///
/// ## Counting reclaimed geometries
/// ```rust
/// use geoctx::ContextBuilder;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let reclaimed = Arc::new(AtomicUsize::new(0));
/// let counter = reclaimed.clone();
/// let ctx = ContextBuilder::new()
///     .on_geometry_reclaim(move |_| {
///         counter.fetch_add(1, Ordering::SeqCst);
///     })
///     .build()?;
///
/// drop(ctx.new_point_from_xy(1.0, 2.0));
/// assert_eq!(reclaimed.load(Ordering::SeqCst), 1);
/// # Ok(())
/// # }
/// ```
///
/// ## Full configuration
/// ```rust
/// use geoctx::{Config, ContextBuilder, WkbFlavor};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::default()
///     .with_wkt_rounding_precision(3)
///     .with_wkb_flavor(WkbFlavor::Iso);
///
/// let ctx = ContextBuilder::new().config(config).build()?;
/// let point = ctx.new_point_from_xy(1.23456, 2.0);
/// assert_eq!(point.to_wkt(), "POINT (1.235 2)");
/// # Ok(())
/// # }
/// ```
pub struct ContextBuilder {
    config: Config,
    hooks: Hooks,
}

impl ContextBuilder {
    /// Create a builder with the default configuration and no hooks.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            hooks: Hooks::default(),
        }
    }

    /// Set the context configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Called just before a root geometry is reclaimed by `Drop`.
    ///
    /// Explicit [`Geometry::destroy`](crate::Geometry::destroy) calls do not
    /// fire the hook.
    pub fn on_geometry_reclaim<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ReclaimedGeometry) + Send + Sync + 'static,
    {
        self.hooks.on_geometry_reclaim = Some(Arc::new(hook));
        self
    }

    /// Called just before an STR tree is reclaimed.
    pub fn on_strtree_reclaim<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ReclaimedIndex) + Send + Sync + 'static,
    {
        self.hooks.on_strtree_reclaim = Some(Arc::new(hook));
        self
    }

    /// Called once, when the engine instance is finalized, with the native
    /// handles still alive at that point (all zero unless something leaked).
    pub fn on_finish<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EngineStats) + Send + Sync + 'static,
    {
        self.hooks.on_finish = Some(Arc::new(hook));
        self
    }

    /// Validate the configuration and create the context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration
    /// is out of range.
    pub fn build(self) -> Result<Context> {
        self.config.validate()?;
        Ok(Context::from_parts(self.config, self.hooks))
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("config", &self.config)
            .field("on_geometry_reclaim", &self.hooks.on_geometry_reclaim.is_some())
            .field("on_strtree_reclaim", &self.hooks.on_strtree_reclaim.is_some())
            .field("on_finish", &self.hooks.on_finish.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_builder_default() {
        let builder = ContextBuilder::new();
        assert_eq!(builder.config, Config::default());
        assert!(builder.hooks.on_finish.is_none());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = Config::default().with_strtree_node_capacity(0);
        assert!(ContextBuilder::new().config(config).build().is_err());
    }

    #[test]
    fn test_finish_hook_runs_once() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();
        let ctx = ContextBuilder::new()
            .on_finish(move |stats| {
                assert_eq!(*stats, EngineStats::default());
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let point = ctx.new_point_from_xy(0.0, 0.0);
        let other = ctx.clone();
        drop(ctx);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        drop(other);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        drop(point);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_lists_hooks() {
        let builder = ContextBuilder::new().on_strtree_reclaim(|_| {});
        let debug = format!("{builder:?}");
        assert!(debug.contains("on_strtree_reclaim: true"));
    }
}
