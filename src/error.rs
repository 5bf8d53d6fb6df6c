use std::fmt;
use thiserror::Error;

/// Recoverable errors reported by geoctx.
///
/// Caller bugs (out-of-range indexes, use after `destroy`, mixing contexts where
/// a single context is required) are not represented here: they panic.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed WKT, WKB or GeoJSON input
    #[error("{format} parse error: {message}")]
    Parse {
        format: Format,
        message: String,
    },

    /// The engine rejected an operation on otherwise well-formed input
    #[error("engine error: {0}")]
    Engine(String),

    /// The value is already present in the spatial index
    #[error("duplicate value")]
    DuplicateValue,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialization format named in parse errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Wkt,
    Wkb,
    GeoJson,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Wkt => write!(f, "WKT"),
            Format::Wkb => write!(f, "WKB"),
            Format::GeoJson => write!(f, "GeoJSON"),
        }
    }
}

/// Result type alias for geoctx operations
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) const INDEX_OUT_OF_RANGE: &str = "index out of range";
pub(crate) const DIMENSION_OUT_OF_RANGE: &str = "dimension out of range";
pub(crate) const DESTROYED_GEOMETRY: &str = "destroyed Geometry";
pub(crate) const DESTROYED_COORD_SEQ: &str = "destroyed CoordSeq";
pub(crate) const CONTEXT_MISMATCH: &str = "context mismatch";

/// Aborts the current call with a precondition fault.
#[track_caller]
pub(crate) fn fault(message: &str) -> ! {
    panic!("{message}")
}

/// Aborts the current call because an unconditional engine call failed.
#[track_caller]
pub(crate) fn engine_fault(message: Option<String>) -> ! {
    let message = message.unwrap_or_else(|| "unknown engine error".to_string());
    tracing::warn!(%message, "unconditional engine call failed");
    panic!("engine failure: {message}")
}
