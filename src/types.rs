use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Geometry type identifiers, numbered as the engine numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GeometryTypeId {
    Point = 0,
    LineString = 1,
    LinearRing = 2,
    Polygon = 3,
    MultiPoint = 4,
    MultiLineString = 5,
    MultiPolygon = 6,
    GeometryCollection = 7,
}

impl GeometryTypeId {
    pub fn name(&self) -> &'static str {
        match self {
            GeometryTypeId::Point => "Point",
            GeometryTypeId::LineString => "LineString",
            GeometryTypeId::LinearRing => "LinearRing",
            GeometryTypeId::Polygon => "Polygon",
            GeometryTypeId::MultiPoint => "MultiPoint",
            GeometryTypeId::MultiLineString => "MultiLineString",
            GeometryTypeId::MultiPolygon => "MultiPolygon",
            GeometryTypeId::GeometryCollection => "GeometryCollection",
        }
    }

    /// Check if this type holds sub-geometries.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            GeometryTypeId::MultiPoint
                | GeometryTypeId::MultiLineString
                | GeometryTypeId::MultiPolygon
                | GeometryTypeId::GeometryCollection
        )
    }
}

impl fmt::Display for GeometryTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// End cap style used when buffering lines and points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufCapStyle {
    #[default]
    Round = 1,
    Flat = 2,
    Square = 3,
}

/// Join style used at interior vertices when buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufJoinStyle {
    #[default]
    Round = 1,
    Mitre = 2,
    Bevel = 3,
}

/// WKB dialect produced by writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WkbFlavor {
    /// PostGIS-style flags in the high bits of the type word
    #[default]
    Extended,
    /// ISO 13249 type offsets (1000, 2000, 3000)
    Iso,
}

/// Byte order of written WKB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    BigEndian,
    #[default]
    LittleEndian,
}

/// Context configuration
///
/// Controls the lazily built converters and the defaults handed to new
/// dependent objects. Every field has a default, so partial TOML documents
/// are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum ordinates written per WKT coordinate (2, 3 or 4)
    pub wkt_output_dimension: u8,

    /// Trim trailing zeros from WKT numbers
    pub wkt_trim: bool,

    /// Fixed number of decimals in WKT output, if any
    pub wkt_rounding_precision: Option<u32>,

    /// Flavor of WKB written by `Geometry::to_wkb`
    pub wkb_flavor: WkbFlavor,

    /// Byte order of written WKB
    pub wkb_byte_order: ByteOrder,

    /// Whether `Geometry::to_wkb` embeds the SRID
    pub wkb_include_srid: bool,

    /// Indentation of GeoJSON output, `None` for compact output
    pub geojson_indent: Option<usize>,

    /// Default node capacity for new STR trees
    pub strtree_node_capacity: usize,

    /// Default number of segments per quadrant for `Geometry::buffer`
    pub buffer_quadrant_segments: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wkt_output_dimension: 4,
            wkt_trim: true,
            wkt_rounding_precision: None,
            wkb_flavor: WkbFlavor::Extended,
            wkb_byte_order: ByteOrder::LittleEndian,
            wkb_include_srid: false,
            geojson_indent: None,
            strtree_node_capacity: 10,
            buffer_quadrant_segments: 8,
        }
    }
}

impl Config {
    pub fn with_wkt_output_dimension(mut self, dimension: u8) -> Self {
        self.wkt_output_dimension = dimension;
        self
    }

    pub fn with_wkt_rounding_precision(mut self, precision: u32) -> Self {
        self.wkt_rounding_precision = Some(precision);
        self
    }

    pub fn with_wkb_flavor(mut self, flavor: WkbFlavor) -> Self {
        self.wkb_flavor = flavor;
        self
    }

    pub fn with_wkb_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.wkb_byte_order = byte_order;
        self
    }

    pub fn with_wkb_include_srid(mut self, include_srid: bool) -> Self {
        self.wkb_include_srid = include_srid;
        self
    }

    pub fn with_geojson_indent(mut self, indent: usize) -> Self {
        self.geojson_indent = Some(indent);
        self
    }

    pub fn with_strtree_node_capacity(mut self, capacity: usize) -> Self {
        self.strtree_node_capacity = capacity;
        self
    }

    pub fn with_buffer_quadrant_segments(mut self, segments: i32) -> Self {
        self.buffer_quadrant_segments = segments;
        self
    }

    /// Check that every field is within the range the engine accepts.
    pub fn validate(&self) -> Result<()> {
        if !(2..=4).contains(&self.wkt_output_dimension) {
            return Err(Error::Config(format!(
                "wkt_output_dimension must be 2, 3 or 4, got {}",
                self.wkt_output_dimension
            )));
        }
        if self.strtree_node_capacity < 2 {
            return Err(Error::Config(format!(
                "strtree_node_capacity must be at least 2, got {}",
                self.strtree_node_capacity
            )));
        }
        if self.buffer_quadrant_segments < 1 {
            return Err(Error::Config(format!(
                "buffer_quadrant_segments must be positive, got {}",
                self.buffer_quadrant_segments
            )));
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    #[cfg(feature = "toml")]
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    #[cfg(feature = "toml")]
    pub fn from_toml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

/// Live native handles held by one engine instance, by kind.
///
/// Every successful create is paired with one destroy, so all counters return
/// to zero once the wrappers that own them are gone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub geometries: usize,
    pub coord_seqs: usize,
    pub prepared: usize,
    pub buffer_params: usize,
    pub strtrees: usize,
    pub codecs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_output_dimension() {
        let config = Config::default().with_wkt_output_dimension(5);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_node_capacity() {
        let config = Config::default().with_strtree_node_capacity(1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_type_id_names() {
        assert_eq!(GeometryTypeId::LinearRing.name(), "LinearRing");
        assert!(GeometryTypeId::MultiPoint.is_collection());
        assert!(!GeometryTypeId::Polygon.is_collection());
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            wkb_flavor = "iso"
            geojson_indent = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.wkb_flavor, WkbFlavor::Iso);
        assert_eq!(config.geojson_indent, Some(2));
        assert_eq!(config.strtree_node_capacity, 10);
    }

    #[cfg(feature = "toml")]
    #[test]
    fn test_toml_rejects_invalid() {
        assert!(Config::from_toml_str("wkt_output_dimension = 7").is_err());
    }
}
