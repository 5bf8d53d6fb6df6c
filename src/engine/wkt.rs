//! Well-known text reader and writer.

use super::convert;
use super::model::{Coords, Shape};
use super::{CodecId, CodecNode, Engine, GeomId, WktSettings};
use crate::types::GeometryTypeId;
use std::fmt::Write;
use std::str::FromStr;

fn type_from_tag(tag: &str) -> Option<GeometryTypeId> {
    Some(match tag {
        "POINT" => GeometryTypeId::Point,
        "LINESTRING" => GeometryTypeId::LineString,
        "LINEARRING" => GeometryTypeId::LinearRing,
        "POLYGON" => GeometryTypeId::Polygon,
        "MULTIPOINT" => GeometryTypeId::MultiPoint,
        "MULTILINESTRING" => GeometryTypeId::MultiLineString,
        "MULTIPOLYGON" => GeometryTypeId::MultiPolygon,
        "GEOMETRYCOLLECTION" => GeometryTypeId::GeometryCollection,
        _ => return None,
    })
}

/// `<TAG> [Z|M|ZM] EMPTY` at the top level.
fn top_level_empty(upper: &str) -> Option<GeometryTypeId> {
    let mut words = upper.split_whitespace();
    let type_id = type_from_tag(words.next()?)?;
    let rest: Vec<&str> = words.collect();
    match rest.as_slice() {
        ["EMPTY"] => Some(type_id),
        [dims, "EMPTY"] if matches!(*dims, "Z" | "M" | "ZM") => Some(type_id),
        _ => None,
    }
}

pub(crate) fn parse(text: &str) -> Result<Shape, String> {
    let trimmed = text.trim();
    let upper = trimmed.to_ascii_uppercase();
    if let Some(type_id) = top_level_empty(&upper) {
        return Ok(Shape::empty(type_id));
    }
    let ring = upper.starts_with("LINEARRING");
    let source = if ring {
        format!("LINESTRING{}", &trimmed["LINEARRING".len()..])
    } else {
        trimmed.to_string()
    };
    let parsed = wkt::Wkt::<f64>::from_str(&source).map_err(|e| format!("ParseException: {e}"))?;
    let geometry: geo::Geometry<f64> = parsed
        .try_into()
        .map_err(|e: wkt::conversion::Error| format!("ParseException: {e}"))?;
    Ok(match convert::from_geo(&geometry) {
        Shape::LineString(coords) if ring => Shape::LinearRing(coords),
        shape => shape,
    })
}

struct WktFormatter {
    settings: WktSettings,
    dims: usize,
    measured: bool,
}

impl WktFormatter {
    fn new(settings: WktSettings, shape: &Shape) -> Self {
        let dims = shape.dims().min(settings.output_dimension) as usize;
        let mut measured = dims == 4;
        if measured {
            shape.visit_coords(&mut |c| {
                if c.dims == 4 && c.flat.chunks_exact(4).any(|xyzm| !xyzm[2].is_nan()) {
                    measured = false;
                }
            });
        }
        Self {
            settings,
            dims,
            measured,
        }
    }

    fn tag(&self) -> &'static str {
        match (self.dims, self.measured) {
            (4, true) => " M",
            (4, false) => " ZM",
            (3, _) => " Z",
            _ => "",
        }
    }

    fn number(&self, out: &mut String, value: f64) {
        match (self.settings.trim, self.settings.rounding_precision) {
            (true, None) => {
                let _ = write!(out, "{value}");
            }
            (true, Some(precision)) => {
                let fixed = format!("{:.*}", precision as usize, value);
                let trimmed = if fixed.contains('.') {
                    fixed.trim_end_matches('0').trim_end_matches('.')
                } else {
                    fixed.as_str()
                };
                out.push_str(if trimmed == "-0" { "0" } else { trimmed });
            }
            (false, precision) => {
                let _ = write!(out, "{:.*}", precision.unwrap_or(16) as usize, value);
            }
        }
    }

    fn coord(&self, out: &mut String, coords: &Coords, index: usize) {
        let c = coords.coord(index);
        let ordinates: &[usize] = match (self.dims, self.measured) {
            (4, true) => &[0, 1, 3],
            (4, false) => &[0, 1, 2, 3],
            (3, _) => &[0, 1, 2],
            _ => &[0, 1],
        };
        for (i, ordinate) in ordinates.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            self.number(out, c.get(*ordinate).copied().unwrap_or(f64::NAN));
        }
    }

    fn coord_list(&self, out: &mut String, coords: &Coords) {
        out.push('(');
        for i in 0..coords.len() {
            if i > 0 {
                out.push_str(", ");
            }
            self.coord(out, coords, i);
        }
        out.push(')');
    }

    fn rings(&self, out: &mut String, rings: &[Coords]) {
        out.push('(');
        for (i, ring) in rings.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.coord_list(out, ring);
        }
        out.push(')');
    }

    /// Body of a geometry without its tag, `EMPTY` for empties.
    fn body(&self, out: &mut String, shape: &Shape) {
        if shape.is_empty() && !matches!(shape, Shape::GeometryCollection(m) if !m.is_empty()) {
            out.push_str("EMPTY");
            return;
        }
        match shape {
            Shape::Point(c) | Shape::LineString(c) | Shape::LinearRing(c) => {
                self.coord_list(out, c)
            }
            Shape::Polygon(rings) => self.rings(out, rings),
            Shape::MultiPoint(members)
            | Shape::MultiLineString(members)
            | Shape::MultiPolygon(members) => {
                out.push('(');
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.body(out, member);
                }
                out.push(')');
            }
            Shape::GeometryCollection(members) => {
                out.push('(');
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.tagged(out, member);
                }
                out.push(')');
            }
        }
    }

    fn tagged(&self, out: &mut String, shape: &Shape) {
        out.push_str(&shape.type_id().name().to_ascii_uppercase());
        out.push_str(self.tag());
        out.push(' ');
        self.body(out, shape);
    }
}

pub(crate) fn write(shape: &Shape, settings: WktSettings) -> String {
    let formatter = WktFormatter::new(settings, shape);
    let mut out = String::new();
    formatter.tagged(&mut out, shape);
    out
}

impl Engine {
    pub(crate) fn wkt_read(&mut self, codec: CodecId, text: &str) -> Option<GeomId> {
        if !matches!(self.codec(codec)?, CodecNode::WktReader) {
            return self.fail("IllegalArgumentException: handle is not a WKT reader");
        }
        match parse(text) {
            Ok(shape) => self.create_geom(&shape, 0),
            Err(message) => self.fail(message),
        }
    }

    pub(crate) fn wkt_write(&self, codec: CodecId, id: GeomId) -> Option<String> {
        let settings = match self.codec(codec)? {
            CodecNode::WktWriter(settings) => *settings,
            _ => return self.fail("IllegalArgumentException: handle is not a WKT writer"),
        };
        let shape = self.export(id)?;
        Some(write(&shape, settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: WktSettings = WktSettings {
        output_dimension: 4,
        trim: true,
        rounding_precision: None,
    };

    fn round_trip(text: &str) -> String {
        write(&parse(text).unwrap(), DEFAULT)
    }

    #[test]
    fn test_writes_canonical_text() {
        assert_eq!(round_trip("point(1 2)"), "POINT (1 2)");
        assert_eq!(round_trip("LINESTRING(0 0,1 1.5)"), "LINESTRING (0 0, 1 1.5)");
        assert_eq!(
            round_trip("POLYGON((0 0,1 0,1 1,0 0))"),
            "POLYGON ((0 0, 1 0, 1 1, 0 0))"
        );
        assert_eq!(
            round_trip("MULTIPOINT((0 1),(2 3))"),
            "MULTIPOINT ((0 1), (2 3))"
        );
        assert_eq!(
            round_trip("GEOMETRYCOLLECTION(POINT(1 2),LINESTRING(0 0,1 1))"),
            "GEOMETRYCOLLECTION (POINT (1 2), LINESTRING (0 0, 1 1))"
        );
    }

    #[test]
    fn test_empty_geometries() {
        assert_eq!(round_trip("POINT EMPTY"), "POINT EMPTY");
        assert_eq!(round_trip("polygon z empty"), "POLYGON EMPTY");
        assert_eq!(round_trip("GEOMETRYCOLLECTION EMPTY"), "GEOMETRYCOLLECTION EMPTY");
    }

    #[test]
    fn test_linear_ring_is_kept() {
        let shape = parse("LINEARRING (0 0, 1 0, 1 1, 0 0)").unwrap();
        assert!(matches!(shape, Shape::LinearRing(_)));
        assert_eq!(write(&shape, DEFAULT), "LINEARRING (0 0, 1 0, 1 1, 0 0)");
    }

    #[test]
    fn test_dimension_and_precision() {
        let shape = Shape::Point(Coords {
            dims: 3,
            flat: vec![1.0, 2.0, 3.0],
        });
        assert_eq!(write(&shape, DEFAULT), "POINT Z (1 2 3)");
        let flat = WktSettings {
            output_dimension: 2,
            ..DEFAULT
        };
        assert_eq!(write(&shape, flat), "POINT (1 2)");

        let measured = Shape::Point(Coords {
            dims: 4,
            flat: vec![1.0, 2.0, f64::NAN, 4.0],
        });
        assert_eq!(write(&measured, DEFAULT), "POINT M (1 2 4)");

        let point = parse("POINT (1.23456 2)").unwrap();
        let rounded = WktSettings {
            rounding_precision: Some(2),
            ..DEFAULT
        };
        assert_eq!(write(&point, rounded), "POINT (1.23 2)");
        let untrimmed = WktSettings {
            trim: false,
            rounding_precision: Some(1),
            ..DEFAULT
        };
        assert_eq!(write(&point, untrimmed), "POINT (1.2 2.0)");
    }

    #[test]
    fn test_malformed_text_is_rejected() {
        let err = parse("POINT (1").unwrap_err();
        assert!(err.starts_with("ParseException"));
        assert!(parse("CIRCLE (0 0, 1)").is_err());
    }

    #[test]
    fn test_engine_read_write() {
        let mut engine = Engine::init();
        let reader = engine.create_wkt_reader();
        let writer = engine.create_wkt_writer(DEFAULT);
        let id = engine.wkt_read(reader, "LINESTRING (0 0, 3 4)").unwrap();
        assert_eq!(
            engine.wkt_write(writer, id).as_deref(),
            Some("LINESTRING (0 0, 3 4)")
        );
        assert!(engine.wkt_read(writer, "POINT (0 0)").is_none());
        assert!(engine.wkt_read(reader, "LINESTRING (0 0)").is_none());
    }
}
