//! GeoJSON reader and writer.

use super::model::{Coords, Shape};
use super::{CodecId, CodecNode, Engine, GeomId};
use ::geojson::feature::Id;
use ::geojson::{Feature, GeoJson, JsonObject, Value};
use serde::Serialize;

fn coords_of(positions: &[Vec<f64>]) -> Result<Coords, String> {
    let dims: u8 = if positions.iter().any(|p| p.len() > 2) { 3 } else { 2 };
    let mut flat = Vec::with_capacity(positions.len() * dims as usize);
    for position in positions {
        if position.len() < 2 {
            return Err(format!(
                "ParseException: position must have at least 2 ordinates, found {}",
                position.len()
            ));
        }
        flat.extend_from_slice(&position[..2]);
        if dims == 3 {
            flat.push(position.get(2).copied().unwrap_or(f64::NAN));
        }
    }
    Ok(Coords { dims, flat })
}

fn point(position: &[f64]) -> Result<Shape, String> {
    if position.is_empty() {
        return Ok(Shape::Point(Coords::empty(2)));
    }
    coords_of(&[position.to_vec()]).map(Shape::Point)
}

fn rings(rings: &[Vec<Vec<f64>>]) -> Result<Shape, String> {
    rings
        .iter()
        .map(|ring| coords_of(ring))
        .collect::<Result<Vec<_>, _>>()
        .map(Shape::Polygon)
}

fn value_shape(value: &Value) -> Result<Shape, String> {
    Ok(match value {
        Value::Point(p) => point(p)?,
        Value::LineString(line) => Shape::LineString(coords_of(line)?),
        Value::Polygon(polygon) => rings(polygon)?,
        Value::MultiPoint(points) => Shape::MultiPoint(
            points.iter().map(|p| point(p)).collect::<Result<_, _>>()?,
        ),
        Value::MultiLineString(lines) => Shape::MultiLineString(
            lines
                .iter()
                .map(|l| coords_of(l).map(Shape::LineString))
                .collect::<Result<_, _>>()?,
        ),
        Value::MultiPolygon(polygons) => Shape::MultiPolygon(
            polygons.iter().map(|p| rings(p)).collect::<Result<_, _>>()?,
        ),
        Value::GeometryCollection(members) => Shape::GeometryCollection(
            members
                .iter()
                .map(|g| value_shape(&g.value))
                .collect::<Result<_, _>>()?,
        ),
    })
}

fn feature_shape(feature: &::geojson::Feature) -> Result<Shape, String> {
    match &feature.geometry {
        Some(geometry) => value_shape(&geometry.value),
        None => Ok(Shape::GeometryCollection(Vec::new())),
    }
}

/// A bare `{"type": "Point", "coordinates": []}`, rejected by the
/// `geojson` position parser.
fn is_empty_point(json: &serde_json::Value) -> bool {
    json.get("type").and_then(|t| t.as_str()) == Some("Point")
        && json
            .get("coordinates")
            .and_then(|c| c.as_array())
            .is_some_and(|c| c.is_empty())
}

fn document(json: serde_json::Value) -> Result<GeoJson, String> {
    GeoJson::from_json_value(json).map_err(|e| format!("ParseException: {e}"))
}

pub(crate) fn parse(text: &str) -> Result<Shape, String> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("ParseException: {e}"))?;
    if is_empty_point(&json) {
        return Ok(Shape::Point(Coords::empty(2)));
    }
    match document(json)? {
        GeoJson::Geometry(geometry) => value_shape(&geometry.value),
        GeoJson::Feature(feature) => feature_shape(&feature),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .iter()
            .map(feature_shape)
            .collect::<Result<_, _>>()
            .map(Shape::GeometryCollection),
    }
}

/// The features of a document. A bare geometry becomes one feature without
/// id or properties.
pub(crate) fn parse_features(text: &str) -> Result<Vec<Feature>, String> {
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|e| format!("ParseException: {e}"))?;
    Ok(match document(json)? {
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Geometry(geometry) => vec![Feature {
            geometry: Some(geometry),
            ..Default::default()
        }],
    })
}

fn positions(coords: &Coords) -> Vec<Vec<f64>> {
    (0..coords.len())
        .map(|i| {
            let c = coords.coord(i);
            match c.get(2) {
                Some(z) if !z.is_nan() => vec![c[0], c[1], *z],
                _ => vec![c[0], c[1]],
            }
        })
        .collect()
}

fn shape_value(shape: &Shape) -> Value {
    match shape {
        Shape::Point(c) => Value::Point(positions(c).into_iter().next().unwrap_or_default()),
        Shape::LineString(c) | Shape::LinearRing(c) => Value::LineString(positions(c)),
        Shape::Polygon(rings) => Value::Polygon(rings.iter().map(positions).collect()),
        Shape::MultiPoint(members) => Value::MultiPoint(
            members
                .iter()
                .filter_map(|m| match m {
                    Shape::Point(c) if !c.is_empty() => positions(c).into_iter().next(),
                    _ => None,
                })
                .collect(),
        ),
        Shape::MultiLineString(members) => Value::MultiLineString(
            members
                .iter()
                .filter_map(|m| match m {
                    Shape::LineString(c) | Shape::LinearRing(c) => Some(positions(c)),
                    _ => None,
                })
                .collect(),
        ),
        Shape::MultiPolygon(members) => Value::MultiPolygon(
            members
                .iter()
                .filter_map(|m| match m {
                    Shape::Polygon(rings) => Some(rings.iter().map(positions).collect()),
                    _ => None,
                })
                .collect(),
        ),
        Shape::GeometryCollection(members) => Value::GeometryCollection(
            members
                .iter()
                .map(|m| ::geojson::Geometry::new(shape_value(m)))
                .collect(),
        ),
    }
}

pub(crate) fn write(shape: &Shape, indent: Option<usize>) -> Result<String, String> {
    write_json(&::geojson::Geometry::new(shape_value(shape)), indent)
}

/// Serialize any GeoJSON object; `indent` of `None` or zero is compact.
pub(crate) fn write_json<T: Serialize>(value: &T, indent: Option<usize>) -> Result<String, String> {
    match indent.filter(|width| *width > 0) {
        None => serde_json::to_string(value).map_err(|e| e.to_string()),
        Some(width) => {
            let indent = " ".repeat(width);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut out = Vec::new();
            let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
            value.serialize(&mut serializer).map_err(|e| e.to_string())?;
            String::from_utf8(out).map_err(|e| e.to_string())
        }
    }
}

/// A feature read into the engine.
pub(crate) struct FeatureRecord {
    pub(crate) id: Option<Id>,
    pub(crate) properties: Option<JsonObject>,
    pub(crate) geometry: Option<GeomId>,
}

impl Engine {
    pub(crate) fn geojson_read(&mut self, codec: CodecId, text: &str) -> Option<GeomId> {
        if !matches!(self.codec(codec)?, CodecNode::GeoJsonReader) {
            return self.fail("IllegalArgumentException: handle is not a GeoJSON reader");
        }
        match parse(text) {
            Ok(shape) => self.create_geom(&shape, 0),
            Err(message) => self.fail(message),
        }
    }

    /// Read every feature of `text`, creating its geometry. Nothing is left
    /// behind when any member fails.
    pub(crate) fn geojson_read_features(
        &mut self,
        codec: CodecId,
        text: &str,
    ) -> Option<Vec<FeatureRecord>> {
        if !matches!(self.codec(codec)?, CodecNode::GeoJsonReader) {
            return self.fail("IllegalArgumentException: handle is not a GeoJSON reader");
        }
        let features = match parse_features(text) {
            Ok(features) => features,
            Err(message) => return self.fail(message),
        };
        let mut records: Vec<FeatureRecord> = Vec::with_capacity(features.len());
        for feature in features {
            let geometry = match feature.geometry.as_ref().map(|g| value_shape(&g.value)) {
                None => None,
                Some(Ok(shape)) => self.create_geom(&shape, 0),
                Some(Err(message)) => {
                    self.report(&message);
                    None
                }
            };
            if feature.geometry.is_some() && geometry.is_none() {
                for id in records.iter().filter_map(|r| r.geometry) {
                    self.destroy_geom(id);
                }
                return None;
            }
            records.push(FeatureRecord {
                id: feature.id,
                properties: feature.properties,
                geometry,
            });
        }
        Some(records)
    }

    /// `id` as a GeoJSON geometry object, for embedding in a feature.
    pub(crate) fn geojson_geometry(&self, codec: CodecId, id: GeomId) -> Option<::geojson::Geometry> {
        if !matches!(self.codec(codec)?, CodecNode::GeoJsonWriter) {
            return self.fail("IllegalArgumentException: handle is not a GeoJSON writer");
        }
        let shape = self.export(id)?;
        Some(::geojson::Geometry::new(shape_value(&shape)))
    }

    /// Write `id`; `indent` of `None` or zero gives compact output.
    pub(crate) fn geojson_write(
        &self,
        codec: CodecId,
        id: GeomId,
        indent: Option<usize>,
    ) -> Option<String> {
        if !matches!(self.codec(codec)?, CodecNode::GeoJsonWriter) {
            return self.fail("IllegalArgumentException: handle is not a GeoJSON writer");
        }
        let shape = self.export(id)?;
        match write(&shape, indent) {
            Ok(text) => Some(text),
            Err(message) => self.fail(format!("IllegalStateException: {message}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_geometries() {
        let shape = parse(r#"{"type":"Point","coordinates":[1.0,2.0]}"#).unwrap();
        assert_eq!(shape, Shape::Point(Coords::from_xy([(1.0, 2.0)])));

        let shape = parse(r#"{"type":"LineString","coordinates":[[0,0],[1,1,5]]}"#).unwrap();
        match shape {
            Shape::LineString(c) => {
                assert_eq!(c.dims, 3);
                assert!(c.coord(0)[2].is_nan());
                assert_eq!(c.coord(1)[2], 5.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_features_become_geometries() {
        let feature = r#"{"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[1,2]}}"#;
        assert_eq!(parse(feature).unwrap().type_id().name(), "Point");

        let collection = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":null,"geometry":{"type":"Point","coordinates":[1,2]}},
            {"type":"Feature","properties":null,"geometry":null}
        ]}"#;
        match parse(collection).unwrap() {
            Shape::GeometryCollection(members) => {
                assert_eq!(members.len(), 2);
                assert!(members[1].is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let polygon = Shape::Polygon(vec![Coords::from_xy([
            (0.0, 0.0),
            (1.0, 0.0),
            (1.0, 1.0),
            (0.0, 0.0),
        ])]);
        let text = write(&polygon, None).unwrap();
        assert!(!text.contains('\n'));
        assert_eq!(parse(&text).unwrap(), polygon);

        let pretty = write(&polygon, Some(2)).unwrap();
        assert!(pretty.contains("\n  \""));
        assert_eq!(parse(&pretty).unwrap(), polygon);
    }

    #[test]
    fn test_empty_point() {
        let empty = Shape::Point(Coords::empty(2));
        let text = write(&empty, None).unwrap();
        assert!(text.contains("\"coordinates\":[]"));
        assert_eq!(parse(&text).unwrap(), empty);
    }

    #[test]
    fn test_malformed_input() {
        assert!(parse("{").unwrap_err().starts_with("ParseException"));
        assert!(parse(r#"{"type":"Circle","coordinates":[0,0]}"#).is_err());
    }
}
