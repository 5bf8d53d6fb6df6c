//! GeoJSON features whose geometries are owned by a [`Context`].
//!
//! Ids and properties are carried through unchanged; the geometry of each
//! feature is an ordinary [`Geometry`] and may come from any context.
//!
//! [`Context`]: crate::Context

use crate::engine::write_json;
use crate::error::{Error, Result};
use crate::geometry::Geometry;
pub use geojson::feature::Id;
pub use geojson::{JsonObject, JsonValue};

/// A geometry with an optional id and properties.
#[derive(Clone, Debug, Default)]
pub struct Feature {
    pub id: Option<Id>,
    pub properties: Option<JsonObject>,
    pub geometry: Option<Geometry>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry: Some(geometry),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: Id) -> Self {
        self.id = Some(id);
        self
    }

    pub fn property(&self, key: &str) -> Option<&JsonValue> {
        self.properties.as_ref()?.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.properties
            .get_or_insert_with(JsonObject::new)
            .insert(key.into(), value.into());
    }

    fn raw(&self) -> geojson::Feature {
        geojson::Feature {
            id: self.id.clone(),
            properties: self.properties.clone(),
            geometry: self.geometry.as_ref().map(Geometry::geojson_geometry),
            ..Default::default()
        }
    }

    /// `None` uses the indent configured on the geometry's context.
    pub fn to_geojson(&self, indent: Option<usize>) -> Result<String> {
        let indent = indent.or_else(|| configured_indent(self.geometry.iter()));
        write(&self.raw(), indent)
    }
}

/// An ordered list of features.
#[derive(Clone, Debug, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }

    /// `None` uses the indent configured on the context of the first
    /// feature with a geometry.
    pub fn to_geojson(&self, indent: Option<usize>) -> Result<String> {
        let indent = indent.or_else(|| {
            configured_indent(self.features.iter().filter_map(|f| f.geometry.as_ref()))
        });
        let raw = geojson::FeatureCollection {
            bbox: None,
            features: self.features.iter().map(Feature::raw).collect(),
            foreign_members: None,
        };
        write(&raw, indent)
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        Self {
            features: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

impl<'a> IntoIterator for &'a FeatureCollection {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.iter()
    }
}

fn configured_indent<'a>(mut geometries: impl Iterator<Item = &'a Geometry>) -> Option<usize> {
    geometries
        .next()
        .and_then(|geom| geom.context().config().geojson_indent)
}

fn write<T: serde::Serialize>(value: &T, indent: Option<usize>) -> Result<String> {
    write_json(value, indent)
        .map_err(|message| Error::Engine(format!("IllegalStateException: {message}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;
    use serde_json::json;

    #[test]
    fn test_round_trip_keeps_id_and_properties() {
        let ctx = Context::new();
        let text = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":"park","properties":{"name":"Central","area":12.5},
             "geometry":{"type":"Polygon","coordinates":[[[0,0],[4,0],[4,4],[0,4],[0,0]]]}},
            {"type":"Feature","id":7,"properties":null,"geometry":null}
        ]}"#;
        let features = ctx.new_features_from_geojson(text).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(ctx.engine_stats().geometries, 1);

        let park = &features.features[0];
        assert_eq!(park.id, Some(Id::String("park".to_string())));
        assert_eq!(park.property("name"), Some(&json!("Central")));
        assert_eq!(park.geometry.as_ref().unwrap().area(), 16.0);

        let empty = &features.features[1];
        assert_eq!(empty.id, Some(Id::Number(7.into())));
        assert!(empty.properties.is_none());
        assert!(empty.geometry.is_none());

        let other = Context::new();
        let again = other
            .new_features_from_geojson(&features.to_geojson(None).unwrap())
            .unwrap();
        assert_eq!(again.features[0].id, park.id);
        assert_eq!(again.features[0].properties, park.properties);
        assert_eq!(
            again.features[0].geometry.as_ref().unwrap().to_wkt(),
            "POLYGON ((0 0, 4 0, 4 4, 0 4, 0 0))"
        );
        assert!(again.features[1].geometry.is_none());
        assert_eq!(other.engine_stats().geometries, 1);
    }

    #[test]
    fn test_bare_geometry_is_one_feature() {
        let ctx = Context::new();
        let features = ctx
            .new_features_from_geojson(r#"{"type":"Point","coordinates":[1,2]}"#)
            .unwrap();
        assert_eq!(features.len(), 1);
        let feature = features.into_iter().next().unwrap();
        assert!(feature.id.is_none());
        assert_eq!(feature.geometry.unwrap().to_wkt(), "POINT (1 2)");
    }

    #[test]
    fn test_built_feature_serializes() {
        let ctx = Context::new();
        let mut feature = Feature::new(ctx.new_point_from_xy(1.0, 2.0)).with_id(Id::String("a".into()));
        feature.set_property("rank", 3);
        let text = feature.to_geojson(None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "Feature");
        assert_eq!(value["id"], "a");
        assert_eq!(value["properties"]["rank"], 3);
        assert_eq!(value["geometry"]["coordinates"], json!([1.0, 2.0]));
    }

    #[test]
    fn test_bad_member_leaves_nothing_behind() {
        let ctx = Context::new();
        let text = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[1,2]}},
            {"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1]]]}}
        ]}"#;
        let err = ctx.new_features_from_geojson(text).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert_eq!(ctx.engine_stats().geometries, 0);
    }
}
