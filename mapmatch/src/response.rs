use serde::Serialize;
use serde_json::{json, Map, Value};

/// Pulls the features out of one API response. The API normally answers with a
/// FeatureCollection, but a lone Feature or a bare geometry are accepted too. Anything else yields
/// no features.
pub fn extract_features(resp: &Value) -> Vec<Value> {
    let obj = match resp.as_object() {
        Some(obj) => obj,
        None => return Vec::new(),
    };

    if let Some(Value::Array(features)) = obj.get("features") {
        return features.clone();
    }
    if obj.get("type").and_then(Value::as_str) == Some("Feature") {
        return vec![resp.clone()];
    }
    if let Some(geometry) = obj.get("geometry") {
        let properties = obj
            .get("properties")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        return vec![json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        })];
    }
    Vec::new()
}

/// The merged result of every batch. Features are kept exactly as the API returned them, in batch
/// order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    kind: &'static str,
    pub features: Vec<Value>,
}

impl FeatureCollection {
    pub fn new() -> FeatureCollection {
        FeatureCollection {
            kind: "FeatureCollection",
            features: Vec::new(),
        }
    }

    pub fn merge<I: IntoIterator<Item = Vec<Value>>>(batches: I) -> FeatureCollection {
        let mut merged = FeatureCollection::new();
        for features in batches {
            merged.push_batch(features);
        }
        merged
    }

    pub fn push_batch(&mut self, features: Vec<Value>) {
        self.features.extend(features);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl Default for FeatureCollection {
    fn default() -> FeatureCollection {
        FeatureCollection::new()
    }
}
