use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Media type preferred when a body declares several.
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// A media type object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MediaType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub examples: IndexMap<String, Value>,
}

impl MediaType {
    /// The declared example: `example`, else the `value` of the first named
    /// example object.
    pub fn declared_example(&self) -> Option<Value> {
        if let Some(ref example) = self.example {
            return Some(example.clone());
        }
        self.examples
            .values()
            .find_map(|e| e.get("value").cloned())
    }
}

/// Pick `application/json` when present, otherwise the first declared entry.
pub fn preferred<'a, T>(content: &'a IndexMap<String, T>) -> Option<(&'a String, &'a T)> {
    content
        .get_key_value(JSON_MEDIA_TYPE)
        .or_else(|| content.iter().find(|(k, _)| k.ends_with("+json")))
        .or_else(|| content.first())
}
