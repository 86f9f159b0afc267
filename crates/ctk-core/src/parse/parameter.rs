use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameter location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterLocation {
    Query,
    Header,
    Path,
    Cookie,
    /// Swagger 2.0 request body parameter.
    Body,
    /// Swagger 2.0 form field.
    FormData,
}

/// An API parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,

    #[serde(rename = "in")]
    pub location: ParameterLocation,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,

    // Swagger 2.0 declares non-body parameter types inline.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub param_type: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,

    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
}

impl Parameter {
    /// The parameter's schema: the declared `schema`, or one assembled from
    /// inline Swagger 2.0 type fields. `None` when neither exists.
    pub fn effective_schema(&self) -> Option<Value> {
        if let Some(ref schema) = self.schema {
            return Some(schema.clone());
        }
        let param_type = self.param_type.as_ref()?;
        let mut inline = Map::new();
        inline.insert("type".to_string(), param_type.clone());
        if let Some(ref format) = self.format {
            inline.insert("format".to_string(), Value::String(format.clone()));
        }
        if let Some(ref items) = self.items {
            inline.insert("items".to_string(), items.clone());
        }
        if !self.enum_values.is_empty() {
            inline.insert("enum".to_string(), Value::Array(self.enum_values.clone()));
        }
        Some(Value::Object(inline))
    }
}
