use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON Schema type keyword value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl SchemaType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(SchemaType::String),
            "number" => Some(SchemaType::Number),
            "integer" => Some(SchemaType::Integer),
            "boolean" => Some(SchemaType::Boolean),
            "array" => Some(SchemaType::Array),
            "object" => Some(SchemaType::Object),
            "null" => Some(SchemaType::Null),
            _ => None,
        }
    }
}

/// One level of a JSON Schema object (OpenAPI 3.x / Swagger 2.0 superset).
///
/// Child schemas stay raw: the canonicalizer reads one node at a time so a
/// malformed child only degrades itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub ref_path: Option<String>,

    /// Either a type name or a list of them; kept raw so unknown names
    /// degrade instead of failing.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,

    // Object properties
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    // Array items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,

    // Composition
    #[serde(rename = "allOf", default, skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<Value>,

    #[serde(rename = "oneOf", default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<Value>,

    #[serde(rename = "anyOf", default, skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<Value>,

    // Enum values
    #[serde(rename = "enum", default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,

    // Numeric constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    // String constraints
    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    // Array constraints
    #[serde(rename = "minItems", skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(rename = "maxItems", skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,

    // Const
    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Value>,

    // Examples
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
}

/// The `type` keyword, read leniently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDecl {
    /// No `type` keyword.
    Absent,
    /// One or more recognised type names, in declared order.
    Known(Vec<SchemaType>),
    /// A type name this toolkit does not understand, or a malformed value.
    Invalid(String),
}

impl Schema {
    /// Read one raw node. A node that is not an object, or whose keywords
    /// carry the wrong JSON types, yields an error message instead.
    pub fn from_raw(raw: &Value) -> Result<Schema, String> {
        match raw {
            Value::Object(_) => Schema::deserialize(raw).map_err(|e| e.to_string()),
            Value::Bool(true) => Ok(Schema::default()),
            other => Err(format!("expected a schema object, found {other}")),
        }
    }

    pub fn type_decl(&self) -> TypeDecl {
        match &self.schema_type {
            None => TypeDecl::Absent,
            Some(Value::String(name)) => match SchemaType::from_name(name) {
                Some(t) => TypeDecl::Known(vec![t]),
                None => TypeDecl::Invalid(name.clone()),
            },
            Some(Value::Array(names)) => {
                let mut types = Vec::with_capacity(names.len());
                for name in names {
                    match name.as_str().and_then(SchemaType::from_name) {
                        Some(t) if !types.contains(&t) => types.push(t),
                        Some(_) => {}
                        None => return TypeDecl::Invalid(name.to_string()),
                    }
                }
                TypeDecl::Known(types)
            }
            Some(other) => TypeDecl::Invalid(other.to_string()),
        }
    }

    /// The declared example: `example`, then the first of `examples`, then `const`.
    pub fn declared_example(&self) -> Option<Value> {
        self.example
            .clone()
            .or_else(|| self.examples.first().cloned())
            .or_else(|| self.const_value.clone())
    }
}
