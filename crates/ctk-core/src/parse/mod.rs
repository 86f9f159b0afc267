pub mod components;
pub mod media_type;
pub mod operation;
pub mod parameter;
pub mod ref_resolve;
pub mod request_body;
pub mod response;
pub mod schema;
pub mod spec;

use serde_json::Value;

use crate::error::ParseError;
use spec::OpenApiSpec;

/// A parsed contract: the typed view used to walk paths and operations, plus
/// the raw tree that `$ref` pointers are resolved against.
#[derive(Debug, Clone)]
pub struct ContractDocument {
    pub spec: OpenApiSpec,
    pub raw: Value,
}

/// Parse a contract from YAML.
pub fn from_yaml(input: &str) -> Result<ContractDocument, ParseError> {
    from_value(yaml_value(input)?)
}

/// Load an arbitrary YAML document as a JSON tree.
pub fn yaml_value(input: &str) -> Result<Value, ParseError> {
    let yaml: serde_yaml_ng::Value = serde_yaml_ng::from_str(input)?;
    Ok(yaml_to_json(yaml))
}

/// Parse a contract from JSON.
pub fn from_json(input: &str) -> Result<ContractDocument, ParseError> {
    let raw: Value = serde_json::from_str(input)?;
    from_value(raw)
}

/// Build a contract from an already-loaded tree.
pub fn from_value(raw: Value) -> Result<ContractDocument, ParseError> {
    if !raw.is_object() {
        return Err(ParseError::MissingField("openapi".to_string()));
    }
    let spec: OpenApiSpec = serde_json::from_value(raw.clone())?;
    validate_version(&spec)?;
    Ok(ContractDocument { spec, raw })
}

fn validate_version(spec: &OpenApiSpec) -> Result<(), ParseError> {
    match (&spec.openapi, &spec.swagger) {
        (Some(v), _) if v.starts_with("3.") => Ok(()),
        (None, Some(v)) if v.starts_with("2.") => Ok(()),
        (Some(v), _) | (None, Some(v)) => Err(ParseError::UnsupportedVersion(v.clone())),
        (None, None) => Err(ParseError::MissingField("openapi".to_string())),
    }
}

/// YAML mapping keys need not be strings (`200:` is an integer); JSON object
/// keys must be.
fn yaml_to_json(value: serde_yaml_ng::Value) -> Value {
    use serde_yaml_ng::Value as Yaml;
    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        Yaml::Mapping(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (yaml_key(k), yaml_to_json(v)))
                .collect(),
        ),
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: serde_yaml_ng::Value) -> String {
    use serde_yaml_ng::Value as Yaml;
    match key {
        Yaml::String(s) => s,
        Yaml::Number(n) => n.to_string(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Null => "null".to_string(),
        other => serde_yaml_ng::to_string(&other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
