use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::config::PropertyPolicy;
use crate::error::SynthesisError;
use crate::ir::{IrOperation, IrParameter, NodeId, SchemaKind, SchemaNode, SchemaTree};

/// Deepest recursion synthesis follows before giving up.
pub const MAX_SYNTHESIS_DEPTH: usize = 64;

/// Largest array an example will contain, whatever `minItems` asks for.
pub const MAX_EXAMPLE_ITEMS: u64 = 256;

/// Array elements one synthesized value may hold in total, counted through
/// every level of nesting.
pub const MAX_EXAMPLE_ELEMENTS: usize = 10_000;

/// Longest string an example will contain, whatever `minLength` asks for.
pub const MAX_EXAMPLE_STRING: usize = 4096;

const DEFAULT_STRING: &str = "string";
const DEFAULT_INTEGER: f64 = 42.0;
const DEFAULT_NUMBER: f64 = 123.45;

/// Canonical literal for a string `format`.
pub fn format_literal(format: &str) -> Option<&'static str> {
    Some(match format {
        "uuid" => "3fa85f64-5717-4562-b3fc-2c963f66afa6",
        "date-time" => "2024-01-01T00:00:00Z",
        "date" => "2024-01-01",
        "time" => "00:00:00",
        "email" => "user@example.com",
        "uri" | "url" => "https://example.com",
        "hostname" => "example.com",
        "ipv4" => "192.0.2.1",
        "ipv6" => "2001:db8::1",
        "byte" => "c3RyaW5n",
        "binary" => "binary",
        "password" => "********",
        _ => return None,
    })
}

/// Produces one deterministic example value per schema tree.
///
/// Per node, in order: the declared example, the first enum member, the
/// `{name}` token for a string property named after a path parameter, the
/// format literal, then the type default. A node reached again while it is
/// still being synthesized renders as a minimal placeholder instead.
#[derive(Debug, Clone, Default)]
pub struct ExampleSynthesizer {
    policy: PropertyPolicy,
    path_parameters: Vec<String>,
}

impl ExampleSynthesizer {
    pub fn new(policy: PropertyPolicy) -> Self {
        Self {
            policy,
            path_parameters: Vec::new(),
        }
    }

    /// String properties with these names render as `{name}` tokens.
    pub fn with_path_parameters<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_parameters = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn synthesize(&self, tree: &SchemaTree) -> Result<Value, SynthesisError> {
        let mut pass = Pass {
            synth: self,
            tree,
            on_path: Vec::new(),
            budget: MAX_EXAMPLE_ELEMENTS,
        };
        pass.value(tree.root, None, 0)
    }
}

/// Synthesize with the default policy and no path tokens.
pub fn synthesize(tree: &SchemaTree) -> Result<Value, SynthesisError> {
    ExampleSynthesizer::default().synthesize(tree)
}

/// One example per declared response, keyed by status code. Properties named
/// after the operation's path parameters carry `{name}` tokens.
pub fn response_examples(
    op: &IrOperation,
    policy: PropertyPolicy,
) -> Result<IndexMap<String, Value>, SynthesisError> {
    let synth = ExampleSynthesizer::new(policy).with_path_parameters(op.path_parameter_names());
    op.responses
        .iter()
        .map(|(status, response)| Ok((status.clone(), synth.synthesize(&response.schema)?)))
        .collect()
}

/// The request body example, if the operation takes a body.
pub fn request_example(
    op: &IrOperation,
    policy: PropertyPolicy,
) -> Result<Option<Value>, SynthesisError> {
    let synth = ExampleSynthesizer::new(policy);
    op.request_body
        .as_ref()
        .map(|body| synth.synthesize(&body.schema))
        .transpose()
}

/// One example per parameter, in declaration order. Names may repeat across
/// locations, so each value stays paired with its parameter.
pub fn parameter_examples(
    op: &IrOperation,
) -> Result<Vec<(&IrParameter, Value)>, SynthesisError> {
    let synth = ExampleSynthesizer::default();
    op.parameters
        .iter()
        .map(|p| Ok((p, synth.synthesize(&p.schema)?)))
        .collect()
}

struct Pass<'s, 't> {
    synth: &'s ExampleSynthesizer,
    tree: &'t SchemaTree,
    on_path: Vec<NodeId>,
    /// Array elements still available to this pass.
    budget: usize,
}

impl<'s, 't> Pass<'s, 't> {
    fn node(&self, id: NodeId) -> Result<&'t SchemaNode, SynthesisError> {
        self.tree.node(id).ok_or_else(|| {
            SynthesisError::MalformedSchema(format!(
                "node {} is outside a tree of {} nodes",
                id.0,
                self.tree.len()
            ))
        })
    }

    fn value(
        &mut self,
        id: NodeId,
        property: Option<&str>,
        depth: usize,
    ) -> Result<Value, SynthesisError> {
        if depth > MAX_SYNTHESIS_DEPTH {
            return Err(SynthesisError::SynthesisDepthExceeded(MAX_SYNTHESIS_DEPTH));
        }
        let node = self.node(id)?;
        if let Some(ref example) = node.example {
            return Ok(example.clone());
        }
        if self.on_path.contains(&id) {
            debug!("node {} revisited, rendering placeholder", id.0);
            return self.placeholder(id);
        }

        self.on_path.push(id);
        let value = self.fresh(node, property, depth);
        self.on_path.pop();
        value
    }

    fn fresh(
        &mut self,
        node: &'t SchemaNode,
        property: Option<&str>,
        depth: usize,
    ) -> Result<Value, SynthesisError> {
        match &node.kind {
            SchemaKind::String {
                format,
                enum_values,
                min_length,
                max_length,
                ..
            } => {
                if let Some(first) = enum_values.first() {
                    return Ok(first.clone());
                }
                if let Some(name) = property.filter(|p| self.is_path_parameter(p)) {
                    return Ok(Value::String(format!("{{{name}}}")));
                }
                if let Some(literal) = format.as_deref().and_then(format_literal) {
                    return Ok(Value::String(literal.to_string()));
                }
                Ok(default_string(*min_length, *max_length))
            }
            SchemaKind::Number {
                integer,
                minimum,
                maximum,
            } => Ok(default_number(*integer, *minimum, *maximum)),
            SchemaKind::Boolean => Ok(Value::Bool(true)),
            SchemaKind::Array {
                items,
                min_items,
                max_items,
            } => {
                let wanted = item_count(*min_items, *max_items);
                if wanted == 0 {
                    return Ok(Value::Array(Vec::new()));
                }
                let before = self.budget;
                let item = self.value(*items, None, depth + 1)?;
                // One item stands for itself plus every element nested in it.
                let weight = before - self.budget + 1;
                self.budget = self.budget.saturating_sub(1);
                let count = wanted.min(1 + self.budget / weight);
                if count < wanted {
                    warn!(
                        "example element budget of {MAX_EXAMPLE_ELEMENTS} reached, \
                         array truncated to {count} of {wanted} items"
                    );
                }
                self.budget -= (count - 1) * weight;
                Ok(Value::Array(vec![item; count]))
            }
            SchemaKind::Object {
                properties,
                required,
            } => {
                let mut map = Map::new();
                for (name, child) in properties {
                    if self.synth.policy == PropertyPolicy::RequiredOnly
                        && !required.contains(name)
                    {
                        continue;
                    }
                    let value = self.value(*child, Some(name.as_str()), depth + 1)?;
                    map.insert(name.clone(), value);
                }
                Ok(Value::Object(map))
            }
            SchemaKind::OneOf { variants } => match variants.first() {
                Some(first) => self.value(*first, property, depth + 1),
                None => Ok(Value::Object(Map::new())),
            },
            SchemaKind::Unknown => Ok(Value::Object(Map::new())),
        }
    }

    /// Minimal value for a node already on the current path.
    fn placeholder(&self, id: NodeId) -> Result<Value, SynthesisError> {
        let mut seen = vec![id];
        let mut node = self.node(id)?;
        while let SchemaKind::OneOf { variants } = &node.kind {
            match variants.first() {
                Some(first) if !seen.contains(first) => {
                    seen.push(*first);
                    node = self.node(*first)?;
                    if let Some(ref example) = node.example {
                        return Ok(example.clone());
                    }
                }
                _ => return Ok(Value::Object(Map::new())),
            }
        }

        Ok(match &node.kind {
            SchemaKind::Array { .. } => Value::Array(Vec::new()),
            SchemaKind::String {
                enum_values,
                min_length,
                max_length,
                ..
            } => match enum_values.first() {
                Some(first) => first.clone(),
                None => default_string(*min_length, *max_length),
            },
            SchemaKind::Number {
                integer,
                minimum,
                maximum,
            } => default_number(*integer, *minimum, *maximum),
            SchemaKind::Boolean => Value::Bool(true),
            SchemaKind::Object { .. } | SchemaKind::OneOf { .. } | SchemaKind::Unknown => {
                Value::Object(Map::new())
            }
        })
    }

    fn is_path_parameter(&self, property: &str) -> bool {
        self.synth.path_parameters.iter().any(|p| p == property)
    }
}

/// `"string"`, padded with `x` up to `min_length` and cut at `max_length`.
fn default_string(min_length: Option<u64>, max_length: Option<u64>) -> Value {
    let mut text = DEFAULT_STRING.to_string();
    let mut min = usize::try_from(min_length.unwrap_or(0)).unwrap_or(usize::MAX);
    if min > MAX_EXAMPLE_STRING {
        warn!("minLength {min} exceeds {MAX_EXAMPLE_STRING}, truncating example string");
        min = MAX_EXAMPLE_STRING;
    }
    if text.len() < min {
        text.extend(std::iter::repeat_n('x', min - text.len()));
    }
    if let Some(max) = max_length {
        text.truncate(usize::try_from(max).unwrap_or(usize::MAX));
    }
    Value::String(text)
}

/// 42 or 123.45, moved into `[minimum, maximum]`.
fn default_number(integer: bool, minimum: Option<f64>, maximum: Option<f64>) -> Value {
    let mut value = if integer { DEFAULT_INTEGER } else { DEFAULT_NUMBER };
    if let Some(min) = minimum {
        value = value.max(min);
    }
    if let Some(max) = maximum {
        value = value.min(max);
    }

    if integer {
        let mut whole = value.ceil();
        if maximum.is_some_and(|max| whole > max) {
            whole = value.floor();
        }
        return Value::from(whole as i64);
    }
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(0))
}

/// `max(1, min_items)`, capped by `max_items`.
fn item_count(min_items: Option<u64>, max_items: Option<u64>) -> usize {
    let mut count = min_items.unwrap_or(0).max(1);
    if let Some(max) = max_items {
        count = count.min(max);
    }
    if count > MAX_EXAMPLE_ITEMS {
        warn!("minItems {count} exceeds {MAX_EXAMPLE_ITEMS}, truncating example array");
        count = MAX_EXAMPLE_ITEMS;
    }
    count as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::TreeBuilder;
    use serde_json::json;

    #[test]
    fn test_format_literals() {
        assert_eq!(
            format_literal("uuid"),
            Some("3fa85f64-5717-4562-b3fc-2c963f66afa6")
        );
        assert_eq!(format_literal("url"), Some("https://example.com"));
        assert_eq!(format_literal("int64"), None);
    }

    #[test]
    fn test_default_string_respects_lengths() {
        assert_eq!(default_string(None, None), json!("string"));
        assert_eq!(default_string(Some(9), None), json!("stringxxx"));
        assert_eq!(default_string(None, Some(3)), json!("str"));
    }

    #[test]
    fn test_huge_min_length_is_capped() {
        let Value::String(text) = default_string(Some(u64::MAX), None) else {
            panic!("expected a string");
        };
        assert_eq!(text.len(), MAX_EXAMPLE_STRING);
        assert!(text.starts_with("stringx"));
    }

    #[test]
    fn test_default_number_clamps() {
        assert_eq!(default_number(true, None, None), json!(42));
        assert_eq!(default_number(true, Some(100.0), None), json!(100));
        assert_eq!(default_number(true, None, Some(10.0)), json!(10));
        assert_eq!(default_number(true, Some(0.5), Some(1.5)), json!(1));
        assert_eq!(default_number(false, None, None), json!(123.45));
        assert_eq!(default_number(false, None, Some(1.0)), json!(1.0));
    }

    #[test]
    fn test_item_count() {
        assert_eq!(item_count(None, None), 1);
        assert_eq!(item_count(Some(3), None), 3);
        assert_eq!(item_count(Some(3), Some(2)), 2);
        assert_eq!(item_count(None, Some(0)), 0);
        assert_eq!(item_count(Some(10_000), None), MAX_EXAMPLE_ITEMS as usize);
    }

    #[test]
    fn test_enum_beats_format() {
        let tree = SchemaTree::single(SchemaNode::new(SchemaKind::String {
            format: Some("uuid".to_string()),
            pattern: None,
            enum_values: vec![json!("fixed")],
            min_length: None,
            max_length: None,
        }));
        assert_eq!(synthesize(&tree).unwrap(), json!("fixed"));
    }

    #[test]
    fn test_dangling_node_is_malformed() {
        let mut builder = TreeBuilder::new();
        let root = builder.push(SchemaNode::new(SchemaKind::Array {
            items: NodeId(7),
            min_items: None,
            max_items: None,
        }));
        let tree = builder.finish(root);
        assert!(matches!(
            synthesize(&tree),
            Err(SynthesisError::MalformedSchema(_))
        ));
    }

    #[test]
    fn test_one_of_self_loop_placeholder() {
        let mut builder = TreeBuilder::new();
        let root = builder.reserve();
        builder.set(root, SchemaNode::new(SchemaKind::OneOf { variants: vec![root] }));
        let tree = builder.finish(root);
        assert_eq!(synthesize(&tree).unwrap(), json!({}));
    }

    #[test]
    fn test_path_parameter_token_only_for_strings() {
        let mut builder = TreeBuilder::new();
        let root = builder.reserve();
        let id = builder.push(SchemaNode::new(SchemaKind::string()));
        let count = builder.push(SchemaNode::new(SchemaKind::number(true)));
        let mut properties = indexmap::IndexMap::new();
        properties.insert("paymentId".to_string(), id);
        properties.insert("count".to_string(), count);
        builder.set(
            root,
            SchemaNode::new(SchemaKind::Object {
                properties,
                required: Default::default(),
            }),
        );
        let tree = builder.finish(root);

        let synth = ExampleSynthesizer::default().with_path_parameters(["paymentId", "count"]);
        assert_eq!(
            synth.synthesize(&tree).unwrap(),
            json!({ "paymentId": "{paymentId}", "count": 42 })
        );
        assert_eq!(
            synthesize(&tree).unwrap(),
            json!({ "paymentId": "string", "count": 42 })
        );
    }
}
