use indexmap::IndexSet;
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::error::NormalizeError;
use crate::ir::{NodeId, SchemaKind, SchemaNode, SchemaTree, TreeBuilder};
use crate::parse::ref_resolve::{RefResolver, escape_segment, ref_of};
use crate::parse::schema::{Schema, SchemaType, TypeDecl};

/// Deepest schema nesting canonicalized before the node is rejected.
pub const MAX_CANONICAL_DEPTH: usize = 64;

/// Largest arena a single schema may expand into.
pub const MAX_TREE_NODES: usize = 10_000;

/// Turns raw schemas into canonical [`SchemaTree`]s.
///
/// `$ref` pointers resolve against the document the canonicalizer was built
/// for. A reference to a schema that is still being canonicalized higher up
/// the current path becomes an edge back to that ancestor.
#[derive(Debug, Clone, Copy)]
pub struct Canonicalizer<'a> {
    resolver: RefResolver<'a>,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(document: &'a Value) -> Self {
        Self {
            resolver: RefResolver::new(document),
        }
    }

    /// Canonicalize one raw schema found at `pointer` (used in error reports).
    pub fn canonicalize(&self, raw: &Value, pointer: &str) -> Result<SchemaTree, NormalizeError> {
        let mut walk = Walk {
            resolver: self.resolver,
            builder: TreeBuilder::new(),
            in_progress: Vec::new(),
            count: 0,
        };
        let root = walk.node(raw, pointer, 0)?;
        let tree = walk.builder.finish(root);
        debug!("canonicalized {pointer} into {} nodes", tree.len());
        Ok(tree)
    }
}

/// Canonicalize a self-contained schema; its `$ref`s resolve against itself.
pub fn canonicalize_schema(raw: &Value) -> Result<SchemaTree, NormalizeError> {
    Canonicalizer::new(raw).canonicalize(raw, "#")
}

struct Walk<'a> {
    resolver: RefResolver<'a>,
    builder: TreeBuilder,
    /// Reference pointers being canonicalized on the current path.
    in_progress: Vec<(String, NodeId)>,
    count: usize,
}

impl<'a> Walk<'a> {
    fn node(&mut self, raw: &Value, at: &str, depth: usize) -> Result<NodeId, NormalizeError> {
        if depth > MAX_CANONICAL_DEPTH {
            return Err(malformed(
                at,
                format!("schema nesting exceeds {MAX_CANONICAL_DEPTH} levels"),
            ));
        }
        self.count += 1;
        if self.count > MAX_TREE_NODES {
            return Err(malformed(
                at,
                format!("schema expands beyond {MAX_TREE_NODES} nodes"),
            ));
        }

        let Some(pointer) = ref_of(raw) else {
            let id = self.builder.reserve();
            let node = self.build(raw, at, depth)?;
            self.builder.set(id, node);
            return Ok(id);
        };

        if let Some(ancestor) = self.ancestor(pointer) {
            debug!("recursive schema {pointer} linked back to node {}", ancestor.0);
            return Ok(ancestor);
        }

        let (target, chain) = self.resolver.resolve_chain(pointer)?;
        let id = self.builder.reserve();
        let mark = self.in_progress.len();
        self.in_progress
            .extend(chain.iter().map(|p| (p.clone(), id)));
        let target_at = chain.last().map(String::as_str).unwrap_or(pointer);
        let built = self.build(target, target_at, depth);
        self.in_progress.truncate(mark);

        let mut node = built?;
        overlay_ref_siblings(&mut node, raw);
        self.builder.set(id, node);
        Ok(id)
    }

    fn ancestor(&self, pointer: &str) -> Option<NodeId> {
        self.in_progress
            .iter()
            .find(|(p, _)| p == pointer)
            .map(|(_, id)| *id)
    }

    fn build(&mut self, raw: &Value, at: &str, depth: usize) -> Result<SchemaNode, NormalizeError> {
        let schema = Schema::from_raw(raw).map_err(|reason| malformed(at, reason))?;

        if !schema.all_of.is_empty() {
            let mut merging = Vec::new();
            return match merge_all_of(&self.resolver, raw, at, &mut merging, depth)? {
                Merged::Schema(merged) => {
                    let merged_at = format!("{at}/allOf");
                    self.build(&Value::Object(merged), &merged_at, depth + 1)
                }
                Merged::Conflict(reason) => {
                    warn!("{at}: allOf branches conflict ({reason}), degrading to unknown");
                    Ok(metadata(SchemaNode::unknown(), &schema))
                }
            };
        }

        let branches = if !schema.one_of.is_empty() {
            Some(("oneOf", &schema.one_of))
        } else if !schema.any_of.is_empty() {
            Some(("anyOf", &schema.any_of))
        } else {
            None
        };
        if let Some((keyword, branches)) = branches {
            let mut variants = Vec::with_capacity(branches.len());
            for (i, branch) in branches.iter().enumerate() {
                variants.push(self.node(branch, &format!("{at}/{keyword}/{i}"), depth + 1)?);
            }
            return Ok(metadata(
                SchemaNode::new(SchemaKind::OneOf { variants }),
                &schema,
            ));
        }

        let (types, nullable) = match schema.type_decl() {
            TypeDecl::Invalid(name) => {
                warn!("{at}: unsupported type {name}, degrading to unknown");
                return Ok(metadata(SchemaNode::unknown(), &schema));
            }
            TypeDecl::Known(types) => {
                let nullable = types.contains(&SchemaType::Null);
                let non_null: Vec<SchemaType> = types
                    .into_iter()
                    .filter(|t| *t != SchemaType::Null)
                    .collect();
                (non_null, nullable)
            }
            TypeDecl::Absent => (infer_types(&schema), false),
        };

        let mut node = match types.as_slice() {
            [] => SchemaNode::unknown(),
            [single] => self.typed(*single, &schema, at, depth)?,
            many => {
                // Variants sit one level below the union.
                if depth + 1 > MAX_CANONICAL_DEPTH {
                    return Err(malformed(
                        at,
                        format!("schema nesting exceeds {MAX_CANONICAL_DEPTH} levels"),
                    ));
                }
                let mut variants = Vec::with_capacity(many.len());
                for t in many {
                    let id = self.builder.reserve();
                    let variant = self.typed(*t, &schema, at, depth + 1)?;
                    self.builder.set(id, variant);
                    variants.push(id);
                }
                SchemaNode::new(SchemaKind::OneOf { variants })
            }
        };
        node = metadata(node, &schema);
        node.nullable |= nullable;
        Ok(node)
    }

    fn typed(
        &mut self,
        schema_type: SchemaType,
        schema: &Schema,
        at: &str,
        depth: usize,
    ) -> Result<SchemaNode, NormalizeError> {
        let structural = !schema.properties.is_empty() || schema.items.is_some();
        let kind = match schema_type {
            SchemaType::Object => {
                if schema.items.is_some() {
                    return Ok(contradictory(at, "object with items"));
                }
                let mut properties = indexmap::IndexMap::with_capacity(schema.properties.len());
                for (name, prop) in &schema.properties {
                    let prop_at = format!("{at}/properties/{}", escape_segment(name));
                    let id = self.node(prop, &prop_at, depth + 1)?;
                    properties.insert(name.clone(), id);
                }
                let required: IndexSet<String> = schema.required.iter().cloned().collect();
                for name in &required {
                    if !properties.contains_key(name) {
                        debug!("{at}: required property {name} is not declared");
                        let id = self.builder.push(SchemaNode::unknown());
                        properties.insert(name.clone(), id);
                    }
                }
                SchemaKind::Object {
                    properties,
                    required,
                }
            }
            SchemaType::Array => {
                if !schema.properties.is_empty() {
                    return Ok(contradictory(at, "array with properties"));
                }
                let Some(ref items) = schema.items else {
                    return Err(malformed(at, "array schema without items".to_string()));
                };
                if let (Some(min), Some(max)) = (schema.min_items, schema.max_items) {
                    if min > max {
                        return Ok(contradictory(at, "minItems greater than maxItems"));
                    }
                }
                let items = self.node(items, &format!("{at}/items"), depth + 1)?;
                SchemaKind::Array {
                    items,
                    min_items: schema.min_items,
                    max_items: schema.max_items,
                }
            }
            SchemaType::String => {
                if structural {
                    return Ok(contradictory(at, "string with structural keywords"));
                }
                if let (Some(min), Some(max)) = (schema.min_length, schema.max_length) {
                    if min > max {
                        return Ok(contradictory(at, "minLength greater than maxLength"));
                    }
                }
                SchemaKind::String {
                    format: schema.format.clone(),
                    pattern: schema.pattern.clone(),
                    enum_values: schema.enum_values.clone(),
                    min_length: schema.min_length,
                    max_length: schema.max_length,
                }
            }
            SchemaType::Number | SchemaType::Integer => {
                if structural {
                    return Ok(contradictory(at, "number with structural keywords"));
                }
                if let (Some(min), Some(max)) = (schema.minimum, schema.maximum) {
                    if min > max {
                        return Ok(contradictory(at, "minimum greater than maximum"));
                    }
                }
                SchemaKind::Number {
                    integer: schema_type == SchemaType::Integer,
                    minimum: schema.minimum,
                    maximum: schema.maximum,
                }
            }
            SchemaType::Boolean => {
                if structural {
                    return Ok(contradictory(at, "boolean with structural keywords"));
                }
                SchemaKind::Boolean
            }
            SchemaType::Null => SchemaKind::Unknown,
        };

        let mut node = SchemaNode::new(kind);
        // Non-string enums have no slot on their node; the first member
        // stands in as the declared example so synthesis stays in the set.
        if !matches!(node.kind, SchemaKind::String { .. }) {
            node.example = schema.enum_values.first().cloned();
        }
        Ok(node)
    }
}

fn metadata(mut node: SchemaNode, schema: &Schema) -> SchemaNode {
    if let Some(example) = schema.declared_example() {
        node.example = Some(example);
    }
    if node.description.is_none() {
        node.description = schema.description.clone();
    }
    node.nullable |= schema.nullable.unwrap_or(false);
    node
}

/// OpenAPI 3.1 allows annotations next to `$ref`; they override the target's.
fn overlay_ref_siblings(node: &mut SchemaNode, raw: &Value) {
    let Some(map) = raw.as_object() else {
        return;
    };
    if let Some(example) = map.get("example") {
        node.example = Some(example.clone());
    }
    if let Some(description) = map.get("description").and_then(Value::as_str) {
        node.description = Some(description.to_string());
    }
    if map.get("nullable").and_then(Value::as_bool) == Some(true) {
        node.nullable = true;
    }
}

/// Infer the type of a node that declares none.
fn infer_types(schema: &Schema) -> Vec<SchemaType> {
    if !schema.properties.is_empty() || !schema.required.is_empty() {
        return vec![SchemaType::Object];
    }
    if schema.items.is_some() {
        return vec![SchemaType::Array];
    }
    let sample = schema
        .enum_values
        .first()
        .or(schema.const_value.as_ref());
    match sample {
        Some(Value::String(_)) => vec![SchemaType::String],
        Some(Value::Bool(_)) => vec![SchemaType::Boolean],
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => vec![SchemaType::Integer],
        Some(Value::Number(_)) => vec![SchemaType::Number],
        _ => Vec::new(),
    }
}

fn contradictory(at: &str, reason: &str) -> SchemaNode {
    warn!("{at}: contradictory schema ({reason}), degrading to unknown");
    SchemaNode::unknown()
}

fn malformed(at: &str, reason: String) -> NormalizeError {
    NormalizeError::MalformedSchema {
        pointer: at.to_string(),
        reason,
    }
}

enum Merged {
    Schema(Map<String, Value>),
    Conflict(String),
}

/// Flatten an `allOf` node into one raw schema: property maps merge with the
/// later branch winning, `required` is the union, bounds take the tighter
/// value and enums intersect. The node's own keywords merge last.
fn merge_all_of(
    resolver: &RefResolver<'_>,
    raw: &Value,
    at: &str,
    merging: &mut Vec<String>,
    depth: usize,
) -> Result<Merged, NormalizeError> {
    if depth > MAX_CANONICAL_DEPTH {
        return Err(malformed(
            at,
            format!("allOf nesting exceeds {MAX_CANONICAL_DEPTH} levels"),
        ));
    }
    let Some(own) = raw.as_object() else {
        return Err(malformed(at, "allOf on a non-object schema".to_string()));
    };
    let branches = match own.get("allOf") {
        Some(Value::Array(branches)) => branches.as_slice(),
        _ => &[],
    };

    let mut acc = Map::new();
    for (i, branch) in branches.iter().enumerate() {
        let branch_at = format!("{at}/allOf/{i}");
        let mark = merging.len();
        let resolved = match ref_of(branch) {
            Some(pointer) => {
                if merging.iter().any(|p| p == pointer) {
                    merging.push(pointer.to_string());
                    return Err(NormalizeError::CyclicReference(merging.join(" -> ")));
                }
                let (target, chain) = resolver.resolve_chain(pointer)?;
                merging.extend(chain);
                target
            }
            None => branch,
        };

        let flattened = if resolved.get("allOf").is_some() {
            match merge_all_of(resolver, resolved, &branch_at, merging, depth + 1)? {
                Merged::Schema(map) => map,
                conflict => {
                    merging.truncate(mark);
                    return Ok(conflict);
                }
            }
        } else {
            match resolved {
                Value::Object(map) => map.clone(),
                _ => return Err(malformed(&branch_at, "allOf branch is not a schema".to_string())),
            }
        };
        merging.truncate(mark);

        if let Err(reason) = merge_into(&mut acc, &flattened) {
            return Ok(Merged::Conflict(reason));
        }
    }

    let mut own = own.clone();
    own.remove("allOf");
    if let Err(reason) = merge_into(&mut acc, &own) {
        return Ok(Merged::Conflict(reason));
    }
    Ok(Merged::Schema(acc))
}

fn merge_into(acc: &mut Map<String, Value>, branch: &Map<String, Value>) -> Result<(), String> {
    for (key, value) in branch {
        let Some(existing) = acc.get(key).cloned() else {
            acc.insert(key.clone(), value.clone());
            continue;
        };
        let merged = match key.as_str() {
            "type" => merge_type(&existing, value)?,
            "properties" => {
                let mut props = existing.as_object().cloned().unwrap_or_default();
                if let Some(incoming) = value.as_object() {
                    for (name, prop) in incoming {
                        props.insert(name.clone(), prop.clone());
                    }
                }
                Value::Object(props)
            }
            "required" => {
                let mut names = existing.as_array().cloned().unwrap_or_default();
                for name in value.as_array().into_iter().flatten() {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
                Value::Array(names)
            }
            "minimum" | "minLength" | "minItems" => tighter(&existing, value, true),
            "maximum" | "maxLength" | "maxItems" => tighter(&existing, value, false),
            "enum" => {
                let incoming = value.as_array().cloned().unwrap_or_default();
                let common: Vec<Value> = existing
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|v| incoming.contains(v))
                    .collect();
                if common.is_empty() {
                    return Err("enum sets do not intersect".to_string());
                }
                Value::Array(common)
            }
            "nullable" => Value::Bool(
                existing.as_bool().unwrap_or(false) && value.as_bool().unwrap_or(false),
            ),
            _ => existing,
        };
        acc.insert(key.clone(), merged);
    }
    Ok(())
}

fn merge_type(existing: &Value, incoming: &Value) -> Result<Value, String> {
    match (existing.as_str(), incoming.as_str()) {
        (Some(a), Some(b)) if a == b => Ok(existing.clone()),
        (Some("number"), Some("integer")) | (Some("integer"), Some("number")) => {
            Ok(Value::String("integer".to_string()))
        }
        _ => Err(format!("type {existing} conflicts with {incoming}")),
    }
}

fn tighter(existing: &Value, incoming: &Value, lower_bound: bool) -> Value {
    match (existing.as_f64(), incoming.as_f64()) {
        (Some(a), Some(b)) => {
            let take_incoming = if lower_bound { b > a } else { b < a };
            if take_incoming {
                incoming.clone()
            } else {
                existing.clone()
            }
        }
        (None, Some(_)) => incoming.clone(),
        _ => existing.clone(),
    }
}
