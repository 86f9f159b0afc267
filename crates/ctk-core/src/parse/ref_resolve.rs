use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ResolveError;

/// Longest `$ref` chain followed before giving up.
pub const MAX_REF_CHAIN: usize = 32;

/// Resolves document-internal `$ref` pointers against the raw contract tree.
///
/// A pointer whose target is itself a `$ref` is followed until a concrete
/// node is reached. The pointers on the chain being followed form the
/// visiting set: re-entering one of them is a [`ResolveError::CyclicReference`].
#[derive(Debug, Clone, Copy)]
pub struct RefResolver<'a> {
    root: &'a Value,
}

impl<'a> RefResolver<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// Look up a single pointer without following any `$ref` at the target.
    pub fn lookup(&self, pointer: &str) -> Result<&'a Value, ResolveError> {
        let fragment = pointer
            .strip_prefix('#')
            .ok_or_else(|| ResolveError::UnresolvedReference(pointer.to_string()))?;
        if fragment.is_empty() {
            return Ok(self.root);
        }
        let path = fragment
            .strip_prefix('/')
            .ok_or_else(|| ResolveError::UnresolvedReference(pointer.to_string()))?;

        let mut node = self.root;
        for raw_segment in path.split('/') {
            let segment = decode_segment(raw_segment);
            node = match node {
                Value::Object(map) => map.get(&segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(|| ResolveError::UnresolvedReference(pointer.to_string()))?;
        }
        Ok(node)
    }

    /// Resolve a pointer to the first non-`$ref` node on its chain.
    pub fn resolve(&self, pointer: &str) -> Result<&'a Value, ResolveError> {
        self.resolve_chain(pointer).map(|(node, _)| node)
    }

    /// Resolve a pointer, also returning every pointer followed on the way
    /// (the requested one first).
    pub fn resolve_chain(&self, pointer: &str) -> Result<(&'a Value, Vec<String>), ResolveError> {
        let mut visiting: Vec<String> = Vec::new();
        let mut current = pointer.to_string();

        loop {
            if visiting.contains(&current) {
                visiting.push(current);
                return Err(ResolveError::CyclicReference(visiting.join(" -> ")));
            }
            if visiting.len() >= MAX_REF_CHAIN {
                visiting.push(current);
                return Err(ResolveError::CyclicReference(visiting.join(" -> ")));
            }

            let node = self.lookup(&current)?;
            visiting.push(current);
            match ref_of(node) {
                Some(next) => current = next.to_string(),
                None => return Ok((node, visiting)),
            }
        }
    }

    /// Resolve a node that may itself be a `$ref`.
    pub fn resolve_node(&self, node: &'a Value) -> Result<&'a Value, ResolveError> {
        match ref_of(node) {
            Some(pointer) => self.resolve(pointer),
            None => Ok(node),
        }
    }

    /// Resolve a possibly-referenced node and deserialize it. The outer
    /// result carries resolution failures; the inner one a target that does
    /// not have the expected shape.
    pub fn resolve_as<T: DeserializeOwned>(
        &self,
        node: &'a Value,
    ) -> Result<Result<T, String>, ResolveError> {
        let target = self.resolve_node(node)?;
        Ok(T::deserialize(target).map_err(|e| e.to_string()))
    }
}

/// The `$ref` pointer of a node, if it is a reference object.
pub fn ref_of(node: &Value) -> Option<&str> {
    node.as_object()
        .and_then(|map| map.get("$ref"))
        .and_then(Value::as_str)
}

/// Escape one segment for use inside a JSON pointer.
pub fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Undo JSON-pointer (`~1`, `~0`) and percent escaping in one segment.
fn decode_segment(segment: &str) -> String {
    let unescaped = segment.replace("~1", "/").replace("~0", "~");
    if !unescaped.contains('%') {
        return unescaped;
    }

    let bytes = unescaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or(unescaped)
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "components": {
                "schemas": {
                    "Pet": { "type": "object" },
                    "Alias": { "$ref": "#/components/schemas/Pet" },
                    "LoopA": { "$ref": "#/components/schemas/LoopB" },
                    "LoopB": { "$ref": "#/components/schemas/LoopA" },
                    "Self": { "$ref": "#/components/schemas/Self" },
                    "a/b": { "type": "string" },
                    "with space": { "type": "integer" }
                }
            },
            "paths": {
                "/pets/{id}": { "get": { "operationId": "getPet" } }
            },
            "list": [ { "type": "boolean" } ]
        })
    }

    #[test]
    fn test_lookup_simple_pointer() {
        let raw = doc();
        let resolver = RefResolver::new(&raw);
        let pet = resolver.lookup("#/components/schemas/Pet").unwrap();
        assert_eq!(pet, &json!({ "type": "object" }));
    }

    #[test]
    fn test_follows_alias_chain() {
        let raw = doc();
        let resolver = RefResolver::new(&raw);
        let (node, chain) = resolver
            .resolve_chain("#/components/schemas/Alias")
            .unwrap();
        assert_eq!(node, &json!({ "type": "object" }));
        assert_eq!(
            chain,
            vec!["#/components/schemas/Alias", "#/components/schemas/Pet"]
        );
    }

    #[test]
    fn test_escaped_segments() {
        let raw = doc();
        let resolver = RefResolver::new(&raw);
        assert_eq!(
            resolver.resolve("#/components/schemas/a~1b").unwrap(),
            &json!({ "type": "string" })
        );
        assert_eq!(
            resolver.resolve("#/components/schemas/with%20space").unwrap(),
            &json!({ "type": "integer" })
        );
        assert_eq!(
            resolver
                .resolve("#/paths/~1pets~1{id}/get/operationId")
                .unwrap(),
            &json!("getPet")
        );
        assert_eq!(
            resolver.resolve("#/list/0").unwrap(),
            &json!({ "type": "boolean" })
        );
    }

    #[test]
    fn test_missing_target_is_unresolved() {
        let raw = doc();
        let resolver = RefResolver::new(&raw);
        assert_eq!(
            resolver.resolve("#/components/schemas/Missing"),
            Err(ResolveError::UnresolvedReference(
                "#/components/schemas/Missing".to_string()
            ))
        );
    }

    #[test]
    fn test_external_pointer_is_unresolved() {
        let raw = doc();
        let resolver = RefResolver::new(&raw);
        assert!(matches!(
            resolver.resolve("other.yaml#/components/schemas/Pet"),
            Err(ResolveError::UnresolvedReference(_))
        ));
    }

    #[test]
    fn test_pointer_cycle_is_rejected() {
        let raw = doc();
        let resolver = RefResolver::new(&raw);
        assert_eq!(
            resolver.resolve("#/components/schemas/LoopA"),
            Err(ResolveError::CyclicReference(
                "#/components/schemas/LoopA -> #/components/schemas/LoopB -> #/components/schemas/LoopA"
                    .to_string()
            ))
        );
        assert!(matches!(
            resolver.resolve("#/components/schemas/Self"),
            Err(ResolveError::CyclicReference(_))
        ));
    }
}
