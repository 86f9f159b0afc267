use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use serde_json::{Map, Value};

use crate::config::NamingStrategy;
use crate::error::{NormalizeError, TransformError};
use crate::ir::*;
use crate::parse::ContractDocument;
use crate::parse::media_type::{self, JSON_MEDIA_TYPE, MediaType};
use crate::parse::operation::Operation;
use crate::parse::parameter::{Parameter, ParameterLocation};
use crate::parse::ref_resolve::{RefResolver, escape_segment, ref_of};
use crate::parse::request_body::RequestBody;
use crate::parse::response::Response;

use super::canonicalize::Canonicalizer;
use super::name_normalizer::{apply_alias, route_to_name};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM: &str = "multipart/form-data";

/// Options controlling how a contract is normalized.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    pub naming_strategy: NamingStrategy,
    pub aliases: IndexMap<String, String>,
    /// Replaces `info.title` as the service name.
    pub service_name: Option<String>,
    /// Path the contract was read from.
    pub source: Option<String>,
    /// Stored verbatim under `metadata.policy`.
    pub policy: Option<Value>,
}

/// Normalize a parsed contract into an [`IrDocument`].
pub fn normalize(document: &ContractDocument) -> Result<IrDocument, TransformError> {
    normalize_with_options(document, &NormalizeOptions::default())
}

/// Normalize with explicit naming and service options.
///
/// Operations that fail are recorded in [`IrDocument::errors`] and left out;
/// the call itself only fails when the document declares no operations or
/// none of them normalize.
pub fn normalize_with_options(
    document: &ContractDocument,
    options: &NormalizeOptions,
) -> Result<IrDocument, TransformError> {
    let spec = &document.spec;
    let service = service_name(document, options);
    let version = match spec.info.version.trim() {
        "" => "0".to_string(),
        v => v.to_string(),
    };
    debug!("normalizing {service} {version} ({})", spec.spec_version());

    let normalizer = OperationNormalizer {
        resolver: RefResolver::new(&document.raw),
        canonicalizer: Canonicalizer::new(&document.raw),
        consumes: document
            .raw
            .get("consumes")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    };

    let mut operations = Vec::new();
    let mut errors = Vec::new();
    let mut seen: IndexSet<String> = IndexSet::new();
    let mut declared = 0usize;

    for (path, item) in &spec.paths {
        for (key, op) in item.operations() {
            let Some(method) = HttpMethod::from_key(key) else {
                continue;
            };
            declared += 1;
            let name = operation_name(op, method, path, options);

            let result = if seen.contains(&name) {
                Err(NormalizeError::DuplicateOperationId(name.clone()))
            } else {
                normalizer.operation(&name, method, key, path, &item.parameters, op)
            };

            match result {
                Ok(operation) => {
                    seen.insert(name);
                    operations.push(operation);
                }
                Err(error) => {
                    let failure = OperationError {
                        operation: name,
                        method,
                        path: path.clone(),
                        error,
                    };
                    warn!("skipping operation {failure}");
                    errors.push(failure);
                }
            }
        }
    }

    if declared == 0 {
        return Err(TransformError::NoOperations(service));
    }
    if operations.is_empty() {
        return Err(TransformError::AllOperationsFailed { service, errors });
    }

    let mut metadata = IndexMap::new();
    metadata.insert(
        "spec_version".to_string(),
        Value::String(spec.spec_version().to_string()),
    );
    if !spec.info.title.is_empty() {
        metadata.insert("title".to_string(), Value::String(spec.info.title.clone()));
    }
    if let Some(ref policy) = options.policy {
        metadata.insert("policy".to_string(), policy.clone());
    }

    debug!(
        "normalized {} operations of {service} ({} skipped)",
        operations.len(),
        errors.len()
    );

    Ok(IrDocument {
        service,
        version,
        protocol: spec.protocol().to_string(),
        source: options.source.clone(),
        metadata,
        operations,
        errors,
    })
}

/// Service name: the override, else `info.title`, else the source file stem.
fn service_name(document: &ContractDocument, options: &NormalizeOptions) -> String {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    options
        .service_name
        .as_deref()
        .and_then(non_empty)
        .or_else(|| non_empty(&document.spec.info.title))
        .or_else(|| {
            options
                .source
                .as_deref()
                .and_then(|s| Path::new(s).file_stem())
                .and_then(|stem| non_empty(&stem.to_string_lossy()))
        })
        .unwrap_or_else(|| "service".to_string())
}

fn operation_name(
    op: &Operation,
    method: HttpMethod,
    path: &str,
    options: &NormalizeOptions,
) -> String {
    let declared = op
        .operation_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let base = match (options.naming_strategy, declared) {
        (NamingStrategy::UseOperationId, Some(id)) => id.to_string(),
        _ => route_to_name(method.as_str(), path),
    };
    apply_alias(&base, &options.aliases)
}

struct OperationNormalizer<'a> {
    resolver: RefResolver<'a>,
    canonicalizer: Canonicalizer<'a>,
    /// Document-wide Swagger 2.0 `consumes`.
    consumes: Vec<String>,
}

impl<'a> OperationNormalizer<'a> {
    fn operation(
        &self,
        name: &str,
        method: HttpMethod,
        key: &str,
        path: &str,
        path_parameters: &'a [Value],
        op: &'a Operation,
    ) -> Result<IrOperation, NormalizeError> {
        let item_at = format!("#/paths/{}", escape_segment(path));
        let op_at = format!("{item_at}/{key}");

        let mut declared: Vec<(Parameter, String)> = Vec::new();
        for (i, raw) in path_parameters.iter().enumerate() {
            self.collect_parameter(raw, format!("{item_at}/parameters/{i}"), &mut declared)?;
        }
        for (i, raw) in op.parameters.iter().enumerate() {
            self.collect_parameter(raw, format!("{op_at}/parameters/{i}"), &mut declared)?;
        }

        let mut parameters = Vec::new();
        let mut body_parameter = None;
        let mut form_fields = Vec::new();
        for (param, at) in declared {
            let location = match param.location {
                ParameterLocation::Path => IrParameterLocation::Path,
                ParameterLocation::Query => IrParameterLocation::Query,
                ParameterLocation::Header => IrParameterLocation::Header,
                ParameterLocation::Cookie => IrParameterLocation::Cookie,
                ParameterLocation::Body => {
                    body_parameter = Some((param, at));
                    continue;
                }
                ParameterLocation::FormData => {
                    form_fields.push(param);
                    continue;
                }
            };
            let schema = match param.effective_schema() {
                Some(raw) => self
                    .canonicalizer
                    .canonicalize(&raw, &format!("{at}/schema"))?,
                None => SchemaTree::unknown(),
            };
            parameters.push(IrParameter {
                required: param.required || location == IrParameterLocation::Path,
                name: param.name,
                location,
                description: param.description,
                schema: with_example(schema, param.example),
            });
        }
        check_path_parameters(path, &parameters)?;

        let request_body = if let Some(ref raw) = op.request_body {
            let at = pointer_of(raw, format!("{op_at}/requestBody"));
            let body: RequestBody = self
                .resolver
                .resolve_as(raw)?
                .map_err(|reason| malformed(&at, reason))?;
            self.request_body(&body, &at)?
        } else if let Some((param, at)) = body_parameter {
            Some(self.body_parameter(param, &at, op)?)
        } else if !form_fields.is_empty() {
            Some(self.form_body(&form_fields, &op_at, op)?)
        } else {
            None
        };

        let mut responses = IndexMap::new();
        for (status, raw) in &op.responses {
            if status.starts_with("x-") {
                continue;
            }
            let at = pointer_of(raw, format!("{op_at}/responses/{}", escape_segment(status)));
            let response: Response = self
                .resolver
                .resolve_as(raw)?
                .map_err(|reason| malformed(&at, reason))?;
            responses.insert(status.clone(), self.response(&response, &at)?);
        }

        Ok(IrOperation {
            operation_id: name.to_string(),
            method,
            path: path.to_string(),
            summary: op.summary.clone(),
            description: op.description.clone(),
            tags: op.tags.clone(),
            deprecated: op.deprecated.unwrap_or(false),
            parameters,
            request_body,
            responses,
        })
    }

    /// Resolve one parameter and add it, replacing an earlier one with the
    /// same name and location.
    fn collect_parameter(
        &self,
        raw: &'a Value,
        at: String,
        declared: &mut Vec<(Parameter, String)>,
    ) -> Result<(), NormalizeError> {
        let at = pointer_of(raw, at);
        let param: Parameter = self
            .resolver
            .resolve_as(raw)?
            .map_err(|reason| malformed(&at, reason))?;
        match declared
            .iter_mut()
            .find(|(p, _)| p.name == param.name && p.location == param.location)
        {
            Some(slot) => *slot = (param, at),
            None => declared.push((param, at)),
        }
        Ok(())
    }

    fn request_body(
        &self,
        body: &RequestBody,
        at: &str,
    ) -> Result<Option<IrRequestBody>, NormalizeError> {
        let Some((content_type, media)) = body.preferred_content() else {
            debug!("{at}: request body declares no content");
            return Ok(None);
        };
        let schema = self.media_schema(media, &format!("{at}/content/{}", escape_segment(content_type)))?;
        Ok(Some(IrRequestBody {
            content_type: content_type.clone(),
            required: body.required,
            description: body.description.clone(),
            schema,
        }))
    }

    /// Swagger 2.0 `in: body` parameter.
    fn body_parameter(
        &self,
        param: Parameter,
        at: &str,
        op: &Operation,
    ) -> Result<IrRequestBody, NormalizeError> {
        let schema = match param.schema {
            Some(ref raw) => self.canonicalizer.canonicalize(raw, &format!("{at}/schema"))?,
            None => SchemaTree::unknown(),
        };
        let content_type = op
            .consumes
            .first()
            .or(self.consumes.first())
            .cloned()
            .unwrap_or_else(|| JSON_MEDIA_TYPE.to_string());
        Ok(IrRequestBody {
            content_type,
            required: param.required,
            description: param.description,
            schema: with_example(schema, param.example),
        })
    }

    /// Swagger 2.0 `in: formData` fields, gathered into one object body.
    fn form_body(
        &self,
        fields: &[Parameter],
        op_at: &str,
        op: &Operation,
    ) -> Result<IrRequestBody, NormalizeError> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        let mut has_file = false;
        for field in fields {
            has_file |= field.param_type.as_ref().and_then(Value::as_str) == Some("file");
            let schema = field
                .effective_schema()
                .unwrap_or_else(|| Value::Object(Map::new()));
            properties.insert(field.name.clone(), schema);
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }
        let mut raw = Map::new();
        raw.insert("type".to_string(), Value::String("object".to_string()));
        raw.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            raw.insert("required".to_string(), Value::Array(required));
        }

        let declares_multipart = op
            .consumes
            .iter()
            .chain(&self.consumes)
            .any(|c| c == MULTIPART_FORM);
        let content_type = if has_file || declares_multipart {
            MULTIPART_FORM
        } else {
            FORM_URLENCODED
        };
        let schema = self
            .canonicalizer
            .canonicalize(&Value::Object(raw), &format!("{op_at}/parameters"))?;
        Ok(IrRequestBody {
            content_type: content_type.to_string(),
            required: fields.iter().any(|f| f.required),
            description: None,
            schema,
        })
    }

    fn response(&self, response: &Response, at: &str) -> Result<IrResponse, NormalizeError> {
        let description = Some(response.description.trim())
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        if let Some((content_type, media)) = response.preferred_content() {
            let schema = self.media_schema(media, &format!("{at}/content/{}", escape_segment(content_type)))?;
            return Ok(IrResponse {
                description,
                content_type: Some(content_type.clone()),
                schema,
            });
        }

        if let Some(ref raw) = response.schema {
            let schema = self.canonicalizer.canonicalize(raw, &format!("{at}/schema"))?;
            let example = media_type::preferred(&response.examples).map(|(_, v)| v.clone());
            return Ok(IrResponse {
                description,
                content_type: Some(JSON_MEDIA_TYPE.to_string()),
                schema: with_example(schema, example),
            });
        }

        Ok(IrResponse {
            description,
            content_type: None,
            schema: SchemaTree::unknown(),
        })
    }

    fn media_schema(&self, media: &MediaType, at: &str) -> Result<SchemaTree, NormalizeError> {
        let schema = match media.schema {
            Some(ref raw) => self.canonicalizer.canonicalize(raw, &format!("{at}/schema"))?,
            None => SchemaTree::unknown(),
        };
        Ok(with_example(schema, media.declared_example()))
    }
}

/// Every `{name}` placeholder has a path parameter and every path parameter
/// has a placeholder.
fn check_path_parameters(path: &str, parameters: &[IrParameter]) -> Result<(), NormalizeError> {
    let placeholders = path_placeholders(path);
    let declared: Vec<&str> = parameters
        .iter()
        .filter(|p| p.location == IrParameterLocation::Path)
        .map(|p| p.name.as_str())
        .collect();

    if let Some(name) = placeholders.iter().find(|n| !declared.contains(*n)) {
        return Err(NormalizeError::UnboundPathParameter {
            path: path.to_string(),
            name: name.to_string(),
        });
    }
    if let Some(name) = declared.iter().find(|n| !placeholders.contains(*n)) {
        return Err(NormalizeError::UndeclaredPathPlaceholder {
            path: path.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Attach an example to the root node unless the schema declares its own.
fn with_example(mut tree: SchemaTree, example: Option<Value>) -> SchemaTree {
    let root = tree.root.0;
    if let (Some(example), Some(node)) = (example, tree.nodes.get_mut(root)) {
        if node.example.is_none() {
            node.example = Some(example);
        }
    }
    tree
}

/// Errors inside a referenced component are reported at the component.
fn pointer_of(raw: &Value, fallback: String) -> String {
    ref_of(raw).map(str::to_string).unwrap_or(fallback)
}

fn malformed(at: &str, reason: String) -> NormalizeError {
    NormalizeError::MalformedSchema {
        pointer: at.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::from_value;
    use serde_json::json;

    fn normalize_json(raw: Value) -> IrDocument {
        normalize(&from_value(raw).unwrap()).unwrap()
    }

    #[test]
    fn test_operation_parameter_overrides_path_parameter() {
        let ir = normalize_json(json!({
            "openapi": "3.0.3",
            "info": { "title": "Orders", "version": "1" },
            "paths": {
                "/orders/{orderId}": {
                    "parameters": [
                        { "name": "orderId", "in": "path", "schema": { "type": "string" } },
                        { "name": "verbose", "in": "query", "schema": { "type": "boolean" } }
                    ],
                    "get": {
                        "operationId": "getOrder",
                        "parameters": [
                            { "name": "orderId", "in": "path", "required": true,
                              "schema": { "type": "integer" } }
                        ],
                        "responses": { "200": { "description": "ok" } }
                    }
                }
            }
        }));
        let op = ir.operation("getOrder").unwrap();
        assert_eq!(op.parameters.len(), 2);
        assert_eq!(op.parameters[0].name, "orderId");
        assert!(op.parameters[0].required);
        assert_eq!(op.parameters[0].schema.root_node().unwrap().kind.name(), "integer");
        assert_eq!(op.parameters[1].location, IrParameterLocation::Query);
    }

    #[test]
    fn test_path_parameter_is_always_required() {
        let ir = normalize_json(json!({
            "openapi": "3.0.3",
            "info": { "title": "Orders", "version": "1" },
            "paths": {
                "/orders/{id}": {
                    "delete": {
                        "parameters": [ { "name": "id", "in": "path", "schema": { "type": "string" } } ],
                        "responses": { "204": { "description": "gone" } }
                    }
                }
            }
        }));
        let op = &ir.operations[0];
        assert_eq!(op.operation_id, "deleteOrder");
        assert!(op.parameters[0].required);
        assert_eq!(op.responses["204"].schema.root_node().unwrap().kind, SchemaKind::Unknown);
        assert_eq!(op.responses["204"].content_type, None);
    }

    #[test]
    fn test_swagger_body_and_form_parameters() {
        let ir = normalize_json(json!({
            "swagger": "2.0",
            "info": { "title": "Legacy", "version": "2" },
            "consumes": ["application/json"],
            "paths": {
                "/items": {
                    "post": {
                        "operationId": "createItem",
                        "parameters": [
                            { "name": "body", "in": "body", "required": true,
                              "schema": { "$ref": "#/definitions/Item" } }
                        ],
                        "responses": {
                            "201": { "description": "created", "schema": { "$ref": "#/definitions/Item" } }
                        }
                    }
                },
                "/uploads": {
                    "post": {
                        "operationId": "upload",
                        "parameters": [
                            { "name": "file", "in": "formData", "type": "file", "required": true },
                            { "name": "label", "in": "formData", "type": "string" }
                        ],
                        "responses": { "200": { "description": "ok" } }
                    }
                }
            },
            "definitions": {
                "Item": { "type": "object", "properties": { "id": { "type": "integer" } } }
            }
        }));
        assert_eq!(ir.protocol, "swagger");

        let create = ir.operation("createItem").unwrap();
        let body = create.request_body.as_ref().unwrap();
        assert_eq!(body.content_type, "application/json");
        assert!(body.required);
        assert_eq!(body.schema.root_node().unwrap().kind.name(), "object");
        assert_eq!(
            create.responses["201"].content_type.as_deref(),
            Some("application/json")
        );

        let upload = ir.operation("upload").unwrap();
        let form = upload.request_body.as_ref().unwrap();
        assert_eq!(form.content_type, "multipart/form-data");
        let SchemaKind::Object { properties, required } = &form.schema.root_node().unwrap().kind
        else {
            panic!("expected object form body");
        };
        assert_eq!(properties.len(), 2);
        assert!(required.contains("file"));
        assert!(upload.parameters.is_empty());
    }

    #[test]
    fn test_media_example_fills_root_example() {
        let ir = normalize_json(json!({
            "openapi": "3.1.0",
            "info": { "title": "Echo", "version": "1" },
            "paths": {
                "/echo": {
                    "post": {
                        "operationId": "echo",
                        "requestBody": {
                            "content": {
                                "text/plain": { "schema": { "type": "string" } },
                                "application/json": {
                                    "schema": { "type": "object" },
                                    "example": { "message": "hi" }
                                }
                            }
                        },
                        "responses": { "200": { "description": "ok" } }
                    }
                }
            }
        }));
        let body = ir.operations[0].request_body.as_ref().unwrap();
        assert_eq!(body.content_type, "application/json");
        assert_eq!(
            body.schema.root_node().unwrap().example,
            Some(json!({ "message": "hi" }))
        );
    }

    #[test]
    fn test_service_name_fallbacks() {
        let doc = from_value(json!({
            "openapi": "3.0.0",
            "info": { "title": "  ", "version": "" },
            "paths": { "/ping": { "get": { "responses": { "200": { "description": "pong" } } } } }
        }))
        .unwrap();

        let ir = normalize(&doc).unwrap();
        assert_eq!(ir.service, "service");
        assert_eq!(ir.version, "0");

        let options = NormalizeOptions {
            source: Some("contracts/health-check.yaml".to_string()),
            ..Default::default()
        };
        assert_eq!(normalize_with_options(&doc, &options).unwrap().service, "health-check");

        let options = NormalizeOptions {
            service_name: Some("renamed".to_string()),
            source: Some("contracts/health-check.yaml".to_string()),
            policy: Some(json!({ "tier": "gold" })),
            ..Default::default()
        };
        let ir = normalize_with_options(&doc, &options).unwrap();
        assert_eq!(ir.service, "renamed");
        assert_eq!(ir.metadata["policy"], json!({ "tier": "gold" }));
        assert_eq!(ir.metadata["spec_version"], json!("3.0.0"));
    }

    #[test]
    fn test_route_based_naming_and_alias() {
        let doc = from_value(json!({
            "openapi": "3.0.0",
            "info": { "title": "Pay", "version": "1" },
            "paths": {
                "/payments": {
                    "get": { "operationId": "fetchAll", "responses": { "200": { "description": "ok" } } }
                }
            }
        }))
        .unwrap();
        let mut aliases = IndexMap::new();
        aliases.insert("listPayments".to_string(), "payments".to_string());
        let options = NormalizeOptions {
            naming_strategy: NamingStrategy::UseRouteBased,
            aliases,
            ..Default::default()
        };
        let ir = normalize_with_options(&doc, &options).unwrap();
        assert_eq!(ir.operations[0].operation_id, "payments");
    }
}
