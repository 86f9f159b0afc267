use ctk_core::config::{ArtifactFormat, CtkConfig, MockConfig, PropertyPolicy};
use ctk_core::describe::Describer;
use ctk_core::ir::{IrDocument, IrOperation, status_code};
use ctk_core::synth::response_examples;
use ctk_core::transform::name_normalizer::{slugify, version_slug};
use ctk_core::{ArtifactGenerator, GeneratedFile, GeneratorError};
use indexmap::IndexMap;
use log::{debug, warn};
use minijinja::context;
use serde_json::{Map, Value, json};

use crate::model::{MockDocument, MockMatcher, MockResponse, MockRoute, MockServer};

/// Mock server kind for an IR protocol: `rest`, `soap` or `rpc`. Unknown
/// protocols are served as `rest`.
pub fn protocol_kind(protocol: &str) -> &'static str {
    match protocol.to_ascii_lowercase().as_str() {
        "wsdl" | "soap" => "soap",
        "proto" | "grpc" | "rpc" => "rpc",
        _ => "rest",
    }
}

const CONTENT_TYPE: &str = "Content-Type";
const FALLBACK_STATUS: u16 = 200;

/// Mock-server configuration generator.
pub struct MockConfigGenerator;

impl MockConfigGenerator {
    /// Build the mock document for one IR document.
    pub fn build(ir: &IrDocument, config: &CtkConfig) -> Result<MockDocument, GeneratorError> {
        let mock = &config.mock;
        let describer = Describer::new(&mock.description_template)?;
        let policy = config.synthesis.response_properties;
        let kind = protocol_kind(&ir.protocol);

        let mut routes = Vec::new();
        for op in &ir.operations {
            routes.extend(operation_routes(ir, op, kind, mock, policy, &describer)?);
        }
        debug!(
            "{} {}: {} routes from {} operations",
            ir.service,
            ir.version,
            routes.len(),
            ir.operations.len()
        );

        let port = mock.port_for(kind);
        let mut metadata = IndexMap::new();
        metadata.insert(
            "ir_metadata".to_string(),
            Value::Object(ir.metadata.clone().into_iter().collect()),
        );
        metadata.insert("protocol_kind".to_string(), json!(kind));
        let mut ports = Map::new();
        ports.insert(kind.to_string(), json!(port));
        metadata.insert("ports".to_string(), Value::Object(ports));

        Ok(MockDocument {
            service: ir.service.clone(),
            version: ir.version.clone(),
            protocol: ir.protocol.clone(),
            source: ir.source.clone(),
            metadata,
            servers: vec![MockServer {
                name: format!("{} {kind} mock", ir.service),
                protocol: kind.to_string(),
                host: mock.host.clone(),
                port,
                routes,
            }],
        })
    }

    /// `<service-slug>/<version-slug>/mock-config.<ext>`
    pub fn output_path(ir: &IrDocument, format: ArtifactFormat) -> String {
        format!(
            "{}/{}/mock-config.{}",
            slugify(&ir.service),
            version_slug(&ir.version),
            format.extension()
        )
    }
}

impl ArtifactGenerator for MockConfigGenerator {
    type Config = CtkConfig;
    type Error = GeneratorError;

    fn generate(
        &self,
        ir: &IrDocument,
        config: &CtkConfig,
    ) -> Result<Vec<GeneratedFile>, GeneratorError> {
        let document = Self::build(ir, config)?;
        let format = config.mock.format;
        let content = match format {
            ArtifactFormat::Yaml => serde_yaml_ng::to_string(&document)
                .map_err(|e| GeneratorError::Serialize(e.to_string()))?,
            ArtifactFormat::Json => {
                let mut json = serde_json::to_string_pretty(&document)
                    .map_err(|e| GeneratorError::Serialize(e.to_string()))?;
                json.push('\n');
                json
            }
        };
        Ok(vec![GeneratedFile {
            path: Self::output_path(ir, format),
            content,
        }])
    }
}

fn operation_routes(
    ir: &IrDocument,
    op: &IrOperation,
    kind: &str,
    mock: &MockConfig,
    policy: PropertyPolicy,
    describer: &Describer<'_>,
) -> Result<Vec<MockRoute>, GeneratorError> {
    let examples = response_examples(op, policy).map_err(|source| GeneratorError::Synthesis {
        operation: op.operation_id.clone(),
        source,
    })?;

    let statuses = mocked_statuses(op);
    if statuses.is_empty() {
        debug!("{} declares no responses, mocking {FALLBACK_STATUS}", op.operation_id);
        let route = MockRoute {
            operation: op.operation_id.clone(),
            description: describe(describer, ir, op, FALLBACK_STATUS)?,
            matcher: matcher(op, kind),
            response: MockResponse {
                status: FALLBACK_STATUS,
                headers: IndexMap::new(),
                body: None,
                latency_ms: mock.latency_ms,
            },
        };
        return Ok(vec![route]);
    }

    statuses
        .into_iter()
        .map(|(status, key)| {
            let response = &op.responses[key];
            let mut headers = IndexMap::new();
            let body = match &response.content_type {
                Some(content_type) => {
                    headers.insert(CONTENT_TYPE.to_string(), content_type.clone());
                    examples.get(key).cloned()
                }
                None => None,
            };
            Ok(MockRoute {
                operation: op.operation_id.clone(),
                description: describe(describer, ir, op, status)?,
                matcher: matcher(op, kind),
                response: MockResponse {
                    status,
                    headers,
                    body,
                    latency_ms: mock.latency_ms,
                },
            })
        })
        .collect()
}

/// Declared responses as (status, response key), ordered by status.
/// `default` stands for 200 unless a success status is declared.
fn mocked_statuses(op: &IrOperation) -> Vec<(u16, &str)> {
    let has_success = op.has_success_response();
    let mut statuses: Vec<(u16, &str)> = op
        .responses
        .keys()
        .filter_map(|key| {
            let status = if key == "default" {
                (!has_success).then_some(FALLBACK_STATUS)
            } else {
                let code = status_code(key);
                if code.is_none() {
                    warn!("{}: ignoring response status {key}", op.operation_id);
                }
                code
            };
            status.map(|code| (code, key.as_str()))
        })
        .collect();
    statuses.sort_by_key(|(code, _)| *code);
    statuses
}

fn matcher(op: &IrOperation, kind: &str) -> MockMatcher {
    MockMatcher {
        method: op.method.to_string(),
        path: op.path.clone(),
        soap_action: (kind == "soap").then(|| op.operation_id.clone()),
        rpc_method: (kind == "rpc").then(|| op.operation_id.clone()),
    }
}

fn describe(
    describer: &Describer<'_>,
    ir: &IrDocument,
    op: &IrOperation,
    status: u16,
) -> Result<String, GeneratorError> {
    describer.render(context! {
        service => ir.service,
        version => ir.version,
        operation => op.operation_id,
        method => op.method.as_str(),
        path => op.path,
        status => status,
        summary => op.headline(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctk_core::ir::{HttpMethod, IrResponse, SchemaTree};

    fn op_with(statuses: &[&str]) -> IrOperation {
        IrOperation {
            operation_id: "getThing".to_string(),
            method: HttpMethod::Get,
            path: "/things".to_string(),
            summary: None,
            description: None,
            tags: Vec::new(),
            deprecated: false,
            parameters: Vec::new(),
            request_body: None,
            responses: statuses
                .iter()
                .map(|s| {
                    (
                        s.to_string(),
                        IrResponse {
                            description: None,
                            content_type: None,
                            schema: SchemaTree::unknown(),
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_protocol_kind() {
        assert_eq!(protocol_kind("openapi"), "rest");
        assert_eq!(protocol_kind("swagger"), "rest");
        assert_eq!(protocol_kind("WSDL"), "soap");
        assert_eq!(protocol_kind("proto"), "rpc");
        assert_eq!(protocol_kind("grpc"), "rpc");
    }

    #[test]
    fn test_matcher_per_kind() {
        let op = op_with(&[]);
        assert_eq!(matcher(&op, "rest").soap_action, None);
        assert_eq!(matcher(&op, "soap").soap_action.as_deref(), Some("getThing"));
        let rpc = matcher(&op, "rpc");
        assert_eq!(rpc.rpc_method.as_deref(), Some("getThing"));
        assert_eq!(rpc.soap_action, None);
        assert_eq!(rpc.path, "/things");
    }

    #[test]
    fn test_default_skipped_when_success_declared() {
        let op = op_with(&["default", "404", "200"]);
        assert_eq!(mocked_statuses(&op), vec![(200, "200"), (404, "404")]);
    }

    #[test]
    fn test_default_becomes_200() {
        let op = op_with(&["404", "default"]);
        assert_eq!(mocked_statuses(&op), vec![(200, "default"), (404, "404")]);
    }

    #[test]
    fn test_range_counts_as_success() {
        let op = op_with(&["2XX", "default"]);
        assert_eq!(mocked_statuses(&op), vec![(200, "2XX")]);
    }
}
