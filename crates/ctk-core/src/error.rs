use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported specification version: {0}")]
    UnsupportedVersion(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("failed to parse WSDL: {0}")]
    Wsdl(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("cyclic reference: {0}")]
    CyclicReference(String),
}

/// Failure recorded against a single operation. The remaining operations of
/// the document still normalize.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NormalizeError {
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("cyclic reference: {0}")]
    CyclicReference(String),

    #[error("path {path} has placeholder {{{name}}} without a declared path parameter")]
    UnboundPathParameter { path: String, name: String },

    #[error("path {path} declares path parameter {name} without a matching placeholder")]
    UndeclaredPathPlaceholder { path: String, name: String },

    #[error("malformed schema at {pointer}: {reason}")]
    MalformedSchema { pointer: String, reason: String },

    #[error("duplicate operationId: {0}")]
    DuplicateOperationId(String),
}

impl From<ResolveError> for NormalizeError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UnresolvedReference(p) => NormalizeError::UnresolvedReference(p),
            ResolveError::CyclicReference(c) => NormalizeError::CyclicReference(c),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("synthesis exceeded the recursion ceiling of {0}")]
    SynthesisDepthExceeded(usize),

    #[error("malformed schema: {0}")]
    MalformedSchema(String),
}

/// Document-level failures. These abort the whole invocation.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("document {0} has no operations")]
    NoOperations(String),

    #[error("every operation of {service} failed to normalize ({} errors)", errors.len())]
    AllOperationsFailed {
        service: String,
        errors: Vec<crate::ir::OperationError>,
    },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("index {0} is locked by another writer")]
    IndexLocked(String),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of an [`ArtifactGenerator`](crate::ArtifactGenerator).
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("example synthesis failed for {operation}: {source}")]
    Synthesis {
        operation: String,
        #[source]
        source: SynthesisError,
    },

    #[error("template rendering failed: {0}")]
    Render(String),

    #[error("serialization failed: {0}")]
    Serialize(String),
}
