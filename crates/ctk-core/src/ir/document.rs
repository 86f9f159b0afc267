use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::operations::{HttpMethod, IrOperation};
use crate::error::NormalizeError;

/// The normalized contract: one service at one version.
///
/// Produced fresh for each normalization run and never mutated afterwards;
/// re-parsing the contract supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrDocument {
    pub service: String,
    pub version: String,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
    pub operations: Vec<IrOperation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<OperationError>,
}

impl IrDocument {
    pub fn operation(&self, operation_id: &str) -> Option<&IrOperation> {
        self.operations
            .iter()
            .find(|op| op.operation_id == operation_id)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A normalization failure recorded against one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// The name the operation would have carried: its operationId or the
    /// route-derived name, with aliases applied.
    pub operation: String,
    pub method: HttpMethod,
    pub path: String,
    pub error: NormalizeError,
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} {}): {}",
            self.operation, self.method, self.path, self.error
        )
    }
}
