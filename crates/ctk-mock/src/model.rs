use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level document consumed by a mock runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockDocument {
    pub service: String,
    pub version: String,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
    pub servers: Vec<MockServer>,
}

impl MockDocument {
    /// All routes across servers, in declaration order.
    pub fn routes(&self) -> impl Iterator<Item = &MockRoute> {
        self.servers.iter().flat_map(|s| s.routes.iter())
    }
}

/// A bind address with the routes it serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockServer {
    pub name: String,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub routes: Vec<MockRoute>,
}

/// One canned answer for one operation and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockRoute {
    pub operation: String,
    pub description: String,
    pub matcher: MockMatcher,
    pub response: MockResponse,
}

/// Criteria an incoming request must meet. SOAP routes also match on the
/// action and RPC routes on the method name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockMatcher {
    pub method: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soap_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    pub latency_ms: u64,
}
