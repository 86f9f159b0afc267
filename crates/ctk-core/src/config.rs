use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Top-level project configuration loaded from `.ctk.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CtkConfig {
    pub naming: NamingConfig,
    pub synthesis: SynthesisConfig,
    pub intake: IntakeConfig,
    pub mock: MockConfig,
    pub scenario: ScenarioConfig,
}

/// Naming strategy and aliases.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub strategy: NamingStrategy,
    /// Map from resolved operation name (operationId or route-derived) to custom alias.
    pub aliases: IndexMap<String, String>,
}

/// How operation names are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingStrategy {
    #[default]
    UseOperationId,
    UseRouteBased,
}

/// Which object properties an example carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyPolicy {
    /// Every declared property.
    #[default]
    All,
    /// Only the properties listed in `required`.
    RequiredOnly,
}

/// Verbosity of synthesized examples per consumer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub response_properties: PropertyPolicy,
    pub request_properties: PropertyPolicy,
}

/// Where `ctk intake` writes snapshots and the catalog index.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub output_dir: String,
    pub index_path: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            output_dir: "workspace/catalog".to_string(),
            index_path: "workspace/catalog/index.json".to_string(),
        }
    }
}

/// Output format of generated configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    #[default]
    Yaml,
    Json,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Yaml => "yaml",
            ArtifactFormat::Json => "json",
        }
    }
}

/// Mock-config generation options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    pub output_dir: String,
    pub host: String,
    /// Port per protocol kind (`rest`, `soap`, `rpc`).
    pub ports: IndexMap<String, u16>,
    pub latency_ms: u64,
    pub format: ArtifactFormat,
    /// minijinja template for each route's description.
    pub description_template: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            output_dir: "artifacts/mocks".to_string(),
            host: "0.0.0.0".to_string(),
            ports: IndexMap::new(),
            latency_ms: 50,
            format: ArtifactFormat::Yaml,
            description_template: "Mocked {{ method }} {{ path }} of {{ service }}".to_string(),
        }
    }
}

impl MockConfig {
    /// Port for a protocol kind: configured override, else the built-in default.
    pub fn port_for(&self, protocol_kind: &str) -> u16 {
        self.ports
            .get(protocol_kind)
            .copied()
            .filter(|p| *p > 0)
            .unwrap_or_else(|| default_port(protocol_kind))
    }
}

/// Default port of REST mock servers.
pub const DEFAULT_REST_PORT: u16 = 8500;
/// Default port of SOAP mock servers.
pub const DEFAULT_SOAP_PORT: u16 = 8600;
/// Default port of RPC mock servers.
pub const DEFAULT_RPC_PORT: u16 = 8700;

/// Built-in port of a protocol kind; unknown kinds share the REST port.
pub fn default_port(protocol_kind: &str) -> u16 {
    match protocol_kind {
        "soap" => DEFAULT_SOAP_PORT,
        "rpc" => DEFAULT_RPC_PORT,
        _ => DEFAULT_REST_PORT,
    }
}

/// Test-scenario generation options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub output_dir: String,
    pub prefix: String,
    pub tags: Vec<String>,
    pub metadata: IndexMap<String, String>,
    /// minijinja template for each step's description.
    pub description_template: String,
    pub assertions: Vec<String>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            output_dir: "artifacts/tests".to_string(),
            prefix: "smoke".to_string(),
            tags: Vec::new(),
            metadata: IndexMap::new(),
            description_template: "Invoke {{ operation }} ({{ method }} {{ path }})".to_string(),
            assertions: vec!["status == expected.status".to_string()],
        }
    }
}

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = ".ctk.yaml";

/// Load config from a YAML file. Returns `None` if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<Option<CtkConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
    let config: CtkConfig = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("failed to parse config {}: {}", path.display(), e))?;
    Ok(Some(config))
}

/// Generate the default config file content.
pub fn default_config_content() -> &'static str {
    r#"# ctk configuration
naming:
  strategy: use_operation_id  # use_operation_id | use_route_based
  aliases: {}
    # listPayments: payments     # operationId -> custom name

synthesis:
  response_properties: all     # all | required_only
  request_properties: all      # all | required_only

intake:
  output_dir: workspace/catalog
  index_path: workspace/catalog/index.json

mock:
  output_dir: artifacts/mocks
  host: 0.0.0.0
  ports: {}                    # rest: 9100, soap: 9200, rpc: 9300
  latency_ms: 50
  format: yaml                 # yaml | json
  description_template: "Mocked {{ method }} {{ path }} of {{ service }}"

scenario:
  output_dir: artifacts/tests
  prefix: smoke
  tags: []
  metadata: {}
  description_template: "Invoke {{ operation }} ({{ method }} {{ path }})"
  assertions:
    - status == expected.status
"#
}
