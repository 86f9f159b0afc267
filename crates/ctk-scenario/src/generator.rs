use ctk_core::config::{CtkConfig, ScenarioConfig};
use ctk_core::describe::Describer;
use ctk_core::ir::{IrDocument, IrOperation, status_code};
use ctk_core::synth::{parameter_examples, request_example};
use ctk_core::transform::name_normalizer::{slugify, version_slug};
use ctk_core::{ArtifactGenerator, GeneratedFile, GeneratorError};
use heck::ToKebabCase;
use indexmap::IndexSet;
use log::debug;
use minijinja::context;
use serde_json::Value;

use crate::model::{
    ExpectedResponse, ScenarioDocument, ScenarioMetadata, ScenarioStep, StepParameter, StepRequest,
};

const SCENARIO_FILE: &str = "scenario.yaml";
const PAYLOAD_DIR: &str = "payloads";
const DEFAULT_STATUS: u16 = 200;

/// Smoke-test scenario bundle generator.
pub struct ScenarioGenerator;

/// A built scenario plus the payload files its steps reference.
#[derive(Debug, Clone)]
pub struct ScenarioBundle {
    pub document: ScenarioDocument,
    /// (path relative to the bundle, JSON payload)
    pub payloads: Vec<(String, Value)>,
}

impl ScenarioGenerator {
    pub fn build(ir: &IrDocument, config: &CtkConfig) -> Result<ScenarioBundle, GeneratorError> {
        let scenario = &config.scenario;
        let describer = Describer::new(&scenario.description_template)?;

        let mut steps = Vec::with_capacity(ir.operations.len());
        let mut payloads = Vec::new();
        for (index, op) in ir.operations.iter().enumerate() {
            let position = index + 1;
            let payload = request_example(op, config.synthesis.request_properties)
                .map_err(|source| synthesis_error(op, source))?
                .map(|value| (payload_path(position, op), value));

            steps.push(build_step(
                ir,
                op,
                position,
                scenario,
                &describer,
                payload.as_ref().map(|(path, _)| path.clone()),
            )?);
            payloads.extend(payload);
        }
        debug!(
            "{} {}: {} steps, {} payloads",
            ir.service,
            ir.version,
            steps.len(),
            payloads.len()
        );

        Ok(ScenarioBundle {
            document: ScenarioDocument {
                scenario_id: scenario_id(ir, &scenario.prefix),
                service: ir.service.clone(),
                version: ir.version.clone(),
                protocol: ir.protocol.clone(),
                metadata: ScenarioMetadata {
                    tags: tags(scenario),
                    custom: scenario.metadata.clone(),
                },
                steps,
            },
            payloads,
        })
    }

    /// `<service-slug>/<version-slug>`
    pub fn bundle_dir(ir: &IrDocument) -> String {
        format!("{}/{}", slugify(&ir.service), version_slug(&ir.version))
    }
}

impl ArtifactGenerator for ScenarioGenerator {
    type Config = CtkConfig;
    type Error = GeneratorError;

    fn generate(
        &self,
        ir: &IrDocument,
        config: &CtkConfig,
    ) -> Result<Vec<GeneratedFile>, GeneratorError> {
        let bundle = Self::build(ir, config)?;
        let dir = Self::bundle_dir(ir);

        let mut files = vec![GeneratedFile {
            path: format!("{dir}/{SCENARIO_FILE}"),
            content: serde_yaml_ng::to_string(&bundle.document)
                .map_err(|e| GeneratorError::Serialize(e.to_string()))?,
        }];
        for (path, payload) in bundle.payloads {
            let mut content = serde_json::to_string_pretty(&payload)
                .map_err(|e| GeneratorError::Serialize(e.to_string()))?;
            content.push('\n');
            files.push(GeneratedFile {
                path: format!("{dir}/{path}"),
                content,
            });
        }
        Ok(files)
    }
}

/// `<prefix>-<service-slug>-<version-slug>`, all slug-safe.
pub fn scenario_id(ir: &IrDocument, prefix: &str) -> String {
    format!(
        "{}-{}-{}",
        slugify(prefix),
        slugify(&ir.service),
        slugify(&ir.version)
    )
}

/// `payloads/NNN_<operation-slug>.json`
fn payload_path(position: usize, op: &IrOperation) -> String {
    format!(
        "{PAYLOAD_DIR}/{position:03}_{}.json",
        slugify(&op.operation_id.to_kebab_case())
    )
}

/// The prefix first, then configured tags, without repeats.
fn tags(config: &ScenarioConfig) -> Vec<String> {
    let mut tags = IndexSet::new();
    tags.insert(config.prefix.clone());
    tags.extend(config.tags.iter().cloned());
    tags.into_iter().filter(|t| !t.is_empty()).collect()
}

fn build_step(
    ir: &IrDocument,
    op: &IrOperation,
    position: usize,
    config: &ScenarioConfig,
    describer: &Describer<'_>,
    payload: Option<String>,
) -> Result<ScenarioStep, GeneratorError> {
    let parameters = parameter_examples(op)
        .map_err(|source| synthesis_error(op, source))?
        .into_iter()
        .map(|(p, value)| StepParameter {
            name: p.name.clone(),
            location: p.location,
            required: p.required,
            value,
        })
        .collect();

    let expected = match op.expected_response() {
        Some((key, response)) => ExpectedResponse {
            status: status_code(key).unwrap_or(DEFAULT_STATUS),
            content_type: response.content_type.clone(),
            schema: response
                .content_type
                .as_ref()
                .map(|_| response.schema.clone()),
        },
        None => ExpectedResponse {
            status: DEFAULT_STATUS,
            content_type: None,
            schema: None,
        },
    };

    let description = describer.render(context! {
        index => position,
        service => ir.service,
        version => ir.version,
        operation => op.operation_id,
        method => op.method.as_str(),
        path => op.path,
        summary => op.headline(),
    })?;

    Ok(ScenarioStep {
        name: op.operation_id.clone(),
        description,
        request: StepRequest {
            method: op.method.to_string(),
            path: op.path.clone(),
            parameters,
            content_type: payload
                .as_ref()
                .and(op.request_body.as_ref())
                .map(|body| body.content_type.clone()),
            payload,
        },
        expected,
        assertions: config.assertions.clone(),
        notes: op.description.clone(),
    })
}

fn synthesis_error(op: &IrOperation, source: ctk_core::error::SynthesisError) -> GeneratorError {
    GeneratorError::Synthesis {
        operation: op.operation_id.clone(),
        source,
    }
}
