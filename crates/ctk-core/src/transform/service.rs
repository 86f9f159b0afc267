use std::path::Path;
use std::sync::LazyLock;

use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use serde_json::Value;

use crate::error::{NormalizeError, ParseError, TransformError};
use crate::ir::{HttpMethod, IrDocument, IrOperation, OperationError};

use super::name_normalizer::apply_alias;
use super::normalize::NormalizeOptions;

/// Service definitions carry no version of their own.
const SERVICE_VERSION: &str = "1.0";

static COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("invalid comment pattern")
});
static PACKAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bpackage\s+([\w.]+)\s*;").expect("invalid package pattern"));
static SERVICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bservice\s+(\w+)\s*\{").expect("invalid service pattern"));
static RPC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\brpc\s+(\w+)\s*\(").expect("invalid rpc pattern"));

/// Service-definition formats that normalize to operations only.
///
/// Names, the endpoint an operation is reached on and its documentation are
/// kept; message schemas are not read, so the operations carry no
/// parameters, body or responses. SOAP and gRPC calls both travel as HTTP
/// `POST`: a WSDL operation sits on its `soap:address` path and an RPC on
/// `/<package>.<Service>/<Method>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceFormat {
    Wsdl,
    Proto,
}

impl ServiceFormat {
    /// `.wsdl` and `.proto` files. Anything else is an OpenAPI document.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("wsdl") {
            Some(Self::Wsdl)
        } else if ext.eq_ignore_ascii_case("proto") {
            Some(Self::Proto)
        } else {
            None
        }
    }

    /// `protocol` of the documents this format normalizes into.
    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Wsdl => "wsdl",
            Self::Proto => "proto",
        }
    }
}

/// Normalize a service definition of the given format.
pub fn normalize_service(
    text: &str,
    format: ServiceFormat,
    options: &NormalizeOptions,
) -> Result<IrDocument, TransformError> {
    match format {
        ServiceFormat::Wsdl => normalize_wsdl(text, options),
        ServiceFormat::Proto => normalize_proto(text, options),
    }
}

/// One operation as declared by a service definition.
#[derive(Debug)]
struct Declared {
    name: String,
    /// Port type or service the operation belongs to.
    group: String,
    path: String,
    description: Option<String>,
}

/// Operations of a WSDL 1.1 `definitions` (or 2.0 `description`) document,
/// taken from its port types (interfaces).
pub fn normalize_wsdl(text: &str, options: &NormalizeOptions) -> Result<IrDocument, TransformError> {
    let wsdl = scan_wsdl(text)?;
    let endpoint = wsdl
        .endpoint
        .as_deref()
        .map(endpoint_path)
        .unwrap_or_else(|| "/".to_string());

    let declared = wsdl
        .operations
        .into_iter()
        .map(|(group, name, description)| Declared {
            name,
            group,
            path: endpoint.clone(),
            description,
        })
        .collect();

    let mut metadata = IndexMap::new();
    if let Some(namespace) = wsdl.target_namespace {
        metadata.insert("target_namespace".to_string(), Value::String(namespace));
    }
    let service = service_name(options, [wsdl.name, wsdl.service]);
    assemble(ServiceFormat::Wsdl, service, declared, metadata, options)
}

/// Operations of every `service` block of a protobuf file.
pub fn normalize_proto(
    text: &str,
    options: &NormalizeOptions,
) -> Result<IrDocument, TransformError> {
    let text = COMMENT.replace_all(text, "");
    let package = PACKAGE.captures(&text).map(|c| c[1].to_string());

    let mut services = Vec::new();
    let mut declared = Vec::new();
    for service in SERVICE.captures_iter(&text) {
        let (Some(whole), Some(name)) = (service.get(0), service.get(1)) else {
            continue;
        };
        let name = name.as_str();
        services.push(name.to_string());

        let open = whole.end() - 1;
        let body = &text[open..block_end(&text, open)];
        let qualified = match package {
            Some(ref package) => format!("{package}.{name}"),
            None => name.to_string(),
        };
        for rpc in RPC.captures_iter(body) {
            declared.push(Declared {
                name: rpc[1].to_string(),
                group: name.to_string(),
                path: format!("/{qualified}/{}", &rpc[1]),
                description: None,
            });
        }
    }

    let mut metadata = IndexMap::new();
    if let Some(package) = package {
        metadata.insert("package".to_string(), Value::String(package));
    }
    if services.len() > 1 {
        metadata.insert("services".to_string(), Value::from(services.clone()));
    }
    let service = service_name(options, [services.into_iter().next()]);
    assemble(ServiceFormat::Proto, service, declared, metadata, options)
}

fn assemble(
    format: ServiceFormat,
    service: String,
    declared: Vec<Declared>,
    mut metadata: IndexMap<String, Value>,
    options: &NormalizeOptions,
) -> Result<IrDocument, TransformError> {
    if declared.is_empty() {
        return Err(TransformError::NoOperations(service));
    }

    let mut operations = Vec::new();
    let mut errors = Vec::new();
    let mut seen = IndexSet::new();
    for op in declared {
        let name = apply_alias(&op.name, &options.aliases);
        if !seen.insert(name.clone()) {
            let failure = OperationError {
                operation: name.clone(),
                method: HttpMethod::Post,
                path: op.path,
                error: NormalizeError::DuplicateOperationId(name),
            };
            warn!("skipping operation {failure}");
            errors.push(failure);
            continue;
        }
        operations.push(IrOperation {
            operation_id: name,
            method: HttpMethod::Post,
            path: op.path,
            summary: None,
            description: op.description,
            tags: Some(op.group).filter(|g| !g.is_empty()).into_iter().collect(),
            deprecated: false,
            parameters: Vec::new(),
            request_body: None,
            responses: IndexMap::new(),
        });
    }

    if let Some(ref policy) = options.policy {
        metadata.insert("policy".to_string(), policy.clone());
    }
    debug!(
        "normalized {} {} operations of {service} ({} skipped)",
        operations.len(),
        format.protocol(),
        errors.len()
    );

    Ok(IrDocument {
        service,
        version: SERVICE_VERSION.to_string(),
        protocol: format.protocol().to_string(),
        source: options.source.clone(),
        metadata,
        operations,
        errors,
    })
}

/// The override, else the first declared name, else the source file stem.
fn service_name<I>(options: &NormalizeOptions, declared: I) -> String
where
    I: IntoIterator<Item = Option<String>>,
{
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    options
        .service_name
        .as_deref()
        .and_then(non_empty)
        .or_else(|| declared.into_iter().flatten().find_map(|s| non_empty(&s)))
        .or_else(|| {
            options
                .source
                .as_deref()
                .and_then(|s| Path::new(s).file_stem())
                .and_then(|stem| non_empty(&stem.to_string_lossy()))
        })
        .unwrap_or_else(|| "service".to_string())
}

#[derive(Debug, Default)]
struct Wsdl {
    name: Option<String>,
    service: Option<String>,
    target_namespace: Option<String>,
    endpoint: Option<String>,
    /// (port type, operation, documentation)
    operations: Vec<(String, String, Option<String>)>,
}

fn scan_wsdl(text: &str) -> Result<Wsdl, ParseError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut wsdl = Wsdl::default();
    // (local name, `name` attribute) of each open element
    let mut stack: Vec<(Vec<u8>, Option<String>)> = Vec::new();
    let mut documenting = false;
    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(ParseError::Wsdl(format!(
                    "{e} at byte {}",
                    reader.buffer_position()
                )));
            }
        };
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let local = e.local_name().as_ref().to_vec();
                let name = attribute(e, "name")?;
                let parent = stack.last().map(|(tag, _)| tag.as_slice());
                let grandparent = stack
                    .len()
                    .checked_sub(2)
                    .map(|i| stack[i].0.as_slice());

                match (parent, local.as_slice()) {
                    (None, b"definitions" | b"description") => {
                        wsdl.name = name.clone();
                        wsdl.target_namespace = attribute(e, "targetNamespace")?;
                    }
                    (None, other) => {
                        return Err(ParseError::Wsdl(format!(
                            "root element is <{}>, not a WSDL definitions document",
                            String::from_utf8_lossy(other)
                        )));
                    }
                    (Some(b"definitions" | b"description"), b"service") => {
                        if wsdl.service.is_none() {
                            wsdl.service = name.clone();
                        }
                    }
                    (Some(b"portType" | b"interface"), b"operation") => {
                        let group = stack
                            .last()
                            .and_then(|(_, n)| n.clone())
                            .unwrap_or_default();
                        match name.clone() {
                            Some(op) => wsdl.operations.push((group, op, None)),
                            None => warn!("WSDL operation without a name in {group}, skipped"),
                        }
                    }
                    (Some(b"operation"), b"documentation")
                        if matches!(grandparent, Some(b"portType" | b"interface"))
                            && matches!(event, Event::Start(_)) =>
                    {
                        documenting = true;
                    }
                    (Some(b"port"), b"address") | (Some(b"service"), b"endpoint") => {
                        let key = if local == b"address" { "location" } else { "address" };
                        if wsdl.endpoint.is_none() {
                            wsdl.endpoint = attribute(e, key)?;
                        }
                    }
                    _ => {}
                }

                if matches!(event, Event::Start(_)) {
                    stack.push((local, name));
                }
            }
            Event::Text(ref text) if documenting => {
                let text = String::from_utf8_lossy(text);
                if let Some((_, _, doc)) = wsdl.operations.last_mut() {
                    match doc.as_mut() {
                        Some(existing) => {
                            existing.push(' ');
                            existing.push_str(text.trim());
                        }
                        None => *doc = Some(text.trim().to_string()),
                    }
                }
            }
            Event::End(_) => {
                if stack.pop().is_some_and(|(tag, _)| tag == b"documentation") {
                    documenting = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(wsdl)
}

fn attribute(element: &BytesStart<'_>, key: &str) -> Result<Option<String>, ParseError> {
    let attr = element
        .try_get_attribute(key)
        .map_err(|e| ParseError::Wsdl(e.to_string()))?;
    Ok(attr
        .map(|a| String::from_utf8_lossy(&a.value).trim().to_string())
        .filter(|v| !v.is_empty()))
}

/// Path part of an endpoint URL: `http://host:8080/soap/orders?wsdl` is
/// `/soap/orders`.
fn endpoint_path(location: &str) -> String {
    let rest = location
        .split_once("://")
        .map_or(location, |(_, rest)| rest);
    let path = rest.find('/').map_or("", |i| &rest[i..]);
    let path = path.split(['?', '#']).next().unwrap_or_default();
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Index of the `}` closing the block opened at `open`, or the end of text.
fn block_end(text: &str, open: usize) -> usize {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return open + i;
                }
            }
            _ => {}
        }
    }
    text.len()
}
