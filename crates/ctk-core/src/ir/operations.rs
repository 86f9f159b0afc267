use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::schema::SchemaTree;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// Parse a lowercase path-item key.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "get" => Some(HttpMethod::Get),
            "put" => Some(HttpMethod::Put),
            "post" => Some(HttpMethod::Post),
            "delete" => Some(HttpMethod::Delete),
            "options" => Some(HttpMethod::Options),
            "head" => Some(HttpMethod::Head),
            "patch" => Some(HttpMethod::Patch),
            "trace" => Some(HttpMethod::Trace),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully normalized API operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrOperation {
    pub operation_id: String,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(default)]
    pub parameters: Vec<IrParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<IrRequestBody>,
    #[serde(default)]
    pub responses: IndexMap<String, IrResponse>,
}

impl IrOperation {
    /// `{name}` placeholders of the path, in order of appearance.
    pub fn path_placeholders(&self) -> Vec<&str> {
        path_placeholders(&self.path)
    }

    /// Names of the declared `path` parameters.
    pub fn path_parameter_names(&self) -> Vec<&str> {
        self.parameters
            .iter()
            .filter(|p| p.location == IrParameterLocation::Path)
            .map(|p| p.name.as_str())
            .collect()
    }

    /// The summary, else the description.
    pub fn headline(&self) -> Option<&str> {
        self.summary.as_deref().or(self.description.as_deref())
    }

    /// Whether a 2xx status (or `2XX` range) is declared.
    pub fn has_success_response(&self) -> bool {
        self.responses.keys().any(|key| is_success(key))
    }

    /// The response a successful call is expected to produce: the first
    /// declared 2xx, else the first declared response.
    pub fn expected_response(&self) -> Option<(&str, &IrResponse)> {
        self.responses
            .iter()
            .find(|(key, _)| is_success(key))
            .or_else(|| self.responses.first())
            .map(|(key, response)| (key.as_str(), response))
    }
}

/// A resolved path/query/header/cookie parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrParameter {
    pub name: String,
    pub location: IrParameterLocation,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: SchemaTree,
}

/// Parameter location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IrParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl IrParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            IrParameterLocation::Path => "path",
            IrParameterLocation::Query => "query",
            IrParameterLocation::Header => "header",
            IrParameterLocation::Cookie => "cookie",
        }
    }
}

/// A resolved request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrRequestBody {
    pub content_type: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: SchemaTree,
}

/// A resolved response for one status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub schema: SchemaTree,
}

/// Extract `{name}` placeholders from a path template.
pub fn path_placeholders(path: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

/// Numeric code of a response key: `404` is 404, a `4XX` range is its
/// lowest code. `default` and anything else is `None`.
pub fn status_code(key: &str) -> Option<u16> {
    if !key.is_ascii() {
        return None;
    }
    let code = if key.len() == 3 && key[1..].eq_ignore_ascii_case("xx") {
        key[..1].parse::<u16>().ok()? * 100
    } else {
        key.parse().ok()?
    };
    (100..=599).contains(&code).then_some(code)
}

/// Whether a response key denotes a 2xx status.
pub fn is_success(key: &str) -> bool {
    status_code(key).is_some_and(|code| (200..300).contains(&code))
}
