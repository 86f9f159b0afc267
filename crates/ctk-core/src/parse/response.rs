use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::media_type::{self, MediaType};

/// A response for one status code, in either the 3.x or the 2.0 layout.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub content: IndexMap<String, MediaType>,

    /// Swagger 2.0 response schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    /// Swagger 2.0 examples keyed by media type.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub examples: IndexMap<String, Value>,
}

impl Response {
    /// The 3.x media type the normalizer builds the response from.
    pub fn preferred_content(&self) -> Option<(&String, &MediaType)> {
        media_type::preferred(&self.content)
    }
}
