use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::media_type::{self, MediaType};

/// An OpenAPI 3.x request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub content: IndexMap<String, MediaType>,

    #[serde(default)]
    pub required: bool,
}

impl RequestBody {
    /// The media type the normalizer builds the body from.
    pub fn preferred_content(&self) -> Option<(&String, &MediaType)> {
        media_type::preferred(&self.content)
    }
}
