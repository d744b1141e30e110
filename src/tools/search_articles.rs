//! MCP `search_articles` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_articles` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchArticlesParams {
    #[schemars(description = "Free text to match against article titles and abstracts")]
    pub query: String,

    #[schemars(description = "Maximum number of results to return. Defaults to 10.")]
    pub limit: Option<usize>,
}
