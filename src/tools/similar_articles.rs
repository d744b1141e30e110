//! MCP `similar_articles` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `similar_articles` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SimilarArticlesParams {
    /// Key of the seed article.
    #[schemars(description = "Key of the article to find neighbors for (see get_article / search_articles results)")]
    pub key: i64,

    /// Maximum number of results. Defaults to `retrieval.default_limit`.
    #[schemars(description = "Maximum number of results to return. Defaults to 10.")]
    pub limit: Option<usize>,
}
