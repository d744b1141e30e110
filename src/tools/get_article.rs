use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetArticleParams {
    #[schemars(description = "Key of the article to fetch")]
    pub key: i64,
}
