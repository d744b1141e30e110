//! MCP `list_subjects` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `list_subjects` MCP tool.
///
/// Without `subject`, every subject is listed with its member count. With it,
/// the newest articles in that subject are returned instead.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListSubjectsParams {
    #[schemars(description = "Optional subject name to browse, newest articles first")]
    pub subject: Option<String>,

    #[schemars(description = "Maximum number of articles when browsing a subject. Defaults to 20.")]
    pub limit: Option<usize>,
}
