//! MCP `search_docs` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `search_docs` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchDocsParams {
    #[schemars(description = "Text to match against doc titles, summaries, and keywords")]
    pub query: String,

    #[schemars(description = "Maximum number of docs to return (1-100). Defaults to 10.")]
    pub limit: Option<usize>,

    #[schemars(description = "Only return docs in this category")]
    pub category: Option<String>,

    #[schemars(description = "Only return docs of this difficulty, e.g. 'beginner' or 'advanced'")]
    pub difficulty: Option<String>,
}
