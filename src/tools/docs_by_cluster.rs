//! MCP `get_docs_by_cluster` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `get_docs_by_cluster` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DocsByClusterParams {
    /// When absent, clusters are listed instead of docs.
    #[schemars(
        description = "Cluster name whose docs to list. Omit to list the clusters themselves."
    )]
    pub cluster: Option<String>,

    #[schemars(
        description = "When listing clusters, include doc count and average quality. Defaults to true."
    )]
    pub include_stats: Option<bool>,

    #[schemars(description = "Maximum number of rows to return (1-200). Defaults to 20.")]
    pub limit: Option<usize>,
}
