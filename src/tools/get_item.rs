//! MCP `get_item_with_children` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `get_item_with_children` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetItemParams {
    #[schemars(description = "Numeric id of the item")]
    pub id: i64,
}
