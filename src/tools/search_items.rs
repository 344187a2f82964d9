use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchItemsParams {
    #[schemars(description = "Optional text to match against item name, title, and description")]
    pub query: Option<String>,

    #[schemars(description = "Optional status filter, e.g. 'active' or 'completed'")]
    pub status: Option<String>,

    #[schemars(description = "Optional priority filter: 'low', 'medium', 'high', or 'critical'")]
    pub priority: Option<String>,

    #[schemars(description = "Maximum number of items to return (1-100). Defaults to 10.")]
    pub limit: Option<usize>,
}
