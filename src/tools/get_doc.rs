use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetDocParams {
    #[schemars(description = "Numeric id of the doc")]
    pub id: i64,
}
