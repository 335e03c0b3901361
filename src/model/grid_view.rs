use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct UserGridView {
    pub id: u64,
    pub user_id: u64,
    #[schema(example = "training-matrix")]
    pub grid_type: String,
    pub name: String,
    /// Opaque to the server; stored and returned verbatim.
    #[schema(value_type = Object, example = json!({
        "hiddenFilters": [], "rowOrder": [3, 1, 2], "hiddenColumns": ["notes"], "columnOrder": []
    }))]
    pub config: Json<Value>,
    pub is_default: bool,
    pub is_company_default: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
