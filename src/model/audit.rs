use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use strum::{AsRefStr, Display};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Insert,
    Update,
    Delete,
    /// Hard delete of an employee and all dependent rows.
    Purge,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AuditLogEntry {
    pub id: u64,
    #[schema(example = "employees")]
    pub table_name: String,
    pub record_id: u64,
    #[schema(example = "UPDATE")]
    pub action: String,
    pub user_id: Option<u64>,
    pub user_name: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub old_data: Option<Json<Value>>,
    #[schema(value_type = Option<Object>)]
    pub new_data: Option<Json<Value>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
