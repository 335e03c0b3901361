use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OnboardingStatus {
    Pending,
    Complete,
    NotRequired,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct OnboardingItem {
    pub id: u64,
    #[schema(example = "DBS check")]
    pub name: String,
    pub description: Option<String>,
    pub display_order: i32,
    pub active: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

/// Checklist row for one employee, joined with its item definition.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct OnboardingRecord {
    pub id: u64,
    pub employee_id: u64,
    pub item_id: u64,
    pub item_name: String,
    pub item_description: Option<String>,
    pub display_order: i32,
    #[schema(example = "pending")]
    pub status: String,
    #[schema(value_type = Option<String>, format = "date")]
    pub completed_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub recorded_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
