use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// An employment reference requested for a new starter.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct EmployeeReference {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = 1)]
    pub reference_number: i32,
    pub contact_name: Option<String>,
    pub contact_company: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub received: bool,
    pub verbal_ref: bool,
    #[schema(value_type = Option<String>, format = "date")]
    pub date_requested: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub date_received: Option<NaiveDate>,
    pub notes: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
