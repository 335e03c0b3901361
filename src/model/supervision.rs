use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const SUPERVISION_SELECT: &str = r#"
    SELECT
        s.id, s.employee_id, CONCAT(e.first_name, ' ', e.last_name) AS employee_name,
        s.conducted_by_id, CONCAT(c.first_name, ' ', c.last_name) AS conducted_by_name,
        s.supervision_date, s.period, s.notes, s.is_completed,
        s.created_at, s.updated_at
    FROM supervision_records s
    JOIN employees e ON e.id = s.employee_id
    LEFT JOIN employees c ON c.id = s.conducted_by_id
"#;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Supervision {
    pub id: u64,
    pub employee_id: u64,
    pub employee_name: String,
    pub conducted_by_id: Option<u64>,
    pub conducted_by_name: Option<String>,
    #[schema(value_type = String, format = "date")]
    pub supervision_date: NaiveDate,
    /// `YYYY-MM` of the supervision date.
    #[schema(example = "2026-10")]
    pub period: String,
    pub notes: Option<String>,
    /// `false` for a planned supervision.
    pub is_completed: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SupervisionException {
    pub id: u64,
    pub employee_id: u64,
    #[schema(example = "2026-08")]
    pub period: String,
    #[schema(example = "annual_leave")]
    pub exception_type: String,
    pub notes: Option<String>,
    pub created_by: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SupervisionRequirement {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub effective_from: NaiveDate,
    pub required_count: i32,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
