use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TrainingCourse {
    pub id: u64,
    #[schema(example = "Fire Safety")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "Health & Safety")]
    pub category: String,

    /// `None` means a completion never expires.
    #[schema(example = 12)]
    pub validity_months: Option<i32>,
    pub expiry_warning_days_before: i32,
    pub notification_days_before: i32,
    pub reminder_frequency_days: i32,
    pub notify_employee: bool,
    pub notify_admin: bool,

    /// Job roles the course is mandatory for; empty applies to everyone.
    #[schema(value_type = Option<Vec<String>>)]
    pub mandatory_for_roles: Option<Json<Vec<String>>>,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl TrainingCourse {
    pub fn mandatory_roles(&self) -> Option<&[String]> {
        self.mandatory_for_roles.as_ref().map(|j| j.0.as_slice())
    }
}

pub const TRAINING_RECORD_SELECT: &str = r#"
    SELECT
        tr.id, tr.employee_id, CONCAT(e.first_name, ' ', e.last_name) AS employee_name,
        tr.course_id, c.name AS course_name, c.category,
        tr.completion_date, tr.expiry_date, tr.certificate_url, tr.notes,
        tr.recorded_by, tr.created_at
    FROM training_records tr
    JOIN employees e ON e.id = tr.employee_id
    JOIN training_courses c ON c.id = tr.course_id
"#;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct TrainingRecord {
    pub id: u64,
    pub employee_id: u64,
    pub employee_name: String,
    pub course_id: u64,
    pub course_name: String,
    pub category: String,
    #[schema(value_type = String, format = "date")]
    pub completion_date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date")]
    pub expiry_date: Option<NaiveDate>,
    pub certificate_url: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: u64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}
