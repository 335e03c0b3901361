use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const APPRAISAL_SELECT: &str = r#"
    SELECT
        a.id, a.employee_id, CONCAT(e.first_name, ' ', e.last_name) AS employee_name,
        a.review_number, a.milestone_type, a.due_date, a.completed_date,
        a.conducted_by_id, CONCAT(c.first_name, ' ', c.last_name) AS conducted_by_name,
        a.notes, a.created_at, a.updated_at
    FROM appraisal_milestones a
    JOIN employees e ON e.id = a.employee_id
    LEFT JOIN employees c ON c.id = a.conducted_by_id
"#;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct AppraisalMilestone {
    pub id: u64,
    pub employee_id: u64,
    pub employee_name: String,
    pub review_number: i32,
    #[schema(example = "quarterly")]
    pub milestone_type: String,
    #[schema(value_type = String, format = "date")]
    pub due_date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date")]
    pub completed_date: Option<NaiveDate>,
    pub conducted_by_id: Option<u64>,
    pub conducted_by_name: Option<String>,
    pub notes: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
