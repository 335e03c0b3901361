use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_ROLE: &str = "Residential Support Worker";

/// Shared projection for employee reads; joins the status name and the
/// supervisor's display name.
pub const EMPLOYEE_SELECT: &str = r#"
    SELECT
        e.id, e.email, e.first_name, e.last_name, e.department, e.role,
        e.start_date, e.active, e.status_id, es.name AS status_name, e.notes,
        e.reports_to, CONCAT(m.first_name, ' ', m.last_name) AS reports_to_name,
        e.supervision_frequency, e.appraisal_frequency_months,
        e.created_at, e.updated_at
    FROM employees e
    LEFT JOIN employee_statuses es ON es.id = e.status_id
    LEFT JOIN employees m ON m.id = e.reports_to
"#;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "email": "jane.doe@example.com",
        "first_name": "Jane",
        "last_name": "Doe",
        "department": "Oak House",
        "role": "Residential Support Worker",
        "start_date": "2025-03-10",
        "active": true,
        "status_id": 2,
        "status_name": "Probation",
        "notes": null,
        "reports_to": 4,
        "reports_to_name": "Sam Hill",
        "supervision_frequency": 1,
        "appraisal_frequency_months": 3,
        "created_at": "2025-03-01T09:00:00Z",
        "updated_at": "2025-03-01T09:00:00Z"
    })
)]
pub struct Employee {
    pub id: u64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    pub role: String,

    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,

    pub active: bool,
    pub status_id: Option<u64>,
    pub status_name: Option<String>,
    pub notes: Option<String>,

    /// Supervisor, another employee.
    pub reports_to: Option<u64>,
    pub reports_to_name: Option<String>,

    /// Months between required supervisions.
    pub supervision_frequency: i32,
    pub appraisal_frequency_months: i32,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
