use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Login account as exposed by the API; never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct User {
    pub id: u64,
    pub email: String,
    pub display_name: String,
    #[schema(example = 3)]
    pub role_id: u8,
    pub employee_id: Option<u64>,
    pub active: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

pub const USER_SELECT: &str = r#"
    SELECT id, email, display_name, role_id, employee_id, active, last_login_at, created_at
    FROM users
"#;
