use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The single `company_settings` row (id = 1).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct CompanySettings {
    pub company_name: String,
    #[schema(example = 30)]
    pub default_expiry_warning_days: i32,
    pub default_notification_days_before: i32,
    #[schema(example = 7)]
    pub default_reminder_frequency_days: i32,
    pub default_notify_employee: bool,
    pub default_notify_admin: bool,
    #[schema(example = 9)]
    pub supervision_months_back: i32,
    #[schema(example = 3)]
    pub supervision_months_forward: i32,
    pub appraisal_reviews_back: i32,
    pub appraisal_reviews_forward: i32,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}
