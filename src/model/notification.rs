use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationType {
    Expired,
    ExpiryWarning,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecipientType {
    Employee,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct NotificationLog {
    pub id: u64,
    pub training_record_id: u64,
    pub employee_id: u64,
    pub employee_name: Option<String>,
    pub course_id: u64,
    pub course_name: Option<String>,
    pub recipient_email: String,
    pub recipient_type: String,
    pub notification_type: String,
    #[schema(value_type = String, format = "date-time")]
    pub sent_at: DateTime<Utc>,
    pub days_until_expiry: Option<i32>,
}
