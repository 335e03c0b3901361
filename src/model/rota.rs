use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ShiftType {
    pub id: u64,
    #[schema(example = "LD")]
    pub code: String,
    #[schema(example = "Long Day")]
    pub name: String,
    #[schema(example = 12.0)]
    pub default_hours: f64,
    pub includes_sleep: bool,
    pub display_color: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
}

/// A shift joined with its type so hours and sleeps can be summed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Shift {
    pub id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub shift_type_id: u64,
    pub shift_code: String,
    /// Overrides the type's default hours when set.
    pub hours: Option<f64>,
    pub default_hours: f64,
    pub includes_sleep: bool,
    pub notes: Option<String>,
}

impl Shift {
    pub fn effective_hours(&self) -> f64 {
        self.hours.unwrap_or(self.default_hours)
    }
}

pub const SHIFT_SELECT: &str = r#"
    SELECT
        s.id, s.employee_id, s.date, s.shift_type_id, t.code AS shift_code,
        s.hours, t.default_hours, t.includes_sleep, s.notes
    FROM shifts s
    JOIN shift_types t ON t.id = s.shift_type_id
"#;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct RotaMonthlyHours {
    pub id: u64,
    pub year: i32,
    pub month: i32,
    #[schema(example = 160.0)]
    pub contracted_hours: f64,
}
