use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Days granted when no entitlement row exists for the year.
pub const DEFAULT_ENTITLEMENT_DAYS: f64 = 28.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    /// `pending -> approved | rejected`, `approved -> cancelled`.
    pub fn can_transition_to(self, next: LeaveStatus) -> bool {
        matches!(
            (self, next),
            (LeaveStatus::Pending, LeaveStatus::Approved)
                | (LeaveStatus::Pending, LeaveStatus::Rejected)
                | (LeaveStatus::Approved, LeaveStatus::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LeaveStatus::Rejected | LeaveStatus::Cancelled)
    }
}

pub const LEAVE_SELECT: &str = r#"
    SELECT
        l.id, l.employee_id, CONCAT(e.first_name, ' ', e.last_name) AS employee_name,
        l.start_date, l.end_date, l.total_days, l.status,
        l.requested_by, l.approved_by, l.approved_at, l.notes,
        l.created_at, l.updated_at
    FROM leave_requests l
    JOIN employees e ON e.id = l.employee_id
"#;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveRequest {
    pub id: u64,
    pub employee_id: u64,
    pub employee_name: String,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    #[schema(example = 2.5)]
    pub total_days: f64,
    #[schema(example = "pending")]
    pub status: String,
    /// User who submitted the request.
    pub requested_by: u64,
    pub approved_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct LeaveEntitlement {
    pub id: u64,
    pub employee_id: u64,
    pub year: i32,
    pub total_days: f64,
    pub carried_over: f64,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LeaveStatus; 4] = [
        LeaveStatus::Pending,
        LeaveStatus::Approved,
        LeaveStatus::Rejected,
        LeaveStatus::Cancelled,
    ];

    #[test]
    fn allowed_transitions() {
        let allowed: Vec<(LeaveStatus, LeaveStatus)> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            allowed,
            [
                (LeaveStatus::Pending, LeaveStatus::Approved),
                (LeaveStatus::Pending, LeaveStatus::Rejected),
                (LeaveStatus::Approved, LeaveStatus::Cancelled),
            ]
        );
    }

    #[test]
    fn terminal_states_go_nowhere() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(ALL.iter().all(|to| !from.can_transition_to(*to)));
        }
    }

    #[test]
    fn pending_cannot_be_cancelled_directly() {
        assert!(!LeaveStatus::Pending.can_transition_to(LeaveStatus::Cancelled));
    }

    #[test]
    fn parses_stored_status() {
        assert_eq!("approved".parse::<LeaveStatus>().unwrap(), LeaveStatus::Approved);
        assert_eq!(LeaveStatus::Cancelled.as_ref(), "cancelled");
    }
}
