use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::period::add_months;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
pub enum TrainingStatus {
    #[serde(rename = "Not Completed")]
    #[strum(serialize = "Not Completed")]
    NotCompleted,
    #[serde(rename = "Expired")]
    #[strum(serialize = "Expired")]
    Expired,
    #[serde(rename = "Expiring Soon")]
    #[strum(serialize = "Expiring Soon")]
    ExpiringSoon,
    #[serde(rename = "Valid")]
    #[strum(serialize = "Valid")]
    Valid,
    #[serde(rename = "Completed")]
    #[strum(serialize = "Completed")]
    Completed,
}

impl TrainingStatus {
    /// Statuses that warrant a reminder email.
    pub fn needs_attention(&self) -> bool {
        matches!(self, TrainingStatus::Expired | TrainingStatus::ExpiringSoon)
    }
}

/// Expiry of a completion; `None` for courses that never expire.
pub fn expiry_date(completion: NaiveDate, validity_months: Option<i32>) -> Option<NaiveDate> {
    validity_months.map(|m| add_months(completion, m.max(0) as u32))
}

pub fn days_until(expiry: Option<NaiveDate>, today: NaiveDate) -> Option<i64> {
    expiry.map(|e| (e - today).num_days())
}

/// Classify the latest completion of a course.
///
/// `completion` is the latest record's `(completion_date, expiry_date)`, or
/// `None` when the employee never completed the course.
pub fn training_status(
    completion: Option<(NaiveDate, Option<NaiveDate>)>,
    today: NaiveDate,
    warning_days: i64,
) -> TrainingStatus {
    let Some((_, expiry)) = completion else {
        return TrainingStatus::NotCompleted;
    };

    match expiry {
        None => TrainingStatus::Completed,
        Some(expiry) if expiry < today => TrainingStatus::Expired,
        Some(expiry) if (expiry - today).num_days() < warning_days => TrainingStatus::ExpiringSoon,
        Some(_) => TrainingStatus::Valid,
    }
}

/// Whether a course applies to an employee of `role`. An empty or missing
/// mandatory-role list means the course applies to everyone.
pub fn course_applies(mandatory_for_roles: Option<&[String]>, role: &str) -> bool {
    match mandatory_for_roles {
        None => true,
        Some([]) => true,
        Some(roles) => roles.iter().any(|r| r.eq_ignore_ascii_case(role)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn twelve_month_validity_expires_a_year_later() {
        assert_eq!(expiry_date(d(2026, 1, 15), Some(12)), Some(d(2027, 1, 15)));
    }

    #[test]
    fn null_validity_never_expires() {
        let completion = d(2010, 1, 1);
        assert_eq!(expiry_date(completion, None), None);

        let far_future = d(2099, 1, 1);
        let status = training_status(Some((completion, None)), far_future, 30);
        assert_eq!(status, TrainingStatus::Completed);
        assert_ne!(status, TrainingStatus::Expired);
    }

    #[test]
    fn missing_record_is_not_completed() {
        assert_eq!(
            training_status(None, d(2026, 10, 18), 30),
            TrainingStatus::NotCompleted
        );
    }

    #[test]
    fn status_window_boundaries() {
        let today = d(2026, 10, 18);
        let done = d(2025, 10, 18);
        let at = |expiry| training_status(Some((done, Some(expiry))), today, 30);

        assert_eq!(at(d(2026, 10, 17)), TrainingStatus::Expired);
        // expiring today is still inside the window, not yet expired
        assert_eq!(at(today), TrainingStatus::ExpiringSoon);
        assert_eq!(at(d(2026, 11, 16)), TrainingStatus::ExpiringSoon);
        // today + warningDays is outside the half-open window
        assert_eq!(at(d(2026, 11, 17)), TrainingStatus::Valid);
    }

    #[test]
    fn days_until_is_signed() {
        let today = d(2026, 10, 18);
        assert_eq!(days_until(Some(d(2026, 10, 20)), today), Some(2));
        assert_eq!(days_until(Some(d(2026, 10, 10)), today), Some(-8));
        assert_eq!(days_until(None, today), None);
    }

    #[test]
    fn status_labels_match_wire_format() {
        assert_eq!(TrainingStatus::ExpiringSoon.to_string(), "Expiring Soon");
        assert_eq!(
            serde_json::to_string(&TrainingStatus::NotCompleted).unwrap(),
            "\"Not Completed\""
        );
        assert_eq!("Valid".parse::<TrainingStatus>().unwrap(), TrainingStatus::Valid);
    }

    #[test]
    fn mandatory_roles_filter_courses() {
        let roles = vec!["Team Leader".to_string()];
        assert!(course_applies(None, "Cook"));
        assert!(course_applies(Some(&[]), "Cook"));
        assert!(course_applies(Some(&roles), "team leader"));
        assert!(!course_applies(Some(&roles), "Cook"));
    }
}
