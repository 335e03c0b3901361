use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::period::{Period, add_months};

/// Required supervisions per month when no requirement row applies.
pub const DEFAULT_REQUIRED_COUNT: i32 = 1;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExceptionType {
    AnnualLeave,
    SickLeave,
    NotRequired,
}

/// Cell state in the supervision matrix. `Exception` cells carry their
/// exception type alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MonthStatus {
    Complete,
    Partial,
    Missing,
    NotYetDue,
    BeforeStart,
    Exception,
}

/// A requirement row as far as resolution is concerned.
#[derive(Debug, Clone, Copy)]
pub struct RequirementRule {
    pub id: u64,
    pub effective_from: NaiveDate,
    pub required_count: i32,
}

/// Required supervisions for `period`: the latest rule effective on or
/// before the first of the month. Equal dates resolve to the newest row.
pub fn required_count(rules: &[RequirementRule], period: Period) -> i32 {
    let start = period.first_day();
    rules
        .iter()
        .filter(|r| r.effective_from <= start)
        .max_by_key(|r| (r.effective_from, r.id))
        .map(|r| r.required_count)
        .unwrap_or(DEFAULT_REQUIRED_COUNT)
}

/// Inputs to classify one employee-month.
#[derive(Debug, Clone, Copy)]
pub struct MonthFacts {
    pub period: Period,
    pub today: NaiveDate,
    pub start_date: NaiveDate,
    pub completed: i32,
    pub required: i32,
    pub exception: Option<ExceptionType>,
}

pub fn month_status(f: &MonthFacts) -> MonthStatus {
    if f.exception.is_some() {
        return MonthStatus::Exception;
    }
    if f.period.last_day() < f.start_date {
        return MonthStatus::BeforeStart;
    }
    if f.completed >= f.required {
        return MonthStatus::Complete;
    }
    if f.completed > 0 {
        return MonthStatus::Partial;
    }
    if f.period > Period::containing(f.today) {
        MonthStatus::NotYetDue
    } else {
        MonthStatus::Missing
    }
}

/// Days before the next due date at which an employee shows as `DueSoon`.
pub const DUE_SOON_DAYS: i64 = 7;

/// Where an employee stands against their supervision frequency. Variants
/// are declared most urgent first so sorting puts problems at the top.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SupervisionStanding {
    Overdue,
    Never,
    DueSoon,
    Ok,
}

/// `frequency_months` below one is treated as monthly.
pub fn supervision_standing(
    last_completed: Option<NaiveDate>,
    frequency_months: i32,
    today: NaiveDate,
) -> SupervisionStanding {
    let Some(last) = last_completed else {
        return SupervisionStanding::Never;
    };
    let next_due = add_months(last, frequency_months.max(1) as u32);
    if next_due < today {
        SupervisionStanding::Overdue
    } else if (next_due - today).num_days() <= DUE_SOON_DAYS {
        SupervisionStanding::DueSoon
    } else {
        SupervisionStanding::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn facts(period: &str, completed: i32, required: i32) -> MonthFacts {
        MonthFacts {
            period: p(period),
            today: d(2026, 10, 18),
            start_date: d(2025, 3, 10),
            completed,
            required,
            exception: None,
        }
    }

    #[test]
    fn defaults_to_one_without_rules() {
        assert_eq!(required_count(&[], p("2026-01")), 1);
    }

    #[test]
    fn latest_effective_rule_wins() {
        let rules = [
            RequirementRule { id: 1, effective_from: d(2025, 1, 1), required_count: 1 },
            RequirementRule { id: 2, effective_from: d(2026, 4, 1), required_count: 2 },
            RequirementRule { id: 3, effective_from: d(2026, 9, 15), required_count: 3 },
        ];
        assert_eq!(required_count(&rules, p("2024-12")), 1);
        assert_eq!(required_count(&rules, p("2026-03")), 1);
        assert_eq!(required_count(&rules, p("2026-04")), 2);
        // effective mid-month only counts from the following month
        assert_eq!(required_count(&rules, p("2026-09")), 2);
        assert_eq!(required_count(&rules, p("2026-10")), 3);
    }

    #[test]
    fn ties_go_to_newest_rule() {
        let rules = [
            RequirementRule { id: 7, effective_from: d(2026, 1, 1), required_count: 4 },
            RequirementRule { id: 3, effective_from: d(2026, 1, 1), required_count: 2 },
        ];
        assert_eq!(required_count(&rules, p("2026-02")), 4);
    }

    #[test]
    fn completion_counts() {
        assert_eq!(month_status(&facts("2026-05", 2, 2)), MonthStatus::Complete);
        assert_eq!(month_status(&facts("2026-05", 1, 2)), MonthStatus::Partial);
        assert_eq!(month_status(&facts("2026-05", 0, 1)), MonthStatus::Missing);
    }

    #[test]
    fn current_month_without_supervision_is_missing() {
        assert_eq!(month_status(&facts("2026-10", 0, 1)), MonthStatus::Missing);
    }

    #[test]
    fn future_month_is_not_due() {
        assert_eq!(month_status(&facts("2026-12", 0, 1)), MonthStatus::NotYetDue);
        // a supervision already held counts even for a future month
        assert_eq!(month_status(&facts("2026-12", 1, 1)), MonthStatus::Complete);
    }

    #[test]
    fn months_before_start_are_suppressed() {
        assert_eq!(month_status(&facts("2025-02", 0, 1)), MonthStatus::BeforeStart);
        // the start month itself is tracked
        assert_eq!(month_status(&facts("2025-03", 0, 1)), MonthStatus::Missing);
    }

    #[test]
    fn exception_overrides_everything() {
        let mut f = facts("2026-05", 0, 1);
        f.exception = Some(ExceptionType::SickLeave);
        assert_eq!(month_status(&f), MonthStatus::Exception);

        let mut f = facts("2026-05", 3, 1);
        f.exception = Some(ExceptionType::NotRequired);
        assert_eq!(month_status(&f), MonthStatus::Exception);
    }

    #[test]
    fn exception_type_labels() {
        assert_eq!(ExceptionType::AnnualLeave.as_ref(), "annual_leave");
        assert_eq!("sick_leave".parse::<ExceptionType>().unwrap(), ExceptionType::SickLeave);
        assert!("holiday".parse::<ExceptionType>().is_err());
    }

    #[test]
    fn month_status_wire_names() {
        assert_eq!(serde_json::to_string(&MonthStatus::NotYetDue).unwrap(), "\"not_yet_due\"");
        assert_eq!(MonthStatus::BeforeStart.to_string(), "before_start");
    }

    #[test]
    fn standing_follows_frequency() {
        let today = d(2026, 10, 18);
        assert_eq!(supervision_standing(None, 1, today), SupervisionStanding::Never);
        // monthly, last on 1 Sep: due 1 Oct, already passed
        assert_eq!(supervision_standing(Some(d(2026, 9, 1)), 1, today), SupervisionStanding::Overdue);
        // quarterly from the same date is fine until December
        assert_eq!(supervision_standing(Some(d(2026, 9, 1)), 3, today), SupervisionStanding::Ok);
        // due 24 Oct, inside the seven day window
        assert_eq!(supervision_standing(Some(d(2026, 9, 24)), 1, today), SupervisionStanding::DueSoon);
        // due today is not yet overdue
        assert_eq!(supervision_standing(Some(d(2026, 9, 18)), 1, today), SupervisionStanding::DueSoon);
        // zero frequency behaves as monthly
        assert_eq!(supervision_standing(Some(d(2026, 9, 1)), 0, today), SupervisionStanding::Overdue);
    }

    #[test]
    fn urgent_standings_sort_first() {
        let mut all = vec![
            SupervisionStanding::Ok,
            SupervisionStanding::DueSoon,
            SupervisionStanding::Never,
            SupervisionStanding::Overdue,
        ];
        all.sort();
        assert_eq!(all[0], SupervisionStanding::Overdue);
        assert_eq!(all[3], SupervisionStanding::Ok);
        assert_eq!(serde_json::to_string(&SupervisionStanding::DueSoon).unwrap(), "\"due_soon\"");
    }
}
