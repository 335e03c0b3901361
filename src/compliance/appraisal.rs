use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use super::period::add_months;

/// Reviews created with a new employee: 3, 6, 9 and 12 months in.
pub const FIRST_YEAR_REVIEWS: i32 = 4;

/// Milestones appended by one "generate next" call.
pub const GENERATE_BATCH: i32 = 3;

/// Days before the due date at which a review shows as due soon.
pub const DUE_SOON_DAYS: i64 = 30;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MilestoneType {
    /// 3/6/9/12-month reviews in the first year.
    Quarterly,
    Annual,
    /// Entered by hand rather than from the schedule.
    AdHoc,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AppraisalStatus {
    Completed,
    Overdue,
    DueSoon,
    NotYetDue,
}

/// Months after the start date at which review `n` (1-based) falls due.
pub fn review_offset_months(review_number: i32) -> u32 {
    let n = review_number.max(1) as u32;
    if n <= FIRST_YEAR_REVIEWS as u32 {
        3 * n
    } else {
        12 * (n - 3)
    }
}

pub fn milestone_type(review_number: i32) -> MilestoneType {
    if review_number <= FIRST_YEAR_REVIEWS {
        MilestoneType::Quarterly
    } else {
        MilestoneType::Annual
    }
}

/// A milestone that should exist according to the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledReview {
    pub review_number: i32,
    pub milestone_type: MilestoneType,
    pub due_date: NaiveDate,
}

pub fn scheduled_review(start_date: NaiveDate, review_number: i32) -> ScheduledReview {
    ScheduledReview {
        review_number,
        milestone_type: milestone_type(review_number),
        due_date: add_months(start_date, review_offset_months(review_number)),
    }
}

/// Reviews created alongside a new employee.
pub fn first_year_schedule(start_date: NaiveDate) -> Vec<ScheduledReview> {
    (1..=FIRST_YEAR_REVIEWS)
        .map(|n| scheduled_review(start_date, n))
        .collect()
}

/// The next batch after the highest existing review number, skipping any
/// number already present.
pub fn next_reviews(start_date: NaiveDate, existing: &[i32]) -> Vec<ScheduledReview> {
    let highest = existing.iter().copied().max().unwrap_or(0);
    (highest + 1..=highest + GENERATE_BATCH)
        .filter(|n| !existing.contains(n))
        .map(|n| scheduled_review(start_date, n))
        .collect()
}

pub fn appraisal_status(
    due_date: NaiveDate,
    completed_date: Option<NaiveDate>,
    today: NaiveDate,
) -> AppraisalStatus {
    if completed_date.is_some() {
        return AppraisalStatus::Completed;
    }
    let days = (due_date - today).num_days();
    if days < 0 {
        AppraisalStatus::Overdue
    } else if days <= DUE_SOON_DAYS {
        AppraisalStatus::DueSoon
    } else {
        AppraisalStatus::NotYetDue
    }
}

pub fn days_until_due(
    due_date: NaiveDate,
    completed_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Option<i64> {
    match completed_date {
        Some(_) => None,
        None => Some((due_date - today).num_days()),
    }
}

/// Matrix row layout: the last `back` completed items (oldest first, padded
/// on the left) followed by the next `forward` pending items (padded on the
/// right). `completed` and `pending` must be sorted by due date ascending.
pub fn matrix_window<T: Clone>(
    completed: &[T],
    pending: &[T],
    back: usize,
    forward: usize,
) -> Vec<Option<T>> {
    let tail = &completed[completed.len().saturating_sub(back)..];
    let head = &pending[..pending.len().min(forward)];

    let mut cells = Vec::with_capacity(back + forward);
    cells.extend(std::iter::repeat_n(None, back - tail.len()));
    cells.extend(tail.iter().cloned().map(Some));
    cells.extend(head.iter().cloned().map(Some));
    cells.extend(std::iter::repeat_n(None, forward - head.len()));
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn offsets_are_quarterly_then_yearly() {
        let offsets: Vec<u32> = (1..=7).map(review_offset_months).collect();
        assert_eq!(offsets, [3, 6, 9, 12, 24, 36, 48]);
    }

    #[test]
    fn first_year_schedule_from_start_date() {
        let reviews = first_year_schedule(d(2026, 1, 31));
        let dates: Vec<NaiveDate> = reviews.iter().map(|r| r.due_date).collect();
        assert_eq!(
            dates,
            [d(2026, 4, 30), d(2026, 7, 31), d(2026, 10, 31), d(2027, 1, 31)]
        );
        assert!(reviews.iter().all(|r| r.milestone_type == MilestoneType::Quarterly));
    }

    #[test]
    fn generate_appends_after_highest() {
        let start = d(2024, 6, 1);
        let next = next_reviews(start, &[1, 2, 3, 4]);
        let numbers: Vec<i32> = next.iter().map(|r| r.review_number).collect();
        assert_eq!(numbers, [5, 6, 7]);
        assert_eq!(next[0].due_date, d(2026, 6, 1));
        assert_eq!(next[0].milestone_type, MilestoneType::Annual);
    }

    #[test]
    fn generate_for_employee_without_reviews_starts_at_one() {
        let next = next_reviews(d(2026, 1, 1), &[]);
        let numbers: Vec<i32> = next.iter().map(|r| r.review_number).collect();
        assert_eq!(numbers, [1, 2, 3]);
    }

    #[test]
    fn status_thresholds() {
        let today = d(2026, 10, 18);
        assert_eq!(
            appraisal_status(d(2026, 1, 1), Some(d(2026, 1, 2)), today),
            AppraisalStatus::Completed
        );
        assert_eq!(appraisal_status(d(2026, 10, 17), None, today), AppraisalStatus::Overdue);
        assert_eq!(appraisal_status(today, None, today), AppraisalStatus::DueSoon);
        assert_eq!(appraisal_status(d(2026, 11, 17), None, today), AppraisalStatus::DueSoon);
        assert_eq!(appraisal_status(d(2026, 11, 18), None, today), AppraisalStatus::NotYetDue);
    }

    #[test]
    fn days_until_due_only_for_open_reviews() {
        let today = d(2026, 10, 18);
        assert_eq!(days_until_due(d(2026, 10, 28), None, today), Some(10));
        assert_eq!(days_until_due(d(2026, 10, 28), Some(today), today), None);
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_string(&AppraisalStatus::DueSoon).unwrap(), "\"due_soon\"");
        assert_eq!(AppraisalStatus::NotYetDue.to_string(), "not_yet_due");
        assert_eq!("overdue".parse::<AppraisalStatus>().unwrap(), AppraisalStatus::Overdue);
        assert_eq!(AppraisalStatus::Completed.as_ref(), "completed");
    }

    #[test]
    fn matrix_window_pads_both_sides() {
        let cells = matrix_window(&[1], &[10, 11, 12], 2, 2);
        assert_eq!(cells, [None, Some(1), Some(10), Some(11)]);

        let cells = matrix_window(&[1, 2, 3], &[], 2, 2);
        assert_eq!(cells, [Some(2), Some(3), None, None]);

        let cells: Vec<Option<i32>> = matrix_window(&[], &[], 1, 1);
        assert_eq!(cells, [None, None]);
    }
}
