use chrono::{NaiveDate, Utc};
use sqlx::MySqlPool;

use crate::error::{ApiError, ApiResult};

pub mod appraisal;
pub mod audit_log;
pub mod employee;
pub mod employee_status;
pub mod grid_view;
pub mod health;
pub mod leave_request;
pub mod notification;
pub mod onboarding;
pub mod reference;
pub mod role;
pub mod rota;
pub mod settings;
pub mod supervision;
pub mod supervision_exception;
pub mod supervision_requirement;
pub mod training_course;
pub mod training_record;
pub mod user;

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) fn require_text(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        Err(ApiError::bad_request(format!("{field} is required")))
    } else {
        Ok(())
    }
}

/// 404 unless a row with `id` exists in `table`.
pub(crate) async fn ensure_exists(
    pool: &MySqlPool,
    table: &'static str,
    id: u64,
    what: &str,
) -> ApiResult<()> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE id = ?");
    let count = sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .fetch_one(pool)
        .await?;

    if count == 0 {
        Err(ApiError::not_found(what))
    } else {
        Ok(())
    }
}
