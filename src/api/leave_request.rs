use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{ensure_exists, today},
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        audit::AuditAction,
        leave::{DEFAULT_ENTITLEMENT_DAYS, LEAVE_SELECT, LeaveEntitlement, LeaveRequest, LeaveStatus},
        role::Permission,
    },
    utils::{
        audit,
        db_utils::{BindFilters, FilterValue, Filters},
        pagination::PageParams,
    },
};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateLeaveRequest {
    pub employee_id: u64,
    #[schema(example = "2026-12-22", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-12-24", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    /// Working days taken; half days allowed.
    #[schema(example = 2.5)]
    pub total_days: f64,
    pub notes: Option<String>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdateLeaveStatus {
    pub status: LeaveStatus,
    pub notes: Option<String>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct SetLeaveEntitlement {
    pub employee_id: u64,
    #[schema(example = 2026)]
    pub year: i32,
    #[schema(example = 28.0)]
    pub total_days: f64,
    #[serde(default)]
    pub carried_over: f64,
    pub notes: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct LeaveQuery {
    pub employee_id: Option<u64>,
    /// `pending`, `approved`, `rejected` or `cancelled`
    pub status: Option<LeaveStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct BalanceQuery {
    /// Defaults to the current year.
    pub year: Option<i32>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveRequest>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 3)]
    pub total: i64,
}

#[derive(Debug, PartialEq, Serialize, ToSchema)]
pub struct LeaveBalance {
    pub employee_id: u64,
    pub year: i32,
    pub total_entitlement: f64,
    pub carried_over: f64,
    pub approved_days_taken: f64,
    pub pending_days: f64,
    pub remaining: f64,
}

impl LeaveBalance {
    /// `entitlement` is the stored `(total_days, carried_over)` for the year.
    pub(crate) fn compute(
        employee_id: u64,
        year: i32,
        entitlement: Option<(f64, f64)>,
        approved: f64,
        pending: f64,
    ) -> Self {
        let (total, carried) = entitlement.unwrap_or((DEFAULT_ENTITLEMENT_DAYS, 0.0));
        LeaveBalance {
            employee_id,
            year,
            total_entitlement: total,
            carried_over: carried,
            approved_days_taken: approved,
            pending_days: pending,
            remaining: total + carried - approved,
        }
    }
}

fn validate_request(payload: &CreateLeaveRequest) -> ApiResult<()> {
    if payload.end_date < payload.start_date {
        return Err(ApiError::bad_request("end_date cannot be before start_date"));
    }
    if payload.total_days <= 0.0 {
        return Err(ApiError::bad_request("total_days must be positive"));
    }
    Ok(())
}

/// Without the approve permission a user books leave only for their own
/// linked employee record.
fn ensure_may_request_for(auth: &AuthUser, employee_id: u64) -> ApiResult<()> {
    if auth.can(Permission::LeaveApprove) || auth.employee_id == Some(employee_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "You can only request leave for yourself".into(),
        ))
    }
}

fn check_transition(current: &str, next: LeaveStatus) -> ApiResult<LeaveStatus> {
    let current: LeaveStatus = current
        .parse()
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("unknown stored leave status '{current}'")))?;
    if current.is_terminal() {
        Err(ApiError::bad_request(format!("Leave request is already {current}")))
    } else if current.can_transition_to(next) {
        Ok(current)
    } else {
        Err(ApiError::bad_request(format!(
            "Cannot change leave from {current} to {next}"
        )))
    }
}

async fn fetch(pool: &MySqlPool, id: u64) -> ApiResult<LeaveRequest> {
    sqlx::query_as::<_, LeaveRequest>(&format!("{LEAVE_SELECT} WHERE l.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Leave request"))
}

#[utoipa::path(
    get,
    path = "/api/leave/requests",
    params(LeaveQuery),
    responses((status = 200, description = "Paginated leave list, latest start first", body = LeaveListResponse)),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn list_requests(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveQuery>,
) -> ApiResult<HttpResponse> {
    let page = PageParams {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve();

    let mut filters = Filters::new();
    if let Some(id) = query.employee_id {
        filters.add("l.employee_id = ?", [FilterValue::U64(id)]);
    }
    if let Some(status) = query.status {
        filters.add("l.status = ?", [FilterValue::Str(status.to_string())]);
    }
    let where_clause = filters.where_clause();

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM leave_requests l {where_clause}"
    ))
    .bind_filters(filters.values())
    .fetch_one(pool.get_ref())
    .await?;

    let data = sqlx::query_as::<_, LeaveRequest>(&format!(
        "{LEAVE_SELECT} {where_clause} ORDER BY l.start_date DESC, l.id DESC LIMIT ? OFFSET ?"
    ))
    .bind_filters(filters.values())
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(LeaveListResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/leave/requests/{id}",
    params(("id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 404, description = "Leave request not found")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn get_request(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(fetch(pool.get_ref(), path.into_inner()).await?))
}

#[utoipa::path(
    post,
    path = "/api/leave/requests",
    request_body = CreateLeaveRequest,
    responses(
        (status = 201, description = "Leave requested", body = LeaveRequest),
        (status = 400, description = "Invalid dates or days"),
        (status = 403, description = "Requesting for someone else")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn create_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeaveRequest>,
) -> ApiResult<HttpResponse> {
    validate_request(&payload)?;
    ensure_may_request_for(&auth, payload.employee_id)?;
    ensure_exists(pool.get_ref(), "employees", payload.employee_id, "Employee").await?;

    let id = sqlx::query(
        r#"
        INSERT INTO leave_requests (employee_id, start_date, end_date, total_days, status, requested_by, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.total_days)
    .bind(LeaveStatus::Pending.as_ref())
    .bind(auth.user_id)
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    info!(leave_id = id, employee_id = payload.employee_id, "Leave requested");
    audit::record(
        pool.get_ref(),
        "leave_requests",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    Ok(HttpResponse::Created().json(fetch(pool.get_ref(), id).await?))
}

/// Change Leave Status
///
/// `pending` moves to `approved` or `rejected`; `approved` moves to `cancelled`.
#[utoipa::path(
    put,
    path = "/api/leave/requests/{id}/status",
    params(("id" = u64, Path, description = "Leave request ID")),
    request_body = UpdateLeaveStatus,
    responses(
        (status = 200, description = "Status changed", body = LeaveRequest),
        (status = 400, description = "Transition not allowed"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Changed concurrently")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn update_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateLeaveStatus>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::LeaveApprove)?;
    let id = path.into_inner();
    let before = fetch(pool.get_ref(), id).await?;
    let current = check_transition(&before.status, payload.status)?;

    let decided = matches!(payload.status, LeaveStatus::Approved | LeaveStatus::Rejected);
    let result = sqlx::query(
        r#"
        UPDATE leave_requests
        SET status = ?,
            approved_by = IF(?, ?, approved_by),
            approved_at = IF(?, NOW(), approved_at),
            notes = COALESCE(?, notes),
            updated_at = NOW()
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(payload.status.as_ref())
    .bind(decided)
    .bind(auth.user_id)
    .bind(decided)
    .bind(&payload.notes)
    .bind(id)
    .bind(current.as_ref())
    .execute(pool.get_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict("Leave request was changed by someone else"));
    }

    info!(leave_id = id, from = %current, to = %payload.status, "Leave status changed");
    audit::record(
        pool.get_ref(),
        "leave_requests",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(fetch(pool.get_ref(), id).await?))
}

async fn load_balance(pool: &MySqlPool, employee_id: u64, year: i32) -> ApiResult<LeaveBalance> {
    let entitlement = sqlx::query_as::<_, (f64, f64)>(
        "SELECT total_days, carried_over FROM leave_entitlements WHERE employee_id = ? AND year = ?",
    )
    .bind(employee_id)
    .bind(year)
    .fetch_optional(pool)
    .await?;

    let (approved, pending) = sqlx::query_as::<_, (f64, f64)>(
        r#"
        SELECT
            CAST(COALESCE(SUM(CASE WHEN status = 'approved' THEN total_days END), 0) AS DOUBLE),
            CAST(COALESCE(SUM(CASE WHEN status = 'pending' THEN total_days END), 0) AS DOUBLE)
        FROM leave_requests
        WHERE employee_id = ? AND YEAR(start_date) = ?
        "#,
    )
    .bind(employee_id)
    .bind(year)
    .fetch_one(pool)
    .await?;

    Ok(LeaveBalance::compute(employee_id, year, entitlement, approved, pending))
}

#[utoipa::path(
    get,
    path = "/api/leave/balance/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID"), BalanceQuery),
    responses(
        (status = 200, description = "Entitlement and usage for the year", body = LeaveBalance),
        (status = 404, description = "Employee not found")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn get_balance(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    query: web::Query<BalanceQuery>,
) -> ApiResult<HttpResponse> {
    let employee_id = path.into_inner();
    ensure_exists(pool.get_ref(), "employees", employee_id, "Employee").await?;
    let year = query.year.unwrap_or_else(|| today().year());

    Ok(HttpResponse::Ok().json(load_balance(pool.get_ref(), employee_id, year).await?))
}

/// Set Entitlement
///
/// Creates or replaces the employee's allowance for the year and returns the
/// resulting balance.
#[utoipa::path(
    put,
    path = "/api/leave/entitlements",
    request_body = SetLeaveEntitlement,
    responses(
        (status = 200, description = "Entitlement saved", body = LeaveBalance),
        (status = 400, description = "Negative days"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn set_entitlement(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SetLeaveEntitlement>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::LeaveManageEntitlements)?;
    if payload.total_days < 0.0 || payload.carried_over < 0.0 {
        return Err(ApiError::bad_request("Days cannot be negative"));
    }
    ensure_exists(pool.get_ref(), "employees", payload.employee_id, "Employee").await?;

    let id = sqlx::query(
        r#"
        INSERT INTO leave_entitlements (employee_id, year, total_days, carried_over, notes)
        VALUES (?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            id = LAST_INSERT_ID(id),
            total_days = VALUES(total_days),
            carried_over = VALUES(carried_over),
            notes = VALUES(notes),
            updated_at = NOW()
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.year)
    .bind(payload.total_days)
    .bind(payload.carried_over)
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    audit::record(
        pool.get_ref(),
        "leave_entitlements",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    let balance = load_balance(pool.get_ref(), payload.employee_id, payload.year).await?;
    Ok(HttpResponse::Ok().json(balance))
}

/// Stored entitlement rows, for admin screens.
#[utoipa::path(
    get,
    path = "/api/leave/entitlements/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses((status = 200, description = "Entitlements by year", body = Vec<LeaveEntitlement>)),
    tag = "Leave",
    security(("bearer_auth" = []))
)]
pub async fn list_entitlements(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let rows = sqlx::query_as::<_, LeaveEntitlement>(
        "SELECT id, employee_id, year, total_days, carried_over, notes FROM leave_entitlements WHERE employee_id = ? ORDER BY year DESC",
    )
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn request(start: NaiveDate, end: NaiveDate, days: f64) -> CreateLeaveRequest {
        CreateLeaveRequest {
            employee_id: 7,
            start_date: start,
            end_date: end,
            total_days: days,
            notes: None,
        }
    }

    fn user(role: Role, employee_id: Option<u64>) -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "u@example.com".into(),
            role,
            employee_id,
        }
    }

    #[test]
    fn request_validation() {
        assert!(validate_request(&request(d(2026, 12, 22), d(2026, 12, 24), 3.0)).is_ok());
        assert!(validate_request(&request(d(2026, 12, 22), d(2026, 12, 22), 0.5)).is_ok());
        assert!(validate_request(&request(d(2026, 12, 24), d(2026, 12, 22), 3.0)).is_err());
        assert!(validate_request(&request(d(2026, 12, 22), d(2026, 12, 24), 0.0)).is_err());
    }

    #[test]
    fn staff_book_only_their_own_leave() {
        assert!(ensure_may_request_for(&user(Role::Staff, Some(7)), 7).is_ok());
        assert!(matches!(
            ensure_may_request_for(&user(Role::Staff, Some(7)), 8),
            Err(ApiError::Forbidden(_))
        ));
        assert!(ensure_may_request_for(&user(Role::Staff, None), 7).is_err());
        assert!(ensure_may_request_for(&user(Role::Manager, None), 8).is_ok());
    }

    #[test]
    fn terminal_requests_report_their_state() {
        match check_transition("cancelled", LeaveStatus::Approved) {
            Err(ApiError::BadRequest(msg)) => assert_eq!(msg, "Leave request is already cancelled"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn transitions_are_checked_against_stored_status() {
        assert_eq!(
            check_transition("pending", LeaveStatus::Approved).unwrap(),
            LeaveStatus::Pending
        );
        assert!(matches!(
            check_transition("rejected", LeaveStatus::Approved),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            check_transition("pending", LeaveStatus::Cancelled),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            check_transition("bogus", LeaveStatus::Approved),
            Err(ApiError::Internal(_))
        ));
    }

    #[test]
    fn balance_defaults_to_statutory_allowance() {
        let b = LeaveBalance::compute(7, 2026, None, 10.0, 2.0);
        assert_eq!(b.total_entitlement, 28.0);
        assert_eq!(b.remaining, 18.0);
        assert_eq!(b.pending_days, 2.0);

        let b = LeaveBalance::compute(7, 2026, Some((25.0, 3.5)), 5.0, 0.0);
        assert_eq!(b.remaining, 23.5);
    }
}
