use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{ensure_exists, today},
    auth::auth::AuthUser,
    compliance::Period,
    error::{ApiError, ApiResult},
    model::{
        audit::AuditAction,
        role::Permission,
        rota::{RotaMonthlyHours, SHIFT_SELECT, Shift, ShiftType},
    },
    utils::{
        audit,
        db_utils::{build_update_from, execute_update},
    },
};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpsertShift {
    pub employee_id: u64,
    #[schema(example = "2026-10-20", format = "date", value_type = String)]
    pub date: NaiveDate,
    pub shift_type_id: u64,
    /// Omit to use the shift type's default hours.
    pub hours: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdateShift {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift_type_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

const UPDATABLE: &[&str] = &["shift_type_id", "hours", "notes"];

#[derive(Deserialize, Serialize, ToSchema)]
pub struct SetMonthlyHours {
    pub year: i32,
    #[schema(example = 10)]
    pub month: u32,
    #[schema(example = 160.0)]
    pub contracted_hours: f64,
}

#[derive(Deserialize, IntoParams)]
pub struct MonthQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct YearQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct RotaSummary {
    pub total_hours: f64,
    pub total_sleeps: i32,
    /// Hours worked minus the month's contracted hours, when those are set.
    pub over_under: Option<f64>,
    pub annual_leave_days: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RotaStaff {
    pub employee_id: u64,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    /// Keyed by `YYYY-MM-DD`.
    pub shifts: BTreeMap<String, Shift>,
    /// Days of approved leave within the month, `YYYY-MM-DD`.
    pub leave_dates: Vec<String>,
    pub summary: RotaSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RotaMonth {
    pub year: i32,
    pub month: u32,
    pub days_in_month: u32,
    pub contracted_hours: Option<f64>,
    pub staff: Vec<RotaStaff>,
    pub shift_types: Vec<ShiftType>,
}

#[derive(Debug, sqlx::FromRow)]
struct RotaEmployee {
    id: u64,
    first_name: String,
    last_name: String,
    role: String,
}

#[derive(Debug, sqlx::FromRow)]
struct ApprovedLeave {
    employee_id: u64,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

const SHIFT_TYPE_SELECT: &str = "SELECT id, code, name, default_hours, includes_sleep, display_color, sort_order, is_active FROM shift_types";

pub(crate) fn summarize(shifts: &[&Shift], leave_days: usize, contracted: Option<f64>) -> RotaSummary {
    let total_hours: f64 = shifts.iter().map(|s| s.effective_hours()).sum();
    RotaSummary {
        total_hours,
        total_sleeps: shifts.iter().filter(|s| s.includes_sleep).count() as i32,
        over_under: contracted.map(|c| total_hours - c),
        annual_leave_days: leave_days as i32,
    }
}

/// Dates of a leave booking that fall inside `period`.
pub(crate) fn leave_days_within(period: Period, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let from = start.max(period.first_day());
    let to = end.min(period.last_day());
    from.iter_days().take_while(|d| *d <= to).collect()
}

fn resolve_month(query: &MonthQuery) -> ApiResult<Period> {
    let now = today();
    Period::new(query.year.unwrap_or(now.year()), query.month.unwrap_or(now.month()))
        .ok_or_else(|| ApiError::bad_request("month must be between 1 and 12"))
}

async fn fetch_shift(pool: &MySqlPool, id: u64) -> ApiResult<Shift> {
    sqlx::query_as::<_, Shift>(&format!("{SHIFT_SELECT} WHERE s.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Shift"))
}

async fn active_shift_types(pool: &MySqlPool) -> Result<Vec<ShiftType>, sqlx::Error> {
    sqlx::query_as::<_, ShiftType>(&format!(
        "{SHIFT_TYPE_SELECT} WHERE is_active = 1 ORDER BY sort_order, code"
    ))
    .fetch_all(pool)
    .await
}

#[utoipa::path(
    get,
    path = "/api/rota/shift-types",
    responses((status = 200, description = "Active shift types in display order", body = Vec<ShiftType>)),
    tag = "Rota",
    security(("bearer_auth" = []))
)]
pub async fn list_shift_types(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(active_shift_types(pool.get_ref()).await?))
}

/// Rota Month
///
/// Every active employee with their shifts, approved leave and totals.
#[utoipa::path(
    get,
    path = "/api/rota/month",
    params(MonthQuery),
    responses(
        (status = 200, description = "Month grid", body = RotaMonth),
        (status = 400, description = "Invalid month")
    ),
    tag = "Rota",
    security(("bearer_auth" = []))
)]
pub async fn get_month(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MonthQuery>,
) -> ApiResult<HttpResponse> {
    let period = resolve_month(&query)?;
    let (first, last) = (period.first_day(), period.last_day());

    let contracted = sqlx::query_scalar::<_, f64>(
        "SELECT contracted_hours FROM rota_monthly_hours WHERE year = ? AND month = ?",
    )
    .bind(period.year())
    .bind(period.month() as i32)
    .fetch_optional(pool.get_ref())
    .await?;

    let employees = sqlx::query_as::<_, RotaEmployee>(
        "SELECT id, first_name, last_name, role FROM employees WHERE active = 1 ORDER BY last_name, first_name",
    )
    .fetch_all(pool.get_ref())
    .await?;

    let shifts = sqlx::query_as::<_, Shift>(&format!(
        "{SHIFT_SELECT} WHERE s.date BETWEEN ? AND ? ORDER BY s.employee_id, s.date"
    ))
    .bind(first)
    .bind(last)
    .fetch_all(pool.get_ref())
    .await?;

    let leave = sqlx::query_as::<_, ApprovedLeave>(
        r#"
        SELECT employee_id, start_date, end_date
        FROM leave_requests
        WHERE status = 'approved' AND start_date <= ? AND end_date >= ?
        "#,
    )
    .bind(last)
    .bind(first)
    .fetch_all(pool.get_ref())
    .await?;

    let mut shifts_by_employee: HashMap<u64, BTreeMap<String, Shift>> = HashMap::new();
    for shift in shifts {
        shifts_by_employee
            .entry(shift.employee_id)
            .or_default()
            .insert(shift.date.to_string(), shift);
    }

    let mut leave_by_employee: HashMap<u64, BTreeSet<NaiveDate>> = HashMap::new();
    for l in leave {
        leave_by_employee
            .entry(l.employee_id)
            .or_default()
            .extend(leave_days_within(period, l.start_date, l.end_date));
    }

    let staff = employees
        .into_iter()
        .map(|e| {
            let shifts = shifts_by_employee.remove(&e.id).unwrap_or_default();
            let leave_dates = leave_by_employee.remove(&e.id).unwrap_or_default();
            let summary = summarize(&shifts.values().collect::<Vec<_>>(), leave_dates.len(), contracted);
            RotaStaff {
                employee_id: e.id,
                first_name: e.first_name,
                last_name: e.last_name,
                role: e.role,
                shifts,
                leave_dates: leave_dates.iter().map(|d| d.to_string()).collect(),
                summary,
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(RotaMonth {
        year: period.year(),
        month: period.month(),
        days_in_month: period.days(),
        contracted_hours: contracted,
        staff,
        shift_types: active_shift_types(pool.get_ref()).await?,
    }))
}

/// Set Shift
///
/// One shift per employee per day; posting again replaces it.
#[utoipa::path(
    post,
    path = "/api/rota/shifts",
    request_body = UpsertShift,
    responses(
        (status = 200, description = "Shift saved", body = Shift),
        (status = 404, description = "Employee or shift type not found")
    ),
    tag = "Rota",
    security(("bearer_auth" = []))
)]
pub async fn upsert_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<UpsertShift>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::RotasEdit)?;
    if matches!(payload.hours, Some(h) if !(0.0..=24.0).contains(&h)) {
        return Err(ApiError::bad_request("hours must be between 0 and 24"));
    }
    ensure_exists(pool.get_ref(), "employees", payload.employee_id, "Employee").await?;
    ensure_exists(pool.get_ref(), "shift_types", payload.shift_type_id, "Shift type").await?;

    let id = sqlx::query(
        r#"
        INSERT INTO shifts (employee_id, date, shift_type_id, hours, notes)
        VALUES (?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            id = LAST_INSERT_ID(id),
            shift_type_id = VALUES(shift_type_id),
            hours = VALUES(hours),
            notes = VALUES(notes),
            updated_at = NOW()
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.date)
    .bind(payload.shift_type_id)
    .bind(payload.hours)
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    audit::record(
        pool.get_ref(),
        "shifts",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(fetch_shift(pool.get_ref(), id).await?))
}

#[utoipa::path(
    put,
    path = "/api/rota/shifts/{id}",
    params(("id" = u64, Path, description = "Shift ID")),
    request_body = UpdateShift,
    responses(
        (status = 200, description = "Shift updated", body = Shift),
        (status = 404, description = "Shift not found")
    ),
    tag = "Rota",
    security(("bearer_auth" = []))
)]
pub async fn update_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateShift>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::RotasEdit)?;
    let id = path.into_inner();
    if let Some(type_id) = body.shift_type_id {
        ensure_exists(pool.get_ref(), "shift_types", type_id, "Shift type").await?;
    }

    let before = fetch_shift(pool.get_ref(), id).await?;
    let update = build_update_from("shifts", &*body, UPDATABLE, id, true)?;
    execute_update(pool.get_ref(), update).await?;

    audit::record(
        pool.get_ref(),
        "shifts",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&*body).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(fetch_shift(pool.get_ref(), id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/rota/shifts/{id}",
    params(("id" = u64, Path, description = "Shift ID")),
    responses(
        (status = 204, description = "Shift removed"),
        (status = 404, description = "Shift not found")
    ),
    tag = "Rota",
    security(("bearer_auth" = []))
)]
pub async fn delete_shift(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::RotasEdit)?;
    let id = path.into_inner();
    let before = fetch_shift(pool.get_ref(), id).await?;

    sqlx::query("DELETE FROM shifts WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    audit::record(
        pool.get_ref(),
        "shifts",
        id,
        AuditAction::Delete,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/rota/monthly-hours",
    params(YearQuery),
    responses((status = 200, description = "Contracted hours per month", body = Vec<RotaMonthlyHours>)),
    tag = "Rota",
    security(("bearer_auth" = []))
)]
pub async fn list_monthly_hours(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<YearQuery>,
) -> ApiResult<HttpResponse> {
    let year = query.year.unwrap_or_else(|| today().year());
    let rows = sqlx::query_as::<_, RotaMonthlyHours>(
        "SELECT id, year, month, contracted_hours FROM rota_monthly_hours WHERE year = ? ORDER BY month",
    )
    .bind(year)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    put,
    path = "/api/rota/monthly-hours",
    request_body = SetMonthlyHours,
    responses(
        (status = 200, description = "Contracted hours saved", body = RotaMonthlyHours),
        (status = 400, description = "Invalid month or hours")
    ),
    tag = "Rota",
    security(("bearer_auth" = []))
)]
pub async fn set_monthly_hours(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SetMonthlyHours>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::RotasEdit)?;
    let period = Period::new(payload.year, payload.month)
        .ok_or_else(|| ApiError::bad_request("month must be between 1 and 12"))?;
    if payload.contracted_hours < 0.0 {
        return Err(ApiError::bad_request("contracted_hours cannot be negative"));
    }

    let id = sqlx::query(
        r#"
        INSERT INTO rota_monthly_hours (year, month, contracted_hours)
        VALUES (?, ?, ?)
        ON DUPLICATE KEY UPDATE id = LAST_INSERT_ID(id), contracted_hours = VALUES(contracted_hours)
        "#,
    )
    .bind(period.year())
    .bind(period.month() as i32)
    .bind(payload.contracted_hours)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    audit::record(
        pool.get_ref(),
        "rota_monthly_hours",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(RotaMonthlyHours {
        id,
        year: period.year(),
        month: period.month() as i32,
        contracted_hours: payload.contracted_hours,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn shift(day: u32, hours: Option<f64>, default_hours: f64, sleep: bool) -> Shift {
        Shift {
            id: day as u64,
            employee_id: 1,
            date: d(2026, 10, day),
            shift_type_id: 1,
            shift_code: if sleep { "SL".into() } else { "LD".into() },
            hours,
            default_hours,
            includes_sleep: sleep,
            notes: None,
        }
    }

    #[test]
    fn summary_totals_hours_sleeps_and_balance() {
        let shifts = [
            shift(1, None, 12.0, false),
            shift(2, Some(8.5), 12.0, false),
            shift(3, None, 10.0, true),
        ];
        let refs: Vec<&Shift> = shifts.iter().collect();

        let summary = summarize(&refs, 2, Some(40.0));
        assert_eq!(summary.total_hours, 30.5);
        assert_eq!(summary.total_sleeps, 1);
        assert_eq!(summary.over_under, Some(-9.5));
        assert_eq!(summary.annual_leave_days, 2);

        assert_eq!(summarize(&refs, 0, None).over_under, None);
        assert_eq!(summarize(&[], 0, Some(10.0)), RotaSummary {
            over_under: Some(-10.0),
            ..RotaSummary::default()
        });
    }

    #[test]
    fn leave_is_clamped_to_the_month() {
        let oct = Period::new(2026, 10).unwrap();
        let days = leave_days_within(oct, d(2026, 9, 28), d(2026, 10, 2));
        assert_eq!(days, [d(2026, 10, 1), d(2026, 10, 2)]);

        let days = leave_days_within(oct, d(2026, 10, 30), d(2026, 11, 4));
        assert_eq!(days, [d(2026, 10, 30), d(2026, 10, 31)]);

        assert!(leave_days_within(oct, d(2026, 11, 1), d(2026, 11, 3)).is_empty());
    }

    #[test]
    fn month_query_validation() {
        let q = MonthQuery { year: Some(2026), month: Some(13) };
        assert!(resolve_month(&q).is_err());
        let q = MonthQuery { year: Some(2026), month: Some(2) };
        assert_eq!(resolve_month(&q).unwrap().days(), 28);
    }
}
