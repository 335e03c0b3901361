use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{ensure_exists, today},
    auth::auth::AuthUser,
    compliance::{
        Period,
        supervision::{
            ExceptionType, MonthFacts, MonthStatus, RequirementRule, SupervisionStanding, month_status,
            required_count, supervision_standing,
        },
    },
    error::{ApiError, ApiResult},
    model::{
        audit::AuditAction,
        role::Permission,
        supervision::{SUPERVISION_SELECT, Supervision},
    },
    utils::{
        audit,
        db_utils::{BindFilters, FilterValue, Filters, build_update_sql, execute_update},
        settings_cache,
    },
};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateSupervision {
    pub employee_id: u64,
    pub conducted_by_id: Option<u64>,
    #[schema(example = "2026-10-02", format = "date", value_type = String)]
    pub supervision_date: NaiveDate,
    pub notes: Option<String>,
    /// Defaults to `true`; `false` records a planned supervision.
    pub is_completed: Option<bool>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdateSupervision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conducted_by_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(format = "date", value_type = Option<String>)]
    pub supervision_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
}

const UPDATABLE: &[&str] = &[
    "conducted_by_id",
    "supervision_date",
    "period",
    "notes",
    "is_completed",
];

#[derive(Deserialize, IntoParams)]
pub struct SupervisionQuery {
    pub employee_id: Option<u64>,
    pub supervisor_id: Option<u64>,
    /// `YYYY-MM`
    pub period: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct MatrixQuery {
    pub months_back: Option<u32>,
    pub months_forward: Option<u32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatrixCell {
    #[schema(value_type = String, example = "2026-10")]
    pub period: Period,
    pub status: MonthStatus,
    pub exception_type: Option<ExceptionType>,
    pub completed: i32,
    pub planned: i32,
    pub required: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatrixRow {
    pub employee_id: u64,
    pub employee_name: String,
    pub role: String,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    pub cells: Vec<MatrixCell>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SupervisionMatrix {
    #[schema(value_type = Vec<String>)]
    pub periods: Vec<Period>,
    pub rows: Vec<MatrixRow>,
}

/// Each active employee's standing against their supervision frequency.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SupervisionStatusRow {
    pub employee_id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub department: Option<String>,
    pub reports_to: Option<u64>,
    pub supervisor_name: Option<String>,
    pub supervision_frequency: i32,
    #[schema(value_type = Option<String>, format = "date")]
    pub last_supervision_date: Option<NaiveDate>,
    pub days_since_last_supervision: Option<i64>,
    pub status: SupervisionStanding,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    pub employee_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SupervisionSummary {
    pub total_employees: usize,
    pub never_supervised: usize,
    pub ok: usize,
    pub due_soon: usize,
    pub overdue: usize,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct StandingEmployee {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub department: Option<String>,
    pub reports_to: Option<u64>,
    pub supervisor_name: Option<String>,
    pub supervision_frequency: i32,
    pub start_date: NaiveDate,
    pub status_name: Option<String>,
    pub last_supervision_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct MatrixEmployee {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct PeriodCount {
    employee_id: u64,
    period: String,
    is_completed: bool,
    total: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ExceptionRow {
    employee_id: u64,
    period: String,
    exception_type: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct RequirementRow {
    id: u64,
    employee_id: u64,
    effective_from: NaiveDate,
    required_count: i32,
}

/// Per-employee inputs gathered for the matrix.
#[derive(Debug, Default)]
pub(crate) struct EmployeeMonths {
    pub completed: HashMap<Period, i32>,
    pub planned: HashMap<Period, i32>,
    pub exceptions: HashMap<Period, ExceptionType>,
    pub rules: Vec<RequirementRule>,
}

pub(crate) fn parse_period(value: &str) -> ApiResult<Period> {
    value
        .parse::<Period>()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

pub(crate) fn build_row(
    employee: &MatrixEmployee,
    months: &EmployeeMonths,
    periods: &[Period],
    today: NaiveDate,
) -> MatrixRow {
    let cells = periods
        .iter()
        .map(|&period| {
            let completed = months.completed.get(&period).copied().unwrap_or(0);
            let exception = months.exceptions.get(&period).copied();
            let required = required_count(&months.rules, period);
            let status = month_status(&MonthFacts {
                period,
                today,
                start_date: employee.start_date,
                completed,
                required,
                exception,
            });
            MatrixCell {
                period,
                status,
                exception_type: exception,
                completed,
                planned: months.planned.get(&period).copied().unwrap_or(0),
                required,
            }
        })
        .collect();

    MatrixRow {
        employee_id: employee.id,
        employee_name: format!("{} {}", employee.first_name, employee.last_name),
        role: employee.role.clone(),
        start_date: employee.start_date,
        cells,
    }
}

/// Classify each employee and order the result most urgent first.
pub(crate) fn standing_rows(employees: Vec<StandingEmployee>, today: NaiveDate) -> Vec<SupervisionStatusRow> {
    let mut rows: Vec<SupervisionStatusRow> = employees
        .into_iter()
        .map(|e| SupervisionStatusRow {
            status: supervision_standing(e.last_supervision_date, e.supervision_frequency, today),
            days_since_last_supervision: e.last_supervision_date.map(|d| (today - d).num_days()),
            employee_id: e.id,
            first_name: e.first_name,
            last_name: e.last_name,
            email: e.email,
            role: e.role,
            department: e.department,
            reports_to: e.reports_to,
            supervisor_name: e.supervisor_name,
            supervision_frequency: e.supervision_frequency,
            last_supervision_date: e.last_supervision_date,
            start_date: e.start_date,
            employee_status: e.status_name,
        })
        .collect();
    rows.sort_by(|a, b| {
        a.status
            .cmp(&b.status)
            .then_with(|| a.last_name.cmp(&b.last_name))
            .then_with(|| a.first_name.cmp(&b.first_name))
    });
    rows
}

pub(crate) fn summarize(rows: &[SupervisionStatusRow]) -> SupervisionSummary {
    rows.iter().fold(
        SupervisionSummary {
            total_employees: rows.len(),
            ..Default::default()
        },
        |mut acc, row| {
            match row.status {
                SupervisionStanding::Never => acc.never_supervised += 1,
                SupervisionStanding::Ok => acc.ok += 1,
                SupervisionStanding::DueSoon => acc.due_soon += 1,
                SupervisionStanding::Overdue => acc.overdue += 1,
            }
            acc
        },
    )
}

async fn fetch_standings(pool: &MySqlPool) -> ApiResult<Vec<SupervisionStatusRow>> {
    let employees = sqlx::query_as::<_, StandingEmployee>(
        r#"
        SELECT
            e.id, e.first_name, e.last_name, e.email, e.role, e.department,
            e.reports_to, CONCAT(m.first_name, ' ', m.last_name) AS supervisor_name,
            e.supervision_frequency, e.start_date, es.name AS status_name,
            (SELECT MAX(s.supervision_date) FROM supervision_records s
             WHERE s.employee_id = e.id AND s.is_completed = 1) AS last_supervision_date
        FROM employees e
        LEFT JOIN employees m ON m.id = e.reports_to
        LEFT JOIN employee_statuses es ON es.id = e.status_id
        WHERE e.active = 1
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(standing_rows(employees, today()))
}

async fn fetch(pool: &MySqlPool, id: u64) -> ApiResult<Supervision> {
    sqlx::query_as::<_, Supervision>(&format!("{SUPERVISION_SELECT} WHERE s.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Supervision"))
}

#[utoipa::path(
    get,
    path = "/api/supervisions",
    params(SupervisionQuery),
    responses(
        (status = 200, description = "Supervisions, newest first", body = Vec<Supervision>),
        (status = 400, description = "Malformed period")
    ),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn list_supervisions(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<SupervisionQuery>,
) -> ApiResult<HttpResponse> {
    let mut filters = Filters::new();
    if let Some(id) = query.employee_id {
        filters.add("s.employee_id = ?", [FilterValue::U64(id)]);
    }
    if let Some(id) = query.supervisor_id {
        filters.add("s.conducted_by_id = ?", [FilterValue::U64(id)]);
    }
    if let Some(period) = &query.period {
        let period = parse_period(period)?;
        filters.add("s.period = ?", [FilterValue::Str(period.to_string())]);
    }

    let sql = format!(
        "{SUPERVISION_SELECT} {} ORDER BY s.supervision_date DESC, s.id DESC",
        filters.where_clause()
    );
    let rows = sqlx::query_as::<_, Supervision>(&sql)
        .bind_filters(filters.values())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    post,
    path = "/api/supervisions",
    request_body = CreateSupervision,
    responses(
        (status = 201, description = "Supervision recorded", body = Supervision),
        (status = 404, description = "Employee not found")
    ),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn create_supervision(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateSupervision>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SupervisionsCreate)?;
    ensure_exists(pool.get_ref(), "employees", payload.employee_id, "Employee").await?;
    if let Some(conductor) = payload.conducted_by_id {
        ensure_exists(pool.get_ref(), "employees", conductor, "Supervisor").await?;
    }

    let period = Period::containing(payload.supervision_date);

    let id = sqlx::query(
        r#"
        INSERT INTO supervision_records
            (employee_id, conducted_by_id, supervision_date, period, notes, is_completed)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.conducted_by_id)
    .bind(payload.supervision_date)
    .bind(period.to_string())
    .bind(&payload.notes)
    .bind(payload.is_completed.unwrap_or(true))
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    audit::record(
        pool.get_ref(),
        "supervision_records",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    Ok(HttpResponse::Created().json(fetch(pool.get_ref(), id).await?))
}

/// Update Supervision
///
/// Moving the date moves the supervision to the matching period.
#[utoipa::path(
    put,
    path = "/api/supervisions/{id}",
    params(("id" = u64, Path, description = "Supervision ID")),
    request_body = UpdateSupervision,
    responses(
        (status = 200, description = "Supervision updated", body = Supervision),
        (status = 404, description = "Supervision not found")
    ),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn update_supervision(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateSupervision>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SupervisionsManage)?;
    let id = path.into_inner();
    let before = fetch(pool.get_ref(), id).await?;

    let mut patch = serde_json::to_value(&*body).map_err(|e| ApiError::Internal(e.into()))?;
    if let (Some(date), Some(obj)) = (body.supervision_date, patch.as_object_mut()) {
        obj.insert("period".into(), Period::containing(date).to_string().into());
    }
    let update = build_update_sql("supervision_records", &patch, UPDATABLE, "id", id, true)?;
    execute_update(pool.get_ref(), update).await?;

    audit::record(
        pool.get_ref(),
        "supervision_records",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        Some(patch),
    )
    .await;

    Ok(HttpResponse::Ok().json(fetch(pool.get_ref(), id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/supervisions/{id}",
    params(("id" = u64, Path, description = "Supervision ID")),
    responses(
        (status = 204, description = "Supervision deleted"),
        (status = 404, description = "Supervision not found")
    ),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn delete_supervision(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SupervisionsManage)?;
    let id = path.into_inner();
    let before = fetch(pool.get_ref(), id).await?;

    sqlx::query("DELETE FROM supervision_records WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    audit::record(
        pool.get_ref(),
        "supervision_records",
        id,
        AuditAction::Delete,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

/// Supervision matrix
///
/// One row per active employee, one cell per month around the current one.
#[utoipa::path(
    get,
    path = "/api/supervisions/matrix",
    params(MatrixQuery),
    responses((status = 200, description = "Monthly compliance per employee", body = SupervisionMatrix)),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn supervision_matrix(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MatrixQuery>,
) -> ApiResult<HttpResponse> {
    let settings = settings_cache::get(pool.get_ref()).await?;
    let back = query
        .months_back
        .unwrap_or(settings.supervision_months_back.max(0) as u32);
    let forward = query
        .months_forward
        .unwrap_or(settings.supervision_months_forward.max(0) as u32);
    if back > 36 || forward > 36 {
        return Err(ApiError::bad_request("Window cannot exceed 36 months either way"));
    }

    let today = today();
    let periods = Period::containing(today).window(back, forward);
    let (first, last) = match (periods.first(), periods.last()) {
        (Some(first), Some(last)) => (first.to_string(), last.to_string()),
        _ => return Ok(HttpResponse::Ok().json(SupervisionMatrix { periods, rows: Vec::new() })),
    };

    let employees = sqlx::query_as::<_, MatrixEmployee>(
        "SELECT id, first_name, last_name, role, start_date FROM employees WHERE active = 1 ORDER BY last_name, first_name",
    )
    .fetch_all(pool.get_ref())
    .await?;

    let counts = sqlx::query_as::<_, PeriodCount>(
        r#"
        SELECT employee_id, period, is_completed, COUNT(*) AS total
        FROM supervision_records
        WHERE period BETWEEN ? AND ?
        GROUP BY employee_id, period, is_completed
        "#,
    )
    .bind(&first)
    .bind(&last)
    .fetch_all(pool.get_ref())
    .await?;

    let exceptions = sqlx::query_as::<_, ExceptionRow>(
        "SELECT employee_id, period, exception_type FROM supervision_exceptions WHERE period BETWEEN ? AND ?",
    )
    .bind(&first)
    .bind(&last)
    .fetch_all(pool.get_ref())
    .await?;

    let requirements = sqlx::query_as::<_, RequirementRow>(
        "SELECT id, employee_id, effective_from, required_count FROM supervision_requirements",
    )
    .fetch_all(pool.get_ref())
    .await?;

    let mut months: HashMap<u64, EmployeeMonths> = HashMap::new();
    for c in counts {
        let Ok(period) = c.period.parse::<Period>() else { continue };
        let entry = months.entry(c.employee_id).or_default();
        let bucket = if c.is_completed { &mut entry.completed } else { &mut entry.planned };
        *bucket.entry(period).or_insert(0) += c.total as i32;
    }
    for e in exceptions {
        if let (Ok(period), Ok(kind)) = (e.period.parse::<Period>(), e.exception_type.parse::<ExceptionType>()) {
            months.entry(e.employee_id).or_default().exceptions.insert(period, kind);
        }
    }
    for r in requirements {
        months.entry(r.employee_id).or_default().rules.push(RequirementRule {
            id: r.id,
            effective_from: r.effective_from,
            required_count: r.required_count,
        });
    }

    let empty = EmployeeMonths::default();
    let rows = employees
        .iter()
        .map(|e| build_row(e, months.get(&e.id).unwrap_or(&empty), &periods, today))
        .collect();

    Ok(HttpResponse::Ok().json(SupervisionMatrix { periods, rows }))
}

#[utoipa::path(
    get,
    path = "/api/supervisions/status",
    responses((status = 200, description = "Standing of every active employee, most urgent first", body = Vec<SupervisionStatusRow>)),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn supervision_status(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let rows = fetch_standings(pool.get_ref()).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/supervisions/summary",
    responses((status = 200, description = "Counts per supervision standing", body = SupervisionSummary)),
    tag = "Supervision",
    security(("bearer_auth" = []))
)]
pub async fn supervision_summary(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let rows = fetch_standings(pool.get_ref()).await?;
    Ok(HttpResponse::Ok().json(summarize(&rows)))
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

    fn employee(start: NaiveDate) -> MatrixEmployee {
        MatrixEmployee {
            id: 5,
            first_name: "Ada".into(),
            last_name: "Jones".into(),
            role: "Cook".into(),
            start_date: start,
        }
    }

    #[test]
    fn row_covers_every_period_in_order() {
        let today = d(2026, 10, 18);
        let periods = Period::containing(today).window(3, 1);
        let mut months = EmployeeMonths::default();
        months.completed.insert(p("2026-08"), 1);
        months.planned.insert(p("2026-11"), 1);
        months.exceptions.insert(p("2026-09"), ExceptionType::AnnualLeave);

        let row = build_row(&employee(d(2026, 8, 3)), &months, &periods, today);
        let statuses: Vec<MonthStatus> = row.cells.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            [
                MonthStatus::BeforeStart,
                MonthStatus::Complete,
                MonthStatus::Exception,
                MonthStatus::Missing,
                MonthStatus::NotYetDue,
            ]
        );
        assert_eq!(row.cells[2].exception_type, Some(ExceptionType::AnnualLeave));
        // planned supervisions are reported but never satisfy the month
        assert_eq!(row.cells[4].planned, 1);
        assert_eq!(row.cells[4].completed, 0);
        assert_eq!(row.employee_name, "Ada Jones");
    }

    #[test]
    fn requirement_changes_apply_per_month() {
        let today = d(2026, 10, 18);
        let periods = [p("2026-05"), p("2026-06")];
        let mut months = EmployeeMonths::default();
        months.completed.insert(p("2026-05"), 1);
        months.completed.insert(p("2026-06"), 1);
        months.rules.push(RequirementRule { id: 1, effective_from: d(2026, 6, 1), required_count: 2 });

        let row = build_row(&employee(d(2020, 1, 1)), &months, &periods, today);
        assert_eq!(row.cells[0].status, MonthStatus::Complete);
        assert_eq!(row.cells[0].required, 1);
        assert_eq!(row.cells[1].status, MonthStatus::Partial);
        assert_eq!(row.cells[1].required, 2);
    }

    #[test]
    fn malformed_period_is_bad_request() {
        assert!(matches!(parse_period("2026-13"), Err(ApiError::BadRequest(_))));
        assert_eq!(parse_period("2026-02").unwrap(), p("2026-02"));
    }

    fn standing_employee(id: u64, last_name: &str, last: Option<NaiveDate>) -> StandingEmployee {
        StandingEmployee {
            id,
            first_name: "Sam".into(),
            last_name: last_name.into(),
            email: format!("{last_name}@example.com"),
            role: "Residential Support Worker".into(),
            department: None,
            reports_to: Some(1),
            supervisor_name: Some("Ruth Manager".into()),
            supervision_frequency: 1,
            start_date: d(2025, 1, 6),
            status_name: None,
            last_supervision_date: last,
        }
    }

    #[test]
    fn standings_sort_urgent_first_then_by_name() {
        let today = d(2026, 10, 18);
        let rows = standing_rows(
            vec![
                standing_employee(1, "Young", Some(d(2026, 10, 1))),
                standing_employee(2, "Brown", None),
                standing_employee(3, "Clark", Some(d(2026, 8, 2))),
                standing_employee(4, "Adams", Some(d(2026, 10, 1))),
                standing_employee(5, "Evans", Some(d(2026, 9, 20))),
            ],
            today,
        );
        let order: Vec<&str> = rows.iter().map(|r| r.last_name.as_str()).collect();
        assert_eq!(order, ["Clark", "Brown", "Evans", "Adams", "Young"]);
        assert_eq!(rows[0].days_since_last_supervision, Some(77));
        assert_eq!(rows[1].days_since_last_supervision, None);

        let summary = summarize(&rows);
        assert_eq!(
            summary,
            SupervisionSummary {
                total_employees: 5,
                never_supervised: 1,
                ok: 2,
                due_soon: 1,
                overdue: 1,
            }
        );
    }
}
