use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::require_text,
    auth::auth::AuthUser,
    compliance::appraisal::first_year_schedule,
    error::{ApiError, ApiResult},
    model::{
        audit::AuditAction,
        employee::{DEFAULT_ROLE, EMPLOYEE_SELECT, Employee},
        role::Permission,
    },
    utils::{
        audit,
        db_utils::{BindFilters, FilterValue, Filters, build_update_from, execute_update},
        pagination::PageParams,
    },
};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateEmployee {
    #[schema(example = "jane.doe@example.com", format = "email")]
    pub email: String,
    #[schema(example = "Jane")]
    pub first_name: String,
    #[schema(example = "Doe")]
    pub last_name: String,
    #[schema(example = "Oak House")]
    pub department: Option<String>,
    /// Job title; defaults to Residential Support Worker.
    pub role: Option<String>,
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    pub status_id: Option<u64>,
    pub notes: Option<String>,
    pub reports_to: Option<u64>,
    #[schema(example = 1)]
    pub supervision_frequency: Option<i32>,
    #[schema(example = 3)]
    pub appraisal_frequency_months: Option<i32>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdateEmployee {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "2026-01-05", format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reports_to: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervision_frequency: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appraisal_frequency_months: Option<i32>,
}

const UPDATABLE: &[&str] = &[
    "email",
    "first_name",
    "last_name",
    "department",
    "role",
    "start_date",
    "active",
    "status_id",
    "notes",
    "reports_to",
    "supervision_frequency",
    "appraisal_frequency_months",
];

#[derive(Debug, Deserialize, IntoParams)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Include deactivated employees
    pub include_inactive: Option<bool>,
    pub department: Option<String>,
    pub role: Option<String>,
    pub status_id: Option<u64>,
    /// Matches first name, last name or email
    pub search: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeListResponse {
    pub data: Vec<Employee>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 20)]
    pub per_page: u32,
    #[schema(example = 42)]
    pub total: i64,
}

fn normalize_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ApiError::bad_request("A valid email address is required")),
    }
}

fn validate_frequency(field: &str, value: Option<i32>) -> ApiResult<()> {
    match value {
        Some(v) if v < 1 => Err(ApiError::bad_request(format!("{field} must be at least 1"))),
        _ => Ok(()),
    }
}

pub(crate) async fn fetch_employee(pool: &MySqlPool, id: u64) -> ApiResult<Employee> {
    let sql = format!("{EMPLOYEE_SELECT} WHERE e.id = ?");
    sqlx::query_as::<_, Employee>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee"))
}

/// Create Employee
///
/// Also seeds a pending onboarding record for every active checklist item
/// and the four first-year appraisal reviews, in one transaction.
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = Employee),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already in use")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesManage)?;

    let email = normalize_email(&payload.email)?;
    require_text("first_name", &payload.first_name)?;
    require_text("last_name", &payload.last_name)?;
    validate_frequency("supervision_frequency", payload.supervision_frequency)?;
    validate_frequency("appraisal_frequency_months", payload.appraisal_frequency_months)?;

    let role = payload
        .role
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_ROLE);

    let mut tx = pool.begin().await?;

    let employee_id = sqlx::query(
        r#"
        INSERT INTO employees
            (email, first_name, last_name, department, role, start_date, status_id,
             notes, reports_to, supervision_frequency, appraisal_frequency_months)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&email)
    .bind(payload.first_name.trim())
    .bind(payload.last_name.trim())
    .bind(&payload.department)
    .bind(role)
    .bind(payload.start_date)
    .bind(payload.status_id)
    .bind(&payload.notes)
    .bind(payload.reports_to)
    .bind(payload.supervision_frequency.unwrap_or(1))
    .bind(payload.appraisal_frequency_months.unwrap_or(3))
    .execute(&mut *tx)
    .await?
    .last_insert_id();

    let seeded = sqlx::query(
        r#"
        INSERT INTO onboarding_records (employee_id, item_id, status, recorded_by)
        SELECT ?, id, 'pending', ? FROM onboarding_items WHERE active = 1
        "#,
    )
    .bind(employee_id)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    for review in first_year_schedule(payload.start_date) {
        sqlx::query(
            r#"
            INSERT INTO appraisal_milestones (employee_id, review_number, milestone_type, due_date)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(employee_id)
        .bind(review.review_number)
        .bind(review.milestone_type.as_ref())
        .bind(review.due_date)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(employee_id, onboarding_items = seeded, "Employee created");
    audit::record(
        pool.get_ref(),
        "employees",
        employee_id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    let employee = fetch_employee(pool.get_ref(), employee_id).await?;
    Ok(HttpResponse::Created().json(employee))
}

#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse)
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> ApiResult<HttpResponse> {
    let page = PageParams {
        page: query.page,
        per_page: query.per_page,
    }
    .resolve();

    let mut filters = Filters::new();
    if !query.include_inactive.unwrap_or(false) {
        filters.add_raw("e.active = 1");
    }
    if let Some(department) = &query.department {
        filters.add("e.department = ?", [FilterValue::Str(department.clone())]);
    }
    if let Some(role) = &query.role {
        filters.add("e.role = ?", [FilterValue::Str(role.clone())]);
    }
    if let Some(status_id) = query.status_id {
        filters.add("e.status_id = ?", [FilterValue::U64(status_id)]);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let like = format!("%{search}%");
        filters.add(
            "(e.first_name LIKE ? OR e.last_name LIKE ? OR e.email LIKE ?)",
            [
                FilterValue::Str(like.clone()),
                FilterValue::Str(like.clone()),
                FilterValue::Str(like),
            ],
        );
    }
    let where_clause = filters.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM employees e {where_clause}");
    debug!(sql = %count_sql, bindings = ?filters.values(), "Counting employees");
    let total = sqlx::query_scalar::<_, i64>(&count_sql)
        .bind_filters(filters.values())
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "{EMPLOYEE_SELECT} {where_clause} ORDER BY e.last_name, e.first_name LIMIT ? OFFSET ?"
    );
    let employees = sqlx::query_as::<_, Employee>(&data_sql)
        .bind_filters(filters.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        data: employees,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

/// Distinct job roles among active employees.
#[utoipa::path(
    get,
    path = "/api/employees/roles",
    responses((status = 200, description = "Role names", body = Vec<String>)),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_roles(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    let roles = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT role FROM employees WHERE active = 1 ORDER BY role",
    )
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(roles))
}

#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Employee found", body = Employee),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let employee = fetch_employee(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(employee))
}

/// Update Employee (partial)
#[utoipa::path(
    put,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = Employee),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateEmployee>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesManage)?;
    let employee_id = path.into_inner();
    let mut patch = body.into_inner();

    if let Some(email) = &patch.email {
        patch.email = Some(normalize_email(email)?);
    }
    if let Some(name) = &patch.first_name {
        require_text("first_name", name)?;
    }
    if let Some(name) = &patch.last_name {
        require_text("last_name", name)?;
    }
    if patch.reports_to == Some(employee_id) {
        return Err(ApiError::bad_request("An employee cannot report to themselves"));
    }
    validate_frequency("supervision_frequency", patch.supervision_frequency)?;
    validate_frequency("appraisal_frequency_months", patch.appraisal_frequency_months)?;

    let before = fetch_employee(pool.get_ref(), employee_id).await?;

    let update = build_update_from("employees", &patch, UPDATABLE, employee_id, true)?;
    execute_update(pool.get_ref(), update).await?;

    let after = fetch_employee(pool.get_ref(), employee_id).await?;
    audit::record(
        pool.get_ref(),
        "employees",
        employee_id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&patch).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(after))
}

/// Deactivate Employee
///
/// Soft delete: the record and its history are kept with `active = false`.
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 204, description = "Employee deactivated"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesManage)?;
    let employee_id = path.into_inner();

    let result = sqlx::query("UPDATE employees SET active = 0, updated_at = NOW() WHERE id = ?")
        .bind(employee_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Employee"));
    }

    audit::record(
        pool.get_ref(),
        "employees",
        employee_id,
        AuditAction::Delete,
        Some(auth.user_id),
        None,
        Some(json!({ "active": false })),
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

/// Child tables cleared by a purge, in dependency order. The employee row
/// itself goes last.
pub const PURGE_PLAN: &[(&str, &str)] = &[
    ("notification_log", "employee_id"),
    ("training_records", "employee_id"),
    ("onboarding_records", "employee_id"),
    ("employee_references", "employee_id"),
    ("supervision_records", "employee_id"),
    ("supervision_exceptions", "employee_id"),
    ("supervision_requirements", "employee_id"),
    ("appraisal_milestones", "employee_id"),
    ("shifts", "employee_id"),
    ("leave_requests", "employee_id"),
    ("leave_entitlements", "employee_id"),
    ("employees", "id"),
];

/// Purge Employee
///
/// Hard delete of the employee and every dependent row. Admin only.
#[utoipa::path(
    delete,
    path = "/api/employees/{employee_id}/purge",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Rows removed per table", body = Object, example = json!({
            "employee_id": 12, "deleted": { "training_records": 8, "employees": 1 }
        })),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Employee not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn purge_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require_admin()?;
    let employee_id = path.into_inner();

    let before = fetch_employee(pool.get_ref(), employee_id).await?;

    let mut tx = pool.begin().await?;
    let mut deleted = serde_json::Map::new();
    for (table, column) in PURGE_PLAN {
        let sql = format!("DELETE FROM {table} WHERE {column} = ?");
        let rows = sqlx::query(&sql)
            .bind(employee_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        deleted.insert((*table).to_string(), json!(rows));
    }
    tx.commit().await?;

    info!(employee_id, deleted = ?deleted, "Employee purged");
    audit::record(
        pool.get_ref(),
        "employees",
        employee_id,
        AuditAction::Purge,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        None,
    )
    .await;

    Ok(HttpResponse::Ok().json(json!({
        "employee_id": employee_id,
        "deleted": deleted,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_plan_covers_every_child_table_and_ends_with_employee() {
        let tables: Vec<&str> = PURGE_PLAN.iter().map(|(t, _)| *t).collect();
        for child in [
            "onboarding_records",
            "training_records",
            "employee_references",
            "supervision_records",
            "supervision_exceptions",
            "supervision_requirements",
            "appraisal_milestones",
            "shifts",
            "leave_requests",
            "leave_entitlements",
            "notification_log",
        ] {
            assert!(tables.contains(&child), "{child} missing from purge plan");
        }
        assert_eq!(PURGE_PLAN.last(), Some(&("employees", "id")));
    }

    #[test]
    fn notification_log_cleared_before_training_records() {
        let pos = |name: &str| PURGE_PLAN.iter().position(|(t, _)| *t == name).unwrap();
        assert!(pos("notification_log") < pos("training_records"));
    }

    #[test]
    fn email_is_normalized() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM ").unwrap(), "jane.doe@example.com");
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("jane@localhost").is_err());
    }

    #[test]
    fn update_fields_match_allow_list() {
        let patch = UpdateEmployee {
            email: Some("a@b.co".into()),
            first_name: Some("A".into()),
            last_name: Some("B".into()),
            department: Some("D".into()),
            role: Some("Cook".into()),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1),
            active: Some(true),
            status_id: Some(1),
            notes: Some("n".into()),
            reports_to: Some(2),
            supervision_frequency: Some(1),
            appraisal_frequency_months: Some(3),
        };
        assert!(build_update_from("employees", &patch, UPDATABLE, 1, true).is_ok());
    }
}
