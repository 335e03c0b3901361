use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{ensure_exists, today, training_course::COURSE_SELECT},
    auth::auth::AuthUser,
    compliance::training::{
        TrainingStatus, course_applies, days_until, expiry_date, training_status,
    },
    error::{ApiError, ApiResult},
    model::{
        audit::AuditAction,
        role::Permission,
        training::{TRAINING_RECORD_SELECT, TrainingCourse, TrainingRecord},
    },
    utils::{
        audit,
        db_utils::{BindFilters, FilterValue, Filters},
    },
};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateTrainingRecord {
    pub employee_id: u64,
    pub course_id: u64,
    #[schema(example = "2026-01-15", format = "date", value_type = String)]
    pub completion_date: NaiveDate,
    pub certificate_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct RecordQuery {
    pub employee_id: Option<u64>,
    pub course_id: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
pub struct StatusQuery {
    pub category: Option<String>,
    pub employee_id: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
pub struct ExpiringQuery {
    /// Include valid records expiring within this many days (default 30)
    pub days: Option<i64>,
}

/// One cell of the training matrix: an active employee against a course
/// that applies to their role.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrainingStatusRow {
    pub employee_id: u64,
    pub employee_name: String,
    pub employee_email: String,
    pub role: String,
    pub department: Option<String>,
    pub course_id: u64,
    pub course_name: String,
    pub category: String,
    /// Latest completion, if any.
    pub training_record_id: Option<u64>,
    #[schema(value_type = Option<String>, format = "date")]
    pub completion_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub expiry_date: Option<NaiveDate>,
    pub status: TrainingStatus,
    pub days_until_expiry: Option<i64>,
}

/// Employee columns the matrix needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct MatrixEmployee {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub(crate) struct Completion {
    pub id: u64,
    pub employee_id: u64,
    pub course_id: u64,
    pub completion_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}

/// Cross employees with applicable courses using each pair's latest
/// completion. Later completion dates win; equal dates go to the newer row.
pub(crate) fn build_status_rows(
    employees: &[MatrixEmployee],
    courses: &[TrainingCourse],
    completions: &[Completion],
    today: NaiveDate,
) -> Vec<TrainingStatusRow> {
    let mut latest: HashMap<(u64, u64), Completion> = HashMap::new();
    for c in completions {
        latest
            .entry((c.employee_id, c.course_id))
            .and_modify(|cur| {
                if (c.completion_date, c.id) > (cur.completion_date, cur.id) {
                    *cur = *c;
                }
            })
            .or_insert(*c);
    }

    let mut rows = Vec::new();
    for employee in employees {
        for course in courses {
            if !course_applies(course.mandatory_roles(), &employee.role) {
                continue;
            }
            let completion = latest.get(&(employee.id, course.id));
            let status = training_status(
                completion.map(|c| (c.completion_date, c.expiry_date)),
                today,
                course.expiry_warning_days_before as i64,
            );
            let expiry = completion.and_then(|c| c.expiry_date);

            rows.push(TrainingStatusRow {
                employee_id: employee.id,
                employee_name: format!("{} {}", employee.first_name, employee.last_name),
                employee_email: employee.email.clone(),
                role: employee.role.clone(),
                department: employee.department.clone(),
                course_id: course.id,
                course_name: course.name.clone(),
                category: course.category.clone(),
                training_record_id: completion.map(|c| c.id),
                completion_date: completion.map(|c| c.completion_date),
                expiry_date: expiry,
                status,
                days_until_expiry: days_until(expiry, today),
            });
        }
    }
    rows
}

pub(crate) fn is_expiring(row: &TrainingStatusRow, within_days: i64) -> bool {
    row.status.needs_attention()
        || matches!(row.days_until_expiry, Some(d) if d <= within_days)
}

/// Load everything the matrix needs, optionally narrowed.
pub(crate) async fn load_status_rows(
    pool: &MySqlPool,
    employee_id: Option<u64>,
    category: Option<&str>,
) -> ApiResult<Vec<TrainingStatusRow>> {
    let employees = match employee_id {
        Some(id) => sqlx::query_as::<_, MatrixEmployee>(
            "SELECT id, first_name, last_name, email, role, department FROM employees WHERE active = 1 AND id = ?",
        )
        .bind(id)
        .fetch_all(pool)
        .await?,
        None => sqlx::query_as::<_, MatrixEmployee>(
            "SELECT id, first_name, last_name, email, role, department FROM employees WHERE active = 1 ORDER BY last_name, first_name",
        )
        .fetch_all(pool)
        .await?,
    };

    let courses = match category {
        Some(category) => {
            sqlx::query_as::<_, TrainingCourse>(&format!(
                "{COURSE_SELECT} WHERE category = ? ORDER BY category, name"
            ))
            .bind(category)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, TrainingCourse>(&format!("{COURSE_SELECT} ORDER BY category, name"))
                .fetch_all(pool)
                .await?
        }
    };

    let completions = sqlx::query_as::<_, Completion>(
        r#"
        SELECT tr.id, tr.employee_id, tr.course_id, tr.completion_date, tr.expiry_date
        FROM training_records tr
        JOIN employees e ON e.id = tr.employee_id
        WHERE e.active = 1
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(build_status_rows(&employees, &courses, &completions, today()))
}

#[utoipa::path(
    get,
    path = "/api/training-records",
    params(RecordQuery),
    responses((status = 200, description = "Completions, newest first", body = Vec<TrainingRecord>)),
    tag = "Training",
    security(("bearer_auth" = []))
)]
pub async fn list_records(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RecordQuery>,
) -> ApiResult<HttpResponse> {
    let mut filters = Filters::new();
    if let Some(id) = query.employee_id {
        filters.add("tr.employee_id = ?", [FilterValue::U64(id)]);
    }
    if let Some(id) = query.course_id {
        filters.add("tr.course_id = ?", [FilterValue::U64(id)]);
    }

    let sql = format!(
        "{TRAINING_RECORD_SELECT} {} ORDER BY tr.completion_date DESC, tr.id DESC",
        filters.where_clause()
    );
    let records = sqlx::query_as::<_, TrainingRecord>(&sql)
        .bind_filters(filters.values())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(records))
}

/// Record Training
///
/// Expiry is fixed at creation from the course's validity period.
#[utoipa::path(
    post,
    path = "/api/training-records",
    request_body = CreateTrainingRecord,
    responses(
        (status = 201, description = "Completion recorded", body = TrainingRecord),
        (status = 404, description = "Employee or course not found")
    ),
    tag = "Training",
    security(("bearer_auth" = []))
)]
pub async fn create_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTrainingRecord>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::TrainingRecordsRecord)?;
    ensure_exists(pool.get_ref(), "employees", payload.employee_id, "Employee").await?;

    let validity = sqlx::query_scalar::<_, Option<i32>>(
        "SELECT validity_months FROM training_courses WHERE id = ?",
    )
    .bind(payload.course_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ApiError::not_found("Training course"))?;

    let expiry = expiry_date(payload.completion_date, validity);

    let id = sqlx::query(
        r#"
        INSERT INTO training_records
            (employee_id, course_id, completion_date, expiry_date, certificate_url, notes, recorded_by)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(payload.course_id)
    .bind(payload.completion_date)
    .bind(expiry)
    .bind(&payload.certificate_url)
    .bind(&payload.notes)
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    audit::record(
        pool.get_ref(),
        "training_records",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    let record = sqlx::query_as::<_, TrainingRecord>(&format!("{TRAINING_RECORD_SELECT} WHERE tr.id = ?"))
        .bind(id)
        .fetch_one(pool.get_ref())
        .await?;
    Ok(HttpResponse::Created().json(record))
}

#[utoipa::path(
    delete,
    path = "/api/training-records/{id}",
    params(("id" = u64, Path, description = "Training record ID")),
    responses(
        (status = 204, description = "Record deleted"),
        (status = 404, description = "Record not found")
    ),
    tag = "Training",
    security(("bearer_auth" = []))
)]
pub async fn delete_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::TrainingRecordsRecord)?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM training_records WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Training record"));
    }

    audit::record(
        pool.get_ref(),
        "training_records",
        id,
        AuditAction::Delete,
        Some(auth.user_id),
        None,
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

/// Training matrix
#[utoipa::path(
    get,
    path = "/api/training-records/status",
    params(StatusQuery),
    responses((status = 200, description = "Status per employee and applicable course", body = Vec<TrainingStatusRow>)),
    tag = "Training",
    security(("bearer_auth" = []))
)]
pub async fn status_matrix(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<StatusQuery>,
) -> ApiResult<HttpResponse> {
    let rows = load_status_rows(pool.get_ref(), query.employee_id, query.category.as_deref()).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/training-records/expiring",
    params(ExpiringQuery),
    responses((status = 200, description = "Expired, expiring soon, or expiring within the window", body = Vec<TrainingStatusRow>)),
    tag = "Training",
    security(("bearer_auth" = []))
)]
pub async fn expiring(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ExpiringQuery>,
) -> ApiResult<HttpResponse> {
    let days = query.days.unwrap_or(30);
    if days < 0 {
        return Err(ApiError::bad_request("days cannot be negative"));
    }

    let mut rows: Vec<TrainingStatusRow> = load_status_rows(pool.get_ref(), None, None)
        .await?
        .into_iter()
        .filter(|row| is_expiring(row, days))
        .collect();
    rows.sort_by_key(|r| r.days_until_expiry);

    Ok(HttpResponse::Ok().json(rows))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use sqlx::types::Json;

    pub(crate) fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    pub(crate) fn employee(id: u64, role: &str) -> MatrixEmployee {
        MatrixEmployee {
            id,
            first_name: format!("First{id}"),
            last_name: "Last".into(),
            email: format!("e{id}@example.com"),
            role: role.into(),
            department: None,
        }
    }

    pub(crate) fn course(id: u64, validity: Option<i32>, roles: Option<Vec<&str>>) -> TrainingCourse {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        TrainingCourse {
            id,
            name: format!("Course{id}"),
            description: None,
            category: "Core".into(),
            validity_months: validity,
            expiry_warning_days_before: 30,
            notification_days_before: 0,
            reminder_frequency_days: 7,
            notify_employee: true,
            notify_admin: true,
            mandatory_for_roles: roles.map(|r| Json(r.into_iter().map(String::from).collect())),
            created_at: ts,
            updated_at: ts,
        }
    }

    fn completion(id: u64, employee_id: u64, course_id: u64, date: NaiveDate, expiry: Option<NaiveDate>) -> Completion {
        Completion { id, employee_id, course_id, completion_date: date, expiry_date: expiry }
    }

    #[test]
    fn uses_latest_completion_per_pair() {
        let today = d(2026, 10, 18);
        let rows = build_status_rows(
            &[employee(1, "Cook")],
            &[course(10, Some(12), None)],
            &[
                completion(1, 1, 10, d(2024, 1, 1), Some(d(2025, 1, 1))),
                completion(2, 1, 10, d(2026, 3, 1), Some(d(2027, 3, 1))),
            ],
            today,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].training_record_id, Some(2));
        assert_eq!(rows[0].status, TrainingStatus::Valid);
    }

    #[test]
    fn same_day_completions_prefer_newest_row() {
        let day = d(2026, 3, 1);
        let rows = build_status_rows(
            &[employee(1, "Cook")],
            &[course(10, None, None)],
            &[completion(9, 1, 10, day, None), completion(4, 1, 10, day, None)],
            d(2026, 10, 18),
        );
        assert_eq!(rows[0].training_record_id, Some(9));
        assert_eq!(rows[0].status, TrainingStatus::Completed);
    }

    #[test]
    fn skips_courses_not_mandatory_for_role() {
        let rows = build_status_rows(
            &[employee(1, "Cook"), employee(2, "Team Leader")],
            &[course(10, Some(12), Some(vec!["Team Leader"]))],
            &[],
            d(2026, 10, 18),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].employee_id, 2);
        assert_eq!(rows[0].status, TrainingStatus::NotCompleted);
    }

    #[test]
    fn expiring_filter() {
        let today = d(2026, 10, 18);
        let rows = build_status_rows(
            &[employee(1, "Cook")],
            &[course(10, Some(12), None), course(11, Some(12), None), course(12, Some(12), None)],
            &[
                completion(1, 1, 10, d(2025, 10, 1), Some(d(2026, 10, 1))),   // expired
                completion(2, 1, 11, d(2025, 12, 20), Some(d(2026, 12, 20))), // 63 days out
                completion(3, 1, 12, d(2026, 6, 1), Some(d(2027, 6, 1))),     // far out
            ],
            today,
        );
        let within_30: Vec<u64> = rows.iter().filter(|r| is_expiring(r, 30)).map(|r| r.course_id).collect();
        assert_eq!(within_30, [10]);
        let within_90: Vec<u64> = rows.iter().filter(|r| is_expiring(r, 90)).map(|r| r.course_id).collect();
        assert_eq!(within_90, [10, 11]);
    }
}
