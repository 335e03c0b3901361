use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::collections::HashMap;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{ensure_exists, today},
    auth::auth::AuthUser,
    compliance::appraisal::{
        AppraisalStatus, MilestoneType, appraisal_status, days_until_due, matrix_window,
        next_reviews,
    },
    error::{ApiError, ApiResult},
    model::{
        appraisal::{APPRAISAL_SELECT, AppraisalMilestone},
        audit::AuditAction,
        role::Permission,
    },
    utils::{
        audit,
        db_utils::{build_update_sql, execute_update},
        settings_cache,
    },
};

/// Milestone with its status as of today.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AppraisalView {
    #[serde(flatten)]
    pub milestone: AppraisalMilestone,
    pub status: AppraisalStatus,
    pub days_until_due: Option<i64>,
}

impl AppraisalView {
    fn new(milestone: AppraisalMilestone, today: NaiveDate) -> Self {
        Self {
            status: appraisal_status(milestone.due_date, milestone.completed_date, today),
            days_until_due: days_until_due(milestone.due_date, milestone.completed_date, today),
            milestone,
        }
    }
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateAppraisal {
    pub employee_id: u64,
    #[schema(example = "2026-11-01", format = "date", value_type = String)]
    pub due_date: NaiveDate,
    /// Defaults to `ad_hoc`.
    pub milestone_type: Option<MilestoneType>,
    #[schema(format = "date", value_type = Option<String>)]
    pub completed_date: Option<NaiveDate>,
    pub conducted_by_id: Option<u64>,
    pub notes: Option<String>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdateAppraisal {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(format = "date", value_type = Option<String>)]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(format = "date", value_type = Option<String>)]
    pub completed_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conducted_by_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Reopen a completed milestone.
    #[serde(default)]
    pub clear_completed: bool,
}

const UPDATABLE: &[&str] = &["due_date", "completed_date", "conducted_by_id", "notes"];

#[derive(Deserialize, IntoParams)]
pub struct AppraisalQuery {
    pub employee_id: Option<u64>,
}

#[derive(Deserialize, IntoParams)]
pub struct MatrixQuery {
    pub reviews_back: Option<u32>,
    pub reviews_forward: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppraisalMatrixRow {
    pub employee_id: u64,
    pub employee_name: String,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    /// Completed reviews then upcoming ones; `null` cells are padding.
    pub cells: Vec<Option<AppraisalView>>,
}

#[derive(Debug, sqlx::FromRow)]
struct MatrixEmployee {
    id: u64,
    first_name: String,
    last_name: String,
    start_date: NaiveDate,
}

/// Turn an update body into the column patch; reopening wins over a
/// supplied completion date.
fn update_patch(body: &UpdateAppraisal) -> ApiResult<serde_json::Value> {
    let mut patch = serde_json::to_value(body).map_err(|e| ApiError::Internal(e.into()))?;
    if let Some(obj) = patch.as_object_mut() {
        obj.remove("clear_completed");
        if body.clear_completed {
            obj.insert("completed_date".into(), serde_json::Value::Null);
        }
    }
    Ok(patch)
}

/// Split one employee's milestones into the matrix layout.
fn matrix_cells(
    milestones: Vec<AppraisalMilestone>,
    back: usize,
    forward: usize,
    today: NaiveDate,
) -> Vec<Option<AppraisalView>> {
    let (mut completed, mut pending): (Vec<_>, Vec<_>) = milestones
        .into_iter()
        .map(|m| AppraisalView::new(m, today))
        .partition(|v| v.milestone.completed_date.is_some());
    completed.sort_by_key(|v| (v.milestone.due_date, v.milestone.review_number));
    pending.sort_by_key(|v| (v.milestone.due_date, v.milestone.review_number));

    matrix_window(&completed, &pending, back, forward)
}

async fn fetch(pool: &MySqlPool, id: u64) -> ApiResult<AppraisalMilestone> {
    sqlx::query_as::<_, AppraisalMilestone>(&format!("{APPRAISAL_SELECT} WHERE a.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Appraisal"))
}

#[utoipa::path(
    get,
    path = "/api/appraisals",
    params(AppraisalQuery),
    responses((status = 200, description = "Milestones by due date", body = Vec<AppraisalView>)),
    tag = "Appraisal",
    security(("bearer_auth" = []))
)]
pub async fn list_appraisals(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AppraisalQuery>,
) -> ApiResult<HttpResponse> {
    let rows = match query.employee_id {
        Some(employee_id) => {
            sqlx::query_as::<_, AppraisalMilestone>(&format!(
                "{APPRAISAL_SELECT} WHERE a.employee_id = ? ORDER BY a.due_date, a.review_number"
            ))
            .bind(employee_id)
            .fetch_all(pool.get_ref())
            .await?
        }
        None => {
            sqlx::query_as::<_, AppraisalMilestone>(&format!(
                "{APPRAISAL_SELECT} WHERE e.active = 1 ORDER BY a.due_date, a.employee_id"
            ))
            .fetch_all(pool.get_ref())
            .await?
        }
    };

    let today = today();
    let views: Vec<AppraisalView> = rows.into_iter().map(|m| AppraisalView::new(m, today)).collect();
    Ok(HttpResponse::Ok().json(views))
}

/// Add Appraisal
///
/// Numbered after the employee's highest existing review.
#[utoipa::path(
    post,
    path = "/api/appraisals",
    request_body = CreateAppraisal,
    responses(
        (status = 201, description = "Milestone created", body = AppraisalView),
        (status = 404, description = "Employee not found")
    ),
    tag = "Appraisal",
    security(("bearer_auth" = []))
)]
pub async fn create_appraisal(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAppraisal>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::AppraisalsManage)?;
    ensure_exists(pool.get_ref(), "employees", payload.employee_id, "Employee").await?;

    let highest = sqlx::query_scalar::<_, Option<i32>>(
        "SELECT MAX(review_number) FROM appraisal_milestones WHERE employee_id = ?",
    )
    .bind(payload.employee_id)
    .fetch_one(pool.get_ref())
    .await?
    .unwrap_or(0);
    let kind = payload.milestone_type.unwrap_or(MilestoneType::AdHoc);

    let id = sqlx::query(
        r#"
        INSERT INTO appraisal_milestones
            (employee_id, review_number, milestone_type, due_date, completed_date, conducted_by_id, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.employee_id)
    .bind(highest + 1)
    .bind(kind.as_ref())
    .bind(payload.due_date)
    .bind(payload.completed_date)
    .bind(payload.conducted_by_id)
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    audit::record(
        pool.get_ref(),
        "appraisal_milestones",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    let view = AppraisalView::new(fetch(pool.get_ref(), id).await?, today());
    Ok(HttpResponse::Created().json(view))
}

#[utoipa::path(
    put,
    path = "/api/appraisals/{id}",
    params(("id" = u64, Path, description = "Appraisal ID")),
    request_body = UpdateAppraisal,
    responses(
        (status = 200, description = "Milestone updated", body = AppraisalView),
        (status = 400, description = "Nothing to update"),
        (status = 404, description = "Milestone not found")
    ),
    tag = "Appraisal",
    security(("bearer_auth" = []))
)]
pub async fn update_appraisal(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateAppraisal>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::AppraisalsManage)?;
    let id = path.into_inner();
    let before = fetch(pool.get_ref(), id).await?;

    let patch = update_patch(&body)?;
    let update = build_update_sql("appraisal_milestones", &patch, UPDATABLE, "id", id, true)?;
    execute_update(pool.get_ref(), update).await?;

    audit::record(
        pool.get_ref(),
        "appraisal_milestones",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        Some(patch),
    )
    .await;

    let view = AppraisalView::new(fetch(pool.get_ref(), id).await?, today());
    Ok(HttpResponse::Ok().json(view))
}

#[utoipa::path(
    delete,
    path = "/api/appraisals/{id}",
    params(("id" = u64, Path, description = "Appraisal ID")),
    responses(
        (status = 204, description = "Milestone deleted"),
        (status = 404, description = "Milestone not found")
    ),
    tag = "Appraisal",
    security(("bearer_auth" = []))
)]
pub async fn delete_appraisal(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::AppraisalsManage)?;
    let id = path.into_inner();
    let before = fetch(pool.get_ref(), id).await?;

    sqlx::query("DELETE FROM appraisal_milestones WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    audit::record(
        pool.get_ref(),
        "appraisal_milestones",
        id,
        AuditAction::Delete,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

/// Generate Next Reviews
///
/// Appends the next three milestones of the schedule; numbers that already
/// exist are skipped.
#[utoipa::path(
    post,
    path = "/api/appraisals/generate/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 201, description = "Newly created milestones", body = Vec<AppraisalView>),
        (status = 404, description = "Employee not found")
    ),
    tag = "Appraisal",
    security(("bearer_auth" = []))
)]
pub async fn generate_next(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::AppraisalsManage)?;
    let employee_id = path.into_inner();

    let start_date = sqlx::query_scalar::<_, NaiveDate>("SELECT start_date FROM employees WHERE id = ?")
        .bind(employee_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ApiError::not_found("Employee"))?;

    let existing = sqlx::query_scalar::<_, i32>(
        "SELECT review_number FROM appraisal_milestones WHERE employee_id = ?",
    )
    .bind(employee_id)
    .fetch_all(pool.get_ref())
    .await?;

    let mut created = Vec::new();
    for review in next_reviews(start_date, &existing) {
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO appraisal_milestones (employee_id, review_number, milestone_type, due_date)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(employee_id)
        .bind(review.review_number)
        .bind(review.milestone_type.as_ref())
        .bind(review.due_date)
        .execute(pool.get_ref())
        .await?;

        if result.rows_affected() > 0 {
            created.push(result.last_insert_id());
        }
    }

    info!(employee_id, created = created.len(), "Appraisal milestones generated");
    audit::record(
        pool.get_ref(),
        "appraisal_milestones",
        employee_id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        Some(serde_json::json!({ "generated_ids": created })),
    )
    .await;

    let today = today();
    let mut views = Vec::with_capacity(created.len());
    for id in created {
        views.push(AppraisalView::new(fetch(pool.get_ref(), id).await?, today));
    }
    Ok(HttpResponse::Created().json(views))
}

/// Appraisal matrix
#[utoipa::path(
    get,
    path = "/api/appraisals/matrix",
    params(MatrixQuery),
    responses((status = 200, description = "Recent and upcoming reviews per active employee", body = Vec<AppraisalMatrixRow>)),
    tag = "Appraisal",
    security(("bearer_auth" = []))
)]
pub async fn appraisal_matrix(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MatrixQuery>,
) -> ApiResult<HttpResponse> {
    let settings = settings_cache::get(pool.get_ref()).await?;
    let back = query
        .reviews_back
        .unwrap_or(settings.appraisal_reviews_back.max(0) as u32) as usize;
    let forward = query
        .reviews_forward
        .unwrap_or(settings.appraisal_reviews_forward.max(0) as u32) as usize;
    if back > 20 || forward > 20 {
        return Err(ApiError::bad_request("Window cannot exceed 20 reviews either way"));
    }

    let employees = sqlx::query_as::<_, MatrixEmployee>(
        "SELECT id, first_name, last_name, start_date FROM employees WHERE active = 1 ORDER BY last_name, first_name",
    )
    .fetch_all(pool.get_ref())
    .await?;

    let milestones = sqlx::query_as::<_, AppraisalMilestone>(&format!(
        "{APPRAISAL_SELECT} WHERE e.active = 1"
    ))
    .fetch_all(pool.get_ref())
    .await?;

    let mut by_employee: HashMap<u64, Vec<AppraisalMilestone>> = HashMap::new();
    for m in milestones {
        by_employee.entry(m.employee_id).or_default().push(m);
    }

    let today = today();
    let rows: Vec<AppraisalMatrixRow> = employees
        .into_iter()
        .map(|e| AppraisalMatrixRow {
            employee_name: format!("{} {}", e.first_name, e.last_name),
            cells: matrix_cells(by_employee.remove(&e.id).unwrap_or_default(), back, forward, today),
            employee_id: e.id,
            start_date: e.start_date,
        })
        .collect();

    Ok(HttpResponse::Ok().json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn milestone(n: i32, due: NaiveDate, completed: Option<NaiveDate>) -> AppraisalMilestone {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        AppraisalMilestone {
            id: n as u64,
            employee_id: 1,
            employee_name: "Ada Jones".into(),
            review_number: n,
            milestone_type: "quarterly".into(),
            due_date: due,
            completed_date: completed,
            conducted_by_id: None,
            conducted_by_name: None,
            notes: None,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn clear_completed_nulls_the_date() {
        let body: UpdateAppraisal =
            serde_json::from_str(r#"{"completed_date":"2026-01-01","clear_completed":true}"#).unwrap();
        let patch = update_patch(&body).unwrap();
        assert_eq!(patch, serde_json::json!({ "completed_date": null }));

        let body: UpdateAppraisal = serde_json::from_str(r#"{"notes":"ok"}"#).unwrap();
        assert_eq!(update_patch(&body).unwrap(), serde_json::json!({ "notes": "ok" }));
    }

    #[test]
    fn matrix_cells_pad_around_recent_and_upcoming() {
        let today = d(2026, 10, 18);
        let cells = matrix_cells(
            vec![
                milestone(3, d(2026, 12, 1), None),
                milestone(1, d(2026, 6, 1), Some(d(2026, 6, 2))),
                milestone(2, d(2026, 9, 1), None),
            ],
            2,
            3,
            today,
        );
        let numbers: Vec<Option<i32>> = cells
            .iter()
            .map(|c| c.as_ref().map(|v| v.milestone.review_number))
            .collect();
        assert_eq!(numbers, [None, Some(1), Some(2), Some(3), None]);

        let overdue = cells[2].as_ref().unwrap();
        assert_eq!(overdue.status, AppraisalStatus::Overdue);
        assert_eq!(overdue.days_until_due, Some(-47));
        assert_eq!(cells[1].as_ref().unwrap().days_until_due, None);
    }

    #[test]
    fn view_flattens_milestone_fields() {
        let view = AppraisalView::new(milestone(1, d(2026, 11, 1), None), d(2026, 10, 18));
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["review_number"], 1);
        assert_eq!(json["status"], "due_soon");
        assert_eq!(json["days_until_due"], 14);
    }
}
