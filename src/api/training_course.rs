use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use sqlx::types::Json;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::require_text,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{audit::AuditAction, role::Permission, training::TrainingCourse},
    utils::{
        audit,
        db_utils::{build_update_from, execute_update},
        settings_cache,
    },
};

/// Omitted notification fields take the company defaults.
#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateTrainingCourse {
    #[schema(example = "Manual Handling")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "Health & Safety")]
    pub category: String,
    /// Months a completion stays valid; omit for courses that never expire.
    #[schema(example = 12)]
    pub validity_months: Option<i32>,
    pub expiry_warning_days_before: Option<i32>,
    pub notification_days_before: Option<i32>,
    pub reminder_frequency_days: Option<i32>,
    pub notify_employee: Option<bool>,
    pub notify_admin: Option<bool>,
    pub mandatory_for_roles: Option<Vec<String>>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdateTrainingCourse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validity_months: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_warning_days_before: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_days_before: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_frequency_days: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_employee: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mandatory_for_roles: Option<Vec<String>>,
}

const UPDATABLE: &[&str] = &[
    "name",
    "description",
    "category",
    "validity_months",
    "expiry_warning_days_before",
    "notification_days_before",
    "reminder_frequency_days",
    "notify_employee",
    "notify_admin",
    "mandatory_for_roles",
];

#[derive(Deserialize, IntoParams)]
pub struct CourseQuery {
    pub category: Option<String>,
}

pub(crate) const COURSE_SELECT: &str = r#"
    SELECT id, name, description, category, validity_months, expiry_warning_days_before,
           notification_days_before, reminder_frequency_days, notify_employee, notify_admin,
           mandatory_for_roles, created_at, updated_at
    FROM training_courses
"#;

fn validate_numbers(
    validity_months: Option<i32>,
    days: [(&str, Option<i32>); 3],
) -> ApiResult<()> {
    if matches!(validity_months, Some(m) if m <= 0) {
        return Err(ApiError::bad_request("validity_months must be positive"));
    }
    for (field, value) in days {
        if matches!(value, Some(d) if d < 0) {
            return Err(ApiError::bad_request(format!("{field} cannot be negative")));
        }
    }
    Ok(())
}

fn clean_roles(roles: Option<Vec<String>>) -> Option<Vec<String>> {
    roles.map(|r| {
        r.into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

async fn fetch(pool: &MySqlPool, id: u64) -> ApiResult<TrainingCourse> {
    sqlx::query_as::<_, TrainingCourse>(&format!("{COURSE_SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Training course"))
}

#[utoipa::path(
    get,
    path = "/api/training-courses",
    params(CourseQuery),
    responses((status = 200, description = "Courses by category and name", body = Vec<TrainingCourse>)),
    tag = "Training",
    security(("bearer_auth" = []))
)]
pub async fn list_courses(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<CourseQuery>,
) -> ApiResult<HttpResponse> {
    let courses = match &query.category {
        Some(category) => {
            sqlx::query_as::<_, TrainingCourse>(&format!(
                "{COURSE_SELECT} WHERE category = ? ORDER BY category, name"
            ))
            .bind(category)
            .fetch_all(pool.get_ref())
            .await?
        }
        None => {
            sqlx::query_as::<_, TrainingCourse>(&format!("{COURSE_SELECT} ORDER BY category, name"))
                .fetch_all(pool.get_ref())
                .await?
        }
    };

    Ok(HttpResponse::Ok().json(courses))
}

#[utoipa::path(
    get,
    path = "/api/training-courses/{id}",
    params(("id" = u64, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Course found", body = TrainingCourse),
        (status = 404, description = "Course not found")
    ),
    tag = "Training",
    security(("bearer_auth" = []))
)]
pub async fn get_course(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(fetch(pool.get_ref(), path.into_inner()).await?))
}

#[utoipa::path(
    post,
    path = "/api/training-courses",
    request_body = CreateTrainingCourse,
    responses(
        (status = 201, description = "Course created", body = TrainingCourse),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Course name already exists")
    ),
    tag = "Training",
    security(("bearer_auth" = []))
)]
pub async fn create_course(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateTrainingCourse>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::TrainingCoursesManage)?;
    let payload = payload.into_inner();

    require_text("name", &payload.name)?;
    require_text("category", &payload.category)?;
    validate_numbers(
        payload.validity_months,
        [
            ("expiry_warning_days_before", payload.expiry_warning_days_before),
            ("notification_days_before", payload.notification_days_before),
            ("reminder_frequency_days", payload.reminder_frequency_days),
        ],
    )?;

    let defaults = settings_cache::get(pool.get_ref()).await?;
    let roles = clean_roles(payload.mandatory_for_roles.clone());

    let id = sqlx::query(
        r#"
        INSERT INTO training_courses
            (name, description, category, validity_months, expiry_warning_days_before,
             notification_days_before, reminder_frequency_days, notify_employee, notify_admin,
             mandatory_for_roles)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(payload.category.trim())
    .bind(payload.validity_months)
    .bind(
        payload
            .expiry_warning_days_before
            .unwrap_or(defaults.default_expiry_warning_days),
    )
    .bind(
        payload
            .notification_days_before
            .unwrap_or(defaults.default_notification_days_before),
    )
    .bind(
        payload
            .reminder_frequency_days
            .unwrap_or(defaults.default_reminder_frequency_days),
    )
    .bind(payload.notify_employee.unwrap_or(defaults.default_notify_employee))
    .bind(payload.notify_admin.unwrap_or(defaults.default_notify_admin))
    .bind(roles.map(Json))
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    audit::record(
        pool.get_ref(),
        "training_courses",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&payload).ok(),
    )
    .await;

    Ok(HttpResponse::Created().json(fetch(pool.get_ref(), id).await?))
}

#[utoipa::path(
    put,
    path = "/api/training-courses/{id}",
    params(("id" = u64, Path, description = "Course ID")),
    request_body = UpdateTrainingCourse,
    responses(
        (status = 200, description = "Course updated", body = TrainingCourse),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Course not found")
    ),
    tag = "Training",
    security(("bearer_auth" = []))
)]
pub async fn update_course(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateTrainingCourse>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::TrainingCoursesManage)?;
    let id = path.into_inner();
    let mut patch = body.into_inner();

    if let Some(name) = &patch.name {
        require_text("name", name)?;
    }
    validate_numbers(
        patch.validity_months,
        [
            ("expiry_warning_days_before", patch.expiry_warning_days_before),
            ("notification_days_before", patch.notification_days_before),
            ("reminder_frequency_days", patch.reminder_frequency_days),
        ],
    )?;
    patch.mandatory_for_roles = clean_roles(patch.mandatory_for_roles.take());

    let before = fetch(pool.get_ref(), id).await?;
    let update = build_update_from("training_courses", &patch, UPDATABLE, id, true)?;
    execute_update(pool.get_ref(), update).await?;

    audit::record(
        pool.get_ref(),
        "training_courses",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&patch).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(fetch(pool.get_ref(), id).await?))
}

/// Removes the course and every completion recorded against it.
#[utoipa::path(
    delete,
    path = "/api/training-courses/{id}",
    params(("id" = u64, Path, description = "Course ID")),
    responses(
        (status = 204, description = "Course deleted"),
        (status = 404, description = "Course not found")
    ),
    tag = "Training",
    security(("bearer_auth" = []))
)]
pub async fn delete_course(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::TrainingCoursesManage)?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM training_courses WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Training course"));
    }

    audit::record(
        pool.get_ref(),
        "training_courses",
        id,
        AuditAction::Delete,
        Some(auth.user_id),
        None,
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_must_be_positive() {
        assert!(validate_numbers(Some(0), [("a", None), ("b", None), ("c", None)]).is_err());
        assert!(validate_numbers(None, [("a", Some(0)), ("b", None), ("c", None)]).is_ok());
        assert!(validate_numbers(Some(12), [("a", Some(-1)), ("b", None), ("c", None)]).is_err());
    }

    #[test]
    fn blank_roles_are_dropped() {
        let roles = clean_roles(Some(vec![" Cook ".into(), "".into(), "  ".into()]));
        assert_eq!(roles, Some(vec!["Cook".to_string()]));
        assert_eq!(clean_roles(None), None);
    }
}
