use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::require_text,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{audit::AuditAction, employee_status::EmployeeStatus, role::Permission},
    utils::{
        audit,
        db_utils::{build_update_from, execute_update},
    },
};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateEmployeeStatus {
    #[schema(example = "Bank")]
    pub name: String,
    pub display_order: Option<i32>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdateEmployeeStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Deserialize, IntoParams)]
pub struct StatusQuery {
    pub include_inactive: Option<bool>,
}

const SELECT: &str =
    "SELECT id, name, display_order, active, created_at, updated_at FROM employee_statuses";

async fn fetch(pool: &MySqlPool, id: u64) -> ApiResult<EmployeeStatus> {
    sqlx::query_as::<_, EmployeeStatus>(&format!("{SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Employee status"))
}

#[utoipa::path(
    get,
    path = "/api/employee-statuses",
    params(StatusQuery),
    responses((status = 200, description = "Statuses in display order", body = Vec<EmployeeStatus>)),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_statuses(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<StatusQuery>,
) -> ApiResult<HttpResponse> {
    let filter = if query.include_inactive.unwrap_or(false) {
        ""
    } else {
        "WHERE active = 1"
    };
    let statuses = sqlx::query_as::<_, EmployeeStatus>(&format!(
        "{SELECT} {filter} ORDER BY display_order, name"
    ))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(statuses))
}

#[utoipa::path(
    post,
    path = "/api/employee-statuses",
    request_body = CreateEmployeeStatus,
    responses(
        (status = 201, description = "Status created", body = EmployeeStatus),
        (status = 409, description = "Name already exists")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateEmployeeStatus>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeeStatusesManage)?;
    require_text("name", &payload.name)?;

    let id = sqlx::query("INSERT INTO employee_statuses (name, display_order) VALUES (?, ?)")
        .bind(payload.name.trim())
        .bind(payload.display_order.unwrap_or(0))
        .execute(pool.get_ref())
        .await?
        .last_insert_id();

    audit::record(
        pool.get_ref(),
        "employee_statuses",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    Ok(HttpResponse::Created().json(fetch(pool.get_ref(), id).await?))
}

#[utoipa::path(
    put,
    path = "/api/employee-statuses/{id}",
    params(("id" = u64, Path, description = "Status ID")),
    request_body = UpdateEmployeeStatus,
    responses(
        (status = 200, description = "Status updated", body = EmployeeStatus),
        (status = 404, description = "Status not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateEmployeeStatus>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeeStatusesManage)?;
    let id = path.into_inner();
    if let Some(name) = &body.name {
        require_text("name", name)?;
    }

    let before = fetch(pool.get_ref(), id).await?;
    let update = build_update_from(
        "employee_statuses",
        &*body,
        &["name", "display_order", "active"],
        id,
        true,
    )?;
    execute_update(pool.get_ref(), update).await?;

    audit::record(
        pool.get_ref(),
        "employee_statuses",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&*body).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(fetch(pool.get_ref(), id).await?))
}

/// Employees holding the status keep their record with no status.
#[utoipa::path(
    delete,
    path = "/api/employee-statuses/{id}",
    params(("id" = u64, Path, description = "Status ID")),
    responses(
        (status = 204, description = "Status deleted"),
        (status = 404, description = "Status not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeeStatusesManage)?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM employee_statuses WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Employee status"));
    }

    audit::record(
        pool.get_ref(),
        "employee_statuses",
        id,
        AuditAction::Delete,
        Some(auth.user_id),
        None,
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}
