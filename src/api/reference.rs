use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::{
    api::ensure_exists,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{audit::AuditAction, reference::EmployeeReference, role::Permission},
    utils::{
        audit,
        db_utils::{build_update_from, execute_update},
    },
};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateReference {
    /// Next free number when omitted.
    pub reference_number: Option<i32>,
    pub contact_name: Option<String>,
    pub contact_company: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub received: bool,
    #[serde(default)]
    pub verbal_ref: bool,
    #[schema(value_type = Option<String>, format = "date")]
    pub date_requested: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date")]
    pub date_received: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdateReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbal_ref: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = "date")]
    pub date_requested: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = "date")]
    pub date_received: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

const UPDATABLE: &[&str] = &[
    "contact_name",
    "contact_company",
    "contact_email",
    "contact_phone",
    "received",
    "verbal_ref",
    "date_requested",
    "date_received",
    "notes",
];

const SELECT: &str = r#"
    SELECT id, employee_id, reference_number, contact_name, contact_company, contact_email,
           contact_phone, received, verbal_ref, date_requested, date_received, notes,
           created_at, updated_at
    FROM employee_references
"#;

async fn fetch(pool: &MySqlPool, id: u64) -> ApiResult<EmployeeReference> {
    sqlx::query_as::<_, EmployeeReference>(&format!("{SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Reference"))
}

#[utoipa::path(
    get,
    path = "/api/employees/{employee_id}/references",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses((status = 200, description = "References by number", body = Vec<EmployeeReference>)),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn list_references(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let refs = sqlx::query_as::<_, EmployeeReference>(&format!(
        "{SELECT} WHERE employee_id = ? ORDER BY reference_number"
    ))
    .bind(path.into_inner())
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(refs))
}

#[utoipa::path(
    post,
    path = "/api/employees/{employee_id}/references",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    request_body = CreateReference,
    responses(
        (status = 201, description = "Reference created", body = EmployeeReference),
        (status = 404, description = "Employee not found"),
        (status = 409, description = "Reference number already used")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn create_reference(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<CreateReference>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesManage)?;
    let employee_id = path.into_inner();
    ensure_exists(pool.get_ref(), "employees", employee_id, "Employee").await?;

    let reference_number = match payload.reference_number {
        Some(n) if n < 1 => return Err(ApiError::bad_request("reference_number must be positive")),
        Some(n) => n,
        None => {
            let next = sqlx::query_scalar::<_, i64>(
                "SELECT CAST(COALESCE(MAX(reference_number), 0) + 1 AS SIGNED) FROM employee_references WHERE employee_id = ?",
            )
            .bind(employee_id)
            .fetch_one(pool.get_ref())
            .await?;
            next as i32
        }
    };

    let id = sqlx::query(
        r#"
        INSERT INTO employee_references
            (employee_id, reference_number, contact_name, contact_company, contact_email,
             contact_phone, received, verbal_ref, date_requested, date_received, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(employee_id)
    .bind(reference_number)
    .bind(&payload.contact_name)
    .bind(&payload.contact_company)
    .bind(&payload.contact_email)
    .bind(&payload.contact_phone)
    .bind(payload.received)
    .bind(payload.verbal_ref)
    .bind(payload.date_requested)
    .bind(payload.date_received)
    .bind(&payload.notes)
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    audit::record(
        pool.get_ref(),
        "employee_references",
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
    path = "/api/references/{id}",
    params(("id" = u64, Path, description = "Reference ID")),
    request_body = UpdateReference,
    responses(
        (status = 200, description = "Reference updated", body = EmployeeReference),
        (status = 404, description = "Reference not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn update_reference(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateReference>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesManage)?;
    let id = path.into_inner();

    let before = fetch(pool.get_ref(), id).await?;
    let update = build_update_from("employee_references", &*body, UPDATABLE, id, true)?;
    execute_update(pool.get_ref(), update).await?;

    audit::record(
        pool.get_ref(),
        "employee_references",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&*body).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(fetch(pool.get_ref(), id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/references/{id}",
    params(("id" = u64, Path, description = "Reference ID")),
    responses(
        (status = 204, description = "Reference deleted"),
        (status = 404, description = "Reference not found")
    ),
    tag = "Employee",
    security(("bearer_auth" = []))
)]
pub async fn delete_reference(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::EmployeesManage)?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM employee_references WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Reference"));
    }

    audit::record(
        pool.get_ref(),
        "employee_references",
        id,
        AuditAction::Delete,
        Some(auth.user_id),
        None,
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}
