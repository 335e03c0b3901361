use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::{ensure_exists, require_text, today},
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{
        audit::AuditAction,
        onboarding::{OnboardingItem, OnboardingRecord, OnboardingStatus},
        role::Permission,
    },
    utils::{
        audit,
        db_utils::{build_update_from, execute_update},
    },
};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateOnboardingItem {
    #[schema(example = "Right to work check")]
    pub name: String,
    pub description: Option<String>,
    pub display_order: Option<i32>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdateOnboardingItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

const UPDATABLE: &[&str] = &["name", "description", "display_order", "active"];

#[derive(Deserialize, IntoParams)]
pub struct ItemQuery {
    pub include_inactive: Option<bool>,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct SetOnboardingStatus {
    pub status: OnboardingStatus,
    pub notes: Option<String>,
}

const ITEM_SELECT: &str = "SELECT id, name, description, display_order, active, created_at, updated_at FROM onboarding_items";

const RECORD_SELECT: &str = r#"
    SELECT r.id, r.employee_id, r.item_id, i.name AS item_name, i.description AS item_description,
           i.display_order, r.status, r.completed_date, r.notes, r.recorded_by, r.updated_at
    FROM onboarding_records r
    JOIN onboarding_items i ON i.id = r.item_id
"#;

async fn fetch_item(pool: &MySqlPool, id: u64) -> ApiResult<OnboardingItem> {
    sqlx::query_as::<_, OnboardingItem>(&format!("{ITEM_SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Onboarding item"))
}

/// Only a completed item carries a completion date.
fn completed_date_for(status: OnboardingStatus, today: NaiveDate) -> Option<NaiveDate> {
    match status {
        OnboardingStatus::Complete => Some(today),
        OnboardingStatus::Pending | OnboardingStatus::NotRequired => None,
    }
}

#[utoipa::path(
    get,
    path = "/api/onboarding/items",
    params(ItemQuery),
    responses((status = 200, description = "Checklist items in display order", body = Vec<OnboardingItem>)),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn list_items(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ItemQuery>,
) -> ApiResult<HttpResponse> {
    let filter = if query.include_inactive.unwrap_or(false) {
        ""
    } else {
        "WHERE active = 1"
    };
    let items = sqlx::query_as::<_, OnboardingItem>(&format!(
        "{ITEM_SELECT} {filter} ORDER BY display_order, name"
    ))
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(items))
}

#[utoipa::path(
    post,
    path = "/api/onboarding/items",
    request_body = CreateOnboardingItem,
    responses((status = 201, description = "Item created", body = OnboardingItem)),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn create_item(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateOnboardingItem>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::OnboardingManage)?;
    require_text("name", &payload.name)?;

    let id = sqlx::query(
        "INSERT INTO onboarding_items (name, description, display_order) VALUES (?, ?, ?)",
    )
    .bind(payload.name.trim())
    .bind(&payload.description)
    .bind(payload.display_order.unwrap_or(0))
    .execute(pool.get_ref())
    .await?
    .last_insert_id();

    audit::record(
        pool.get_ref(),
        "onboarding_items",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    Ok(HttpResponse::Created().json(fetch_item(pool.get_ref(), id).await?))
}

#[utoipa::path(
    put,
    path = "/api/onboarding/items/{id}",
    params(("id" = u64, Path, description = "Item ID")),
    request_body = UpdateOnboardingItem,
    responses(
        (status = 200, description = "Item updated", body = OnboardingItem),
        (status = 404, description = "Item not found")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn update_item(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateOnboardingItem>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::OnboardingManage)?;
    let id = path.into_inner();
    if let Some(name) = &body.name {
        require_text("name", name)?;
    }

    let before = fetch_item(pool.get_ref(), id).await?;
    let update = build_update_from("onboarding_items", &*body, UPDATABLE, id, true)?;
    execute_update(pool.get_ref(), update).await?;

    audit::record(
        pool.get_ref(),
        "onboarding_items",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&*body).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(fetch_item(pool.get_ref(), id).await?))
}

/// Deactivate Item
///
/// Items are never hard-deleted; existing employee records keep pointing at them.
#[utoipa::path(
    delete,
    path = "/api/onboarding/items/{id}",
    params(("id" = u64, Path, description = "Item ID")),
    responses(
        (status = 204, description = "Item deactivated"),
        (status = 404, description = "Item not found")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn delete_item(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::OnboardingManage)?;
    let id = path.into_inner();

    let result = sqlx::query("UPDATE onboarding_items SET active = 0, updated_at = NOW() WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Onboarding item"));
    }

    audit::record(
        pool.get_ref(),
        "onboarding_items",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        None,
        Some(serde_json::json!({ "active": false })),
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/api/onboarding/employees/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Checklist for the employee", body = Vec<OnboardingRecord>),
        (status = 404, description = "Employee not found")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn employee_records(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let employee_id = path.into_inner();
    ensure_exists(pool.get_ref(), "employees", employee_id, "Employee").await?;

    let records = sqlx::query_as::<_, OnboardingRecord>(&format!(
        "{RECORD_SELECT} WHERE r.employee_id = ? ORDER BY i.display_order, i.name"
    ))
    .bind(employee_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(records))
}

/// Set Item Status
///
/// Creates the record when the item was added after the employee was hired.
#[utoipa::path(
    put,
    path = "/api/onboarding/employees/{employee_id}/items/{item_id}",
    params(
        ("employee_id" = u64, Path, description = "Employee ID"),
        ("item_id" = u64, Path, description = "Onboarding item ID")
    ),
    request_body = SetOnboardingStatus,
    responses(
        (status = 200, description = "Record updated", body = OnboardingRecord),
        (status = 404, description = "Employee or item not found")
    ),
    tag = "Onboarding",
    security(("bearer_auth" = []))
)]
pub async fn set_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(u64, u64)>,
    payload: web::Json<SetOnboardingStatus>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::OnboardingManage)?;
    let (employee_id, item_id) = path.into_inner();
    ensure_exists(pool.get_ref(), "employees", employee_id, "Employee").await?;
    ensure_exists(pool.get_ref(), "onboarding_items", item_id, "Onboarding item").await?;

    let completed = completed_date_for(payload.status, today());

    sqlx::query(
        r#"
        INSERT INTO onboarding_records (employee_id, item_id, status, completed_date, notes, recorded_by)
        VALUES (?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            status = VALUES(status),
            completed_date = VALUES(completed_date),
            notes = COALESCE(VALUES(notes), notes),
            recorded_by = VALUES(recorded_by)
        "#,
    )
    .bind(employee_id)
    .bind(item_id)
    .bind(payload.status.as_ref())
    .bind(completed)
    .bind(&payload.notes)
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await?;

    let record = sqlx::query_as::<_, OnboardingRecord>(&format!(
        "{RECORD_SELECT} WHERE r.employee_id = ? AND r.item_id = ?"
    ))
    .bind(employee_id)
    .bind(item_id)
    .fetch_one(pool.get_ref())
    .await?;

    audit::record(
        pool.get_ref(),
        "onboarding_records",
        record.id,
        AuditAction::Update,
        Some(auth.user_id),
        None,
        serde_json::to_value(&*payload).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_complete_stamps_a_date() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(completed_date_for(OnboardingStatus::Complete, today), Some(today));
        assert_eq!(completed_date_for(OnboardingStatus::Pending, today), None);
        assert_eq!(completed_date_for(OnboardingStatus::NotRequired, today), None);
    }

    #[test]
    fn status_payload_uses_snake_case() {
        let body: SetOnboardingStatus =
            serde_json::from_str(r#"{"status":"not_required"}"#).unwrap();
        assert_eq!(body.status, OnboardingStatus::NotRequired);
        assert!(serde_json::from_str::<SetOnboardingStatus>(r#"{"status":"done"}"#).is_err());
    }
}
