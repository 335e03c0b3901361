use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{MySql, MySqlPool, Transaction};
use utoipa::{IntoParams, ToSchema};

use crate::{
    api::require_text,
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{audit::AuditAction, grid_view::UserGridView, role::Permission},
    utils::audit,
};

#[derive(Deserialize, Serialize, ToSchema)]
pub struct CreateGridView {
    #[schema(example = "training-matrix")]
    pub grid_type: String,
    #[schema(example = "Night staff")]
    pub name: String,
    /// Stored verbatim; defaults to `{}`.
    #[schema(value_type = Option<Object>)]
    pub config: Option<Value>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_company_default: bool,
}

#[derive(Deserialize, Serialize, ToSchema)]
pub struct UpdateGridView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub config: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_company_default: Option<bool>,
}

impl CreateGridView {
    /// Trim the keys so default switching and the stored row agree.
    fn normalized(mut self) -> ApiResult<Self> {
        self.grid_type = self.grid_type.trim().to_string();
        self.name = self.name.trim().to_string();
        require_text("grid_type", &self.grid_type)?;
        require_text("name", &self.name)?;
        Ok(self)
    }
}

#[derive(Deserialize, IntoParams)]
pub struct GridQuery {
    #[param(example = "training-matrix")]
    pub grid_type: String,
}

const SELECT: &str = "SELECT id, user_id, grid_type, name, config, is_default, is_company_default, created_at, updated_at FROM user_grid_views";

/// Listing group: personal default, company default, then the rest.
fn rank(view: &UserGridView, user_id: u64) -> u8 {
    if view.user_id == user_id && view.is_default {
        0
    } else if view.is_company_default {
        1
    } else if view.user_id == user_id {
        2
    } else {
        3
    }
}

pub(crate) fn sort_views(views: &mut [UserGridView], user_id: u64) {
    views.sort_by(|a, b| {
        rank(a, user_id)
            .cmp(&rank(b, user_id))
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// The view to load on open: the user's own default, else the company
/// default, else none.
pub(crate) fn resolve_default(views: &[UserGridView], user_id: u64) -> Option<&UserGridView> {
    views
        .iter()
        .find(|v| v.user_id == user_id && v.is_default)
        .or_else(|| views.iter().find(|v| v.is_company_default))
}

fn can_modify(view: &UserGridView, user_id: u64) -> bool {
    view.user_id == user_id || view.is_company_default
}

fn ensure_company_default_allowed(auth: &AuthUser) -> ApiResult<()> {
    if auth.can(Permission::SettingsManage) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "Only administrators can set the company default view".into(),
        ))
    }
}

async fn visible_views(pool: &MySqlPool, user_id: u64, grid_type: &str) -> ApiResult<Vec<UserGridView>> {
    let views = sqlx::query_as::<_, UserGridView>(&format!(
        "{SELECT} WHERE grid_type = ? AND (user_id = ? OR is_company_default = 1)"
    ))
    .bind(grid_type)
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(views)
}

/// Visible to `user_id`: their own views and company defaults.
async fn fetch_visible(pool: &MySqlPool, id: u64, user_id: u64) -> ApiResult<UserGridView> {
    sqlx::query_as::<_, UserGridView>(&format!("{SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .filter(|v| can_modify(v, user_id))
        .ok_or_else(|| ApiError::not_found("Grid view"))
}

async fn clear_defaults(
    tx: &mut Transaction<'_, MySql>,
    user_id: u64,
    grid_type: &str,
    personal: bool,
    company: bool,
) -> Result<(), sqlx::Error> {
    if personal {
        sqlx::query(
            "UPDATE user_grid_views SET is_default = 0, updated_at = NOW() WHERE user_id = ? AND grid_type = ? AND is_default = 1",
        )
        .bind(user_id)
        .bind(grid_type)
        .execute(&mut **tx)
        .await?;
    }
    if company {
        sqlx::query(
            "UPDATE user_grid_views SET is_company_default = 0, updated_at = NOW() WHERE grid_type = ? AND is_company_default = 1",
        )
        .bind(grid_type)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/grid-views",
    params(GridQuery),
    responses((status = 200, description = "Personal default, company default, then own views by name", body = Vec<UserGridView>)),
    tag = "Grid Views",
    security(("bearer_auth" = []))
)]
pub async fn list_views(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<GridQuery>,
) -> ApiResult<HttpResponse> {
    let mut views = visible_views(pool.get_ref(), auth.user_id, query.grid_type.trim()).await?;
    sort_views(&mut views, auth.user_id);
    Ok(HttpResponse::Ok().json(views))
}

#[utoipa::path(
    get,
    path = "/api/grid-views/default",
    params(GridQuery),
    responses((status = 200, description = "View to apply on load, or null", body = UserGridView)),
    tag = "Grid Views",
    security(("bearer_auth" = []))
)]
pub async fn default_view(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<GridQuery>,
) -> ApiResult<HttpResponse> {
    let views = visible_views(pool.get_ref(), auth.user_id, query.grid_type.trim()).await?;
    Ok(HttpResponse::Ok().json(resolve_default(&views, auth.user_id)))
}

#[utoipa::path(
    get,
    path = "/api/grid-views/{id}",
    params(("id" = u64, Path, description = "View ID")),
    responses(
        (status = 200, description = "View found", body = UserGridView),
        (status = 404, description = "View not found")
    ),
    tag = "Grid Views",
    security(("bearer_auth" = []))
)]
pub async fn get_view(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(fetch_visible(pool.get_ref(), path.into_inner(), auth.user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/grid-views",
    request_body = CreateGridView,
    responses(
        (status = 201, description = "View saved", body = UserGridView),
        (status = 403, description = "Company default requires settings permission")
    ),
    tag = "Grid Views",
    security(("bearer_auth" = []))
)]
pub async fn create_view(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateGridView>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner().normalized()?;
    if payload.is_company_default {
        ensure_company_default_allowed(&auth)?;
    }

    let config = payload
        .config
        .clone()
        .unwrap_or_else(|| Value::Object(Default::default()));

    let mut tx = pool.begin().await?;
    clear_defaults(
        &mut tx,
        auth.user_id,
        &payload.grid_type,
        payload.is_default,
        payload.is_company_default,
    )
    .await?;

    let id = sqlx::query(
        r#"
        INSERT INTO user_grid_views (user_id, grid_type, name, config, is_default, is_company_default)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(&payload.grid_type)
    .bind(&payload.name)
    .bind(Json(&config))
    .bind(payload.is_default)
    .bind(payload.is_company_default)
    .execute(&mut *tx)
    .await?
    .last_insert_id();
    tx.commit().await?;

    audit::record(
        pool.get_ref(),
        "user_grid_views",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&payload).ok(),
    )
    .await;

    Ok(HttpResponse::Created().json(fetch_visible(pool.get_ref(), id, auth.user_id).await?))
}

/// Update View
///
/// Owners may edit their own views; company defaults are editable by anyone.
#[utoipa::path(
    put,
    path = "/api/grid-views/{id}",
    params(("id" = u64, Path, description = "View ID")),
    request_body = UpdateGridView,
    responses(
        (status = 200, description = "View updated", body = UserGridView),
        (status = 404, description = "View not found")
    ),
    tag = "Grid Views",
    security(("bearer_auth" = []))
)]
pub async fn update_view(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateGridView>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    if let Some(name) = &body.name {
        require_text("name", name)?;
    }
    if body.is_company_default.is_some() {
        ensure_company_default_allowed(&auth)?;
    }

    let before = fetch_visible(pool.get_ref(), id, auth.user_id).await?;

    let mut tx = pool.begin().await?;
    clear_defaults(
        &mut tx,
        before.user_id,
        &before.grid_type,
        body.is_default == Some(true),
        body.is_company_default == Some(true),
    )
    .await?;

    sqlx::query(
        r#"
        UPDATE user_grid_views SET
            name = COALESCE(?, name),
            config = COALESCE(?, config),
            is_default = COALESCE(?, is_default),
            is_company_default = COALESCE(?, is_company_default),
            updated_at = NOW()
        WHERE id = ?
        "#,
    )
    .bind(body.name.as_deref().map(str::trim))
    .bind(body.config.as_ref().map(Json))
    .bind(body.is_default)
    .bind(body.is_company_default)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    audit::record(
        pool.get_ref(),
        "user_grid_views",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&*body).ok(),
    )
    .await;

    // a view that stopped being a company default may no longer be visible
    let after = sqlx::query_as::<_, UserGridView>(&format!("{SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_one(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(after))
}

#[utoipa::path(
    delete,
    path = "/api/grid-views/{id}",
    params(("id" = u64, Path, description = "View ID")),
    responses(
        (status = 204, description = "View deleted"),
        (status = 404, description = "View not found")
    ),
    tag = "Grid Views",
    security(("bearer_auth" = []))
)]
pub async fn delete_view(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    let before = fetch_visible(pool.get_ref(), id, auth.user_id).await?;
    if before.is_company_default && before.user_id != auth.user_id {
        ensure_company_default_allowed(&auth)?;
    }

    sqlx::query("DELETE FROM user_grid_views WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    audit::record(
        pool.get_ref(),
        "user_grid_views",
        id,
        AuditAction::Delete,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        None,
    )
    .await;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn view(id: u64, user_id: u64, name: &str, is_default: bool, company: bool) -> UserGridView {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        UserGridView {
            id,
            user_id,
            grid_type: "training-matrix".into(),
            name: name.into(),
            config: Json(json!({ "hiddenColumns": ["notes"], "custom": { "kept": true } })),
            is_default,
            is_company_default: company,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn create_payload_is_trimmed_before_use() {
        let payload: CreateGridView = serde_json::from_value(json!({
            "grid_type": "  training-matrix ",
            "name": " Night staff",
            "is_default": true
        }))
        .unwrap();
        let payload = payload.normalized().unwrap();
        assert_eq!(payload.grid_type, "training-matrix");
        assert_eq!(payload.name, "Night staff");
        assert!(payload.is_default);

        let blank: CreateGridView =
            serde_json::from_value(json!({ "grid_type": "   ", "name": "x" })).unwrap();
        assert!(matches!(blank.normalized(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn personal_default_wins_over_company_default() {
        let views = [view(1, 9, "Company", false, true), view(2, 5, "Mine", true, false)];
        assert_eq!(resolve_default(&views, 5).map(|v| v.id), Some(2));
    }

    #[test]
    fn company_default_used_without_personal_default() {
        let views = [view(1, 9, "Company", false, true), view(2, 5, "Mine", false, false)];
        assert_eq!(resolve_default(&views, 5).map(|v| v.id), Some(1));
        assert!(resolve_default(&views[1..], 5).is_none());
    }

    #[test]
    fn listing_groups_then_names() {
        let mut views = vec![
            view(1, 5, "Zeta", false, false),
            view(2, 9, "Company", false, true),
            view(3, 5, "Alpha", false, false),
            view(4, 5, "Default", true, false),
        ];
        sort_views(&mut views, 5);
        let ids: Vec<u64> = views.iter().map(|v| v.id).collect();
        assert_eq!(ids, [4, 2, 3, 1]);
    }

    #[test]
    fn only_owned_or_company_views_are_modifiable() {
        assert!(can_modify(&view(1, 5, "x", false, false), 5));
        assert!(can_modify(&view(1, 9, "x", false, true), 5));
        assert!(!can_modify(&view(1, 9, "x", true, false), 5));
    }

    #[test]
    fn config_is_preserved_verbatim() {
        let v = view(1, 5, "x", false, false);
        let out = serde_json::to_value(&v).unwrap();
        assert_eq!(out["config"]["custom"]["kept"], true);
    }
}
