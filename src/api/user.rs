use actix_web::{HttpResponse, web};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    api::{ensure_exists, require_text},
    auth::{
        auth::AuthUser,
        password::{hash_password, password_problem},
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        audit::AuditAction,
        role::{Permission, Role},
        user::{USER_SELECT, User},
    },
    utils::{
        audit,
        db_utils::{build_update_sql, execute_update},
    },
};

#[derive(Deserialize, ToSchema)]
pub struct CreateUser {
    #[schema(format = "email")]
    pub email: String,
    pub password: String,
    pub display_name: String,
    #[schema(example = 3)]
    pub role_id: u8,
    pub employee_id: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Replaces the password when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

const UPDATABLE: &[&str] = &["display_name", "role_id", "employee_id", "active", "password_hash"];

#[derive(Deserialize, ToSchema)]
pub struct ResetPassword {
    pub new_password: String,
}

/// Validate complexity, then hash.
pub(crate) fn hash(password: &str) -> ApiResult<String> {
    if let Some(problem) = password_problem(password) {
        return Err(ApiError::bad_request(problem));
    }
    hash_password(password).map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

fn validate_role(role_id: u8) -> ApiResult<Role> {
    Role::from_id(role_id).ok_or_else(|| ApiError::bad_request(format!("Unknown role_id {role_id}")))
}

async fn fetch_user(pool: &MySqlPool, id: u64) -> ApiResult<User> {
    sqlx::query_as::<_, User>(&format!("{USER_SELECT} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))
}

pub(crate) async fn revoke_sessions(pool: &MySqlPool, user_id: u64) -> ApiResult<()> {
    sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE user_id = ? AND revoked = 0")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "All login accounts", body = Vec<User>)),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn list_users(auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    auth.require(Permission::UsersManage)?;

    let users = sqlx::query_as::<_, User>(&format!("{USER_SELECT} ORDER BY email"))
        .fetch_all(pool.get_ref())
        .await?;
    Ok(HttpResponse::Ok().json(users))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "One login account", body = User),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::UsersManage)?;
    let user = fetch_user(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid role, email or password"),
        (status = 409, description = "Email already in use")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<CreateUser>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::UsersManage)?;

    let email = body.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    require_text("display_name", &body.display_name)?;
    validate_role(body.role_id)?;
    if let Some(employee_id) = body.employee_id {
        ensure_exists(pool.get_ref(), "employees", employee_id, "Employee").await?;
    }
    let password_hash = hash(&body.password)?;

    let id = sqlx::query(
        r#"
        INSERT INTO users (email, password_hash, display_name, role_id, employee_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(body.display_name.trim())
    .bind(body.role_id)
    .bind(body.employee_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict(format!("A user with email {email} already exists")),
        other => other,
    })?
    .last_insert_id();

    let user = fetch_user(pool.get_ref(), id).await?;
    info!(user_id = id, role_id = body.role_id, "User created");
    audit::record(
        pool.get_ref(),
        "users",
        id,
        AuditAction::Insert,
        Some(auth.user_id),
        None,
        serde_json::to_value(&user).ok(),
    )
    .await;

    Ok(HttpResponse::Created().json(user))
}

/// Turn an update body into a column patch, hashing any new password.
fn update_patch(body: &UpdateUser) -> ApiResult<serde_json::Value> {
    if let Some(role_id) = body.role_id {
        validate_role(role_id)?;
    }
    if let Some(name) = &body.display_name {
        require_text("display_name", name)?;
    }

    let mut patch = serde_json::to_value(body).map_err(|e| ApiError::Internal(e.into()))?;
    if let Some(obj) = patch.as_object_mut() {
        if let Some(password) = obj.remove("password") {
            let plain = password.as_str().unwrap_or_default();
            obj.insert("password_hash".into(), hash(plain)?.into());
        }
    }
    Ok(patch)
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    request_body = UpdateUser,
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "Updated user", body = User),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateUser>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::UsersManage)?;
    let id = path.into_inner();

    if id == auth.user_id && (body.active == Some(false) || body.role_id.is_some_and(|r| r != Role::Admin.id())) {
        return Err(ApiError::bad_request("You cannot demote or deactivate your own account"));
    }

    let before = fetch_user(pool.get_ref(), id).await?;
    if let Some(employee_id) = body.employee_id {
        ensure_exists(pool.get_ref(), "employees", employee_id, "Employee").await?;
    }

    let patch = update_patch(&body)?;
    let update = build_update_sql("users", &patch, UPDATABLE, "id", id, true)?;
    execute_update(pool.get_ref(), update).await?;

    // a role change, deactivation or new password ends existing sessions
    if body.active == Some(false) || body.role_id.is_some() || body.password.is_some() {
        revoke_sessions(pool.get_ref(), id).await?;
    }

    let after = fetch_user(pool.get_ref(), id).await?;
    info!(user_id = id, "User updated");
    audit::record(
        pool.get_ref(),
        "users",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&after).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(after))
}

#[utoipa::path(
    post,
    path = "/api/users/{id}/reset-password",
    request_body = ResetPassword,
    params(("id" = u64, Path, description = "User id")),
    responses(
        (status = 200, description = "Password replaced and sessions revoked"),
        (status = 400, description = "Password does not meet complexity rules"),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn reset_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<ResetPassword>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::UsersManage)?;
    let id = path.into_inner();
    let password_hash = hash(&body.new_password)?;

    let updated = sqlx::query("UPDATE users SET password_hash = ?, updated_at = NOW() WHERE id = ?")
        .bind(&password_hash)
        .bind(id)
        .execute(pool.get_ref())
        .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::not_found("User"));
    }
    revoke_sessions(pool.get_ref(), id).await?;

    info!(user_id = id, reset_by = auth.user_id, "Password reset");
    audit::record(
        pool.get_ref(),
        "users",
        id,
        AuditAction::Update,
        Some(auth.user_id),
        None,
        Some(serde_json::json!({ "password_reset": true })),
    )
    .await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Password reset successfully" })))
}

/// Create the configured admin account when no users exist yet.
pub async fn ensure_bootstrap_admin(pool: &MySqlPool, config: &Config) -> anyhow::Result<()> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await
        .context("counting users")?;
    if count > 0 {
        return Ok(());
    }

    let Some(admin) = &config.bootstrap_admin else {
        warn!("No users exist and BOOTSTRAP_ADMIN_EMAIL/BOOTSTRAP_ADMIN_PASSWORD are unset");
        return Ok(());
    };

    let password_hash = hash_password(&admin.password)
        .map_err(|e| anyhow::anyhow!("hashing bootstrap admin password: {e}"))?;
    sqlx::query(
        "INSERT INTO users (email, password_hash, display_name, role_id) VALUES (?, ?, 'Administrator', ?)",
    )
    .bind(admin.email.trim().to_lowercase())
    .bind(password_hash)
    .bind(Role::Admin.id())
    .execute(pool)
    .await
    .context("creating bootstrap admin")?;

    info!(email = %admin.email, "Bootstrap admin created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;

    #[test]
    fn password_is_hashed_into_patch() {
        let body = UpdateUser {
            password: Some("A-long-passw0rd".into()),
            active: Some(true),
            ..Default::default()
        };
        let patch = update_patch(&body).unwrap();
        let obj = patch.as_object().unwrap();
        assert!(!obj.contains_key("password"));
        let hash = obj["password_hash"].as_str().unwrap();
        assert!(verify_password("A-long-passw0rd", hash).is_ok());
        assert_eq!(obj["active"], true);
    }

    #[test]
    fn short_passwords_are_rejected() {
        let body = UpdateUser {
            password: Some("short".into()),
            ..Default::default()
        };
        assert!(matches!(update_patch(&body), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn weak_passwords_name_the_missing_character_class() {
        match hash("alllowercase1") {
            Err(ApiError::BadRequest(msg)) => assert!(msg.contains("uppercase"), "{msg}"),
            _ => panic!("expected a complexity error"),
        }
        let hashed = hash("Reset-Me-2026").unwrap();
        assert!(verify_password("Reset-Me-2026", &hashed).is_ok());
    }

    #[test]
    fn unknown_roles_are_rejected() {
        let body = UpdateUser {
            role_id: Some(9),
            ..Default::default()
        };
        assert!(update_patch(&body).is_err());
        assert_eq!(validate_role(2).unwrap(), Role::Manager);
    }
}
