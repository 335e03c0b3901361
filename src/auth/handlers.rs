use actix_web::{HttpRequest, HttpResponse, web};
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    api::user::{hash, revoke_sessions},
    auth::{
        auth::AuthUser,
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_token},
        password::verify_password,
    },
    config::Config,
    error::{ApiError, ApiResult},
    model::{
        audit::AuditAction,
        role::{Permission, Role},
    },
    models::{ChangePasswordRequest, Claims, LoginRequest, TokenPair, TokenType, UserCredentials},
    utils::audit,
};

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".into())
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Issue an access/refresh pair and persist the refresh token id.
async fn issue_tokens(
    pool: &MySqlPool,
    config: &Config,
    subject: &TokenSubject,
) -> ApiResult<TokenPair> {
    let access_token =
        generate_access_token(subject, config).map_err(|e| ApiError::Internal(e.into()))?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, config).map_err(|e| ApiError::Internal(e.into()))?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        expires_in: config.access_token_ttl,
    })
}

fn verified_refresh_claims(req: &HttpRequest, config: &Config) -> Option<Claims> {
    let claims = verify_token(bearer_token(req)?, config).ok()?;
    (claims.token_type == TokenType::Refresh).then_some(claims)
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(pool, config, body), fields(email = %body.email))]
pub async fn login(
    body: web::Json<LoginRequest>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    info!("Login request received");

    let email = body.email.trim().to_lowercase();
    if email.is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let user = sqlx::query_as::<_, UserCredentials>(
        r#"
        SELECT id, email, password_hash, role_id, employee_id, active
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| {
        info!("Invalid credentials: user not found");
        invalid_credentials()
    })?;

    if !user.active {
        info!(user_id = user.id, "Login refused: account disabled");
        return Err(invalid_credentials());
    }

    if let Err(e) = verify_password(&body.password, &user.password_hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(invalid_credentials());
    }

    let subject = TokenSubject {
        user_id: user.id,
        email: user.email,
        role: user.role_id,
        employee_id: user.employee_id,
    };
    let tokens = issue_tokens(pool.get_ref(), &config, &subject).await?;

    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = user.id, "Login successful");
    Ok(HttpResponse::Ok().json(tokens))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Rotated token pair", body = TokenPair),
        (status = 401, description = "Refresh token missing, invalid or revoked")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> ApiResult<HttpResponse> {
    let unauthorized = || ApiError::Unauthorized("Invalid refresh token".into());
    let claims = verified_refresh_claims(&req, &config).ok_or_else(unauthorized)?;

    // revoke first so a replayed token can only win once
    let revoked = sqlx::query(
        "UPDATE refresh_tokens SET revoked = 1 WHERE jti = ? AND revoked = 0 AND user_id = ?",
    )
    .bind(&claims.jti)
    .bind(claims.user_id)
    .execute(pool.get_ref())
    .await?;

    if revoked.rows_affected() == 0 {
        warn!(user_id = claims.user_id, "Refresh with unknown or revoked token");
        return Err(unauthorized());
    }

    // role or link may have changed since the token was issued
    let user = sqlx::query_as::<_, UserCredentials>(
        "SELECT id, email, password_hash, role_id, employee_id, active FROM users WHERE id = ?",
    )
    .bind(claims.user_id)
    .fetch_optional(pool.get_ref())
    .await?
    .filter(|u| u.active)
    .ok_or_else(unauthorized)?;

    let subject = TokenSubject {
        user_id: user.id,
        email: user.email,
        role: user.role_id,
        employee_id: user.employee_id,
    };
    let tokens = issue_tokens(pool.get_ref(), &config, &subject).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Refresh token revoked (idempotent)")),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(claims) = verified_refresh_claims(&req, &config) else {
        return HttpResponse::NoContent().finish();
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token on logout");
    }

    HttpResponse::NoContent().finish()
}

#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub user_id: u64,
    pub email: String,
    pub role: Role,
    pub employee_id: Option<u64>,
    pub permissions: Vec<Permission>,
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current user and effective permissions", body = MeResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn me(auth: AuthUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(MeResponse {
        user_id: auth.user_id,
        permissions: auth.role.permissions(),
        email: auth.email,
        role: auth.role,
        employee_id: auth.employee_id,
    }))
}

/// Check the current password and produce the hash that replaces it.
fn replacement_hash(stored_hash: &str, body: &ChangePasswordRequest) -> ApiResult<String> {
    if verify_password(&body.current_password, stored_hash).is_err() {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }
    if body.new_password == body.current_password {
        return Err(ApiError::bad_request("New password must differ from the current one"));
    }
    hash(&body.new_password)
}

#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed; other sessions revoked"),
        (status = 400, description = "Current password wrong or new password too weak"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
#[instrument(name = "auth_change_password", skip(auth, pool, body), fields(user_id = auth.user_id))]
pub async fn change_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<ChangePasswordRequest>,
) -> ApiResult<HttpResponse> {
    let user = sqlx::query_as::<_, UserCredentials>(
        "SELECT id, email, password_hash, role_id, employee_id, active FROM users WHERE id = ?",
    )
    .bind(auth.user_id)
    .fetch_optional(pool.get_ref())
    .await?
    .filter(|u| u.active)
    .ok_or_else(|| ApiError::Unauthorized("Account not found or disabled".into()))?;

    let password_hash = replacement_hash(&user.password_hash, &body)?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = NOW() WHERE id = ?")
        .bind(&password_hash)
        .bind(user.id)
        .execute(pool.get_ref())
        .await?;
    revoke_sessions(pool.get_ref(), user.id).await?;

    info!("Password changed");
    audit::record(
        pool.get_ref(),
        "users",
        user.id,
        AuditAction::Update,
        Some(user.id),
        None,
        Some(serde_json::json!({ "password_changed": true })),
    )
    .await;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Password changed successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;

    fn request(current: &str, new: &str) -> ChangePasswordRequest {
        ChangePasswordRequest {
            current_password: current.into(),
            new_password: new.into(),
        }
    }

    #[test]
    fn wrong_current_password_is_a_bad_request() {
        let stored = hash_password("Original-Pass1").unwrap();
        match replacement_hash(&stored, &request("guess", "Brand-New-Pass2")) {
            Err(ApiError::BadRequest(msg)) => assert_eq!(msg, "Current password is incorrect"),
            _ => panic!("expected bad request"),
        }
    }

    #[test]
    fn new_password_must_be_complex_and_different() {
        let stored = hash_password("Original-Pass1").unwrap();
        assert!(matches!(
            replacement_hash(&stored, &request("Original-Pass1", "weakpass")),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            replacement_hash(&stored, &request("Original-Pass1", "Original-Pass1")),
            Err(ApiError::BadRequest(_))
        ));

        let replaced = replacement_hash(&stored, &request("Original-Pass1", "Brand-New-Pass2")).unwrap();
        assert!(verify_password("Brand-New-Pass2", &replaced).is_ok());
    }
}
