use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::{audit::AuditAction, role::Permission},
    utils::{
        audit,
        db_utils::{build_update_from, execute_update},
        settings_cache,
    },
};

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_expiry_warning_days: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_notification_days_before: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_reminder_frequency_days: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_notify_employee: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_notify_admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervision_months_back: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervision_months_forward: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appraisal_reviews_back: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appraisal_reviews_forward: Option<i32>,
}

const UPDATABLE: &[&str] = &[
    "company_name",
    "default_expiry_warning_days",
    "default_notification_days_before",
    "default_reminder_frequency_days",
    "default_notify_employee",
    "default_notify_admin",
    "supervision_months_back",
    "supervision_months_forward",
    "appraisal_reviews_back",
    "appraisal_reviews_forward",
];

const SETTINGS_ROW: u64 = 1;

fn validate(body: &UpdateSettings) -> ApiResult<()> {
    let bounded = [
        ("default_expiry_warning_days", body.default_expiry_warning_days, 0, 365),
        ("default_notification_days_before", body.default_notification_days_before, 0, 365),
        ("default_reminder_frequency_days", body.default_reminder_frequency_days, 1, 365),
        ("supervision_months_back", body.supervision_months_back, 0, 36),
        ("supervision_months_forward", body.supervision_months_forward, 0, 36),
        ("appraisal_reviews_back", body.appraisal_reviews_back, 0, 20),
        ("appraisal_reviews_forward", body.appraisal_reviews_forward, 0, 20),
    ];
    for (field, value, min, max) in bounded {
        if let Some(v) = value {
            if !(min..=max).contains(&v) {
                return Err(ApiError::bad_request(format!(
                    "{field} must be between {min} and {max}"
                )));
            }
        }
    }
    if body.company_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::bad_request("company_name cannot be blank"));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/settings",
    responses((status = 200, description = "Company settings", body = crate::model::settings::CompanySettings)),
    tag = "Settings",
    security(("bearer_auth" = []))
)]
pub async fn get_settings(_auth: AuthUser, pool: web::Data<MySqlPool>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(settings_cache::get(pool.get_ref()).await?))
}

#[utoipa::path(
    put,
    path = "/api/settings",
    request_body = UpdateSettings,
    responses(
        (status = 200, description = "Updated settings", body = crate::model::settings::CompanySettings),
        (status = 400, description = "Value out of range"),
        (status = 403, description = "Missing settings.manage")
    ),
    tag = "Settings",
    security(("bearer_auth" = []))
)]
pub async fn update_settings(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<UpdateSettings>,
) -> ApiResult<HttpResponse> {
    auth.require(Permission::SettingsManage)?;
    validate(&body)?;

    let before = settings_cache::get(pool.get_ref()).await?;
    let update = build_update_from("company_settings", &*body, UPDATABLE, SETTINGS_ROW, false)?;
    execute_update(pool.get_ref(), update).await?;
    settings_cache::invalidate().await;

    let after = settings_cache::get(pool.get_ref()).await?;
    info!(user_id = auth.user_id, "Company settings updated");
    audit::record(
        pool.get_ref(),
        "company_settings",
        SETTINGS_ROW,
        AuditAction::Update,
        Some(auth.user_id),
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&*body).ok(),
    )
    .await;

    Ok(HttpResponse::Ok().json(after))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_partial_in_range_update() {
        let body = UpdateSettings {
            supervision_months_back: Some(12),
            default_notify_admin: Some(false),
            ..Default::default()
        };
        assert!(validate(&body).is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let body = UpdateSettings {
            default_reminder_frequency_days: Some(0),
            ..Default::default()
        };
        assert!(matches!(validate(&body), Err(ApiError::BadRequest(_))));

        let body = UpdateSettings {
            appraisal_reviews_forward: Some(21),
            ..Default::default()
        };
        assert!(validate(&body).is_err());
    }

    #[test]
    fn rejects_blank_company_name() {
        let body = UpdateSettings {
            company_name: Some("  ".into()),
            ..Default::default()
        };
        assert!(validate(&body).is_err());
    }
}
