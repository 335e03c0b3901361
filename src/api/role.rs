use actix_web::HttpResponse;
use serde::Serialize;
use strum::IntoEnumIterator;
use utoipa::ToSchema;

use crate::{
    auth::auth::AuthUser,
    error::ApiResult,
    model::role::{Permission, Role},
};

/// Roles are fixed in code; this only describes them.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoleView {
    pub id: u8,
    pub name: Role,
    pub permissions: Vec<Permission>,
}

fn role_views() -> Vec<RoleView> {
    Role::ALL
        .into_iter()
        .map(|role| RoleView {
            id: role.id(),
            name: role,
            permissions: role.permissions(),
        })
        .collect()
}

#[utoipa::path(
    get,
    path = "/api/roles",
    responses((status = 200, description = "Every role with its permissions", body = Vec<RoleView>)),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn list_account_roles(_auth: AuthUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(role_views()))
}

#[utoipa::path(
    get,
    path = "/api/roles/permissions",
    responses((status = 200, description = "All permission keys", body = Vec<Permission>)),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn list_permissions(_auth: AuthUser) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(Permission::iter().collect::<Vec<_>>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_with_their_permission_keys() {
        let json = serde_json::to_value(role_views()).unwrap();
        assert_eq!(json[0]["id"], 1);
        assert_eq!(json[0]["name"], "admin");
        assert_eq!(
            json[0]["permissions"].as_array().unwrap().len(),
            Permission::iter().count()
        );
        assert!(json[1]["permissions"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("leave.approve")));
        assert_eq!(json[2]["name"], "staff");
        assert!(json[2]["permissions"].as_array().unwrap().is_empty());
    }
}
