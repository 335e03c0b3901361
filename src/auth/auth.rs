use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

use crate::error::{ApiError, ApiResult};
use crate::model::role::{Permission, Role};

/// The caller, as established by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| ApiError::Unauthorized("Authentication required".into())),
        )
    }
}

impl AuthUser {
    pub fn can(&self, permission: Permission) -> bool {
        self.role.has(permission)
    }

    pub fn require(&self, permission: Permission) -> ApiResult<()> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("Missing permission: {permission}")))
        }
    }

    pub fn require_admin(&self) -> ApiResult<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin only".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "u@example.com".into(),
            role,
            employee_id: None,
        }
    }

    #[test]
    fn permission_gate() {
        assert!(user(Role::Manager).require(Permission::EmployeesManage).is_ok());
        assert!(matches!(
            user(Role::Staff).require(Permission::EmployeesManage),
            Err(ApiError::Forbidden(_))
        ));
        assert!(user(Role::Manager).require_admin().is_err());
        assert!(user(Role::Admin).require_admin().is_ok());
    }
}
