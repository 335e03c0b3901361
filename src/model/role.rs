use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use utoipa::ToSchema;

/// Account role, stored as `users.role_id`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, AsRefStr, ToSchema)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin = 1,
    Manager = 2,
    Staff = 3,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Manager, Role::Staff];

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Manager),
            3 => Some(Role::Staff),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn has(self, permission: Permission) -> bool {
        match self {
            Role::Admin => true,
            Role::Manager => !matches!(
                permission,
                Permission::UsersManage | Permission::SettingsManage | Permission::AuditLogView
            ),
            Role::Staff => false,
        }
    }

    pub fn permissions(self) -> Vec<Permission> {
        Permission::iter().filter(|p| self.has(*p)).collect()
    }
}

/// Write and privileged-read capabilities checked per endpoint. Plain reads
/// need only a valid token.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, AsRefStr, EnumString, EnumIter, ToSchema,
)]
pub enum Permission {
    #[serde(rename = "employees.manage")]
    #[strum(serialize = "employees.manage")]
    EmployeesManage,
    #[serde(rename = "employee_statuses.manage")]
    #[strum(serialize = "employee_statuses.manage")]
    EmployeeStatusesManage,
    #[serde(rename = "training_courses.manage")]
    #[strum(serialize = "training_courses.manage")]
    TrainingCoursesManage,
    #[serde(rename = "training_records.record")]
    #[strum(serialize = "training_records.record")]
    TrainingRecordsRecord,
    #[serde(rename = "supervisions.create")]
    #[strum(serialize = "supervisions.create")]
    SupervisionsCreate,
    #[serde(rename = "supervisions.manage")]
    #[strum(serialize = "supervisions.manage")]
    SupervisionsManage,
    #[serde(rename = "onboarding.manage")]
    #[strum(serialize = "onboarding.manage")]
    OnboardingManage,
    #[serde(rename = "appraisals.manage")]
    #[strum(serialize = "appraisals.manage")]
    AppraisalsManage,
    #[serde(rename = "leave.approve")]
    #[strum(serialize = "leave.approve")]
    LeaveApprove,
    #[serde(rename = "leave.manage_entitlements")]
    #[strum(serialize = "leave.manage_entitlements")]
    LeaveManageEntitlements,
    #[serde(rename = "rotas.edit")]
    #[strum(serialize = "rotas.edit")]
    RotasEdit,
    #[serde(rename = "settings.manage")]
    #[strum(serialize = "settings.manage")]
    SettingsManage,
    #[serde(rename = "notifications.manage")]
    #[strum(serialize = "notifications.manage")]
    NotificationsManage,
    #[serde(rename = "audit_log.view")]
    #[strum(serialize = "audit_log.view")]
    AuditLogView,
    #[serde(rename = "users.manage")]
    #[strum(serialize = "users.manage")]
    UsersManage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ids_round_trip() {
        for role in Role::ALL {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(4), None);
    }

    #[test]
    fn admin_has_everything() {
        assert_eq!(Role::Admin.permissions().len(), Permission::iter().count());
    }

    #[test]
    fn manager_lacks_admin_only_permissions() {
        assert!(Role::Manager.has(Permission::LeaveApprove));
        assert!(Role::Manager.has(Permission::RotasEdit));
        assert!(!Role::Manager.has(Permission::UsersManage));
        assert!(!Role::Manager.has(Permission::SettingsManage));
        assert!(!Role::Manager.has(Permission::AuditLogView));
    }

    #[test]
    fn staff_is_read_only() {
        assert!(Role::Staff.permissions().is_empty());
    }

    #[test]
    fn permission_keys() {
        assert_eq!(Permission::LeaveManageEntitlements.as_ref(), "leave.manage_entitlements");
        assert_eq!(
            "training_records.record".parse::<Permission>().unwrap(),
            Permission::TrainingRecordsRecord
        );
    }
}
