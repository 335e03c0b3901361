use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

use crate::api::{
    appraisal::{AppraisalMatrixRow, AppraisalView, CreateAppraisal, UpdateAppraisal},
    audit_log::AuditLogResponse,
    employee::{CreateEmployee, EmployeeListResponse, UpdateEmployee},
    employee_status::{CreateEmployeeStatus, UpdateEmployeeStatus},
    grid_view::{CreateGridView, UpdateGridView},
    leave_request::{
        CreateLeaveRequest, LeaveBalance, LeaveListResponse, SetLeaveEntitlement, UpdateLeaveStatus,
    },
    notification::{PendingNotification, SendNotificationsResponse},
    onboarding::{CreateOnboardingItem, SetOnboardingStatus, UpdateOnboardingItem},
    reference::{CreateReference, UpdateReference},
    rota::{RotaMonth, RotaStaff, RotaSummary, SetMonthlyHours, UpdateShift, UpsertShift},
    settings::UpdateSettings,
    role::RoleView,
    supervision::{
        CreateSupervision, MatrixCell, MatrixRow, SupervisionMatrix, SupervisionStatusRow,
        SupervisionSummary, UpdateSupervision,
    },
    supervision_exception::CreateSupervisionException,
    supervision_requirement::{
        CreateSupervisionRequirement, EffectiveRequirement, UpdateSupervisionRequirement,
    },
    training_course::{CreateTrainingCourse, UpdateTrainingCourse},
    training_record::{CreateTrainingRecord, TrainingStatusRow},
    user::{CreateUser, ResetPassword, UpdateUser},
};
use crate::auth::handlers::MeResponse;
use crate::compliance::{
    appraisal::{AppraisalStatus, MilestoneType},
    supervision::{ExceptionType, MonthStatus, SupervisionStanding},
    training::TrainingStatus,
};
use crate::model::{
    appraisal::AppraisalMilestone,
    audit::AuditLogEntry,
    employee::Employee,
    employee_status::EmployeeStatus,
    grid_view::UserGridView,
    leave::{LeaveEntitlement, LeaveRequest, LeaveStatus},
    notification::{NotificationLog, NotificationType, RecipientType},
    onboarding::{OnboardingItem, OnboardingRecord, OnboardingStatus},
    reference::EmployeeReference,
    role::{Permission, Role},
    rota::{RotaMonthlyHours, Shift, ShiftType},
    settings::CompanySettings,
    supervision::{Supervision, SupervisionException, SupervisionRequirement},
    training::{TrainingCourse, TrainingRecord},
    user::User,
};
use crate::models::{ChangePasswordRequest, LoginRequest, TokenPair};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Employee Hub API",
        version = "1.0.0",
        description = r#"
## Employee Hub

HR backend for care homes: staff records, mandatory training compliance,
monthly supervisions, probation and annual appraisals, onboarding checklists,
monthly rotas, leave and expiry reminders.

### Security
All `/api` endpoints except `/api/health` need a **JWT Bearer** access token
from `/auth/login`. Writes are gated per permission; the `admin`, `manager`
and `staff` roles carry fixed permission sets (see `/api/auth/me`).

### Response Format
- JSON with snake_case fields, ISO-8601 dates, `YYYY-MM` periods
- Errors are `{"error": "<message>"}`
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,
        crate::auth::handlers::change_password,

        crate::api::health::health,

        crate::api::employee::create_employee,
        crate::api::employee::list_employees,
        crate::api::employee::list_roles,
        crate::api::employee::get_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,
        crate::api::employee::purge_employee,

        crate::api::employee_status::list_statuses,
        crate::api::employee_status::create_status,
        crate::api::employee_status::update_status,
        crate::api::employee_status::delete_status,

        crate::api::reference::list_references,
        crate::api::reference::create_reference,
        crate::api::reference::update_reference,
        crate::api::reference::delete_reference,

        crate::api::training_course::list_courses,
        crate::api::training_course::get_course,
        crate::api::training_course::create_course,
        crate::api::training_course::update_course,
        crate::api::training_course::delete_course,

        crate::api::training_record::list_records,
        crate::api::training_record::create_record,
        crate::api::training_record::delete_record,
        crate::api::training_record::status_matrix,
        crate::api::training_record::expiring,

        crate::api::supervision::list_supervisions,
        crate::api::supervision::create_supervision,
        crate::api::supervision::update_supervision,
        crate::api::supervision::delete_supervision,
        crate::api::supervision::supervision_matrix,
        crate::api::supervision::supervision_status,
        crate::api::supervision::supervision_summary,

        crate::api::supervision_exception::list_exceptions,
        crate::api::supervision_exception::create_exception,
        crate::api::supervision_exception::delete_exception,

        crate::api::supervision_requirement::list_requirements,
        crate::api::supervision_requirement::effective_requirement,
        crate::api::supervision_requirement::create_requirement,
        crate::api::supervision_requirement::update_requirement,
        crate::api::supervision_requirement::delete_requirement,

        crate::api::onboarding::list_items,
        crate::api::onboarding::create_item,
        crate::api::onboarding::update_item,
        crate::api::onboarding::delete_item,
        crate::api::onboarding::employee_records,
        crate::api::onboarding::set_status,

        crate::api::appraisal::list_appraisals,
        crate::api::appraisal::create_appraisal,
        crate::api::appraisal::update_appraisal,
        crate::api::appraisal::delete_appraisal,
        crate::api::appraisal::generate_next,
        crate::api::appraisal::appraisal_matrix,

        crate::api::rota::list_shift_types,
        crate::api::rota::get_month,
        crate::api::rota::upsert_shift,
        crate::api::rota::update_shift,
        crate::api::rota::delete_shift,
        crate::api::rota::list_monthly_hours,
        crate::api::rota::set_monthly_hours,

        crate::api::leave_request::list_requests,
        crate::api::leave_request::get_request,
        crate::api::leave_request::create_request,
        crate::api::leave_request::update_status,
        crate::api::leave_request::get_balance,
        crate::api::leave_request::set_entitlement,
        crate::api::leave_request::list_entitlements,

        crate::api::grid_view::list_views,
        crate::api::grid_view::default_view,
        crate::api::grid_view::get_view,
        crate::api::grid_view::create_view,
        crate::api::grid_view::update_view,
        crate::api::grid_view::delete_view,

        crate::api::notification::list_pending,
        crate::api::notification::send_notifications,
        crate::api::notification::list_log,
        crate::api::notification::clear_log,

        crate::api::user::list_users,
        crate::api::user::create_user,
        crate::api::user::get_user,
        crate::api::user::update_user,
        crate::api::user::reset_password,
        crate::api::role::list_account_roles,
        crate::api::role::list_permissions,

        crate::api::settings::get_settings,
        crate::api::settings::update_settings,

        crate::api::audit_log::list_audit_log
    ),
    components(
        schemas(
            LoginRequest, TokenPair, MeResponse, ChangePasswordRequest, Role, Permission, RoleView,
            Employee, CreateEmployee, UpdateEmployee, EmployeeListResponse,
            EmployeeStatus, CreateEmployeeStatus, UpdateEmployeeStatus,
            EmployeeReference, CreateReference, UpdateReference,
            TrainingCourse, CreateTrainingCourse, UpdateTrainingCourse,
            TrainingRecord, CreateTrainingRecord, TrainingStatusRow, TrainingStatus,
            Supervision, CreateSupervision, UpdateSupervision,
            SupervisionMatrix, MatrixRow, MatrixCell, MonthStatus,
            SupervisionStatusRow, SupervisionSummary, SupervisionStanding,
            SupervisionException, CreateSupervisionException, ExceptionType,
            SupervisionRequirement, CreateSupervisionRequirement, UpdateSupervisionRequirement,
            EffectiveRequirement,
            OnboardingItem, OnboardingRecord, OnboardingStatus,
            CreateOnboardingItem, UpdateOnboardingItem, SetOnboardingStatus,
            AppraisalMilestone, AppraisalView, AppraisalMatrixRow, AppraisalStatus, MilestoneType,
            CreateAppraisal, UpdateAppraisal,
            ShiftType, Shift, RotaMonthlyHours, UpsertShift, UpdateShift, SetMonthlyHours,
            RotaMonth, RotaStaff, RotaSummary,
            LeaveRequest, LeaveStatus, LeaveEntitlement, CreateLeaveRequest, UpdateLeaveStatus,
            SetLeaveEntitlement, LeaveListResponse, LeaveBalance,
            UserGridView, CreateGridView, UpdateGridView,
            PendingNotification, SendNotificationsResponse, NotificationLog,
            NotificationType, RecipientType,
            User, CreateUser, UpdateUser, ResetPassword,
            CompanySettings, UpdateSettings,
            AuditLogEntry, AuditLogResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token refresh and the current user"),
        (name = "Employee", description = "Staff records, statuses and references"),
        (name = "Training", description = "Courses, completions and compliance status"),
        (name = "Supervision", description = "Monthly supervisions, exceptions and requirements"),
        (name = "Onboarding", description = "Onboarding checklist"),
        (name = "Appraisal", description = "Probation and annual review milestones"),
        (name = "Rota", description = "Monthly staff rota"),
        (name = "Leave", description = "Leave requests, entitlements and balances"),
        (name = "Grid Views", description = "Saved table layouts"),
        (name = "Notifications", description = "Training expiry reminders"),
        (name = "Users", description = "Login accounts and fixed roles"),
        (name = "Settings", description = "Company-wide settings"),
        (name = "Audit", description = "Audit trail"),
        (name = "Health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/training-records/status",
            "/api/supervisions/matrix",
            "/api/appraisals/generate/{employee_id}",
            "/api/notifications/send",
            "/api/rota/month",
            "/api/supervisions/summary",
            "/api/auth/change-password",
            "/api/users/{id}/reset-password",
            "/api/roles",
        ] {
            assert!(doc.paths.paths.contains_key(path), "{path} missing");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
