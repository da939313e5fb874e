use crate::api::{
    attendance::{AttendanceMarkReq, AttendanceReport},
    audit::AuditLogResponse,
    dashboard::{AdminDashboard, LateComer, Performer, StaffDashboard, TaskStats, UserTotals},
    departments::{AnnouncementReq, DepartmentDetails, DepartmentReq},
    late_request::CreateLate,
    layouts::{LayoutContent, SaveLayoutReq},
    leave_request::CreateLeave,
    overtime_request::CreateOvertime,
    paging::{AttendancePage, LatePage, LeavePage, OvertimePage},
    payroll::{RecalculateReq, RecalculateResponse},
    profile::MyDepartment,
    requests::{PendingCounts, ReviewPayload},
    settings::{BatchSettingsReq, SettingValueReq},
    tasks::{MyTasksSummary, ProgressReq, TaskDetails, TaskListResponse, TaskProgress, TaskReq, TaskRow, TaskTotals},
    users::{ResetPasswordReq, UserDetails},
};
use crate::model::{
    attendance::{Attendance, AttendanceStats, AttendanceWithUser},
    audit::{AuditLog, LoginHistory, PasswordReset},
    department::{Department, DepartmentOverview},
    payroll::Payroll,
    request::{LateRequest, LeaveRequest, LeaveType, OvertimeRequest, RequestKind, RequestStatus},
    role::Role,
    setting::{SettingCategory, SettingDataType, SystemSetting},
    task::{Assignment, Priority, Task, TaskStatus},
    user::{ActiveUser, UserProfile},
};
use crate::models::{ChangePasswordReqDto, LoginReqDto, LoginResponse, RefreshReqDto, RegisterReqDto, TokenPair};
use crate::services::{
    layouts::{LayoutBackup, LayoutKind},
    payroll::SalaryBreakdown,
    settings::CustomAssets,
};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TMD System API",
        version = "1.0.0",
        description = r#"
## TMD System

Back office for a field team: staff check in and out with a geotagged photo,
work through weekly task targets and file leave, overtime and late-arrival
requests; admins review requests, manage users and departments, recalculate
payroll and tune the system through runtime settings.

### Key Features
- **Accounts**: JWT access/refresh tokens, login history, password resets
- **Attendance**: check-in window, geofence flag, late and early-leave tracking
- **Tasks**: weekly targets per assignee with progress reporting
- **Requests**: leave / overtime / late with approval and automatic rejection
- **Payroll**: monthly salary with late, unpaid-leave and overtime adjustments
- **Settings & layouts**: runtime configuration, custom CSS/JS, layout backups
- **Audit**: every state change and sensitive view is recorded
- **Notifications**: Server-Sent Events at `/api/notifications/stream`

### Security
Everything except `/auth/login`, `/auth/refresh` and `/auth/logout` needs a
**Bearer** access token. Admin-only operations answer `403` to staff.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::register,
        crate::auth::handlers::change_password,

        crate::api::users::list_users,
        crate::api::users::active_users,
        crate::api::users::user_details,
        crate::api::users::toggle_user_status,
        crate::api::users::reset_user_password,
        crate::api::users::user_tasks,
        crate::api::users::password_reset_history,

        crate::api::departments::list_departments,
        crate::api::departments::department_details,
        crate::api::departments::create_department,
        crate::api::departments::update_department,
        crate::api::departments::toggle_department,
        crate::api::departments::delete_department,
        crate::api::departments::announce,

        crate::api::tasks::list_tasks,
        crate::api::tasks::create_task,
        crate::api::tasks::update_task,
        crate::api::tasks::delete_task,
        crate::api::tasks::toggle_task,
        crate::api::tasks::task_details,
        crate::api::tasks::my_tasks,
        crate::api::tasks::my_tasks_summary,
        crate::api::tasks::task_detail,
        crate::api::tasks::update_progress,

        crate::api::attendance::today,
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::my_history,
        crate::api::attendance::list_by_date,
        crate::api::attendance::attendance_report,
        crate::api::attendance::reverse_geocode,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::my_leaves,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,

        crate::api::overtime_request::create_overtime,
        crate::api::overtime_request::my_overtime,
        crate::api::overtime_request::overtime_list,
        crate::api::overtime_request::get_overtime,
        crate::api::overtime_request::approve_overtime,
        crate::api::overtime_request::reject_overtime,

        crate::api::late_request::create_late,
        crate::api::late_request::my_late,
        crate::api::late_request::late_list,
        crate::api::late_request::get_late,
        crate::api::late_request::approve_late,
        crate::api::late_request::reject_late,

        crate::api::requests::pending_counts,

        crate::api::payroll::list_payrolls,
        crate::api::payroll::recalculate_payroll,
        crate::api::payroll::my_payroll,

        crate::api::settings::list_settings,
        crate::api::settings::get_setting,
        crate::api::settings::export_settings,
        crate::api::settings::custom_assets,
        crate::api::settings::update_setting,
        crate::api::settings::batch_update,
        crate::api::settings::delete_setting,
        crate::api::settings::reset_settings,
        crate::api::settings::import_settings,

        crate::api::layouts::get_layout,
        crate::api::layouts::save_layout,
        crate::api::layouts::list_backups,
        crate::api::layouts::get_backup,
        crate::api::layouts::restore_backup,
        crate::api::layouts::delete_backup,

        crate::api::audit::audit_logs,
        crate::api::audit::login_history,
        crate::api::audit::my_logins,

        crate::api::dashboard::admin_dashboard,
        crate::api::dashboard::staff_dashboard,

        crate::api::profile::my_profile,
        crate::api::profile::update_profile,
        crate::api::profile::my_department,

        crate::api::notifications::stream_notifications
    ),
    components(
        schemas(
            LoginReqDto, LoginResponse, RefreshReqDto, TokenPair, RegisterReqDto, ChangePasswordReqDto,
            Role, UserProfile, ActiveUser, UserDetails, ResetPasswordReq, PasswordReset,
            Department, DepartmentOverview, DepartmentReq, DepartmentDetails, AnnouncementReq, MyDepartment,
            Task, Assignment, Priority, TaskStatus, TaskReq, TaskRow, TaskTotals, TaskListResponse,
            TaskProgress, TaskDetails, MyTasksSummary, ProgressReq,
            Attendance, AttendanceWithUser, AttendanceStats, AttendanceMarkReq, AttendanceReport, AttendancePage,
            RequestStatus, RequestKind, LeaveType, LeaveRequest, OvertimeRequest, LateRequest,
            CreateLeave, CreateOvertime, CreateLate, ReviewPayload, PendingCounts,
            LeavePage, OvertimePage, LatePage,
            Payroll, SalaryBreakdown, RecalculateReq, RecalculateResponse,
            SystemSetting, SettingDataType, SettingCategory, SettingValueReq, BatchSettingsReq, CustomAssets,
            LayoutKind, LayoutBackup, LayoutContent, SaveLayoutReq,
            AuditLog, LoginHistory, AuditLogResponse,
            AdminDashboard, StaffDashboard, UserTotals, TaskStats, Performer, LateComer
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, tokens and account password"),
        (name = "Users", description = "User administration"),
        (name = "Departments", description = "Department administration and announcements"),
        (name = "Tasks", description = "Weekly task targets and progress"),
        (name = "Attendance", description = "Photo and location check-in / check-out"),
        (name = "Leave", description = "Leave requests"),
        (name = "Overtime", description = "Overtime requests"),
        (name = "Late", description = "Late-arrival requests"),
        (name = "Requests", description = "Cross-request counters"),
        (name = "Payroll", description = "Monthly salary calculation"),
        (name = "Settings", description = "Runtime system settings"),
        (name = "Layouts", description = "Layout files and backups"),
        (name = "Audit", description = "Audit trail and login history"),
        (name = "Dashboard", description = "Admin and staff overviews"),
        (name = "Profile", description = "Self-service profile"),
        (name = "Notifications", description = "Server-Sent Events"),
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
    fn documents_bearer_scheme_and_paths() {
        let doc = ApiDoc::openapi();
        let components = doc.components.as_ref().unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(doc.paths.paths.contains_key("/auth/login"));
        assert!(doc.paths.paths.contains_key("/api/notifications/stream"));
        assert!(doc.paths.paths.contains_key("/api/leave-requests/{request_id}/approve"));
    }
}
