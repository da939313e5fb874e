use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AuditLog {
    pub audit_log_id: u64,
    pub user_id: Option<u64>,
    pub username: Option<String>,
    #[schema(example = "UPDATE")]
    pub action: String,
    #[schema(example = "Task")]
    pub entity_name: String,
    pub entity_id: Option<u64>,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub additional_info: Option<String>,
    pub description: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub is_success: bool,
    #[schema(value_type = String, format = "date-time")]
    pub timestamp: NaiveDateTime,
}

pub const AUDIT_SELECT: &str = r#"
    SELECT a.audit_log_id, a.user_id, u.username, a.action, a.entity_name, a.entity_id,
           a.old_values, a.new_values, a.additional_info, a.description, a.ip_address,
           a.user_agent, a.is_success, a.timestamp
    FROM audit_logs a
    LEFT JOIN users u ON u.user_id = a.user_id
"#;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct LoginHistory {
    pub login_history_id: u64,
    pub user_id: Option<u64>,
    pub username: String,
    #[schema(value_type = String, format = "date-time")]
    pub login_time: NaiveDateTime,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub logout_time: Option<NaiveDateTime>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub device: Option<String>,
    pub is_success: bool,
    pub fail_reason: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct PasswordReset {
    pub reset_id: u64,
    pub user_id: u64,
    pub username: String,
    pub reset_by_user_id: Option<u64>,
    pub reset_by_username: Option<String>,
    pub reset_reason: Option<String>,
    pub ip_address: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub reset_time: NaiveDateTime,
}

pub const LOGIN_SELECT: &str = r#"
    SELECT login_history_id, user_id, username, login_time, logout_time, ip_address,
           user_agent, browser, device, is_success, fail_reason
    FROM login_history
"#;
