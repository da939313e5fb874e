use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Full `users` row, including the password hash. Never serialised as-is.
#[derive(Debug, sqlx::FromRow)]
pub struct UserRecord {
    pub user_id: u64,
    pub username: String,
    pub password_hash: String,
    pub full_name: String,
    pub email: Option<String>,
    pub department_id: Option<u64>,
    pub role_id: u8,
    pub is_active: bool,
}

/// Public view of a user joined with its department name.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct UserProfile {
    #[schema(example = 7)]
    pub user_id: u64,
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "John Doe")]
    pub full_name: String,
    #[schema(example = "john@tmd.local", nullable = true)]
    pub email: Option<String>,
    #[schema(nullable = true)]
    pub phone_number: Option<String>,
    #[schema(nullable = true)]
    pub avatar: Option<String>,
    #[schema(nullable = true)]
    pub department_id: Option<u64>,
    #[schema(example = "Operations", nullable = true)]
    pub department_name: Option<String>,
    #[schema(example = 2)]
    pub role_id: u8,
    pub is_active: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_at: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

pub const USER_PROFILE_SELECT: &str = r#"
    SELECT u.user_id, u.username, u.full_name, u.email, u.phone_number, u.avatar,
           u.department_id, d.department_name, u.role_id, u.is_active,
           u.last_login_at, u.created_at
    FROM users u
    LEFT JOIN departments d ON d.department_id = u.department_id
"#;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct ActiveUser {
    pub user_id: u64,
    pub full_name: String,
    pub email: Option<String>,
    pub department_name: Option<String>,
}
