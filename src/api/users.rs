use crate::{
    auth::{
        auth::AuthUser,
        handlers::revoke_all_refresh_tokens,
        password::{hash_password, is_strong_enough},
    },
    error::{ApiError, db_error},
    model::{
        audit::{AUDIT_SELECT, AuditLog, PasswordReset},
        task::{ASSIGNMENT_SELECT, Assignment},
        user::{ActiveUser, USER_PROFILE_SELECT, UserProfile},
    },
    services::audit::{AuditEntry, AuditHelper, RequestMeta},
};
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct UserFilter {
    /// Matches username, full name or e-mail
    pub search: Option<String>,
    pub department_id: Option<u64>,
    pub role_id: Option<u8>,
    pub is_active: Option<bool>,
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    U8(u8),
    Bool(bool),
    Str(String),
}

#[derive(Serialize, ToSchema)]
pub struct UserDetails {
    pub profile: UserProfile,
    #[schema(example = 42)]
    pub total_logins: i64,
    #[schema(example = 3)]
    pub active_tasks: i64,
    #[schema(example = 17)]
    pub total_completed: i64,
    pub recent_activity: Vec<AuditLog>,
}

#[derive(Deserialize, ToSchema)]
pub struct ResetPasswordReq {
    pub new_password: String,
    #[schema(example = "Forgot password, verified by phone")]
    pub reason: String,
}

/// Admins may not switch their own account off.
pub fn ensure_not_self(actor_id: u64, target_id: u64) -> Result<(), ApiError> {
    if actor_id == target_id {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }
    Ok(())
}

/// Trimmed reason once both the new password and the reason pass.
pub fn validate_reset(body: &ResetPasswordReq) -> Result<&str, ApiError> {
    if !is_strong_enough(&body.new_password) {
        return Err(ApiError::bad_request("Password must be at least 6 characters"));
    }
    let reason = body.reason.trim();
    if reason.is_empty() {
        return Err(ApiError::bad_request("A reason is required"));
    }
    Ok(reason)
}

pub(crate) async fn load_profile(pool: &MySqlPool, user_id: u64) -> Result<Option<UserProfile>, ApiError> {
    sqlx::query_as::<_, UserProfile>(&format!("{USER_PROFILE_SELECT} WHERE u.user_id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to load user profile"))
}

/// List users
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserFilter),
    responses(
        (status = 200, description = "Users", body = [UserProfile]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<UserFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args: Vec<FilterValue> = Vec::new();

    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        where_sql.push_str(" AND (u.username LIKE ? OR u.full_name LIKE ? OR u.email LIKE ?)");
        let like = format!("%{search}%");
        args.push(FilterValue::Str(like.clone()));
        args.push(FilterValue::Str(like.clone()));
        args.push(FilterValue::Str(like));
    }
    if let Some(department_id) = query.department_id {
        where_sql.push_str(" AND u.department_id = ?");
        args.push(FilterValue::U64(department_id));
    }
    if let Some(role_id) = query.role_id {
        where_sql.push_str(" AND u.role_id = ?");
        args.push(FilterValue::U8(role_id));
    }
    if let Some(is_active) = query.is_active {
        where_sql.push_str(" AND u.is_active = ?");
        args.push(FilterValue::Bool(is_active));
    }

    let sql = format!("{USER_PROFILE_SELECT}{where_sql} ORDER BY u.created_at DESC");
    let mut q = sqlx::query_as::<_, UserProfile>(&sql);
    for arg in args {
        q = match arg {
            FilterValue::U64(v) => q.bind(v),
            FilterValue::U8(v) => q.bind(v),
            FilterValue::Bool(v) => q.bind(v),
            FilterValue::Str(v) => q.bind(v),
        };
    }

    let users = q
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to list users"))?;

    Ok(HttpResponse::Ok().json(users))
}

/// Active users for pickers
#[utoipa::path(
    get,
    path = "/api/users/active",
    responses((status = 200, description = "Active users", body = [ActiveUser])),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn active_users(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let users = sqlx::query_as::<_, ActiveUser>(
        r#"
        SELECT u.user_id, u.full_name, u.email, d.department_name
        FROM users u
        LEFT JOIN departments d ON d.department_id = u.department_id
        WHERE u.is_active = TRUE
        ORDER BY u.full_name
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to list active users"))?;

    Ok(HttpResponse::Ok().json(users))
}

/// User details with activity summary
#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = UserDetails),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn user_details(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let user_id = path.into_inner();

    let profile = load_profile(pool.get_ref(), user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let total_logins: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM login_history WHERE user_id = ? AND is_success = TRUE")
            .bind(user_id)
            .fetch_one(pool.get_ref())
            .await
            .map_err(db_error("Failed to count logins"))?;

    let (active_tasks, total_completed): (i64, i64) = sqlx::query_as(
        r#"
        SELECT CAST(COUNT(*) AS SIGNED), CAST(COALESCE(SUM(ut.completed_this_week), 0) AS SIGNED)
        FROM user_tasks ut
        JOIN tasks t ON t.task_id = ut.task_id
        WHERE ut.user_id = ? AND t.is_active = TRUE AND t.is_deleted = FALSE
        "#,
    )
    .bind(user_id)
    .fetch_one(pool.get_ref())
    .await
    .map_err(db_error("Failed to summarise tasks"))?;

    let recent_activity = sqlx::query_as::<_, AuditLog>(&format!(
        "{AUDIT_SELECT} WHERE a.user_id = ? ORDER BY a.timestamp DESC LIMIT 5"
    ))
    .bind(user_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to load recent activity"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log_view(auth.user_id, "User", Some(user_id), format!("Viewed details of {}", profile.username))
        .await;

    Ok(HttpResponse::Ok().json(UserDetails {
        profile,
        total_logins,
        active_tasks,
        total_completed,
        recent_activity,
    }))
}

/// Activate / deactivate a user
#[utoipa::path(
    put,
    path = "/api/users/{user_id}/toggle-status",
    params(("user_id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "Status toggled", body = Object, example = json!({"message": "User deactivated", "is_active": false})),
        (status = 400, description = "Cannot deactivate own account"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn toggle_user_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let user_id = path.into_inner();
    let audit = AuditHelper::new(pool.get_ref(), &meta);

    if let Err(e) = ensure_not_self(auth.user_id, user_id) {
        audit
            .log_failed_attempt(Some(auth.user_id), "UPDATE", "User", "Attempted to deactivate own account")
            .await;
        return Err(e.into());
    }

    let current: bool = sqlx::query_scalar("SELECT is_active FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(db_error("Failed to load user"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let next = !current;

    sqlx::query("UPDATE users SET is_active = ?, updated_at = NOW() WHERE user_id = ?")
        .bind(next)
        .bind(user_id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to toggle user status"))?;

    if !next {
        if let Err(e) = revoke_all_refresh_tokens(pool.get_ref(), user_id).await {
            tracing::error!(error = %e, user_id, "Failed to revoke tokens of deactivated user");
        }
    }

    let verb = if next { "activated" } else { "deactivated" };
    audit
        .log(
            AuditEntry::new("UPDATE", "User")
                .by(auth.user_id)
                .entity(user_id)
                .old(json!({ "is_active": current }))
                .new_values(json!({ "is_active": next }))
                .describe(format!("User {verb}")),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": format!("User {verb}"), "is_active": next })))
}

/// Admin password reset
#[utoipa::path(
    put,
    path = "/api/users/{user_id}/reset-password",
    params(("user_id" = u64, Path, description = "User ID")),
    request_body = ResetPasswordReq,
    responses(
        (status = 200, description = "Password reset"),
        (status = 400, description = "Password too short or reason missing"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn reset_user_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<ResetPasswordReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let user_id = path.into_inner();

    let reason = validate_reset(&body)?;

    let old_hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(db_error("Failed to load user"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let new_hash = hash_password(&body.new_password).map_err(|e| {
        tracing::error!(error = %e, "Failed to hash password");
        ApiError::Internal
    })?;

    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = NOW() WHERE user_id = ?")
        .bind(&new_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to reset password"))?;
    sqlx::query(
        r#"
        INSERT INTO password_reset_history (user_id, reset_by_user_id, old_password_hash, reset_reason, ip_address)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(auth.user_id)
    .bind(&old_hash)
    .bind(reason)
    .bind(&meta.ip_address)
    .execute(&mut *tx)
    .await
    .map_err(db_error("Failed to write password history"))?;
    tx.commit().await.map_err(db_error("Failed to commit password reset"))?;

    if let Err(e) = revoke_all_refresh_tokens(pool.get_ref(), user_id).await {
        tracing::error!(error = %e, user_id, "Failed to revoke refresh tokens");
    }

    AuditHelper::new(pool.get_ref(), &meta)
        .log_detailed(
            AuditEntry::new("PASSWORD_RESET", "User")
                .by(auth.user_id)
                .entity(user_id)
                .describe("Password reset by administrator"),
            json!({ "reason": reason }),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Password reset successfully" })))
}

/// Tasks assigned to a user
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/tasks",
    params(("user_id" = u64, Path, description = "User ID")),
    responses((status = 200, description = "Assignments", body = [Assignment])),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn user_tasks(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let user_id = path.into_inner();

    let tasks = sqlx::query_as::<_, Assignment>(&format!(
        "{ASSIGNMENT_SELECT} WHERE ut.user_id = ? ORDER BY t.deadline IS NULL, t.deadline"
    ))
    .bind(user_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to load user tasks"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log_view(auth.user_id, "UserTask", Some(user_id), format!("Viewed tasks of user {user_id}"))
        .await;

    Ok(HttpResponse::Ok().json(tasks))
}

/// Password reset history
#[utoipa::path(
    get,
    path = "/api/users/password-resets",
    responses((status = 200, description = "Most recent resets", body = [PasswordReset])),
    security(("bearer_auth" = [])),
    tag = "Users"
)]
pub async fn password_reset_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let history = sqlx::query_as::<_, PasswordReset>(
        r#"
        SELECT p.reset_id, p.user_id, u.username, p.reset_by_user_id, r.username AS reset_by_username,
               p.reset_reason, p.ip_address, p.reset_time
        FROM password_reset_history p
        JOIN users u ON u.user_id = p.user_id
        LEFT JOIN users r ON r.user_id = p.reset_by_user_id
        ORDER BY p.reset_time DESC
        LIMIT 200
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to load password reset history"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log_view(auth.user_id, "PasswordResetHistory", None, "Viewed password reset history")
        .await;

    Ok(HttpResponse::Ok().json(history))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset(password: &str, reason: &str) -> ResetPasswordReq {
        ResetPasswordReq { new_password: password.into(), reason: reason.into() }
    }

    #[test]
    fn admin_cannot_toggle_own_account() {
        assert!(matches!(ensure_not_self(4, 4), Err(ApiError::BadRequest(_))));
        assert!(ensure_not_self(4, 9).is_ok());
    }

    #[test]
    fn reset_needs_strong_password_and_reason() {
        assert_eq!(validate_reset(&reset("secret1", "  called helpdesk ")).unwrap(), "called helpdesk");
        assert!(validate_reset(&reset("12345", "lost it")).is_err());
        assert!(validate_reset(&reset("secret1", "   ")).is_err());
    }
}
