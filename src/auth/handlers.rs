use crate::{
    auth::{
        auth::AuthUser,
        jwt::{TokenSubject, generate_access_token, generate_refresh_token, verify_refresh_token},
        password::{hash_password, is_strong_enough, verify_password},
    },
    config::Config,
    error::{ApiError, ApiResult, db_error, is_duplicate_key},
    model::{role::Role, user::UserRecord},
    models::{ChangePasswordReqDto, LoginReqDto, LoginResponse, RefreshReqDto, RegisterReqDto, TokenPair},
    services::audit::{AuditEntry, AuditHelper, RequestMeta},
    utils::{
        identity_filter::{self, Identity},
        user_agent,
    },
};
use actix_web::{HttpResponse, Responder, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

const USER_RECORD_SELECT: &str = r#"
    SELECT user_id, username, password_hash, full_name, email, department_id, role_id, is_active
    FROM users
"#;

/* =========================
Identity availability
========================= */

/// true  => AVAILABLE
/// false => TAKEN
pub async fn is_identity_available(identity: Identity<'_>, pool: &MySqlPool, exclude_user: Option<u64>) -> ApiResult<bool> {
    // Cuckoo filter: fast negative
    if !identity_filter::might_exist(identity) {
        return Ok(true);
    }

    let (sql, value) = match identity {
        Identity::Username(u) => ("SELECT COUNT(*) FROM users WHERE username = ? AND user_id <> ?", u),
        Identity::Email(e) => ("SELECT COUNT(*) FROM users WHERE email = ? AND user_id <> ?", e),
    };

    let count: i64 = sqlx::query_scalar(sql)
        .bind(value.trim())
        .bind(exclude_user.unwrap_or(0))
        .fetch_one(pool)
        .await
        .map_err(db_error("Failed to check identity availability"))?;

    Ok(count == 0)
}

async fn record_login(
    pool: &MySqlPool,
    meta: &RequestMeta,
    user_id: Option<u64>,
    username: &str,
    fail_reason: Option<&str>,
) {
    let ua = meta.user_agent.as_deref().unwrap_or_default();
    if let Err(e) = sqlx::query(
        r#"
        INSERT INTO login_history
            (user_id, username, login_time, ip_address, user_agent, browser, device, is_success, fail_reason)
        VALUES (?, ?, NOW(), ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(username)
    .bind(&meta.ip_address)
    .bind(&meta.user_agent)
    .bind(user_agent::browser(ua))
    .bind(user_agent::device(ua))
    .bind(fail_reason.is_none())
    .bind(fail_reason)
    .execute(pool)
    .await
    {
        error!(error = %e, "Failed to write login history");
    }
}

async fn store_refresh_token(pool: &MySqlPool, user_id: u64, jti: &str, exp: usize) -> ApiResult<()> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user_id)
    .bind(jti)
    .bind(exp as i64)
    .execute(pool)
    .await
    .map_err(db_error("Failed to store refresh token"))?;
    Ok(())
}

/// Revokes every refresh token of a user (password change/reset).
pub async fn revoke_all_refresh_tokens(pool: &MySqlPool, user_id: u64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ? AND revoked = FALSE")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

fn issue_pair(subject: &TokenSubject, config: &Config) -> ApiResult<(String, String, crate::models::Claims)> {
    let access = generate_access_token(subject, &config.jwt_secret, config.access_token_ttl).map_err(|e| {
        error!(error = %e, "Failed to sign access token");
        ApiError::Internal
    })?;
    let (refresh, claims) = generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl)
        .map_err(|e| {
            error!(error = %e, "Failed to sign refresh token");
            ApiError::Internal
        })?;
    Ok((access, refresh, claims))
}

/* =========================
Login
========================= */
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Username or password missing"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account locked")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user, meta),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    info!("Login request received");
    let audit = AuditHelper::new(pool.get_ref(), &meta);
    let username = user.username.trim();

    // 1️⃣ Basic validation
    if username.is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return Err(ApiError::bad_request("Username and password are required").into());
    }

    // 2️⃣ Fetch user
    debug!("Fetching user from database");
    let db_user = sqlx::query_as::<_, UserRecord>(&format!("{USER_RECORD_SELECT} WHERE username = ?"))
        .bind(username)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(db_error("Database error while fetching user"))?;

    let Some(db_user) = db_user else {
        info!("Invalid credentials: user not found");
        record_login(pool.get_ref(), &meta, None, username, Some("User not found")).await;
        audit.log_failed_attempt(None, "LOGIN", "User", "Unknown username").await;
        return Err(ApiError::Unauthorized("Invalid username or password".into()).into());
    };

    // 3️⃣ Verify password
    let password_ok = verify_password(&user.password, &db_user.password_hash).map_err(|e| {
        error!(error = %e, user_id = db_user.user_id, "Stored password hash is malformed");
        ApiError::Internal
    })?;
    if !password_ok {
        info!(user_id = db_user.user_id, "Invalid credentials: password mismatch");
        record_login(pool.get_ref(), &meta, Some(db_user.user_id), username, Some("Wrong password")).await;
        audit
            .log_failed_attempt(Some(db_user.user_id), "LOGIN", "User", "Wrong password")
            .await;
        return Err(ApiError::Unauthorized("Invalid username or password".into()).into());
    }

    // 4️⃣ Active check
    if !db_user.is_active {
        info!(user_id = db_user.user_id, "Login refused: account locked");
        record_login(pool.get_ref(), &meta, Some(db_user.user_id), username, Some("Account locked")).await;
        audit
            .log_failed_attempt(Some(db_user.user_id), "LOGIN", "User", "Account locked")
            .await;
        return Err(ApiError::forbidden("Your account has been locked. Contact an administrator.").into());
    }

    let role = Role::from_id(db_user.role_id).ok_or_else(|| {
        error!(user_id = db_user.user_id, role_id = db_user.role_id, "User has unknown role");
        ApiError::Internal
    })?;

    // 5️⃣ Tokens
    debug!("Generating tokens");
    let subject = TokenSubject {
        user_id: db_user.user_id,
        username: db_user.username.clone(),
        role: db_user.role_id,
        department_id: db_user.department_id,
    };
    let (access_token, refresh_token, refresh_claims) = issue_pair(&subject, &config)?;

    // 6️⃣ Store refresh token
    debug!(user_id = db_user.user_id, jti = %refresh_claims.jti, "Storing refresh token");
    store_refresh_token(pool.get_ref(), db_user.user_id, &refresh_claims.jti, refresh_claims.exp).await?;

    // 7️⃣ Update last_login_at (non-fatal)
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE user_id = ?")
        .bind(db_user.user_id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    record_login(pool.get_ref(), &meta, Some(db_user.user_id), username, None).await;
    audit
        .log(
            AuditEntry::new("LOGIN", "User")
                .by(db_user.user_id)
                .entity(db_user.user_id)
                .describe(format!("{} logged in", db_user.username)),
        )
        .await;

    info!(user_id = db_user.user_id, "Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token,
        refresh_token,
        role: role.to_string(),
        full_name: db_user.full_name,
        redirect: role.landing_path().to_string(),
    }))
}

/* =========================
Refresh
========================= */
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshReqDto,
    responses(
        (status = 200, description = "Rotated token pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    ),
    tag = "Auth"
)]
pub async fn refresh_token(
    body: web::Json<RefreshReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    let unauthorized = || ApiError::Unauthorized("Invalid refresh token".into());

    let claims = verify_refresh_token(&body.refresh_token, &config.jwt_secret).map_err(|_| unauthorized())?;

    // 🔍 token must be known, not revoked, and its owner still active
    let record = sqlx::query_as::<_, (u64, bool, bool, u8, Option<u64>, String)>(
        r#"
        SELECT rt.id, rt.revoked, u.is_active, u.role_id, u.department_id, u.username
        FROM refresh_tokens rt
        JOIN users u ON u.user_id = rt.user_id
        WHERE rt.jti = ?
        "#,
    )
    .bind(&claims.jti)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Failed to load refresh token"))?;

    let (token_id, role_id, department_id, username) = match record {
        Some((id, revoked, owner_active, role_id, department_id, username))
            if refresh_allowed(revoked, owner_active) =>
        {
            (id, role_id, department_id, username)
        }
        _ => return Err(unauthorized().into()),
    };

    // 🔥 revoke old refresh token; a concurrent refresh loses the race
    let revoked = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE id = ? AND revoked = FALSE")
        .bind(token_id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to revoke refresh token"))?;
    if revoked.rows_affected() == 0 {
        return Err(unauthorized().into());
    }

    // 🔄 issue new pair with fresh role/department
    let subject = TokenSubject { user_id: claims.user_id, username, role: role_id, department_id };
    let (access_token, refresh_token, new_claims) = issue_pair(&subject, &config)?;
    store_refresh_token(pool.get_ref(), claims.user_id, &new_claims.jti, new_claims.exp).await?;

    debug!(user_id = claims.user_id, "Refresh token rotated");
    Ok(HttpResponse::Ok().json(TokenPair { access_token, refresh_token }))
}

/// A stored refresh token rotates only while unrevoked and its owner is active.
pub fn refresh_allowed(revoked: bool, owner_active: bool) -> bool {
    !revoked && owner_active
}

/* =========================
Logout
========================= */
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = RefreshReqDto,
    responses((status = 204, description = "Logged out (idempotent)")),
    tag = "Auth"
)]
pub async fn logout(
    body: web::Json<RefreshReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    // only valid refresh tokens do anything; everything else is a silent 204
    let claims = match verify_refresh_token(&body.refresh_token, &config.jwt_secret) {
        Ok(c) => c,
        Err(_) => return Ok(HttpResponse::NoContent().finish()),
    };

    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to revoke refresh token"))?;

    if let Err(e) = sqlx::query(
        r#"
        UPDATE login_history
        SET logout_time = NOW()
        WHERE user_id = ? AND is_success = TRUE AND logout_time IS NULL
        ORDER BY login_time DESC
        LIMIT 1
        "#,
    )
    .bind(claims.user_id)
    .execute(pool.get_ref())
    .await
    {
        error!(error = %e, user_id = claims.user_id, "Failed to stamp logout time");
    }

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("LOGOUT", "User")
                .by(claims.user_id)
                .entity(claims.user_id)
                .describe(format!("{} logged out", claims.sub)),
        )
        .await;

    Ok(HttpResponse::NoContent().finish())
}

/* =========================
Register (Admin)
========================= */
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReqDto,
    responses(
        (status = 201, description = "User created", body = Object, example = json!({"message": "User registered successfully", "user_id": 12})),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Username or e-mail already in use")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn register(
    auth: AuthUser,
    user: web::Json<RegisterReqDto>,
    pool: web::Data<MySqlPool>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let audit = AuditHelper::new(pool.get_ref(), &meta);

    let username = user.username.trim();
    let full_name = user.full_name.trim();
    let email = user.email.as_deref().map(str::trim).filter(|e| !e.is_empty());

    if username.is_empty() || full_name.is_empty() {
        return Err(ApiError::bad_request("Username and full name are required").into());
    }
    if !is_strong_enough(&user.password) {
        return Err(ApiError::bad_request("Password must be at least 6 characters").into());
    }
    if email.is_some_and(|e| !e.contains('@')) {
        return Err(ApiError::bad_request("Invalid e-mail address").into());
    }
    let role = Role::from_id(user.role_id).ok_or_else(|| ApiError::bad_request("Invalid role"))?;

    if !is_identity_available(Identity::Username(username), pool.get_ref(), None).await? {
        audit
            .log_failed_attempt(Some(auth.user_id), "CREATE", "User", "Username already exists")
            .await;
        return Err(ApiError::conflict("Username already exists").into());
    }
    if let Some(email) = email {
        if !is_identity_available(Identity::Email(email), pool.get_ref(), None).await? {
            return Err(ApiError::conflict("E-mail already in use").into());
        }
    }

    if let Some(department_id) = user.department_id {
        let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM departments WHERE department_id = ?")
            .bind(department_id)
            .fetch_optional(pool.get_ref())
            .await
            .map_err(db_error("Failed to load department"))?;
        if active != Some(true) {
            return Err(ApiError::bad_request("Department does not exist or is inactive").into());
        }
    }

    let hashed = hash_password(&user.password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        ApiError::Internal
    })?;

    let result = sqlx::query(
        r#"
        INSERT INTO users
            (username, password_hash, full_name, email, phone_number, department_id, role_id, is_active, created_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, TRUE, ?)
        "#,
    )
    .bind(username)
    .bind(&hashed)
    .bind(full_name)
    .bind(email)
    .bind(&user.phone_number)
    .bind(user.department_id)
    .bind(role.id())
    .bind(auth.user_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_duplicate_key(&e) {
            return ApiError::conflict("Username or e-mail already exists");
        }
        error!(error = %e, "Failed to register user");
        ApiError::Internal
    })?;

    let user_id = result.last_insert_id();
    identity_filter::insert(Identity::Username(username));
    if let Some(email) = email {
        identity_filter::insert(Identity::Email(email));
    }

    audit
        .log(
            AuditEntry::new("CREATE", "User")
                .by(auth.user_id)
                .entity(user_id)
                .new_values(json!({
                    "username": username,
                    "full_name": full_name,
                    "email": email,
                    "role": role.as_ref(),
                    "department_id": user.department_id,
                }))
                .describe(format!("Created user {username}")),
        )
        .await;

    info!(user_id, created_by = auth.user_id, "User registered");
    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "user_id": user_id
    })))
}

/* =========================
Change own password
========================= */
#[utoipa::path(
    put,
    path = "/api/account/password",
    request_body = ChangePasswordReqDto,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Validation failed or current password wrong")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn change_password(
    auth: AuthUser,
    body: web::Json<ChangePasswordReqDto>,
    pool: web::Data<MySqlPool>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    let audit = AuditHelper::new(pool.get_ref(), &meta);

    if !is_strong_enough(&body.new_password) {
        return Err(ApiError::bad_request("New password must be at least 6 characters").into());
    }
    if body.new_password == body.current_password {
        return Err(ApiError::bad_request("New password must differ from the current one").into());
    }

    let current_hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE user_id = ?")
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(db_error("Failed to load password hash"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let matches = verify_password(&body.current_password, &current_hash).map_err(|e| {
        error!(error = %e, user_id = auth.user_id, "Stored password hash is malformed");
        ApiError::Internal
    })?;
    if !matches {
        audit
            .log_failed_attempt(Some(auth.user_id), "PASSWORD_CHANGE", "User", "Current password incorrect")
            .await;
        return Err(ApiError::bad_request("Current password is incorrect").into());
    }

    let new_hash = hash_password(&body.new_password).map_err(|e| {
        error!(error = %e, "Failed to hash password");
        ApiError::Internal
    })?;

    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = NOW() WHERE user_id = ?")
        .bind(&new_hash)
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to update password"))?;
    sqlx::query(
        r#"
        INSERT INTO password_reset_history (user_id, reset_by_user_id, old_password_hash, reset_reason, ip_address)
        VALUES (?, ?, ?, 'Changed by user', ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(auth.user_id)
    .bind(&current_hash)
    .bind(&meta.ip_address)
    .execute(&mut *tx)
    .await
    .map_err(db_error("Failed to write password history"))?;
    tx.commit().await.map_err(db_error("Failed to commit password change"))?;

    if let Err(e) = revoke_all_refresh_tokens(pool.get_ref(), auth.user_id).await {
        error!(error = %e, user_id = auth.user_id, "Failed to revoke refresh tokens");
    }

    audit
        .log(
            AuditEntry::new("PASSWORD_CHANGE", "User")
                .by(auth.user_id)
                .entity(auth.user_id)
                .describe("Password changed by owner"),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Password changed successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoked_or_orphaned_tokens_do_not_rotate() {
        assert!(refresh_allowed(false, true));
        assert!(!refresh_allowed(true, true));
        assert!(!refresh_allowed(false, false));
    }
}
