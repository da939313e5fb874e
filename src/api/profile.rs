use crate::{
    api::users::load_profile,
    auth::{auth::AuthUser, handlers::is_identity_available},
    error::{ApiError, ApiResult, conflict_or_db_error, db_error},
    model::{
        department::DepartmentOverview,
        user::{USER_PROFILE_SELECT, UserProfile},
    },
    services::audit::{AuditEntry, AuditHelper, RequestMeta},
    utils::{
        db_utils::{build_update_sql, execute_update},
        identity_filter::{self, Identity},
    },
};
use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use serde_json::{Map, Value, json};
use sqlx::MySqlPool;
use utoipa::ToSchema;

/// Columns a user may change on their own profile.
const EDITABLE: &[&str] = &["full_name", "email", "phone_number", "avatar"];

#[derive(Serialize, ToSchema)]
pub struct MyDepartment {
    #[serde(flatten)]
    pub department: DepartmentOverview,
    pub colleagues: Vec<UserProfile>,
}

/// Trims strings, blanks optional fields to NULL and requires a full name.
fn normalize_update(payload: &Map<String, Value>) -> ApiResult<Map<String, Value>> {
    let mut clean = Map::with_capacity(payload.len());
    for (key, value) in payload {
        let value = match value {
            Value::String(s) => {
                let s = s.trim();
                if s.is_empty() { Value::Null } else { Value::String(s.to_string()) }
            }
            Value::Null => Value::Null,
            _ => return Err(ApiError::bad_request(format!("Field '{key}' must be a string"))),
        };
        clean.insert(key.clone(), value);
    }

    if clean.get("full_name").is_some_and(Value::is_null) {
        return Err(ApiError::bad_request("Full name is required"));
    }
    if let Some(Value::String(name)) = clean.get("full_name") {
        if name.chars().count() > 100 {
            return Err(ApiError::bad_request("Full name must be at most 100 characters"));
        }
    }
    if let Some(Value::String(email)) = clean.get("email") {
        if !email.contains('@') || email.len() > 100 {
            return Err(ApiError::bad_request("Invalid e-mail address"));
        }
    }
    if let Some(Value::String(phone)) = clean.get("phone_number") {
        if phone.len() > 20 {
            return Err(ApiError::bad_request("Phone number must be at most 20 characters"));
        }
    }
    Ok(clean)
}

/// Own profile
#[utoipa::path(
    get,
    path = "/api/profile",
    responses((status = 200, description = "Profile", body = UserProfile), (status = 404, description = "Not found")),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
pub async fn my_profile(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let profile = load_profile(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(HttpResponse::Ok().json(profile))
}

/// Update own profile
#[utoipa::path(
    put,
    path = "/api/profile",
    request_body(content = Object, example = json!({
        "full_name": "John Doe",
        "email": "john@tmd.local",
        "phone_number": "+880 1711 000000"
    })),
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 400, description = "Invalid or read-only field"),
        (status = 409, description = "E-mail already in use")
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
pub async fn update_profile(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<Map<String, Value>>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    let changes = normalize_update(&body)?;
    let update = build_update_sql("users", &changes, EDITABLE, "user_id", auth.user_id)?;

    let new_email = changes.get("email").and_then(Value::as_str);
    if let Some(email) = new_email {
        if !is_identity_available(Identity::Email(email), pool.get_ref(), Some(auth.user_id)).await? {
            return Err(ApiError::conflict("Email already exists").into());
        }
    }

    let before = load_profile(pool.get_ref(), auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;
    // a concurrent update may take the e-mail after the availability check
    execute_update(&mut tx, update)
        .await
        .map_err(conflict_or_db_error("Failed to update profile", "Email already exists"))?;
    tx.commit().await.map_err(db_error("Failed to commit profile"))?;

    if let Some(old) = released_email(before.email.as_deref(), &changes) {
        identity_filter::remove(Identity::Email(old));
    }
    if let Some(email) = new_email {
        identity_filter::insert(Identity::Email(email));
    }

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("UPDATE", "User")
                .by(auth.user_id)
                .entity(auth.user_id)
                .old(json!({
                    "full_name": before.full_name,
                    "email": before.email,
                    "phone_number": before.phone_number,
                }))
                .new_values(Value::Object(changes))
                .describe("Updated own profile"),
        )
        .await;

    let profile = load_profile(pool.get_ref(), auth.user_id)
        .await?
        .ok_or(ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(profile))
}

/// Previous address to drop from the identity filter when the update changes or
/// clears the e-mail.
fn released_email<'a>(before: Option<&'a str>, changes: &Map<String, Value>) -> Option<&'a str> {
    let old = before.filter(|e| !e.is_empty())?;
    match changes.get("email")? {
        Value::String(new) if new.eq_ignore_ascii_case(old) => None,
        _ => Some(old),
    }
}

/// Own department with its active members
#[utoipa::path(
    get,
    path = "/api/profile/department",
    responses(
        (status = 200, description = "Department", body = MyDepartment),
        (status = 404, description = "No department assigned")
    ),
    security(("bearer_auth" = [])),
    tag = "Profile"
)]
pub async fn my_department(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let department_id: Option<u64> = sqlx::query_scalar("SELECT department_id FROM users WHERE user_id = ?")
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await
        .map_err(db_error("Failed to load user"))?
        .flatten();
    let department_id = department_id.ok_or_else(|| ApiError::not_found("No department assigned"))?;

    let department = sqlx::query_as::<_, DepartmentOverview>(
        r#"
        SELECT d.department_id, d.department_name, d.description, d.is_active,
               CAST(COUNT(u.user_id) AS SIGNED) AS total_users,
               CAST(COALESCE(SUM(u.is_active), 0) AS SIGNED) AS active_users,
               d.created_at
        FROM departments d
        LEFT JOIN users u ON u.department_id = d.department_id
        WHERE d.department_id = ?
        GROUP BY d.department_id, d.department_name, d.description, d.is_active, d.created_at
        "#,
    )
    .bind(department_id)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Failed to load department"))?
    .ok_or_else(|| ApiError::not_found("Department not found"))?;

    let colleagues = sqlx::query_as::<_, UserProfile>(&format!(
        "{USER_PROFILE_SELECT} WHERE u.department_id = ? AND u.is_active = TRUE ORDER BY u.full_name"
    ))
    .bind(department_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to load colleagues"))?;

    Ok(HttpResponse::Ok().json(MyDepartment { department, colleagues }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn changed_or_cleared_email_is_released() {
        let changed = object(json!({ "email": "new@tmd.local" }));
        assert_eq!(released_email(Some("old@tmd.local"), &changed), Some("old@tmd.local"));

        let cleared = object(json!({ "email": null }));
        assert_eq!(released_email(Some("old@tmd.local"), &cleared), Some("old@tmd.local"));

        let same = object(json!({ "email": "OLD@tmd.local" }));
        assert_eq!(released_email(Some("old@tmd.local"), &same), None);

        let untouched = object(json!({ "full_name": "Jane" }));
        assert_eq!(released_email(Some("old@tmd.local"), &untouched), None);
        assert_eq!(released_email(None, &changed), None);
    }

    #[test]
    fn trims_and_nulls_blank_fields() {
        let clean = normalize_update(&object(json!({ "full_name": "  Jane  ", "phone_number": " " }))).unwrap();
        assert_eq!(clean["full_name"], "Jane");
        assert!(clean["phone_number"].is_null());
    }

    #[test]
    fn full_name_cannot_be_cleared() {
        assert!(normalize_update(&object(json!({ "full_name": "   " }))).is_err());
        assert!(normalize_update(&object(json!({ "full_name": null }))).is_err());
    }

    #[test]
    fn rejects_bad_email_and_non_strings() {
        assert!(normalize_update(&object(json!({ "email": "nope" }))).is_err());
        assert!(normalize_update(&object(json!({ "avatar": 5 }))).is_err());
        assert!(normalize_update(&object(json!({ "email": "a@b.c" }))).is_ok());
    }

    #[test]
    fn role_is_not_editable() {
        let clean = normalize_update(&object(json!({ "role_id": "1" }))).unwrap();
        assert!(build_update_sql("users", &clean, EDITABLE, "user_id", 3).is_err());
    }
}
