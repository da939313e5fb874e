use crate::{
    auth::auth::AuthUser,
    error::{ApiError, db_error, is_duplicate_key},
    model::{
        department::{Department, DepartmentOverview, normalize_name},
        user::{USER_PROFILE_SELECT, UserProfile},
    },
    services::{
        audit::{AuditEntry, AuditHelper, RequestMeta},
        notifier::{NotificationHub, NotificationKind},
    },
};
use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::ToSchema;

pub const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Deserialize, ToSchema)]
pub struct DepartmentReq {
    #[schema(example = "Marketing")]
    pub department_name: String,
    pub description: Option<String>,
    /// Defaults to active on create; ignored on update
    pub is_active: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct DepartmentDetails {
    pub department: Department,
    pub members: Vec<UserProfile>,
}

#[derive(Deserialize, ToSchema)]
pub struct AnnouncementReq {
    #[schema(example = "Team meeting")]
    pub title: String,
    #[schema(example = "Friday 3pm in the main hall")]
    pub message: String,
}

/* =========================
   VALIDATION
========================= */

fn validate(body: &DepartmentReq) -> Result<(String, Option<String>), ApiError> {
    let name = normalize_name(&body.department_name)
        .ok_or_else(|| ApiError::bad_request("Department name is required"))?;
    if name.chars().count() > 100 {
        return Err(ApiError::bad_request("Department name must be at most 100 characters"));
    }
    let description = body
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    if description.as_ref().is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN) {
        return Err(ApiError::bad_request("Description must be at most 500 characters"));
    }
    Ok((name, description))
}

/// Case-insensitive name uniqueness.
async fn name_taken(pool: &MySqlPool, name: &str, exclude: Option<u64>) -> Result<bool, ApiError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM departments WHERE LOWER(department_name) = LOWER(?) AND department_id <> ?",
    )
    .bind(name)
    .bind(exclude.unwrap_or(0))
    .fetch_one(pool)
    .await
    .map_err(db_error("Failed to check department name"))?;
    Ok(count > 0)
}

async fn load(pool: &MySqlPool, department_id: u64) -> Result<Department, ApiError> {
    sqlx::query_as::<_, Department>(
        r#"
        SELECT department_id, department_name, description, is_active, created_at, updated_at
        FROM departments WHERE department_id = ?
        "#,
    )
    .bind(department_id)
    .fetch_optional(pool)
    .await
    .map_err(db_error("Failed to load department"))?
    .ok_or_else(|| ApiError::not_found("Department not found"))
}

/* =========================
   QUERIES
========================= */

/// Departments with member counts
#[utoipa::path(
    get,
    path = "/api/departments",
    responses((status = 200, description = "Departments", body = [DepartmentOverview])),
    security(("bearer_auth" = [])),
    tag = "Departments"
)]
pub async fn list_departments(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let departments = sqlx::query_as::<_, DepartmentOverview>(
        r#"
        SELECT d.department_id, d.department_name, d.description, d.is_active,
               CAST(COUNT(u.user_id) AS SIGNED) AS total_users,
               CAST(COALESCE(SUM(u.is_active), 0) AS SIGNED) AS active_users,
               d.created_at
        FROM departments d
        LEFT JOIN users u ON u.department_id = d.department_id
        GROUP BY d.department_id, d.department_name, d.description, d.is_active, d.created_at
        ORDER BY d.department_name
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to list departments"))?;

    Ok(HttpResponse::Ok().json(departments))
}

/// Department with its members
#[utoipa::path(
    get,
    path = "/api/departments/{department_id}",
    params(("department_id" = u64, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Department details", body = DepartmentDetails),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Departments"
)]
pub async fn department_details(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let department_id = path.into_inner();
    let department = load(pool.get_ref(), department_id).await?;

    let members = sqlx::query_as::<_, UserProfile>(&format!(
        "{USER_PROFILE_SELECT} WHERE u.department_id = ? ORDER BY u.full_name"
    ))
    .bind(department_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to load department members"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log_view(
            auth.user_id,
            "Department",
            Some(department_id),
            format!("Viewed department {}", department.department_name),
        )
        .await;

    Ok(HttpResponse::Ok().json(DepartmentDetails { department, members }))
}

/* =========================
   COMMANDS
========================= */

/// Create a department
#[utoipa::path(
    post,
    path = "/api/departments",
    request_body = DepartmentReq,
    responses(
        (status = 201, description = "Department created", body = Object, example = json!({"message": "Department created", "department_id": 3})),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Name already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Departments"
)]
pub async fn create_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<DepartmentReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let (name, description) = validate(&body)?;

    if name_taken(pool.get_ref(), &name, None).await? {
        return Err(ApiError::conflict("A department with this name already exists").into());
    }

    let is_active = body.is_active.unwrap_or(true);
    let result = sqlx::query("INSERT INTO departments (department_name, description, is_active) VALUES (?, ?, ?)")
        .bind(&name)
        .bind(&description)
        .bind(is_active)
        .execute(pool.get_ref())
        .await
        .map_err(|e| {
            if is_duplicate_key(&e) {
                ApiError::conflict("A department with this name already exists")
            } else {
                ApiError::from(e)
            }
        })?;
    let department_id = result.last_insert_id();

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("CREATE", "Department")
                .by(auth.user_id)
                .entity(department_id)
                .new_values(json!({ "department_name": name, "description": description, "is_active": is_active }))
                .describe(format!("Created department {name}")),
        )
        .await;

    Ok(HttpResponse::Created().json(json!({ "message": "Department created", "department_id": department_id })))
}

/// Rename / redescribe a department
#[utoipa::path(
    put,
    path = "/api/departments/{department_id}",
    params(("department_id" = u64, Path, description = "Department ID")),
    request_body = DepartmentReq,
    responses(
        (status = 200, description = "Department updated"),
        (status = 404, description = "Department not found"),
        (status = 409, description = "Name already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Departments"
)]
pub async fn update_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<DepartmentReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let department_id = path.into_inner();
    let (name, description) = validate(&body)?;
    let before = load(pool.get_ref(), department_id).await?;

    if name_taken(pool.get_ref(), &name, Some(department_id)).await? {
        return Err(ApiError::conflict("A department with this name already exists").into());
    }

    sqlx::query(
        "UPDATE departments SET department_name = ?, description = ?, updated_at = NOW() WHERE department_id = ?",
    )
    .bind(&name)
    .bind(&description)
    .bind(department_id)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to update department"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("UPDATE", "Department")
                .by(auth.user_id)
                .entity(department_id)
                .old(json!({ "department_name": before.department_name, "description": before.description }))
                .new_values(json!({ "department_name": name, "description": description })),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Department updated" })))
}

/// Deactivation is refused while active users remain; activation always passes.
pub fn ensure_can_toggle(activate: bool, active_users: i64) -> Result<(), ApiError> {
    if !activate && active_users > 0 {
        return Err(ApiError::bad_request(format!(
            "Cannot deactivate a department with {active_users} active user(s)"
        )));
    }
    Ok(())
}

pub fn ensure_can_delete(users: i64) -> Result<(), ApiError> {
    if users > 0 {
        return Err(ApiError::bad_request("Reassign the department's users before deleting it"));
    }
    Ok(())
}

/// Activate / deactivate a department
#[utoipa::path(
    put,
    path = "/api/departments/{department_id}/toggle-status",
    params(("department_id" = u64, Path, description = "Department ID")),
    responses(
        (status = 200, description = "Status toggled"),
        (status = 400, description = "Department still has active users"),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Departments"
)]
pub async fn toggle_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let department_id = path.into_inner();
    let department = load(pool.get_ref(), department_id).await?;
    let next = !department.is_active;

    if !next {
        let active_users: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE department_id = ? AND is_active = TRUE")
                .bind(department_id)
                .fetch_one(pool.get_ref())
                .await
                .map_err(db_error("Failed to count department users"))?;
        ensure_can_toggle(next, active_users)?;
    }

    sqlx::query("UPDATE departments SET is_active = ?, updated_at = NOW() WHERE department_id = ?")
        .bind(next)
        .bind(department_id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to toggle department"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("UPDATE", "Department")
                .by(auth.user_id)
                .entity(department_id)
                .old(json!({ "is_active": department.is_active }))
                .new_values(json!({ "is_active": next })),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Department status updated", "is_active": next })))
}

/// Soft-delete (deactivate) a department without members
#[utoipa::path(
    delete,
    path = "/api/departments/{department_id}",
    params(("department_id" = u64, Path, description = "Department ID")),
    responses(
        (status = 204, description = "Department deleted"),
        (status = 400, description = "Department still has users"),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Departments"
)]
pub async fn delete_department(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let department_id = path.into_inner();
    let department = load(pool.get_ref(), department_id).await?;

    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE department_id = ?")
        .bind(department_id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count department users"))?;
    ensure_can_delete(users)?;

    sqlx::query("UPDATE departments SET is_active = FALSE, updated_at = NOW() WHERE department_id = ?")
        .bind(department_id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to delete department"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("DELETE", "Department")
                .by(auth.user_id)
                .entity(department_id)
                .old(json!({ "department_name": department.department_name, "is_active": department.is_active }))
                .new_values(json!({ "is_active": false })),
        )
        .await;

    Ok(HttpResponse::NoContent().finish())
}

/// Push an announcement to every member of a department
#[utoipa::path(
    post,
    path = "/api/departments/{department_id}/announce",
    params(("department_id" = u64, Path, description = "Department ID")),
    request_body = AnnouncementReq,
    responses(
        (status = 202, description = "Announcement queued"),
        (status = 400, description = "Title or message missing"),
        (status = 404, description = "Department not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Departments"
)]
pub async fn announce(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    hub: web::Data<NotificationHub>,
    path: web::Path<u64>,
    body: web::Json<AnnouncementReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let department_id = path.into_inner();
    load(pool.get_ref(), department_id).await?;

    let title = body.title.trim();
    let message = body.message.trim();
    if title.is_empty() || message.is_empty() {
        return Err(ApiError::bad_request("Title and message are required").into());
    }

    hub.notify_department(department_id, NotificationKind::Announcement, title, message);

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("ANNOUNCE", "Department")
                .by(auth.user_id)
                .entity(department_id)
                .describe(title.to_string()),
        )
        .await;

    Ok(HttpResponse::Accepted().json(json!({ "message": "Announcement sent" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, description: Option<&str>) -> DepartmentReq {
        DepartmentReq { department_name: name.into(), description: description.map(Into::into), is_active: None }
    }

    #[test]
    fn validation_trims_and_limits() {
        let (name, description) = validate(&req("  Sales ", Some("   "))).unwrap();
        assert_eq!(name, "Sales");
        assert_eq!(description, None);

        assert!(validate(&req("  ", None)).is_err());
        assert!(validate(&req("Ops", Some(&"x".repeat(501)))).is_err());
        assert!(validate(&req(&"n".repeat(101), None)).is_err());
    }

    #[test]
    fn deactivation_waits_for_active_users() {
        assert!(ensure_can_toggle(false, 2).is_err());
        assert!(ensure_can_toggle(false, 0).is_ok());
        assert!(ensure_can_toggle(true, 5).is_ok());
    }

    #[test]
    fn delete_is_refused_while_anyone_belongs() {
        let err = ensure_can_delete(1).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(ensure_can_delete(0).is_ok());
    }
}
