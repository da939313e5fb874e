use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use std::io;
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::error::ApiError;
use crate::services::audit::{AuditEntry, AuditHelper, RequestMeta};
use crate::services::layouts::{LayoutBackup, LayoutKind, LayoutStore};

#[derive(Serialize, ToSchema)]
pub struct LayoutContent {
    pub kind: LayoutKind,
    pub content: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SaveLayoutReq {
    #[schema(example = "<!DOCTYPE html><html>...</html>")]
    pub content: String,
}

fn io_error(context: &'static str) -> impl Fn(io::Error) -> ApiError {
    move |e| match e.kind() {
        io::ErrorKind::InvalidInput => ApiError::bad_request("Invalid backup name"),
        io::ErrorKind::NotFound => ApiError::not_found("Backup not found"),
        _ => {
            tracing::error!(error = %e, "{}", context);
            ApiError::Internal
        }
    }
}

/// Current layout markup
#[utoipa::path(
    get,
    path = "/api/layouts/{kind}",
    params(("kind" = LayoutKind, Path, description = "admin or staff")),
    responses((status = 200, description = "Layout file", body = LayoutContent)),
    security(("bearer_auth" = [])),
    tag = "Layouts"
)]
pub async fn get_layout(
    auth: AuthUser,
    store: web::Data<LayoutStore>,
    path: web::Path<LayoutKind>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let kind = path.into_inner();
    let content = store.read(kind).await.map_err(io_error("Failed to read layout"))?;
    Ok(HttpResponse::Ok().json(LayoutContent { kind, content }))
}

/// Save a layout; the previous version is backed up first
#[utoipa::path(
    put,
    path = "/api/layouts/{kind}",
    params(("kind" = LayoutKind, Path, description = "admin or staff")),
    request_body = SaveLayoutReq,
    responses(
        (status = 200, description = "Saved", body = Object, example = json!({
            "message": "Layout saved",
            "backup": "_Layout_20260105093000.html"
        })),
        (status = 400, description = "Empty content")
    ),
    security(("bearer_auth" = [])),
    tag = "Layouts"
)]
pub async fn save_layout(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    store: web::Data<LayoutStore>,
    path: web::Path<LayoutKind>,
    body: web::Json<SaveLayoutReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    if body.content.trim().is_empty() {
        return Err(ApiError::bad_request("Layout content cannot be empty").into());
    }
    let kind = path.into_inner();

    let backup = store
        .save(kind, &body.content)
        .await
        .map_err(io_error("Failed to save layout"))?;
    tracing::info!(user_id = auth.user_id, layout = %kind, backup = ?backup, "Layout saved");

    AuditHelper::new(pool.get_ref(), &meta)
        .log_detailed(
            AuditEntry::new("UPDATE", "Layout")
                .by(auth.user_id)
                .describe(format!("Saved {} layout", kind)),
            json!({ "backup": backup, "length": body.content.len() }),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Layout saved", "backup": backup })))
}

#[utoipa::path(
    get,
    path = "/api/layouts/backups",
    responses((status = 200, description = "Most recent backups first", body = [LayoutBackup])),
    security(("bearer_auth" = [])),
    tag = "Layouts"
)]
pub async fn list_backups(auth: AuthUser, store: web::Data<LayoutStore>) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let backups = store.list_backups().await.map_err(io_error("Failed to list backups"))?;
    Ok(HttpResponse::Ok().json(backups))
}

#[utoipa::path(
    get,
    path = "/api/layouts/backups/{name}",
    params(("name" = String, Path, description = "Backup file name")),
    responses(
        (status = 200, description = "Backup markup", body = LayoutContent),
        (status = 400, description = "Invalid name"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Layouts"
)]
pub async fn get_backup(
    auth: AuthUser,
    store: web::Data<LayoutStore>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let name = path.into_inner();
    let content = store.read_backup(&name).await.map_err(io_error("Failed to read backup"))?;
    Ok(HttpResponse::Ok().json(LayoutContent { kind: LayoutKind::of_backup(&name), content }))
}

/// Restore a backup over its layout
#[utoipa::path(
    post,
    path = "/api/layouts/backups/{name}/restore",
    params(("name" = String, Path, description = "Backup file name")),
    responses(
        (status = 200, description = "Restored"),
        (status = 400, description = "Invalid name"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Layouts"
)]
pub async fn restore_backup(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    store: web::Data<LayoutStore>,
    path: web::Path<String>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let name = path.into_inner();
    let kind = store.restore(&name).await.map_err(io_error("Failed to restore backup"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("RESTORE", "Layout")
                .by(auth.user_id)
                .describe(format!("Restored {kind} layout from {name}")),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Layout restored", "kind": kind })))
}

#[utoipa::path(
    delete,
    path = "/api/layouts/backups/{name}",
    params(("name" = String, Path, description = "Backup file name")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Invalid name"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Layouts"
)]
pub async fn delete_backup(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    store: web::Data<LayoutStore>,
    path: web::Path<String>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let name = path.into_inner();
    store.delete_backup(&name).await.map_err(io_error("Failed to delete backup"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("DELETE", "Layout")
                .by(auth.user_id)
                .describe(format!("Deleted layout backup {name}")),
        )
        .await;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;

    #[test]
    fn io_errors_map_to_statuses() {
        let map = io_error("test");
        assert_eq!(map(io::Error::new(io::ErrorKind::InvalidInput, "x")).status_code(), 400);
        assert_eq!(map(io::Error::new(io::ErrorKind::NotFound, "x")).status_code(), 404);
        assert_eq!(map(io::Error::new(io::ErrorKind::PermissionDenied, "x")).status_code(), 500);
    }
}
