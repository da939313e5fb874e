use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, db_error},
    model::setting::{SETTING_SELECT, SettingCategory, SettingDataType, SystemSetting},
    services::{
        audit::{AuditEntry, AuditHelper, RequestMeta},
        settings::{
            self, CustomAssets, SettingsView, infer_category, infer_data_type, is_valid_key, render_custom_assets,
        },
    },
    utils::settings_cache,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveTime;
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySql, MySqlPool, Transaction};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct SettingValueReq {
    #[schema(example = "08:30")]
    pub value: String,
}

#[derive(Deserialize, ToSchema)]
pub struct BatchSettingsReq {
    /// Key → value; unknown keys are created
    #[schema(example = json!({"BASE_SALARY": "6000000", "CHECK_IN_STANDARD_TIME": "08:15"}))]
    pub settings: BTreeMap<String, String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AssetsQuery {
    /// `admin` to include admin-area blocks (admins only)
    pub area: Option<String>,
}

/* =========================
   RULES
========================= */

/// A value must parse as its setting's data type.
pub fn validate_value(data_type: SettingDataType, value: &str) -> ApiResult<()> {
    let v = value.trim();
    let ok = match data_type {
        SettingDataType::Number => v.parse::<i64>().is_ok(),
        SettingDataType::Decimal => v.parse::<f64>().is_ok_and(f64::is_finite),
        SettingDataType::Boolean => matches!(v.to_ascii_lowercase().as_str(), "true" | "false"),
        SettingDataType::Time => {
            NaiveTime::parse_from_str(v, "%H:%M").is_ok() || NaiveTime::parse_from_str(v, "%H:%M:%S").is_ok()
        }
        SettingDataType::String | SettingDataType::Code => true,
    };
    if ok {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Value '{value}' is not a valid {data_type}")))
    }
}

fn ensure_key(key: &str) -> ApiResult<()> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(ApiError::bad_request("Setting keys use upper-case letters, digits and underscores"))
    }
}

async fn load_setting(pool: &MySqlPool, key: &str) -> ApiResult<Option<SystemSetting>> {
    sqlx::query_as::<_, SystemSetting>(&format!("{SETTING_SELECT} WHERE setting_key = ?"))
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to load setting"))
}

/// Stored data type, or the inferred one for new keys.
fn data_type_of(existing: Option<&SystemSetting>, key: &str) -> SettingDataType {
    existing
        .and_then(|s| s.data_type.parse().ok())
        .unwrap_or_else(|| infer_data_type(key))
}

fn imported_type(setting: &SystemSetting) -> SettingDataType {
    setting
        .data_type
        .parse()
        .unwrap_or_else(|_| infer_data_type(&setting.setting_key))
}

fn imported_category(setting: &SystemSetting) -> SettingCategory {
    setting
        .category
        .parse()
        .unwrap_or_else(|_| infer_category(&setting.setting_key))
}

/// Imported rows keep their own metadata when creating a key.
async fn import_one(tx: &mut Transaction<'_, MySql>, setting: &SystemSetting, user_id: u64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO system_settings
            (setting_key, setting_value, description, data_type, category, is_active, updated_by)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            setting_value = VALUES(setting_value),
            description = COALESCE(VALUES(description), description),
            is_active = VALUES(is_active),
            updated_at = NOW(),
            updated_by = VALUES(updated_by)
        "#,
    )
    .bind(&setting.setting_key)
    .bind(&setting.setting_value)
    .bind(
        setting
            .description
            .clone()
            .unwrap_or_else(|| settings::infer_description(&setting.setting_key)),
    )
    .bind(imported_type(setting).as_ref())
    .bind(imported_category(setting).as_ref())
    .bind(setting.is_active)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/* =========================
   QUERIES
========================= */

/// All active settings
#[utoipa::path(
    get,
    path = "/api/settings",
    responses((status = 200, description = "Active settings by category then key", body = [SystemSetting])),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn list_settings(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let rows = sqlx::query_as::<_, SystemSetting>(&format!(
        "{SETTING_SELECT} WHERE is_active = TRUE ORDER BY category, setting_key"
    ))
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to list settings"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/settings/{key}",
    params(("key" = String, Path, description = "Setting key", example = "BASE_SALARY")),
    responses((status = 200, description = "Setting", body = SystemSetting), (status = 404, description = "Not found")),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn get_setting(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let setting = load_setting(pool.get_ref(), &path)
        .await?
        .filter(|s| s.is_active)
        .ok_or_else(|| ApiError::not_found("Setting not found"))?;

    Ok(HttpResponse::Ok().json(setting))
}

/// Export active settings as a JSON array
#[utoipa::path(
    get,
    path = "/api/settings/export",
    responses((status = 200, description = "Settings export", body = [SystemSetting])),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn export_settings(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let rows = sqlx::query_as::<_, SystemSetting>(&format!(
        "{SETTING_SELECT} WHERE is_active = TRUE ORDER BY category, setting_key"
    ))
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to export settings"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("EXPORT", "SystemSetting")
                .by(auth.user_id)
                .describe(format!("Exported {} settings", rows.len())),
        )
        .await;

    Ok(HttpResponse::Ok()
        .insert_header(("Content-Disposition", "attachment; filename=\"settings.json\""))
        .json(rows))
}

/// Rendered custom CSS/JS, header/footer and branding
#[utoipa::path(
    get,
    path = "/api/settings/custom-assets",
    params(AssetsQuery),
    responses((status = 200, description = "Assets", body = CustomAssets)),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn custom_assets(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AssetsQuery>,
) -> actix_web::Result<impl Responder> {
    let snapshot = settings::snapshot(pool.get_ref())
        .await
        .map_err(db_error("Failed to load settings"))?;
    let admin_area = auth.is_admin() && query.area.as_deref() == Some("admin");

    Ok(HttpResponse::Ok().json(render_custom_assets(&SettingsView(&snapshot), admin_area)))
}

/* =========================
   COMMANDS
========================= */

#[utoipa::path(
    put,
    path = "/api/settings/{key}",
    params(("key" = String, Path, description = "Setting key", example = "CHECK_IN_STANDARD_TIME")),
    request_body = SettingValueReq,
    responses(
        (status = 200, description = "Setting saved"),
        (status = 400, description = "Invalid key or value")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn update_setting(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    body: web::Json<SettingValueReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let key = path.into_inner();
    ensure_key(&key)?;

    let existing = load_setting(pool.get_ref(), &key).await?;
    validate_value(data_type_of(existing.as_ref(), &key), &body.value)?;

    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;
    settings::upsert(&mut tx, &key, &body.value, Some(auth.user_id))
        .await
        .map_err(db_error("Failed to save setting"))?;
    tx.commit().await.map_err(db_error("Failed to commit setting"))?;
    settings_cache::invalidate().await;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new(if existing.is_some() { "UPDATE" } else { "CREATE" }, "SystemSetting")
                .by(auth.user_id)
                .old(json!({ key.as_str(): existing.and_then(|s| s.setting_value) }))
                .new_values(json!({ key.as_str(): body.value })),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Setting saved", "key": key })))
}

/// Save many settings at once
#[utoipa::path(
    put,
    path = "/api/settings",
    request_body = BatchSettingsReq,
    responses(
        (status = 200, description = "Settings saved", body = Object, example = json!({"message": "Settings saved", "updated": 2, "created": 0})),
        (status = 400, description = "Invalid key or value; nothing saved")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn batch_update(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<BatchSettingsReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    if body.settings.is_empty() {
        return Err(ApiError::bad_request("No settings supplied").into());
    }

    let known: Vec<SystemSetting> = sqlx::query_as(&format!("{SETTING_SELECT} ORDER BY setting_key"))
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to load settings"))?;

    let mut created = 0;
    for (key, value) in &body.settings {
        ensure_key(key)?;
        let existing = known.iter().find(|s| &s.setting_key == key);
        validate_value(data_type_of(existing, key), value)?;
        if existing.is_none() {
            created += 1;
        }
    }

    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;
    for (key, value) in &body.settings {
        settings::upsert(&mut tx, key, value, Some(auth.user_id))
            .await
            .map_err(db_error("Failed to save settings"))?;
    }
    tx.commit().await.map_err(db_error("Failed to commit settings"))?;
    settings_cache::invalidate().await;

    let updated = body.settings.len() - created;
    AuditHelper::new(pool.get_ref(), &meta)
        .log_detailed(
            AuditEntry::new("UPDATE", "SystemSetting")
                .by(auth.user_id)
                .new_values(json!(body.settings))
                .describe("Batch settings update"),
            json!({ "updated": updated, "created": created }),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Settings saved", "updated": updated, "created": created })))
}

/// Soft-delete a setting
#[utoipa::path(
    delete,
    path = "/api/settings/{key}",
    params(("key" = String, Path, description = "Setting key")),
    responses((status = 204, description = "Setting deactivated"), (status = 404, description = "Not found")),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn delete_setting(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let key = path.into_inner();

    let result = sqlx::query(
        "UPDATE system_settings SET is_active = FALSE, updated_at = NOW(), updated_by = ? WHERE setting_key = ? AND is_active = TRUE",
    )
    .bind(auth.user_id)
    .bind(&key)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to delete setting"))?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Setting not found").into());
    }
    settings_cache::invalidate().await;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("DELETE", "SystemSetting")
                .by(auth.user_id)
                .describe(format!("Deactivated setting {key}")),
        )
        .await;

    Ok(HttpResponse::NoContent().finish())
}

/// Restore the default catalogue
#[utoipa::path(
    post,
    path = "/api/settings/reset",
    responses((status = 200, description = "Defaults restored")),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn reset_settings(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let count = settings::reset_to_defaults(pool.get_ref(), auth.user_id)
        .await
        .map_err(db_error("Failed to reset settings"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("RESET", "SystemSetting")
                .by(auth.user_id)
                .describe(format!("Reset {count} settings to defaults")),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Settings reset to defaults", "count": count })))
}

/// Import a settings export
#[utoipa::path(
    post,
    path = "/api/settings/import",
    request_body = [SystemSetting],
    responses(
        (status = 200, description = "Settings imported"),
        (status = 400, description = "Invalid key or value; nothing imported")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn import_settings(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<Vec<SystemSetting>>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    if body.is_empty() {
        return Err(ApiError::bad_request("Nothing to import").into());
    }
    for setting in body.iter() {
        ensure_key(&setting.setting_key)?;
        if let Some(value) = &setting.setting_value {
            validate_value(imported_type(setting), value)?;
        }
    }

    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;
    for setting in body.iter() {
        import_one(&mut tx, setting, auth.user_id)
            .await
            .map_err(db_error("Failed to import setting"))?;
    }
    tx.commit().await.map_err(db_error("Failed to commit import"))?;
    settings_cache::invalidate().await;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("IMPORT", "SystemSetting")
                .by(auth.user_id)
                .describe(format!("Imported {} settings", body.len())),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Settings imported", "count": body.len() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_follow_their_data_type() {
        assert!(validate_value(SettingDataType::Number, "5000000").is_ok());
        assert!(validate_value(SettingDataType::Number, "5e6").is_err());
        assert!(validate_value(SettingDataType::Decimal, "1.5").is_ok());
        assert!(validate_value(SettingDataType::Decimal, "NaN").is_err());
        assert!(validate_value(SettingDataType::Boolean, "TRUE").is_ok());
        assert!(validate_value(SettingDataType::Boolean, "yes").is_err());
        assert!(validate_value(SettingDataType::Time, "08:30").is_ok());
        assert!(validate_value(SettingDataType::Time, "08:30:15").is_ok());
        assert!(validate_value(SettingDataType::Time, "25:00").is_err());
        assert!(validate_value(SettingDataType::Code, "<b>anything</b>").is_ok());
    }

    #[test]
    fn keys_are_checked() {
        assert!(ensure_key("BASE_SALARY").is_ok());
        assert!(ensure_key("base salary").is_err());
    }

    #[test]
    fn new_keys_use_inferred_type() {
        assert_eq!(data_type_of(None, "CHECK_IN_STANDARD_TIME"), infer_data_type("CHECK_IN_STANDARD_TIME"));
    }
}
