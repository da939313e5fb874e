use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, db_error},
    model::audit::{AUDIT_SELECT, AuditLog, LOGIN_SELECT, LoginHistory},
    services::audit::{AuditHelper, RequestMeta},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

pub const MAX_AUDIT_ROWS: u32 = 1000;
pub const MAX_OWN_LOGINS: u32 = 50;

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditFilter {
    #[param(example = "UPDATE")]
    pub action: Option<String>,
    #[param(value_type = Option<String>, example = "2026-01-01")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, example = "2026-01-31")]
    pub to: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoginFilter {
    #[param(value_type = Option<String>, example = "2026-01-01")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, example = "2026-01-31")]
    pub to: Option<NaiveDate>,
    pub success: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub logs: Vec<AuditLog>,
    /// Distinct actions for the filter dropdown
    pub actions: Vec<String>,
}

enum FilterValue {
    Str(String),
    Time(NaiveDateTime),
    Bool(bool),
}

/// `[from 00:00, day after to 00:00)` so `to` is inclusive.
fn day_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> ApiResult<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
    if let (Some(f), Some(t)) = (from, to) {
        if f > t {
            return Err(ApiError::bad_request("'from' cannot be after 'to'"));
        }
    }
    let start = from.map(|d| d.and_time(NaiveTime::MIN));
    let end = to.and_then(|d| d.checked_add_days(Days::new(1))).map(|d| d.and_time(NaiveTime::MIN));
    Ok((start, end))
}

fn push_range(column: &str, from: Option<NaiveDate>, to: Option<NaiveDate>, sql: &mut String, args: &mut Vec<FilterValue>) -> ApiResult<()> {
    let (start, end) = day_range(from, to)?;
    if let Some(start) = start {
        sql.push_str(&format!(" AND {column} >= ?"));
        args.push(FilterValue::Time(start));
    }
    if let Some(end) = end {
        sql.push_str(&format!(" AND {column} < ?"));
        args.push(FilterValue::Time(end));
    }
    Ok(())
}

/// Audit trail (admin)
#[utoipa::path(
    get,
    path = "/api/audit-logs",
    params(AuditFilter),
    responses(
        (status = 200, description = "Newest entries first, at most 1000", body = AuditLogResponse),
        (status = 400, description = "Bad date range"),
        (status = 403)
    ),
    security(("bearer_auth" = [])),
    tag = "Audit"
)]
pub async fn audit_logs(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AuditFilter>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args = Vec::new();
    if let Some(action) = query.action.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        where_sql.push_str(" AND a.action = ?");
        args.push(FilterValue::Str(action.to_string()));
    }
    push_range("a.timestamp", query.from, query.to, &mut where_sql, &mut args)?;

    let sql = format!("{AUDIT_SELECT}{where_sql} ORDER BY a.timestamp DESC, a.audit_log_id DESC LIMIT {MAX_AUDIT_ROWS}");
    let mut q = sqlx::query_as::<_, AuditLog>(&sql);
    for arg in args {
        q = match arg {
            FilterValue::Str(v) => q.bind(v),
            FilterValue::Time(v) => q.bind(v),
            FilterValue::Bool(v) => q.bind(v),
        };
    }
    let logs = q.fetch_all(pool.get_ref()).await.map_err(db_error("Failed to load audit logs"))?;

    let actions: Vec<String> = sqlx::query_scalar("SELECT DISTINCT action FROM audit_logs ORDER BY action")
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to load audit actions"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log_view(auth.user_id, "AuditLog", None, format!("Viewed {} audit log entries", logs.len()))
        .await;

    Ok(HttpResponse::Ok().json(AuditLogResponse { logs, actions }))
}

/// Login history of every user (admin)
#[utoipa::path(
    get,
    path = "/api/login-history",
    params(LoginFilter),
    responses(
        (status = 200, description = "Newest first, at most 1000", body = [LoginHistory]),
        (status = 400, description = "Bad date range"),
        (status = 403)
    ),
    security(("bearer_auth" = [])),
    tag = "Audit"
)]
pub async fn login_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LoginFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let mut where_sql = String::from(" WHERE 1=1");
    let mut args = Vec::new();
    push_range("login_time", query.from, query.to, &mut where_sql, &mut args)?;
    if let Some(success) = query.success {
        where_sql.push_str(" AND is_success = ?");
        args.push(FilterValue::Bool(success));
    }

    let sql = format!("{LOGIN_SELECT}{where_sql} ORDER BY login_time DESC LIMIT {MAX_AUDIT_ROWS}");
    let mut q = sqlx::query_as::<_, LoginHistory>(&sql);
    for arg in args {
        q = match arg {
            FilterValue::Str(v) => q.bind(v),
            FilterValue::Time(v) => q.bind(v),
            FilterValue::Bool(v) => q.bind(v),
        };
    }
    let rows = q.fetch_all(pool.get_ref()).await.map_err(db_error("Failed to load login history"))?;

    Ok(HttpResponse::Ok().json(rows))
}

/// Own recent logins
#[utoipa::path(
    get,
    path = "/api/login-history/mine",
    responses((status = 200, description = "Last 50 logins", body = [LoginHistory])),
    security(("bearer_auth" = [])),
    tag = "Audit"
)]
pub async fn my_logins(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let rows = recent_logins(pool.get_ref(), auth.user_id, MAX_OWN_LOGINS).await?;
    Ok(HttpResponse::Ok().json(rows))
}

pub(crate) async fn recent_logins(pool: &MySqlPool, user_id: u64, limit: u32) -> ApiResult<Vec<LoginHistory>> {
    sqlx::query_as::<_, LoginHistory>(&format!(
        "{LOGIN_SELECT} WHERE user_id = ? ORDER BY login_time DESC LIMIT {limit}"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(db_error("Failed to load login history"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn to_date_is_inclusive() {
        let (start, end) = day_range(Some(d(5)), Some(d(5))).unwrap();
        assert_eq!(start.unwrap(), d(5).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(end.unwrap(), d(6).and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn open_and_inverted_ranges() {
        assert_eq!(day_range(None, None).unwrap(), (None, None));
        assert!(day_range(Some(d(6)), Some(d(5))).is_err());
    }

    #[test]
    fn range_adds_placeholders() {
        let mut sql = String::new();
        let mut args = Vec::new();
        push_range("login_time", Some(d(1)), None, &mut sql, &mut args).unwrap();
        assert_eq!(sql, " AND login_time >= ?");
        assert_eq!(args.len(), 1);
    }
}
