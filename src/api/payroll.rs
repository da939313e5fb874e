use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::error::{ApiError, ApiResult, db_error};
use crate::model::payroll::{PAYROLL_SELECT, Payroll};
use crate::services::audit::{AuditEntry, AuditHelper, RequestMeta};
use crate::services::payroll::{self, month_bounds};

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PayrollQuery {
    /// `YYYY-MM` (or any date inside the month); defaults to the current month
    #[schema(example = "2026-01")]
    pub month: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct RecalculateReq {
    /// Recalculate a single user; all active users when omitted
    #[schema(example = 1001)]
    pub user_id: Option<u64>,

    #[schema(example = "2026-01")]
    pub month: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct RecalculateResponse {
    #[schema(value_type = String, format = "date")]
    pub month: NaiveDate,
    pub recalculated: usize,
    pub failed: usize,
}

/// First day of the month named by `raw`, or of `today`'s month.
pub fn parse_month(raw: Option<&str>, today: NaiveDate) -> ApiResult<NaiveDate> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(month_bounds(today).0);
    };
    let date = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| ApiError::bad_request("Month must be formatted as YYYY-MM"))?;
    Ok(month_bounds(date).0)
}

async fn stored(pool: &MySqlPool, user_id: u64, month: NaiveDate) -> ApiResult<Option<Payroll>> {
    sqlx::query_as::<_, Payroll>(&format!("{PAYROLL_SELECT} WHERE p.user_id = ? AND p.month = ?"))
        .bind(user_id)
        .bind(month)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to load payroll"))
}

#[utoipa::path(
    get,
    path = "/api/payroll",
    params(PayrollQuery),
    responses(
        (status = 200, description = "Payroll rows for the month", body = [Payroll]),
        (status = 400, description = "Bad month"),
        (status = 403)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_payrolls(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let month = parse_month(query.month.as_deref(), Local::now().date_naive())?;

    let rows = sqlx::query_as::<_, Payroll>(&format!("{PAYROLL_SELECT} WHERE p.month = ? ORDER BY u.full_name"))
        .bind(month)
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to list payroll"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    post,
    path = "/api/payroll/recalculate",
    request_body = RecalculateReq,
    responses(
        (status = 200, description = "Recalculation summary", body = RecalculateResponse),
        (status = 404, description = "User not found"),
        (status = 403)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn recalculate_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<RecalculateReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let month = parse_month(body.month.as_deref(), Local::now().date_naive())?;

    let user_ids: Vec<u64> = match body.user_id {
        Some(user_id) => {
            let exists: Option<u64> = sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(pool.get_ref())
                .await
                .map_err(db_error("Failed to load user"))?;
            vec![exists.ok_or_else(|| ApiError::not_found("User not found"))?]
        }
        None => sqlx::query_scalar("SELECT user_id FROM users WHERE is_active = TRUE")
            .fetch_all(pool.get_ref())
            .await
            .map_err(db_error("Failed to list users"))?,
    };

    let mut recalculated = 0;
    let mut failed = 0;
    for user_id in &user_ids {
        match payroll::recalculate(pool.get_ref(), *user_id, month).await {
            Ok(_) => recalculated += 1,
            Err(e) => {
                tracing::error!(error = %e, user_id, month = %month, "Payroll recalculation failed");
                failed += 1;
            }
        }
    }

    AuditHelper::new(pool.get_ref(), &meta)
        .log_detailed(
            AuditEntry::new("RECALCULATE", "Payroll")
                .by(auth.user_id)
                .describe(format!("Recalculated payroll for {}", month.format("%Y-%m"))),
            json!({ "user_id": body.user_id, "recalculated": recalculated, "failed": failed }),
        )
        .await;

    Ok(HttpResponse::Ok().json(RecalculateResponse { month, recalculated, failed }))
}

#[utoipa::path(
    get,
    path = "/api/payroll/mine",
    params(PayrollQuery),
    responses(
        (status = 200, description = "Own payroll for the month", body = Payroll),
        (status = 400, description = "Bad month")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn my_payroll(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PayrollQuery>,
) -> actix_web::Result<impl Responder> {
    let month = parse_month(query.month.as_deref(), Local::now().date_naive())?;

    // computed on first view
    if let Some(row) = stored(pool.get_ref(), auth.user_id, month).await? {
        return Ok(HttpResponse::Ok().json(row));
    }
    payroll::recalculate(pool.get_ref(), auth.user_id, month)
        .await
        .map_err(db_error("Failed to calculate payroll"))?;
    let row = stored(pool.get_ref(), auth.user_id, month)
        .await?
        .ok_or(ApiError::Internal)?;

    Ok(HttpResponse::Ok().json(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_parsing() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 17).unwrap();
        let march = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(parse_month(None, today).unwrap(), march);
        assert_eq!(parse_month(Some(" "), today).unwrap(), march);
        assert_eq!(parse_month(Some("2025-03"), today).unwrap(), march);
        assert_eq!(parse_month(Some("2025-03-28"), today).unwrap(), march);
        assert!(parse_month(Some("March"), today).is_err());
        assert!(parse_month(Some("2025-13"), today).is_err());
    }
}
