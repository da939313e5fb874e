//! Plumbing shared by the leave, overtime and late-arrival request endpoints.

use crate::{
    api::paging::{PageQuery, Paginated},
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, db_error},
    model::request::{LateRequest, LeaveRequest, OvertimeRequest, RequestKind, RequestStatus},
    services::{
        audit::{AuditEntry, AuditHelper, RequestMeta},
        notifier::{Notification, NotificationHub, NotificationKind, Target},
        review::{self, Decision},
    },
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::{FromRow, MySqlPool, mysql::MySqlRow};
use strum::IntoEnumIterator;
use utoipa::{IntoParams, ToSchema};

pub const MAX_REASON_LEN: usize = 1000;

#[derive(Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct RequestFilter {
    #[schema(example = "Pending")]
    /// Filter by status
    pub status: Option<RequestStatus>,
    #[schema(example = 12)]
    /// Filter by requester (admin only)
    pub user_id: Option<u64>,
    #[schema(example = 1)]
    /// Pagination page number (start with 1)
    pub page: Option<u64>,
    #[schema(example = 20)]
    /// Items per page
    pub per_page: Option<u64>,
}

impl RequestFilter {
    fn paging(&self) -> PageQuery {
        PageQuery { page: self.page, per_page: self.per_page }
    }
}

#[derive(Deserialize, ToSchema, Default)]
pub struct ReviewPayload {
    /// Optional on approval, required on rejection
    #[schema(example = "Enjoy your time off")]
    pub note: Option<String>,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct PendingCounts {
    pub leave: i64,
    pub overtime: i64,
    pub late: i64,
    pub total: i64,
}

/// Request rows that know their requester.
pub trait Owned {
    fn owner(&self) -> u64;
}

impl Owned for LeaveRequest {
    fn owner(&self) -> u64 {
        self.user_id
    }
}

impl Owned for OvertimeRequest {
    fn owner(&self) -> u64 {
        self.user_id
    }
}

impl Owned for LateRequest {
    fn owner(&self) -> u64 {
        self.user_id
    }
}

/// Trimmed reason of 1..=1000 characters.
pub fn validate_reason(reason: &str) -> ApiResult<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ApiError::bad_request("A reason is required"));
    }
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(ApiError::bad_request("Reason must be at most 1000 characters"));
    }
    Ok(reason.to_string())
}

/// Paginated listing; `owner` pins the listing to one requester.
pub async fn list<T>(
    pool: &MySqlPool,
    kind: RequestKind,
    select: &str,
    filter: &RequestFilter,
    owner: Option<u64>,
) -> ApiResult<Paginated<T>>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
{
    let (page, per_page, offset) = filter.paging().resolve();

    let mut where_sql = String::from(" WHERE 1=1");
    if filter.status.is_some() {
        where_sql.push_str(" AND r.status = ?");
    }
    let user_id = owner.or(filter.user_id);
    if user_id.is_some() {
        where_sql.push_str(" AND r.user_id = ?");
    }
    let status = filter.status.map(|s| s.as_ref().to_string());

    let count_sql = format!("SELECT COUNT(*) FROM {} r{where_sql}", kind.table());
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(status) = &status {
        count_q = count_q.bind(status);
    }
    if let Some(user_id) = user_id {
        count_q = count_q.bind(user_id);
    }
    let total = count_q
        .fetch_one(pool)
        .await
        .map_err(db_error("Failed to count requests"))?;

    let data_sql = format!("{select}{where_sql} ORDER BY r.created_at DESC LIMIT ? OFFSET ?");
    let mut data_q = sqlx::query_as::<_, T>(&data_sql);
    if let Some(status) = &status {
        data_q = data_q.bind(status);
    }
    if let Some(user_id) = user_id {
        data_q = data_q.bind(user_id);
    }
    let data = data_q
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await
        .map_err(db_error("Failed to list requests"))?;

    Ok(Paginated::new(data, page, per_page, total))
}

/// Loads one request; staff only see their own.
pub async fn fetch_visible<T>(pool: &MySqlPool, kind: RequestKind, select: &str, id: u64, auth: &AuthUser) -> ApiResult<T>
where
    T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin + Owned,
{
    let row = sqlx::query_as::<_, T>(&format!("{select} WHERE r.request_id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to load request"))?;

    match row {
        Some(row) if auth.is_admin() || row.owner() == auth.user_id => Ok(row),
        _ => Err(ApiError::not_found(format!("{kind} request not found"))),
    }
}

/// Counts pending/approved requests of `kind` owned by `user_id` that
/// collide on `date_column = date`.
pub async fn active_on_date(
    pool: &MySqlPool,
    kind: RequestKind,
    date_column: &str,
    user_id: u64,
    date: NaiveDate,
) -> ApiResult<bool> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE user_id = ? AND {date_column} = ? AND status IN ('Pending', 'Approved')",
        kind.table()
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(user_id)
        .bind(date)
        .fetch_one(pool)
        .await
        .map_err(db_error("Failed to check existing requests"))?;
    Ok(count > 0)
}

/// Admins are told about every new request; the submission is audited.
pub async fn announce_submission(
    pool: &MySqlPool,
    hub: &NotificationHub,
    meta: &RequestMeta,
    auth: &AuthUser,
    kind: RequestKind,
    request_id: u64,
    values: Value,
) {
    hub.publish(
        Notification::new(
            Target::Admins,
            NotificationKind::RequestSubmitted,
            "New request",
            format!("{} submitted a {} request", auth.username, kind.label()),
        )
        .with_link(format!("/admin/requests/{}/{}", kind.as_ref().to_lowercase(), request_id)),
    );

    AuditHelper::new(pool, meta)
        .log(
            AuditEntry::new("CREATE", kind.entity_name())
                .by(auth.user_id)
                .entity(request_id)
                .new_values(values),
        )
        .await;

    tracing::info!(request_id, kind = %kind, user_id = auth.user_id, "Request submitted");
}

/// Approve/reject shared by the three request kinds.
#[allow(clippy::too_many_arguments)]
pub async fn decide(
    auth: &AuthUser,
    pool: &MySqlPool,
    hub: &NotificationHub,
    meta: &RequestMeta,
    kind: RequestKind,
    request_id: u64,
    decision: Decision,
    payload: Option<&ReviewPayload>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let audit = AuditHelper::new(pool, meta);
    let note = payload.and_then(|p| p.note.as_deref());
    review::review(pool, hub, &audit, kind, request_id, auth.user_id, decision, note).await?;

    let verb = match decision {
        Decision::Approve => "approved",
        Decision::Reject => "rejected",
    };
    Ok(HttpResponse::Ok().json(json!({ "message": format!("{kind} request {verb}") })))
}

pub async fn count_pending(pool: &MySqlPool) -> ApiResult<PendingCounts> {
    let mut counts = PendingCounts::default();
    for kind in RequestKind::iter() {
        let n: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE status = 'Pending'",
            kind.table()
        ))
        .fetch_one(pool)
        .await
        .map_err(db_error("Failed to count pending requests"))?;
        match kind {
            RequestKind::Leave => counts.leave = n,
            RequestKind::Overtime => counts.overtime = n,
            RequestKind::Late => counts.late = n,
        }
        counts.total += n;
    }
    Ok(counts)
}

/// Pending requests across the three kinds
#[utoipa::path(
    get,
    path = "/api/requests/pending-count",
    responses((status = 200, description = "Pending counts", body = PendingCounts)),
    security(("bearer_auth" = [])),
    tag = "Requests"
)]
pub async fn pending_counts(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let counts = count_pending(pool.get_ref()).await?;
    Ok(HttpResponse::Ok().json(counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_bounds() {
        assert!(validate_reason("   ").is_err());
        assert!(validate_reason(&"r".repeat(1001)).is_err());
        assert_eq!(validate_reason(" doctor ").unwrap(), "doctor");
    }

    #[test]
    fn filter_maps_onto_paging() {
        let filter = RequestFilter { status: None, user_id: None, page: Some(2), per_page: Some(5) };
        assert_eq!(filter.paging().resolve(), (2, 5, 5));
    }
}
