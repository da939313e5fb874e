use crate::{
    api::{
        paging::LatePage,
        requests::{self, RequestFilter, ReviewPayload, validate_reason},
    },
    auth::auth::AuthUser,
    error::{ApiError, ApiResult},
    model::request::{LATE_SELECT, LateRequest, RequestKind},
    services::{audit::RequestMeta, notifier::NotificationHub, review::Decision},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateLate {
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub request_date: NaiveDate,
    #[schema(example = "09:30:00", value_type = String)]
    pub expected_arrival_time: NaiveTime,
    #[schema(example = "Doctor appointment")]
    pub reason: String,
}

fn ensure_not_past(date: NaiveDate, today: NaiveDate) -> ApiResult<()> {
    if date < today {
        return Err(ApiError::bad_request("Late arrival cannot be requested for a past date"));
    }
    Ok(())
}

/// Announce a late arrival
#[utoipa::path(
    post,
    path = "/api/late-requests",
    request_body = CreateLate,
    responses(
        (status = 201, description = "Late request submitted", body = Object, example = json!({
            "message": "Late request submitted",
            "request_id": 4
        })),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "A request already exists for this date")
    ),
    security(("bearer_auth" = [])),
    tag = "Late"
)]
pub async fn create_late(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    hub: web::Data<NotificationHub>,
    payload: web::Json<CreateLate>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    ensure_not_past(payload.request_date, Local::now().date_naive())?;
    let reason = validate_reason(&payload.reason)?;

    if requests::active_on_date(pool.get_ref(), RequestKind::Late, "request_date", auth.user_id, payload.request_date)
        .await?
    {
        return Err(ApiError::conflict("A late request already exists for this date").into());
    }

    let request_id = sqlx::query(
        "INSERT INTO late_requests (user_id, request_date, expected_arrival_time, reason) VALUES (?, ?, ?, ?)",
    )
    .bind(auth.user_id)
    .bind(payload.request_date)
    .bind(payload.expected_arrival_time)
    .bind(&reason)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        tracing::error!(error = %e, user_id = auth.user_id, "Failed to create late request");
        ApiError::Internal
    })?
    .last_insert_id();

    requests::announce_submission(
        pool.get_ref(),
        &hub,
        &meta,
        &auth,
        RequestKind::Late,
        request_id,
        json!({
            "request_date": payload.request_date,
            "expected_arrival_time": payload.expected_arrival_time,
        }),
    )
    .await;

    Ok(HttpResponse::Created().json(json!({
        "message": "Late request submitted",
        "request_id": request_id
    })))
}

#[utoipa::path(
    get,
    path = "/api/late-requests/mine",
    params(RequestFilter),
    responses((status = 200, description = "Own requests", body = LatePage)),
    security(("bearer_auth" = [])),
    tag = "Late"
)]
pub async fn my_late(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequestFilter>,
) -> actix_web::Result<impl Responder> {
    let page =
        requests::list::<LateRequest>(pool.get_ref(), RequestKind::Late, LATE_SELECT, &query, Some(auth.user_id))
            .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/late-requests",
    params(RequestFilter),
    responses((status = 200, description = "Late requests", body = LatePage)),
    security(("bearer_auth" = [])),
    tag = "Late"
)]
pub async fn late_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequestFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let page = requests::list::<LateRequest>(pool.get_ref(), RequestKind::Late, LATE_SELECT, &query, None).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/late-requests/{request_id}",
    params(("request_id" = u64, Path, description = "Late request ID")),
    responses((status = 200, description = "Late request", body = LateRequest), (status = 404, description = "Not found")),
    security(("bearer_auth" = [])),
    tag = "Late"
)]
pub async fn get_late(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let request: LateRequest =
        requests::fetch_visible(pool.get_ref(), RequestKind::Late, LATE_SELECT, path.into_inner(), &auth).await?;
    Ok(HttpResponse::Ok().json(request))
}

#[utoipa::path(
    put,
    path = "/api/late-requests/{request_id}/approve",
    params(("request_id" = u64, Path, description = "Late request ID")),
    request_body(content = ReviewPayload, description = "Optional note"),
    responses(
        (status = 200, description = "Approved; the day's lateness is excused"),
        (status = 400, description = "Already processed"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Late"
)]
pub async fn approve_late(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    hub: web::Data<NotificationHub>,
    path: web::Path<u64>,
    payload: Option<web::Json<ReviewPayload>>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    requests::decide(
        &auth,
        pool.get_ref(),
        &hub,
        &meta,
        RequestKind::Late,
        path.into_inner(),
        Decision::Approve,
        payload.as_deref(),
    )
    .await
}

#[utoipa::path(
    put,
    path = "/api/late-requests/{request_id}/reject",
    params(("request_id" = u64, Path, description = "Late request ID")),
    request_body(content = ReviewPayload, description = "Rejection reason (required)"),
    responses(
        (status = 200, description = "Rejected"),
        (status = 400, description = "Missing reason or already processed"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Late"
)]
pub async fn reject_late(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    hub: web::Data<NotificationHub>,
    path: web::Path<u64>,
    payload: web::Json<ReviewPayload>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    requests::decide(
        &auth,
        pool.get_ref(),
        &hub,
        &meta,
        RequestKind::Late,
        path.into_inner(),
        Decision::Reject,
        Some(&*payload),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn today_and_future_only() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert!(ensure_not_past(today, today).is_ok());
        assert!(ensure_not_past(today.succ_opt().unwrap(), today).is_ok());
        assert!(ensure_not_past(today.pred_opt().unwrap(), today).is_err());
    }
}
