use crate::{
    api::{
        paging::LeavePage,
        requests::{self, RequestFilter, ReviewPayload, validate_reason},
    },
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, db_error},
    model::request::{LEAVE_SELECT, LeaveRequest, LeaveType, RequestKind},
    services::{
        audit::RequestMeta,
        notifier::NotificationHub,
        review::Decision,
    },
};
use actix_web::{HttpResponse, Responder, web};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::ToSchema;

pub const MAX_LEAVE_DAYS: i64 = 30;

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    pub leave_type: LeaveType, // enum ensures Swagger dropdown
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-07", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    #[schema(example = "Family visit")]
    pub reason: String,
}

/// Inclusive day count of a valid leave span.
fn leave_days(start: NaiveDate, end: NaiveDate) -> ApiResult<i32> {
    if start > end {
        return Err(ApiError::bad_request("start_date cannot be after end_date"));
    }
    let days = (end - start).num_days() + 1;
    if days > MAX_LEAVE_DAYS {
        return Err(ApiError::bad_request("A leave request can span at most 30 days"));
    }
    Ok(days as i32)
}

/* =========================
Create leave request
========================= */
/// Swagger doc for create_leave endpoint
#[utoipa::path(
    post,
    path = "/api/leave-requests",
    request_body(
        content = CreateLeave,
        description = "Leave request payload",
        content_type = "application/json"
    ),
    responses(
        (status = 201, description = "Leave request submitted successfully",
         body = Object,
         example = json!({
            "message": "Leave request submitted",
            "request_id": 14,
            "total_days": 3
         })
        ),
        (status = 400, description = "Invalid dates or reason"),
        (status = 409, description = "Overlaps an existing request"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    hub: web::Data<NotificationHub>,
    payload: web::Json<CreateLeave>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    let total_days = leave_days(payload.start_date, payload.end_date)?;
    let reason = validate_reason(&payload.reason)?;

    let overlapping: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM leave_requests
        WHERE user_id = ? AND status IN ('Pending', 'Approved')
          AND start_date <= ? AND end_date >= ?
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.end_date)
    .bind(payload.start_date)
    .fetch_one(pool.get_ref())
    .await
    .map_err(db_error("Failed to check overlapping leave"))?;
    if overlapping > 0 {
        return Err(ApiError::conflict("You already have leave requested for these dates").into());
    }

    let request_id = sqlx::query(
        r#"
        INSERT INTO leave_requests (user_id, leave_type, start_date, end_date, total_days, reason)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.leave_type.as_ref())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(total_days)
    .bind(&reason)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to create leave request"))?
    .last_insert_id();

    requests::announce_submission(
        pool.get_ref(),
        &hub,
        &meta,
        &auth,
        RequestKind::Leave,
        request_id,
        json!({
            "leave_type": payload.leave_type.as_ref(),
            "start_date": payload.start_date,
            "end_date": payload.end_date,
            "total_days": total_days,
        }),
    )
    .await;

    Ok(HttpResponse::Created().json(json!({
        "message": "Leave request submitted",
        "request_id": request_id,
        "total_days": total_days
    })))
}

/// My leave requests
#[utoipa::path(
    get,
    path = "/api/leave-requests/mine",
    params(RequestFilter),
    responses((status = 200, description = "Own requests, newest first", body = LeavePage)),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn my_leaves(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequestFilter>,
) -> actix_web::Result<impl Responder> {
    let page = requests::list::<LeaveRequest>(pool.get_ref(), RequestKind::Leave, LEAVE_SELECT, &query, Some(auth.user_id))
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// List leave requests (admin)
#[utoipa::path(
    get,
    path = "/api/leave-requests",
    params(RequestFilter),
    responses(
        (status = 200, description = "Leave requests", body = LeavePage),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequestFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let page = requests::list::<LeaveRequest>(pool.get_ref(), RequestKind::Leave, LEAVE_SELECT, &query, None).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// for getting a leave application details endpoint
#[utoipa::path(
    get,
    path = "/api/leave-requests/{request_id}",
    params(("request_id" = u64, Path, description = "Leave request ID")),
    responses(
        (status = 200, description = "Leave request", body = LeaveRequest),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let leave: LeaveRequest =
        requests::fetch_visible(pool.get_ref(), RequestKind::Leave, LEAVE_SELECT, path.into_inner(), &auth).await?;
    Ok(HttpResponse::Ok().json(leave))
}

/* =========================
Approve leave (Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave-requests/{request_id}/approve",
    params(("request_id" = u64, Path, description = "ID of the leave request to approve")),
    request_body(content = ReviewPayload, description = "Optional note"),
    responses(
        (status = 200, description = "Leave approved successfully", body = Object, example = json!({
            "message": "Leave request approved"
        })),
        (status = 400, description = "Leave request already processed", body = Object, example = json!({
            "message": "Leave request not found or already processed"
        })),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn approve_leave(
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
        RequestKind::Leave,
        path.into_inner(),
        Decision::Approve,
        payload.as_deref(),
    )
    .await
}

/* =========================
Reject leave (Admin)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave-requests/{request_id}/reject",
    params(("request_id" = u64, Path, description = "ID of the leave request to reject")),
    request_body(content = ReviewPayload, description = "Rejection reason (required)"),
    responses(
        (status = 200, description = "Leave rejected successfully", body = Object, example = json!({
            "message": "Leave request rejected"
        })),
        (status = 400, description = "Missing reason or already processed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn reject_leave(
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
        RequestKind::Leave,
        path.into_inner(),
        Decision::Reject,
        Some(&*payload),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    #[test]
    fn span_is_inclusive_and_bounded() {
        assert_eq!(leave_days(d(5), d(5)).unwrap(), 1);
        assert_eq!(leave_days(d(5), d(7)).unwrap(), 3);
        assert_eq!(leave_days(d(1), d(30)).unwrap(), 30);
        assert!(leave_days(d(1), d(31)).is_err());
        assert!(leave_days(d(7), d(5)).is_err());
    }

    #[test]
    fn leave_type_parses_from_payload() {
        let body: CreateLeave = serde_json::from_str(
            r#"{"leave_type":"Unpaid","start_date":"2025-01-05","end_date":"2025-01-06","reason":"x"}"#,
        )
        .unwrap();
        assert!(body.leave_type.deducts_pay());
        assert!(serde_json::from_str::<CreateLeave>(
            r#"{"leave_type":"Holiday","start_date":"2025-01-05","end_date":"2025-01-06","reason":"x"}"#
        )
        .is_err());
    }
}
