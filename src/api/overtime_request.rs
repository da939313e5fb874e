use crate::{
    api::{
        paging::OvertimePage,
        requests::{self, RequestFilter, ReviewPayload, validate_reason},
    },
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, db_error},
    model::request::{OVERTIME_SELECT, OvertimeRequest, RequestKind},
    services::{audit::RequestMeta, notifier::NotificationHub, review::Decision},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::ToSchema;

pub const MIN_OVERTIME_HOURS: f64 = 0.1;
pub const MAX_OVERTIME_HOURS: f64 = 12.0;
pub const MAX_TASK_DESCRIPTION_LEN: usize = 1000;

#[derive(Deserialize, ToSchema)]
pub struct CreateOvertime {
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub work_date: NaiveDate,
    #[schema(example = "19:30:00", value_type = String)]
    pub actual_check_out_time: NaiveTime,
    #[schema(example = 2.5)]
    pub overtime_hours: f64,
    #[schema(example = "Release night")]
    pub reason: String,
    pub task_description: Option<String>,
}

fn validate_overtime(body: &CreateOvertime, today: NaiveDate) -> ApiResult<Option<String>> {
    if body.work_date > today {
        return Err(ApiError::bad_request("Overtime cannot be requested for a future date"));
    }
    if !(MIN_OVERTIME_HOURS..=MAX_OVERTIME_HOURS).contains(&body.overtime_hours) {
        return Err(ApiError::bad_request("Overtime hours must be between 0.1 and 12"));
    }
    let description = body
        .task_description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);
    if description.as_ref().is_some_and(|d| d.chars().count() > MAX_TASK_DESCRIPTION_LEN) {
        return Err(ApiError::bad_request("Task description must be at most 1000 characters"));
    }
    Ok(description)
}

/// Submit an overtime request
#[utoipa::path(
    post,
    path = "/api/overtime-requests",
    request_body = CreateOvertime,
    responses(
        (status = 201, description = "Overtime request submitted", body = Object, example = json!({
            "message": "Overtime request submitted",
            "request_id": 9
        })),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "A request already exists for this date")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn create_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    hub: web::Data<NotificationHub>,
    payload: web::Json<CreateOvertime>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    let task_description = validate_overtime(&payload, Local::now().date_naive())?;
    let reason = validate_reason(&payload.reason)?;

    if requests::active_on_date(pool.get_ref(), RequestKind::Overtime, "work_date", auth.user_id, payload.work_date)
        .await?
    {
        return Err(ApiError::conflict("An overtime request already exists for this date").into());
    }

    let request_id = sqlx::query(
        r#"
        INSERT INTO overtime_requests
            (user_id, work_date, actual_check_out_time, overtime_hours, reason, task_description)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(payload.work_date)
    .bind(payload.actual_check_out_time)
    .bind(payload.overtime_hours)
    .bind(&reason)
    .bind(&task_description)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to create overtime request"))?
    .last_insert_id();

    requests::announce_submission(
        pool.get_ref(),
        &hub,
        &meta,
        &auth,
        RequestKind::Overtime,
        request_id,
        json!({
            "work_date": payload.work_date,
            "actual_check_out_time": payload.actual_check_out_time,
            "overtime_hours": payload.overtime_hours,
        }),
    )
    .await;

    Ok(HttpResponse::Created().json(json!({
        "message": "Overtime request submitted",
        "request_id": request_id
    })))
}

/// My overtime requests
#[utoipa::path(
    get,
    path = "/api/overtime-requests/mine",
    params(RequestFilter),
    responses((status = 200, description = "Own requests", body = OvertimePage)),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn my_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequestFilter>,
) -> actix_web::Result<impl Responder> {
    let page = requests::list::<OvertimeRequest>(
        pool.get_ref(),
        RequestKind::Overtime,
        OVERTIME_SELECT,
        &query,
        Some(auth.user_id),
    )
    .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// List overtime requests (admin)
#[utoipa::path(
    get,
    path = "/api/overtime-requests",
    params(RequestFilter),
    responses((status = 200, description = "Overtime requests", body = OvertimePage)),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn overtime_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequestFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let page =
        requests::list::<OvertimeRequest>(pool.get_ref(), RequestKind::Overtime, OVERTIME_SELECT, &query, None).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/overtime-requests/{request_id}",
    params(("request_id" = u64, Path, description = "Overtime request ID")),
    responses((status = 200, description = "Overtime request", body = OvertimeRequest), (status = 404, description = "Not found")),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn get_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let request: OvertimeRequest =
        requests::fetch_visible(pool.get_ref(), RequestKind::Overtime, OVERTIME_SELECT, path.into_inner(), &auth)
            .await?;
    Ok(HttpResponse::Ok().json(request))
}

#[utoipa::path(
    put,
    path = "/api/overtime-requests/{request_id}/approve",
    params(("request_id" = u64, Path, description = "Overtime request ID")),
    request_body(content = ReviewPayload, description = "Optional note"),
    responses(
        (status = 200, description = "Approved; attendance and payroll updated"),
        (status = 400, description = "Already processed"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn approve_overtime(
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
        RequestKind::Overtime,
        path.into_inner(),
        Decision::Approve,
        payload.as_deref(),
    )
    .await
}

#[utoipa::path(
    put,
    path = "/api/overtime-requests/{request_id}/reject",
    params(("request_id" = u64, Path, description = "Overtime request ID")),
    request_body(content = ReviewPayload, description = "Rejection reason (required)"),
    responses(
        (status = 200, description = "Rejected"),
        (status = 400, description = "Missing reason or already processed"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn reject_overtime(
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
        RequestKind::Overtime,
        path.into_inner(),
        Decision::Reject,
        Some(&*payload),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(day: u32, hours: f64, description: Option<&str>) -> CreateOvertime {
        CreateOvertime {
            work_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            actual_check_out_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            overtime_hours: hours,
            reason: "release".into(),
            task_description: description.map(Into::into),
        }
    }

    #[test]
    fn overtime_rules() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(validate_overtime(&body(10, 2.0, Some("  ")), today).unwrap(), None);
        assert!(validate_overtime(&body(9, 12.0, None), today).is_ok());
        assert!(validate_overtime(&body(11, 2.0, None), today).is_err());
        assert!(validate_overtime(&body(9, 0.05, None), today).is_err());
        assert!(validate_overtime(&body(9, 12.5, None), today).is_err());
        assert!(validate_overtime(&body(9, 1.0, Some(&"t".repeat(1001))), today).is_err());
    }
}
