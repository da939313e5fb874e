use crate::{
    api::paging::{PageQuery, Paginated},
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, db_error, is_duplicate_key},
    model::attendance::{ATTENDANCE_COLUMNS, Attendance, AttendanceStats, AttendanceWithUser},
    services::{
        attendance_rules::{
            ensure_check_in_window, is_late, left_early, total_hours, validate_coordinates, validate_photo_path,
            within_geofence,
        },
        audit::{AuditEntry, AuditHelper, RequestMeta},
        geocode::Geocoder,
        settings,
    },
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

pub const MAX_NOTES_LEN: usize = 1000;
pub const DEFAULT_HISTORY_DAYS: i64 = 30;

#[derive(Deserialize, ToSchema)]
pub struct AttendanceMarkReq {
    #[schema(example = 23.8103)]
    pub latitude: f64,
    #[schema(example = 90.4125)]
    pub longitude: f64,
    /// Path of the already-uploaded proof photo
    #[schema(example = "uploads/attendance/2025/03/amy-0810.jpg")]
    pub photo_path: String,
    pub notes: Option<String>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DateQuery {
    /// Work date, defaults to today
    #[param(value_type = Option<String>, example = "2025-03-10")]
    pub date: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryFilter {
    pub user_id: Option<u64>,
    pub department_id: Option<u64>,
    /// Inclusive, defaults to 30 days ago
    #[param(value_type = Option<String>, example = "2025-03-10")]
    pub from: Option<NaiveDate>,
    /// Inclusive, defaults to today
    #[param(value_type = Option<String>, example = "2025-03-10")]
    pub to: Option<NaiveDate>,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CoordinatesQuery {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceReport {
    #[schema(value_type = String, format = "date")]
    pub from: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub to: NaiveDate,
    pub stats: AttendanceStats,
    pub records: Vec<AttendanceWithUser>,
}

enum FilterValue {
    U64(u64),
    Date(NaiveDate),
}

/* =========================
   RULES
========================= */

fn clean_notes(notes: Option<&str>) -> ApiResult<Option<String>> {
    let notes = notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
    if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
        return Err(ApiError::bad_request("Notes must be at most 1000 characters"));
    }
    Ok(notes)
}

fn ensure_can_check_in(today: Option<&Attendance>) -> ApiResult<()> {
    match today {
        Some(a) if a.check_out_time.is_some() => {
            Err(ApiError::bad_request("Attendance for today is already completed"))
        }
        Some(a) if a.check_in_time.is_some() => Err(ApiError::bad_request("You have already checked in today")),
        _ => Ok(()),
    }
}

fn ensure_can_check_out(today: Option<&Attendance>) -> ApiResult<&Attendance> {
    match today {
        Some(a) if a.check_out_time.is_some() => Err(ApiError::bad_request("You have already checked out today")),
        Some(a) if a.check_in_time.is_some() => Ok(a),
        _ => Err(ApiError::bad_request("You have not checked in today")),
    }
}

/// The conditional check-out update matched nothing: another request closed the day first.
fn ensure_checked_out(rows_affected: u64) -> ApiResult<()> {
    if rows_affected == 0 {
        return Err(ApiError::bad_request("You have already checked out today"));
    }
    Ok(())
}

/// Defaults the range to the last 30 days and refuses inverted ranges.
fn resolve_range(from: Option<NaiveDate>, to: Option<NaiveDate>, today: NaiveDate) -> ApiResult<(NaiveDate, NaiveDate)> {
    let to = to.unwrap_or(today);
    let from = from.unwrap_or(to - Duration::days(DEFAULT_HISTORY_DAYS));
    if from > to {
        return Err(ApiError::bad_request("'from' must not be after 'to'"));
    }
    Ok((from, to))
}

async fn record_for(pool: &MySqlPool, user_id: u64, date: NaiveDate) -> ApiResult<Option<Attendance>> {
    sqlx::query_as::<_, Attendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendances a WHERE a.user_id = ? AND a.work_date = ?"
    ))
    .bind(user_id)
    .bind(date)
    .fetch_optional(pool)
    .await
    .map_err(db_error("Failed to load attendance"))
}

/* =========================
   STAFF
========================= */

/// Today's attendance record
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses((status = 200, description = "Today's record or null", body = Attendance)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn today(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let record = record_for(pool.get_ref(), auth.user_id, Local::now().date_naive()).await?;
    Ok(HttpResponse::Ok().json(record))
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-in",
    request_body = AttendanceMarkReq,
    responses(
        (status = 200, description = "Checked in successfully", body = Attendance),
        (status = 400, description = "Already checked in, window closed or invalid input", body = Object, example = json!({
            "message": "You have already checked in today"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    geocoder: web::Data<Geocoder>,
    body: web::Json<AttendanceMarkReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    let audit = AuditHelper::new(pool.get_ref(), &meta);
    let now = Local::now().naive_local();
    let today = now.date();

    validate_coordinates(body.latitude, body.longitude)?;
    validate_photo_path(&body.photo_path)?;
    let notes = clean_notes(body.notes.as_deref())?;

    let rules = settings::attendance_rules(pool.get_ref())
        .await
        .map_err(db_error("Failed to load attendance settings"))?;
    if let Err(e) = ensure_check_in_window(now.time(), &rules) {
        audit
            .log_failed_attempt(Some(auth.user_id), "CHECK_IN", "Attendance", "Check-in before opening time")
            .await;
        return Err(e.into());
    }

    let existing = record_for(pool.get_ref(), auth.user_id, today).await?;
    ensure_can_check_in(existing.as_ref())?;

    let late = is_late(now.time(), &rules);
    let excused = if late {
        let approved: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM late_requests WHERE user_id = ? AND request_date = ? AND status = 'Approved'",
        )
        .bind(auth.user_id)
        .bind(today)
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to check late requests"))?;
        approved > 0
    } else {
        false
    };
    let geofence_ok = within_geofence(body.latitude, body.longitude, &rules);
    let address = geocoder.reverse(body.latitude, body.longitude).await;

    sqlx::query(
        r#"
        INSERT INTO attendances
            (user_id, work_date, check_in_time, check_in_latitude, check_in_longitude,
             check_in_address, check_in_photo, check_in_notes, check_in_ip_address,
             is_late, late_excused, is_within_geofence)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.user_id)
    .bind(today)
    .bind(now)
    .bind(body.latitude)
    .bind(body.longitude)
    .bind(&address)
    .bind(body.photo_path.trim())
    .bind(&notes)
    .bind(&meta.ip_address)
    .bind(late)
    .bind(excused)
    .bind(geofence_ok)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        // concurrent double submit
        if is_duplicate_key(&e) {
            ApiError::bad_request("You have already checked in today")
        } else {
            ApiError::from(e)
        }
    })?;

    let record = record_for(pool.get_ref(), auth.user_id, today)
        .await?
        .ok_or(ApiError::Internal)?;

    audit
        .log(
            AuditEntry::new("CHECK_IN", "Attendance")
                .by(auth.user_id)
                .entity(record.attendance_id)
                .new_values(json!({
                    "check_in_time": now.to_string(),
                    "is_late": late,
                    "late_excused": excused,
                    "is_within_geofence": geofence_ok,
                    "address": address,
                })),
        )
        .await;

    tracing::info!(user_id = auth.user_id, late, geofence_ok, "Checked in");
    Ok(HttpResponse::Ok().json(record))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/check-out",
    request_body = AttendanceMarkReq,
    responses(
        (status = 200, description = "Checked out successfully", body = Attendance),
        (status = 400, description = "No open check-in or invalid input", body = Object, example = json!({
            "message": "You have not checked in today"
        })),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    geocoder: web::Data<Geocoder>,
    body: web::Json<AttendanceMarkReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    let now = Local::now().naive_local();
    let today = now.date();

    validate_coordinates(body.latitude, body.longitude)?;
    validate_photo_path(&body.photo_path)?;
    let notes = clean_notes(body.notes.as_deref())?;

    let existing = record_for(pool.get_ref(), auth.user_id, today).await?;
    let open = ensure_can_check_out(existing.as_ref())?;
    let checked_in_at = open.check_in_time.ok_or(ApiError::Internal)?;
    let attendance_id = open.attendance_id;

    let rules = settings::attendance_rules(pool.get_ref())
        .await
        .map_err(db_error("Failed to load attendance settings"))?;
    let hours = total_hours(checked_in_at, now);
    let early = left_early(now.time(), &rules);

    let overtime: Option<f64> = sqlx::query_scalar(
        r#"
        SELECT overtime_hours FROM overtime_requests
        WHERE user_id = ? AND work_date = ? AND status = 'Approved'
        ORDER BY reviewed_at DESC
        LIMIT 1
        "#,
    )
    .bind(auth.user_id)
    .bind(today)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(db_error("Failed to check overtime requests"))?;

    let address = geocoder.reverse(body.latitude, body.longitude).await;

    let updated = sqlx::query(
        r#"
        UPDATE attendances
        SET check_out_time = ?, check_out_latitude = ?, check_out_longitude = ?,
            check_out_address = ?, check_out_photo = ?, check_out_notes = ?,
            check_out_ip_address = ?, total_hours = ?, left_early = ?,
            overtime_hours = COALESCE(?, overtime_hours)
        WHERE attendance_id = ? AND check_out_time IS NULL
        "#,
    )
    .bind(now)
    .bind(body.latitude)
    .bind(body.longitude)
    .bind(&address)
    .bind(body.photo_path.trim())
    .bind(&notes)
    .bind(&meta.ip_address)
    .bind(hours)
    .bind(early)
    .bind(overtime)
    .bind(attendance_id)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to check out"))?;
    ensure_checked_out(updated.rows_affected())?;

    let record = record_for(pool.get_ref(), auth.user_id, today)
        .await?
        .ok_or(ApiError::Internal)?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("CHECK_OUT", "Attendance")
                .by(auth.user_id)
                .entity(attendance_id)
                .new_values(json!({
                    "check_out_time": now.to_string(),
                    "total_hours": hours,
                    "left_early": early,
                    "overtime_hours": overtime,
                })),
        )
        .await;

    tracing::info!(user_id = auth.user_id, hours, early, "Checked out");
    Ok(HttpResponse::Ok().json(record))
}

/// My attendance history
#[utoipa::path(
    get,
    path = "/api/attendance/history",
    params(PageQuery),
    responses((status = 200, description = "Newest first", body = AttendancePage)),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn my_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<PageQuery>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    let (page, per_page, offset) = query.resolve();

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attendances WHERE user_id = ?")
        .bind(auth.user_id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(db_error("Failed to count attendance"))?;

    let data = sqlx::query_as::<_, Attendance>(&format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendances a WHERE a.user_id = ? ORDER BY a.work_date DESC LIMIT ? OFFSET ?"
    ))
    .bind(auth.user_id)
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to load attendance history"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log_view(auth.user_id, "Attendance", None, format!("Viewed attendance history page {page}"))
        .await;

    Ok(HttpResponse::Ok().json(Paginated::new(data, page, per_page, total)))
}

/* =========================
   ADMIN
========================= */

/// Everyone's attendance for a day
#[utoipa::path(
    get,
    path = "/api/attendance/by-date",
    params(DateQuery),
    responses((status = 200, description = "Records for the day", body = [AttendanceWithUser])),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_by_date(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<DateQuery>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let date = query.date.unwrap_or_else(|| Local::now().date_naive());

    let records = sqlx::query_as::<_, AttendanceWithUser>(&format!(
        r#"
        SELECT {ATTENDANCE_COLUMNS}, u.full_name, d.department_name
        FROM attendances a
        JOIN users u ON u.user_id = a.user_id
        LEFT JOIN departments d ON d.department_id = u.department_id
        WHERE a.work_date = ?
        ORDER BY a.check_in_time
        "#
    ))
    .bind(date)
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to load attendance for date"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log_view(auth.user_id, "Attendance", None, format!("Viewed attendance for {date}"))
        .await;

    Ok(HttpResponse::Ok().json(records))
}

/// Attendance history with aggregate stats
#[utoipa::path(
    get,
    path = "/api/attendance/report",
    params(HistoryFilter),
    responses(
        (status = 200, description = "Records and stats", body = AttendanceReport),
        (status = 400, description = "Invalid range")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn attendance_report(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<HistoryFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let (from, to) = resolve_range(query.from, query.to, Local::now().date_naive())?;

    let mut where_sql = String::from(" WHERE a.work_date BETWEEN ? AND ?");
    let mut args = vec![FilterValue::Date(from), FilterValue::Date(to)];
    if let Some(user_id) = query.user_id {
        where_sql.push_str(" AND a.user_id = ?");
        args.push(FilterValue::U64(user_id));
    }
    if let Some(department_id) = query.department_id {
        where_sql.push_str(" AND u.department_id = ?");
        args.push(FilterValue::U64(department_id));
    }

    let sql = format!(
        r#"
        SELECT {ATTENDANCE_COLUMNS}, u.full_name, d.department_name
        FROM attendances a
        JOIN users u ON u.user_id = a.user_id
        LEFT JOIN departments d ON d.department_id = u.department_id
        {where_sql}
        ORDER BY a.work_date DESC, u.full_name
        "#
    );
    let mut q = sqlx::query_as::<_, AttendanceWithUser>(&sql);
    for arg in args {
        q = match arg {
            FilterValue::U64(v) => q.bind(v),
            FilterValue::Date(v) => q.bind(v),
        };
    }
    let records = q
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to load attendance report"))?;

    let stats = AttendanceStats::from_records(records.iter().map(|r| &r.attendance));
    Ok(HttpResponse::Ok().json(AttendanceReport { from, to, stats, records }))
}

/// Reverse-geocode coordinates into an address
#[utoipa::path(
    get,
    path = "/api/attendance/reverse-geocode",
    params(CoordinatesQuery),
    responses(
        (status = 200, description = "Resolved or fallback address", body = Object, example = json!({
            "address": "Lat: 23.810300, Long: 90.412500"
        })),
        (status = 400, description = "Invalid coordinates")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn reverse_geocode(
    _auth: AuthUser,
    geocoder: web::Data<Geocoder>,
    query: web::Query<CoordinatesQuery>,
) -> actix_web::Result<impl Responder> {
    validate_coordinates(query.latitude, query.longitude)?;
    let address = geocoder.reverse(query.latitude, query.longitude).await;
    Ok(HttpResponse::Ok().json(json!({ "address": address })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::sample;
    use actix_web::{App, test};

    #[::core::prelude::v1::test]
    fn check_in_and_out_preconditions() {
        let mut open = sample(3, false, None);
        assert!(ensure_can_check_in(None).is_ok());
        assert!(ensure_can_check_in(Some(&open)).is_err());
        assert!(ensure_can_check_out(None).is_err());
        assert!(ensure_can_check_out(Some(&open)).is_ok());

        open.check_in_time = None;
        assert!(ensure_can_check_out(Some(&open)).is_err());

        let done = sample(3, false, Some(8.0));
        assert!(ensure_can_check_in(Some(&done)).is_err());
        assert!(ensure_can_check_out(Some(&done)).is_err());
    }

    #[::core::prelude::v1::test]
    fn losing_a_concurrent_check_out_is_refused() {
        assert!(ensure_checked_out(1).is_ok());
        assert!(matches!(ensure_checked_out(0), Err(ApiError::BadRequest(_))));
    }

    #[::core::prelude::v1::test]
    fn history_range_defaults_to_thirty_days() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        let (from, to) = resolve_range(None, None, today).unwrap();
        assert_eq!(to, today);
        assert_eq!(from, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert!(resolve_range(Some(today), Some(from), today).is_err());
    }

    #[::core::prelude::v1::test]
    fn notes_are_trimmed_and_bounded() {
        assert_eq!(clean_notes(Some("  ")).unwrap(), None);
        assert_eq!(clean_notes(Some(" on site ")).unwrap().as_deref(), Some("on site"));
        assert!(clean_notes(Some(&"n".repeat(1001))).is_err());
    }

    #[actix_web::test]
    async fn reverse_geocode_falls_back_without_provider() {
        use crate::auth::jwt::{TokenSubject, generate_access_token};
        use crate::config::Config;

        let config = Config::for_tests();
        let token = generate_access_token(
            &TokenSubject { user_id: 2, username: "amy".into(), role: 2, department_id: None },
            &config.jwt_secret,
            60,
        )
        .unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .app_data(web::Data::new(Geocoder::new(None)))
                .route("/geo", web::get().to(reverse_geocode)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/geo?latitude=23.8103&longitude=90.4125")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["address"], "Lat: 23.810300, Long: 90.412500");

        let bad = test::TestRequest::get()
            .uri("/geo?latitude=123&longitude=0")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        assert_eq!(test::call_service(&app, bad).await.status(), 400);
    }
}
