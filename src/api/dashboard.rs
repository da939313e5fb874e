use crate::{
    api::{
        audit::recent_logins,
        requests::{PendingCounts, count_pending},
        users::load_profile,
    },
    auth::auth::AuthUser,
    error::{ApiError, db_error},
    model::{
        audit::{AUDIT_SELECT, AuditLog, LoginHistory},
        user::UserProfile,
    },
    services::payroll::month_bounds,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Days, Local, NaiveDate, NaiveTime};
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

const TOP_LIMIT: u32 = 5;

#[derive(Debug, Default, Serialize, ToSchema, sqlx::FromRow)]
pub struct UserTotals {
    pub total: i64,
    pub active: i64,
    pub admins: i64,
    pub staff: i64,
}

#[derive(Debug, Default, Serialize, ToSchema, sqlx::FromRow)]
pub struct TaskStats {
    pub active_tasks: i64,
    pub assignments: i64,
    pub completed: i64,
    pub overdue_tasks: i64,
    /// Completed assignments over all assignments, in percent
    #[sqlx(skip)]
    pub completion_rate: f64,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct Performer {
    pub user_id: u64,
    pub full_name: String,
    pub department_name: Option<String>,
    /// Units completed this week, capped at each task's target
    pub completed: i64,
    pub target: i64,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct LateComer {
    pub user_id: u64,
    pub full_name: String,
    pub department_name: Option<String>,
    pub late_days: i64,
}

#[derive(Serialize, ToSchema)]
pub struct AdminDashboard {
    pub users: UserTotals,
    pub departments: i64,
    pub active_departments: i64,
    pub tasks: TaskStats,
    pub month_check_ins: i64,
    /// Check-ins this month that were on time or excused, in percent
    pub on_time_rate: f64,
    pub top_performers: Vec<Performer>,
    pub frequent_late: Vec<LateComer>,
    pub pending_requests: PendingCounts,
    pub recent_activity: Vec<AuditLog>,
}

#[derive(Serialize, ToSchema)]
pub struct StaffDashboard {
    pub profile: UserProfile,
    pub recent_logins: Vec<LoginHistory>,
    pub logins_this_month: i64,
    pub attendance_days: i64,
    pub hours_this_month: f64,
    pub department_headcount: i64,
}

/// Percentage with one decimal; zero when there is nothing to measure.
pub fn rate(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}

/// `[first of month 00:00, first of next month 00:00)`
fn month_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let (first, last) = month_bounds(today);
    (first, last.checked_add_days(Days::new(1)).unwrap_or(last))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/admin",
    responses((status = 200, description = "Admin overview", body = AdminDashboard), (status = 403)),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn admin_dashboard(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let pool = pool.get_ref();
    let now = Local::now().naive_local();
    let (first, next) = month_window(now.date());

    let users = sqlx::query_as::<_, UserTotals>(
        r#"
        SELECT CAST(COUNT(*) AS SIGNED) AS total,
               CAST(COALESCE(SUM(is_active), 0) AS SIGNED) AS active,
               CAST(COALESCE(SUM(role_id = 1), 0) AS SIGNED) AS admins,
               CAST(COALESCE(SUM(role_id = 2), 0) AS SIGNED) AS staff
        FROM users
        "#,
    )
    .fetch_one(pool)
    .await
    .map_err(db_error("Failed to count users"))?;

    let (departments, active_departments): (i64, i64) = sqlx::query_as(
        "SELECT CAST(COUNT(*) AS SIGNED), CAST(COALESCE(SUM(is_active), 0) AS SIGNED) FROM departments",
    )
    .fetch_one(pool)
    .await
    .map_err(db_error("Failed to count departments"))?;

    let mut tasks = sqlx::query_as::<_, TaskStats>(
        r#"
        SELECT
            (SELECT CAST(COUNT(*) AS SIGNED) FROM tasks WHERE is_active = TRUE AND is_deleted = FALSE) AS active_tasks,
            CAST(COUNT(ut.user_task_id) AS SIGNED) AS assignments,
            CAST(COALESCE(SUM(ut.completed_this_week >= t.target_per_week), 0) AS SIGNED) AS completed,
            (SELECT CAST(COUNT(*) AS SIGNED) FROM tasks
             WHERE is_active = TRUE AND is_deleted = FALSE AND deadline IS NOT NULL AND deadline < ?) AS overdue_tasks
        FROM user_tasks ut
        JOIN tasks t ON t.task_id = ut.task_id AND t.is_active = TRUE AND t.is_deleted = FALSE
        "#,
    )
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(db_error("Failed to load task stats"))?;
    tasks.completion_rate = rate(tasks.completed, tasks.assignments);

    let (month_check_ins, on_time): (i64, i64) = sqlx::query_as(
        r#"
        SELECT CAST(COUNT(*) AS SIGNED),
               CAST(COALESCE(SUM(is_late = FALSE OR late_excused = TRUE), 0) AS SIGNED)
        FROM attendances
        WHERE work_date >= ? AND work_date < ? AND check_in_time IS NOT NULL
        "#,
    )
    .bind(first)
    .bind(next)
    .fetch_one(pool)
    .await
    .map_err(db_error("Failed to load attendance stats"))?;

    let top_performers = sqlx::query_as::<_, Performer>(&format!(
        r#"
        SELECT u.user_id, u.full_name, d.department_name,
               CAST(SUM(LEAST(ut.completed_this_week, t.target_per_week)) AS SIGNED) AS completed,
               CAST(SUM(t.target_per_week) AS SIGNED) AS target
        FROM user_tasks ut
        JOIN tasks t ON t.task_id = ut.task_id AND t.is_active = TRUE AND t.is_deleted = FALSE
        JOIN users u ON u.user_id = ut.user_id AND u.is_active = TRUE
        LEFT JOIN departments d ON d.department_id = u.department_id
        GROUP BY u.user_id, u.full_name, d.department_name
        ORDER BY completed DESC, u.full_name
        LIMIT {TOP_LIMIT}
        "#
    ))
    .fetch_all(pool)
    .await
    .map_err(db_error("Failed to load top performers"))?;

    let frequent_late = sqlx::query_as::<_, LateComer>(&format!(
        r#"
        SELECT u.user_id, u.full_name, d.department_name, CAST(COUNT(*) AS SIGNED) AS late_days
        FROM attendances a
        JOIN users u ON u.user_id = a.user_id
        LEFT JOIN departments d ON d.department_id = u.department_id
        WHERE a.work_date >= ? AND a.work_date < ? AND a.is_late = TRUE AND a.late_excused = FALSE
        GROUP BY u.user_id, u.full_name, d.department_name
        ORDER BY late_days DESC, u.full_name
        LIMIT {TOP_LIMIT}
        "#
    ))
    .bind(first)
    .bind(next)
    .fetch_all(pool)
    .await
    .map_err(db_error("Failed to load late comers"))?;

    let pending_requests = count_pending(pool).await?;

    let recent_activity = sqlx::query_as::<_, AuditLog>(&format!(
        "{AUDIT_SELECT} ORDER BY a.timestamp DESC, a.audit_log_id DESC LIMIT {TOP_LIMIT}"
    ))
    .fetch_all(pool)
    .await
    .map_err(db_error("Failed to load recent activity"))?;

    Ok(HttpResponse::Ok().json(AdminDashboard {
        users,
        departments,
        active_departments,
        tasks,
        month_check_ins,
        on_time_rate: rate(on_time, month_check_ins),
        top_performers,
        frequent_late,
        pending_requests,
        recent_activity,
    }))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/staff",
    responses((status = 200, description = "Personal overview", body = StaffDashboard)),
    security(("bearer_auth" = [])),
    tag = "Dashboard"
)]
pub async fn staff_dashboard(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let pool = pool.get_ref();
    let (first, next) = month_window(Local::now().date_naive());

    let profile = load_profile(pool, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let recent_logins = recent_logins(pool, auth.user_id, TOP_LIMIT).await?;

    let logins_this_month: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM login_history WHERE user_id = ? AND is_success = TRUE AND login_time >= ? AND login_time < ?",
    )
    .bind(auth.user_id)
    .bind(first.and_time(NaiveTime::MIN))
    .bind(next.and_time(NaiveTime::MIN))
    .fetch_one(pool)
    .await
    .map_err(db_error("Failed to count logins"))?;

    let (attendance_days, hours_this_month): (i64, f64) = sqlx::query_as(
        r#"
        SELECT CAST(COUNT(*) AS SIGNED), COALESCE(SUM(total_hours), 0)
        FROM attendances
        WHERE user_id = ? AND work_date >= ? AND work_date < ? AND check_in_time IS NOT NULL
        "#,
    )
    .bind(auth.user_id)
    .bind(first)
    .bind(next)
    .fetch_one(pool)
    .await
    .map_err(db_error("Failed to load attendance summary"))?;

    let department_headcount: i64 = match profile.department_id {
        Some(department_id) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE department_id = ? AND is_active = TRUE")
                .bind(department_id)
                .fetch_one(pool)
                .await
                .map_err(db_error("Failed to count department members"))?
        }
        None => 0,
    };

    Ok(HttpResponse::Ok().json(StaffDashboard {
        profile,
        recent_logins,
        logins_this_month,
        attendance_days,
        hours_this_month: (hours_this_month * 100.0).round() / 100.0,
        department_headcount,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_rounds_to_one_decimal() {
        assert_eq!(rate(1, 3), 33.3);
        assert_eq!(rate(2, 3), 66.7);
        assert_eq!(rate(5, 5), 100.0);
        assert_eq!(rate(3, 0), 0.0);
    }

    #[test]
    fn month_window_is_half_open() {
        let (first, next) = month_window(NaiveDate::from_ymd_opt(2024, 2, 17).unwrap());
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(next, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }
}
