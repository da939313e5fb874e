use crate::{
    auth::auth::AuthUser,
    error::{ApiError, ApiResult, db_error},
    model::task::{
        ASSIGNMENT_SELECT, Assignment, Priority, Task, TaskStatus, is_overdue, progress_percent, task_status,
        week_start,
    },
    services::{
        audit::{AuditEntry, AuditHelper, RequestMeta},
        notifier::{Notification, NotificationHub, NotificationKind, Target},
    },
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlPool, Transaction};
use std::collections::BTreeSet;
use utoipa::ToSchema;

pub const MAX_TASK_NAME_LEN: usize = 200;
pub const MAX_TEXT_LEN: usize = 500;

const TASK_SELECT: &str = r#"
    SELECT task_id, task_name, description, platform, target_per_week, deadline, priority,
           is_active, created_at, updated_at
    FROM tasks
"#;

#[derive(Deserialize, ToSchema)]
pub struct TaskReq {
    #[schema(example = "Weekly social posts")]
    pub task_name: String,
    pub description: Option<String>,
    #[schema(example = "Facebook")]
    pub platform: Option<String>,
    #[schema(example = 5)]
    pub target_per_week: i32,
    #[schema(value_type = Option<String>, format = "date-time", example = "2026-12-31T17:00:00")]
    pub deadline: Option<NaiveDateTime>,
    pub priority: Option<Priority>,
    /// Users to assign; on update the assignment set is replaced
    #[serde(default)]
    pub assignee_ids: Vec<u64>,
}

struct ValidTask {
    name: String,
    description: Option<String>,
    platform: Option<String>,
    target: i32,
    deadline: Option<NaiveDateTime>,
    priority: Priority,
    assignees: Vec<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct TaskTotals {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub overdue: usize,
}

#[derive(Serialize, sqlx::FromRow, ToSchema)]
pub struct TaskRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub task: Task,
    pub assignee_count: i64,
}

#[derive(Serialize, ToSchema)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskRow>,
    pub totals: TaskTotals,
}

/// An assignment with its derived progress.
#[derive(Serialize, ToSchema)]
pub struct TaskProgress {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub status: TaskStatus,
    #[schema(example = 60.0)]
    pub progress_percent: f64,
    pub is_overdue: bool,
}

impl TaskProgress {
    pub fn from_assignment(assignment: Assignment, now: NaiveDateTime) -> Self {
        let target = assignment.target_per_week;
        let done = assignment.completed_this_week;
        TaskProgress {
            status: task_status(done, target),
            progress_percent: progress_percent(done, target),
            is_overdue: is_overdue(assignment.deadline, now),
            assignment,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TaskDetails {
    pub task: Task,
    pub assignees: Vec<TaskProgress>,
}

#[derive(Serialize, ToSchema)]
pub struct MyTasksSummary {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub overdue: usize,
    pub tasks: Vec<TaskProgress>,
}

impl MyTasksSummary {
    pub fn build(tasks: Vec<TaskProgress>) -> Self {
        let completed = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
        MyTasksSummary {
            total: tasks.len(),
            completed,
            in_progress: tasks.len() - completed,
            overdue: tasks.iter().filter(|t| t.is_overdue).count(),
            tasks,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ProgressReq {
    #[schema(example = 3)]
    pub completed_this_week: i32,
    #[schema(example = "https://docs.example.com/report-12")]
    pub report_link: Option<String>,
}

/* =========================
   RULES
========================= */

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Deadline is only checked on create; existing tasks may keep a past deadline.
fn validate_task(body: &TaskReq, now: NaiveDateTime, check_deadline: bool) -> ApiResult<ValidTask> {
    let name = body.task_name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Task name is required"));
    }
    if name.chars().count() > MAX_TASK_NAME_LEN {
        return Err(ApiError::bad_request("Task name must be at most 200 characters"));
    }
    if body.target_per_week < 0 {
        return Err(ApiError::bad_request("Weekly target cannot be negative"));
    }
    let description = trimmed(body.description.as_deref());
    let platform = trimmed(body.platform.as_deref());
    if [&description, &platform]
        .iter()
        .any(|v| v.as_ref().is_some_and(|s| s.chars().count() > MAX_TEXT_LEN))
    {
        return Err(ApiError::bad_request("Description and platform must be at most 500 characters"));
    }
    if check_deadline && body.deadline.is_some_and(|d| d < now) {
        return Err(ApiError::bad_request("Deadline cannot be in the past"));
    }

    let assignees: BTreeSet<u64> = body.assignee_ids.iter().copied().collect();
    Ok(ValidTask {
        name: name.to_string(),
        description,
        platform,
        target: body.target_per_week,
        deadline: body.deadline,
        priority: body.priority.unwrap_or_default(),
        assignees: assignees.into_iter().collect(),
    })
}

/// High priority first, then earliest deadline; tasks without a deadline last.
pub fn sort_for_staff(tasks: &mut [Assignment]) {
    tasks.sort_by(|a, b| {
        Priority::parse_lenient(&a.priority)
            .rank()
            .cmp(&Priority::parse_lenient(&b.priority).rank())
            .then_with(|| match (a.deadline, b.deadline) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
    });
}

fn totals(rows: &[TaskRow], now: NaiveDateTime) -> TaskTotals {
    let active = rows.iter().filter(|r| r.task.is_active).count();
    TaskTotals {
        total: rows.len(),
        active,
        inactive: rows.len() - active,
        overdue: rows
            .iter()
            .filter(|r| r.task.is_active && is_overdue(r.task.deadline, now))
            .count(),
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

async fn load_task(pool: &MySqlPool, task_id: u64) -> ApiResult<Task> {
    sqlx::query_as::<_, Task>(&format!("{TASK_SELECT} WHERE task_id = ? AND is_deleted = FALSE"))
        .bind(task_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to load task"))?
        .ok_or_else(|| ApiError::not_found("Task not found"))
}

/// Every requested assignee must be an active user.
async fn ensure_assignable(pool: &MySqlPool, user_ids: &[u64]) -> ApiResult<()> {
    if user_ids.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; user_ids.len()].join(", ");
    let sql = format!("SELECT COUNT(*) FROM users WHERE is_active = TRUE AND user_id IN ({placeholders})");
    let mut q = sqlx::query_scalar::<_, i64>(&sql);
    for id in user_ids {
        q = q.bind(*id);
    }
    let found = q
        .fetch_one(pool)
        .await
        .map_err(db_error("Failed to check assignees"))?;
    if found as usize != user_ids.len() {
        return Err(ApiError::bad_request("One or more assignees do not exist or are inactive"));
    }
    Ok(())
}

async fn insert_assignments(
    tx: &mut Transaction<'_, MySql>,
    task_id: u64,
    user_ids: &[u64],
    now: NaiveDateTime,
) -> Result<(), sqlx::Error> {
    let monday = week_start(now.date());
    for user_id in user_ids {
        sqlx::query(
            r#"
            INSERT INTO user_tasks (user_id, task_id, completed_this_week, week_start_date)
            VALUES (?, ?, 0, ?)
            "#,
        )
        .bind(user_id)
        .bind(task_id)
        .bind(monday)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn notify_assignees(hub: &NotificationHub, user_ids: &[u64], task_name: &str) {
    for user_id in user_ids {
        hub.publish(
            Notification::new(
                Target::User(*user_id),
                NotificationKind::TaskAssigned,
                "New task assigned",
                format!("You have been assigned to \"{task_name}\""),
            )
            .with_link("/staff/tasks"),
        );
    }
}

/* =========================
   ADMIN
========================= */

/// List tasks with totals
#[utoipa::path(
    get,
    path = "/api/tasks",
    responses((status = 200, description = "Tasks", body = TaskListResponse)),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn list_tasks(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let tasks = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT t.task_id, t.task_name, t.description, t.platform, t.target_per_week, t.deadline,
               t.priority, t.is_active, t.created_at, t.updated_at,
               CAST(COUNT(ut.user_task_id) AS SIGNED) AS assignee_count
        FROM tasks t
        LEFT JOIN user_tasks ut ON ut.task_id = t.task_id
        WHERE t.is_deleted = FALSE
        GROUP BY t.task_id, t.task_name, t.description, t.platform, t.target_per_week, t.deadline,
                 t.priority, t.is_active, t.created_at, t.updated_at
        ORDER BY t.created_at DESC
        "#,
    )
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to list tasks"))?;

    let totals = totals(&tasks, now());
    Ok(HttpResponse::Ok().json(TaskListResponse { tasks, totals }))
}

/// Create a task and assign it
#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = TaskReq,
    responses(
        (status = 201, description = "Task created", body = Object, example = json!({"message": "Task created", "task_id": 7})),
        (status = 400, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn create_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    hub: web::Data<NotificationHub>,
    body: web::Json<TaskReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let now = now();
    let task = validate_task(&body, now, true)?;
    ensure_assignable(pool.get_ref(), &task.assignees).await?;

    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;
    let task_id = sqlx::query(
        r#"
        INSERT INTO tasks (task_name, description, platform, target_per_week, deadline, priority)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task.name)
    .bind(&task.description)
    .bind(&task.platform)
    .bind(task.target)
    .bind(task.deadline)
    .bind(task.priority.as_ref())
    .execute(&mut *tx)
    .await
    .map_err(db_error("Failed to create task"))?
    .last_insert_id();

    insert_assignments(&mut tx, task_id, &task.assignees, now)
        .await
        .map_err(db_error("Failed to assign task"))?;
    tx.commit().await.map_err(db_error("Failed to commit task"))?;

    notify_assignees(&hub, &task.assignees, &task.name);

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("CREATE", "Task")
                .by(auth.user_id)
                .entity(task_id)
                .new_values(json!({
                    "task_name": task.name,
                    "target_per_week": task.target,
                    "priority": task.priority.as_ref(),
                    "assignees": task.assignees,
                })),
        )
        .await;

    Ok(HttpResponse::Created().json(json!({ "message": "Task created", "task_id": task_id })))
}

/// Update a task and replace its assignments
#[utoipa::path(
    put,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    request_body = TaskReq,
    responses(
        (status = 200, description = "Task updated"),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Task not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn update_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    hub: web::Data<NotificationHub>,
    path: web::Path<u64>,
    body: web::Json<TaskReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let task_id = path.into_inner();
    let now = now();
    let task = validate_task(&body, now, false)?;
    let before = load_task(pool.get_ref(), task_id).await?;
    ensure_assignable(pool.get_ref(), &task.assignees).await?;

    let current: Vec<u64> = sqlx::query_scalar("SELECT user_id FROM user_tasks WHERE task_id = ?")
        .bind(task_id)
        .fetch_all(pool.get_ref())
        .await
        .map_err(db_error("Failed to load assignments"))?;
    let added: Vec<u64> = task.assignees.iter().copied().filter(|id| !current.contains(id)).collect();
    let removed: Vec<u64> = current.iter().copied().filter(|id| !task.assignees.contains(id)).collect();

    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;
    sqlx::query(
        r#"
        UPDATE tasks
        SET task_name = ?, description = ?, platform = ?, target_per_week = ?, deadline = ?,
            priority = ?, updated_at = NOW()
        WHERE task_id = ?
        "#,
    )
    .bind(&task.name)
    .bind(&task.description)
    .bind(&task.platform)
    .bind(task.target)
    .bind(task.deadline)
    .bind(task.priority.as_ref())
    .bind(task_id)
    .execute(&mut *tx)
    .await
    .map_err(db_error("Failed to update task"))?;

    for user_id in &removed {
        sqlx::query("DELETE FROM user_tasks WHERE task_id = ? AND user_id = ?")
            .bind(task_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to remove assignment"))?;
    }
    insert_assignments(&mut tx, task_id, &added, now)
        .await
        .map_err(db_error("Failed to assign task"))?;
    tx.commit().await.map_err(db_error("Failed to commit task"))?;

    notify_assignees(&hub, &added, &task.name);

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("UPDATE", "Task")
                .by(auth.user_id)
                .entity(task_id)
                .old(json!({
                    "task_name": before.task_name,
                    "target_per_week": before.target_per_week,
                    "priority": before.priority,
                    "assignees": current,
                }))
                .new_values(json!({
                    "task_name": task.name,
                    "target_per_week": task.target,
                    "priority": task.priority.as_ref(),
                    "assignees": task.assignees,
                })),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Task updated" })))
}

/// Soft-delete a task
#[utoipa::path(
    delete,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses((status = 204, description = "Task deleted"), (status = 404, description = "Task not found")),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn delete_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let task_id = path.into_inner();
    let task = load_task(pool.get_ref(), task_id).await?;

    sqlx::query("UPDATE tasks SET is_deleted = TRUE, is_active = FALSE, updated_at = NOW() WHERE task_id = ?")
        .bind(task_id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to delete task"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("DELETE", "Task")
                .by(auth.user_id)
                .entity(task_id)
                .old(json!({ "task_name": task.task_name })),
        )
        .await;

    Ok(HttpResponse::NoContent().finish())
}

/// Activate / deactivate a task
#[utoipa::path(
    put,
    path = "/api/tasks/{task_id}/toggle-status",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses((status = 200, description = "Status toggled"), (status = 404, description = "Task not found")),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn toggle_task(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let task_id = path.into_inner();
    let task = load_task(pool.get_ref(), task_id).await?;
    let next = !task.is_active;

    sqlx::query("UPDATE tasks SET is_active = ?, updated_at = NOW() WHERE task_id = ?")
        .bind(next)
        .bind(task_id)
        .execute(pool.get_ref())
        .await
        .map_err(db_error("Failed to toggle task"))?;

    AuditHelper::new(pool.get_ref(), &meta)
        .log(
            AuditEntry::new("UPDATE", "Task")
                .by(auth.user_id)
                .entity(task_id)
                .old(json!({ "is_active": task.is_active }))
                .new_values(json!({ "is_active": next })),
        )
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Task status updated", "is_active": next })))
}

/// Task with assignee progress
#[utoipa::path(
    get,
    path = "/api/tasks/{task_id}",
    params(("task_id" = u64, Path, description = "Task ID")),
    responses((status = 200, description = "Task details", body = TaskDetails), (status = 404, description = "Task not found")),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn task_details(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let task_id = path.into_inner();
    let task = load_task(pool.get_ref(), task_id).await?;

    let assignments = sqlx::query_as::<_, Assignment>(&format!(
        "{ASSIGNMENT_SELECT} WHERE ut.task_id = ? ORDER BY u.full_name"
    ))
    .bind(task_id)
    .fetch_all(pool.get_ref())
    .await
    .map_err(db_error("Failed to load assignees"))?;

    let now = now();
    let assignees = assignments
        .into_iter()
        .map(|a| TaskProgress::from_assignment(a, now))
        .collect();

    AuditHelper::new(pool.get_ref(), &meta)
        .log_view(auth.user_id, "Task", Some(task_id), format!("Viewed task {}", task.task_name))
        .await;

    Ok(HttpResponse::Ok().json(TaskDetails { task, assignees }))
}

/* =========================
   STAFF
========================= */

async fn my_active_assignments(pool: &MySqlPool, user_id: u64) -> ApiResult<Vec<TaskProgress>> {
    let mut assignments = sqlx::query_as::<_, Assignment>(&format!(
        "{ASSIGNMENT_SELECT} WHERE ut.user_id = ? AND t.is_active = TRUE"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(db_error("Failed to load my tasks"))?;

    sort_for_staff(&mut assignments);
    let now = now();
    Ok(assignments
        .into_iter()
        .map(|a| TaskProgress::from_assignment(a, now))
        .collect())
}

async fn load_own_assignment(pool: &MySqlPool, user_task_id: u64, auth: &AuthUser) -> ApiResult<Assignment> {
    let assignment = sqlx::query_as::<_, Assignment>(&format!("{ASSIGNMENT_SELECT} WHERE ut.user_task_id = ?"))
        .bind(user_task_id)
        .fetch_optional(pool)
        .await
        .map_err(db_error("Failed to load assignment"))?
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    if assignment.user_id != auth.user_id && !auth.is_admin() {
        return Err(ApiError::not_found("Task not found"));
    }
    Ok(assignment)
}

/// My active tasks
#[utoipa::path(
    get,
    path = "/api/my/tasks",
    responses((status = 200, description = "Active tasks, most urgent first", body = [TaskProgress])),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn my_tasks(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let tasks = my_active_assignments(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

/// My tasks with completion totals
#[utoipa::path(
    get,
    path = "/api/my/tasks/summary",
    responses((status = 200, description = "Task summary", body = MyTasksSummary)),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn my_tasks_summary(auth: AuthUser, pool: web::Data<MySqlPool>) -> actix_web::Result<impl Responder> {
    let tasks = my_active_assignments(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(MyTasksSummary::build(tasks)))
}

/// One of my assignments
#[utoipa::path(
    get,
    path = "/api/my/tasks/{user_task_id}",
    params(("user_task_id" = u64, Path, description = "Assignment ID")),
    responses((status = 200, description = "Assignment", body = TaskProgress), (status = 404, description = "Not found")),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn task_detail(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let assignment = load_own_assignment(pool.get_ref(), path.into_inner(), &auth).await?;
    Ok(HttpResponse::Ok().json(TaskProgress::from_assignment(assignment, now())))
}

/// Report weekly progress
#[utoipa::path(
    put,
    path = "/api/my/tasks/{user_task_id}/progress",
    params(("user_task_id" = u64, Path, description = "Assignment ID")),
    request_body = ProgressReq,
    responses(
        (status = 200, description = "Progress updated", body = TaskProgress),
        (status = 400, description = "Invalid progress"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Tasks"
)]
pub async fn update_progress(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<ProgressReq>,
    meta: RequestMeta,
) -> actix_web::Result<impl Responder> {
    let user_task_id = path.into_inner();
    let audit = AuditHelper::new(pool.get_ref(), &meta);

    if body.completed_this_week < 0 {
        return Err(ApiError::bad_request("Completed count cannot be negative").into());
    }
    let report_link = trimmed(body.report_link.as_deref());
    if report_link.as_ref().is_some_and(|l| l.chars().count() > MAX_TEXT_LEN) {
        return Err(ApiError::bad_request("Report link must be at most 500 characters").into());
    }

    let mut assignment = load_own_assignment(pool.get_ref(), user_task_id, &auth).await?;
    // progress is only reported by the assignee
    if assignment.user_id != auth.user_id {
        audit
            .log_failed_attempt(Some(auth.user_id), "UPDATE", "UserTask", "Progress update on another user's task")
            .await;
        return Err(ApiError::forbidden("You can only update your own tasks").into());
    }

    sqlx::query(
        "UPDATE user_tasks SET completed_this_week = ?, report_link = ?, updated_at = NOW() WHERE user_task_id = ?",
    )
    .bind(body.completed_this_week)
    .bind(&report_link)
    .bind(user_task_id)
    .execute(pool.get_ref())
    .await
    .map_err(db_error("Failed to update progress"))?;

    let previous = assignment.completed_this_week;
    assignment.completed_this_week = body.completed_this_week;
    assignment.report_link = report_link;
    let progress = TaskProgress::from_assignment(assignment, now());

    audit
        .log(
            AuditEntry::new("UPDATE", "UserTask")
                .by(auth.user_id)
                .entity(user_task_id)
                .old(json!({ "completed_this_week": previous }))
                .new_values(json!({
                    "completed_this_week": progress.assignment.completed_this_week,
                    "report_link": progress.assignment.report_link,
                    "progress_percent": progress.progress_percent,
                }))
                .describe(format!(
                    "Progress on \"{}\": {}%",
                    progress.assignment.task_name, progress.progress_percent
                )),
        )
        .await;

    Ok(HttpResponse::Ok().json(progress))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn req(name: &str, target: i32, deadline: Option<NaiveDateTime>) -> TaskReq {
        TaskReq {
            task_name: name.into(),
            description: Some("  ".into()),
            platform: None,
            target_per_week: target,
            deadline,
            priority: None,
            assignee_ids: vec![3, 1, 3],
        }
    }

    fn assignment(priority: &str, deadline: Option<NaiveDateTime>, done: i32) -> Assignment {
        Assignment {
            user_task_id: 1,
            user_id: 1,
            full_name: "Amy".into(),
            task_id: 1,
            task_name: "Posts".into(),
            description: None,
            platform: None,
            target_per_week: 4,
            deadline,
            priority: priority.into(),
            is_active: true,
            completed_this_week: done,
            report_link: None,
            week_start_date: at(10).date(),
            updated_at: None,
        }
    }

    #[test]
    fn create_validation() {
        let ok = validate_task(&req(" Posts ", 5, Some(at(20))), at(10), true).unwrap();
        assert_eq!(ok.name, "Posts");
        assert_eq!(ok.description, None);
        assert_eq!(ok.priority, Priority::Medium);
        assert_eq!(ok.assignees, vec![1, 3]);

        assert!(validate_task(&req("", 5, None), at(10), true).is_err());
        assert!(validate_task(&req("Posts", -1, None), at(10), true).is_err());
        assert!(validate_task(&req("Posts", 5, Some(at(9))), at(10), true).is_err());
        // past deadline tolerated on update
        assert!(validate_task(&req("Posts", 5, Some(at(9))), at(10), false).is_ok());
    }

    #[test]
    fn staff_ordering() {
        let mut tasks = vec![
            assignment("Low", Some(at(11)), 0),
            assignment("High", None, 0),
            assignment("High", Some(at(20)), 0),
            assignment("Medium", Some(at(12)), 0),
        ];
        sort_for_staff(&mut tasks);
        let order: Vec<_> = tasks.iter().map(|t| (t.priority.as_str(), t.deadline.is_some())).collect();
        assert_eq!(order, vec![("High", true), ("High", false), ("Medium", true), ("Low", true)]);
    }

    #[test]
    fn summary_counts() {
        let tasks = vec![
            TaskProgress::from_assignment(assignment("High", Some(at(9)), 4), at(10)),
            TaskProgress::from_assignment(assignment("Low", Some(at(9)), 1), at(10)),
            TaskProgress::from_assignment(assignment("Low", None, 0), at(10)),
        ];
        let summary = MyTasksSummary::build(tasks);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.in_progress, 2);
        assert_eq!(summary.overdue, 2);
        assert_eq!(summary.tasks[1].progress_percent, 25.0);
    }
}
