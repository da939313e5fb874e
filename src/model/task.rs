use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Default, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Sort key: High first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    /// Unknown stored values sort with Medium.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema, Display)]
pub enum TaskStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Task {
    pub task_id: u64,
    #[schema(example = "Weekly social posts")]
    pub task_name: String,
    pub description: Option<String>,
    pub platform: Option<String>,
    #[schema(example = 5)]
    pub target_per_week: i32,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub deadline: Option<NaiveDateTime>,
    #[schema(example = "Medium")]
    pub priority: String,
    pub is_active: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub updated_at: Option<NaiveDateTime>,
}

/// A user's assignment to a task joined with the task definition.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Assignment {
    pub user_task_id: u64,
    pub user_id: u64,
    pub full_name: String,
    pub task_id: u64,
    pub task_name: String,
    pub description: Option<String>,
    pub platform: Option<String>,
    pub target_per_week: i32,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub deadline: Option<NaiveDateTime>,
    pub priority: String,
    pub is_active: bool,
    pub completed_this_week: i32,
    pub report_link: Option<String>,
    #[schema(value_type = String, format = "date")]
    pub week_start_date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub updated_at: Option<NaiveDateTime>,
}

pub const ASSIGNMENT_SELECT: &str = r#"
    SELECT ut.user_task_id, ut.user_id, u.full_name, t.task_id, t.task_name, t.description,
           t.platform, t.target_per_week, t.deadline, t.priority, t.is_active,
           ut.completed_this_week, ut.report_link, ut.week_start_date, ut.updated_at
    FROM user_tasks ut
    JOIN tasks t ON t.task_id = ut.task_id AND t.is_deleted = FALSE
    JOIN users u ON u.user_id = ut.user_id
"#;

pub fn task_status(completed: i32, target: i32) -> TaskStatus {
    if completed >= target {
        TaskStatus::Completed
    } else {
        TaskStatus::InProgress
    }
}

/// Completion percentage, capped at 100. A zero target counts as done.
pub fn progress_percent(completed: i32, target: i32) -> f64 {
    if target <= 0 {
        return 100.0;
    }
    let pct = completed.max(0) as f64 / target as f64 * 100.0;
    (pct.min(100.0) * 10.0).round() / 10.0
}

pub fn is_overdue(deadline: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    deadline.is_some_and(|d| d < now)
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn priority_orders_high_first() {
        let mut list = vec![Priority::Low, Priority::High, Priority::Medium];
        list.sort_by_key(|p| p.rank());
        assert_eq!(list, vec![Priority::High, Priority::Medium, Priority::Low]);
        assert_eq!(Priority::parse_lenient("Urgent"), Priority::Medium);
    }

    #[test]
    fn status_completes_at_target() {
        assert_eq!(task_status(5, 5), TaskStatus::Completed);
        assert_eq!(task_status(4, 5), TaskStatus::InProgress);
        assert_eq!(task_status(0, 0), TaskStatus::Completed);
    }

    #[test]
    fn percent_is_capped() {
        assert_eq!(progress_percent(3, 4), 75.0);
        assert_eq!(progress_percent(9, 4), 100.0);
        assert_eq!(progress_percent(0, 0), 100.0);
    }

    #[test]
    fn overdue_only_past_deadline() {
        let now = date(2025, 3, 10).and_hms_opt(12, 0, 0).unwrap();
        assert!(is_overdue(Some(date(2025, 3, 9).and_hms_opt(0, 0, 0).unwrap()), now));
        assert!(!is_overdue(Some(date(2025, 3, 11).and_hms_opt(0, 0, 0).unwrap()), now));
        assert!(!is_overdue(None, now));
    }

    #[test]
    fn week_starts_on_monday() {
        // 2025-03-13 is a Thursday
        assert_eq!(week_start(date(2025, 3, 13)), date(2025, 3, 10));
        assert_eq!(week_start(date(2025, 3, 10)), date(2025, 3, 10));
        assert_eq!(week_start(date(2025, 3, 16)), date(2025, 3, 10));
    }
}
