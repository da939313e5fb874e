use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
pub enum LeaveType {
    Annual,
    Sick,
    Personal,
    Unpaid,
}

impl LeaveType {
    /// Only unpaid leave reduces the monthly salary.
    pub fn deducts_pay(self) -> bool {
        self == LeaveType::Unpaid
    }
}

/// The three request workflows sharing the Pending → Approved | Rejected machine.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema, Display, AsRefStr, EnumIter)]
pub enum RequestKind {
    Leave,
    Overtime,
    Late,
}

impl RequestKind {
    pub fn table(self) -> &'static str {
        match self {
            RequestKind::Leave => "leave_requests",
            RequestKind::Overtime => "overtime_requests",
            RequestKind::Late => "late_requests",
        }
    }

    pub fn entity_name(self) -> &'static str {
        match self {
            RequestKind::Leave => "LeaveRequest",
            RequestKind::Overtime => "OvertimeRequest",
            RequestKind::Late => "LateRequest",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RequestKind::Leave => "leave",
            RequestKind::Overtime => "overtime",
            RequestKind::Late => "late arrival",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct LeaveRequest {
    pub request_id: u64,
    pub user_id: u64,
    pub full_name: String,
    #[schema(example = "Annual")]
    pub leave_type: String,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub total_days: i32,
    pub reason: String,
    #[schema(example = "Pending")]
    pub status: String,
    pub reviewed_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub reviewed_at: Option<NaiveDateTime>,
    pub review_note: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct OvertimeRequest {
    pub request_id: u64,
    pub user_id: u64,
    pub full_name: String,
    #[schema(value_type = String, format = "date")]
    pub work_date: NaiveDate,
    #[schema(value_type = String, example = "19:30:00")]
    pub actual_check_out_time: NaiveTime,
    pub overtime_hours: f64,
    pub reason: String,
    pub task_description: Option<String>,
    pub status: String,
    pub reviewed_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub reviewed_at: Option<NaiveDateTime>,
    pub review_note: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct LateRequest {
    pub request_id: u64,
    pub user_id: u64,
    pub full_name: String,
    #[schema(value_type = String, format = "date")]
    pub request_date: NaiveDate,
    #[schema(value_type = String, example = "09:15:00")]
    pub expected_arrival_time: NaiveTime,
    pub reason: String,
    pub status: String,
    pub reviewed_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub reviewed_at: Option<NaiveDateTime>,
    pub review_note: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

pub const LEAVE_SELECT: &str = r#"
    SELECT r.request_id, r.user_id, u.full_name, r.leave_type, r.start_date, r.end_date,
           r.total_days, r.reason, r.status, r.reviewed_by, r.reviewed_at, r.review_note,
           r.created_at
    FROM leave_requests r
    JOIN users u ON u.user_id = r.user_id
"#;

pub const OVERTIME_SELECT: &str = r#"
    SELECT r.request_id, r.user_id, u.full_name, r.work_date, r.actual_check_out_time,
           r.overtime_hours, r.reason, r.task_description, r.status, r.reviewed_by,
           r.reviewed_at, r.review_note, r.created_at
    FROM overtime_requests r
    JOIN users u ON u.user_id = r.user_id
"#;

pub const LATE_SELECT: &str = r#"
    SELECT r.request_id, r.user_id, u.full_name, r.request_date, r.expected_arrival_time,
           r.reason, r.status, r.reviewed_by, r.reviewed_at, r.review_note, r.created_at
    FROM late_requests r
    JOIN users u ON u.user_id = r.user_id
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn only_unpaid_leave_deducts() {
        assert!(LeaveType::Unpaid.deducts_pay());
        assert!(!LeaveType::Sick.deducts_pay());
        assert!(LeaveType::from_str("Maternity").is_err());
    }

    #[test]
    fn every_kind_has_its_own_table() {
        let tables: Vec<_> = RequestKind::iter().map(|k| k.table()).collect();
        assert_eq!(tables, vec!["leave_requests", "overtime_requests", "late_requests"]);
    }

    #[test]
    fn statuses_render_as_stored() {
        assert_eq!(RequestStatus::Pending.as_ref(), "Pending");
        assert_eq!(RequestStatus::from_str("Rejected").unwrap(), RequestStatus::Rejected);
    }
}
