use chrono::{Local, NaiveDate};
use serde_json::json;
use sqlx::{MySql, MySqlConnection, MySqlPool};

use crate::error::{ApiError, ApiResult, db_error};
use crate::model::request::{RequestKind, RequestStatus};
use crate::services::audit::{AuditEntry, AuditHelper};
use crate::services::notifier::{Notification, NotificationHub, NotificationKind, Target};
use crate::services::payroll;

pub const MAX_NOTE_LEN: usize = 1000;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn status(self) -> RequestStatus {
        match self {
            Decision::Approve => RequestStatus::Approved,
            Decision::Reject => RequestStatus::Rejected,
        }
    }

    fn audit_action(self) -> &'static str {
        match self {
            Decision::Approve => "APPROVE",
            Decision::Reject => "REJECT",
        }
    }
}

/// A rejection must carry a reason; notes are capped at 1000 chars.
pub fn validate_note(decision: Decision, note: Option<&str>) -> ApiResult<Option<String>> {
    let note = note.map(str::trim).filter(|n| !n.is_empty());
    if decision == Decision::Reject && note.is_none() {
        return Err(ApiError::bad_request("A rejection reason is required"));
    }
    if note.is_some_and(|n| n.chars().count() > MAX_NOTE_LEN) {
        return Err(ApiError::bad_request("Note must be at most 1000 characters"));
    }
    Ok(note.map(str::to_string))
}

/// Moves a Pending request to `status`. Returns `false` when the request does
/// not exist or was already reviewed.
pub async fn transition<'e, E>(
    executor: E,
    kind: RequestKind,
    request_id: u64,
    status: RequestStatus,
    reviewer: Option<u64>,
    note: Option<&str>,
) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = MySql>,
{
    let sql = format!(
        r#"
        UPDATE {}
        SET status = ?, reviewed_by = ?, reviewed_at = ?, review_note = ?
        WHERE request_id = ? AND status = 'Pending'
        "#,
        kind.table()
    );

    let result = sqlx::query(&sql)
        .bind(status.as_ref())
        .bind(reviewer)
        .bind(Local::now().naive_local())
        .bind(note)
        .bind(request_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn owner_of(pool: &MySqlPool, kind: RequestKind, request_id: u64) -> Result<Option<u64>, sqlx::Error> {
    let sql = format!("SELECT user_id FROM {} WHERE request_id = ?", kind.table());
    sqlx::query_scalar(&sql).bind(request_id).fetch_optional(pool).await
}

/// Attendance update an approval implies; leave only touches payroll.
pub fn attendance_effect_sql(kind: RequestKind) -> Option<&'static str> {
    match kind {
        RequestKind::Leave => None,
        RequestKind::Overtime => {
            Some("UPDATE attendances SET overtime_hours = ? WHERE user_id = ? AND work_date = ?")
        }
        RequestKind::Late => Some("UPDATE attendances SET late_excused = TRUE WHERE user_id = ? AND work_date = ?"),
    }
}

/// Applies an approval to attendance on `conn` and returns the owner and the
/// date span whose payroll must be recalculated.
pub async fn apply_approval_effects(
    conn: &mut MySqlConnection,
    kind: RequestKind,
    request_id: u64,
) -> Result<(u64, NaiveDate, NaiveDate), sqlx::Error> {
    match kind {
        RequestKind::Leave => {
            sqlx::query_as("SELECT user_id, start_date, end_date FROM leave_requests WHERE request_id = ?")
                .bind(request_id)
                .fetch_one(&mut *conn)
                .await
        }
        RequestKind::Overtime => {
            let (user_id, work_date, hours): (u64, NaiveDate, f64) = sqlx::query_as(
                "SELECT user_id, work_date, overtime_hours FROM overtime_requests WHERE request_id = ?",
            )
            .bind(request_id)
            .fetch_one(&mut *conn)
            .await?;
            if let Some(sql) = attendance_effect_sql(kind) {
                sqlx::query(sql)
                    .bind(hours)
                    .bind(user_id)
                    .bind(work_date)
                    .execute(&mut *conn)
                    .await?;
            }
            Ok((user_id, work_date, work_date))
        }
        RequestKind::Late => {
            let (user_id, date): (u64, NaiveDate) =
                sqlx::query_as("SELECT user_id, request_date FROM late_requests WHERE request_id = ?")
                    .bind(request_id)
                    .fetch_one(&mut *conn)
                    .await?;
            if let Some(sql) = attendance_effect_sql(kind) {
                sqlx::query(sql).bind(user_id).bind(date).execute(&mut *conn).await?;
            }
            Ok((user_id, date, date))
        }
    }
}

pub fn decision_notification(kind: RequestKind, user_id: u64, request_id: u64, decision: Decision, note: Option<&str>) -> Notification {
    let (notification_kind, verb) = match decision {
        Decision::Approve => (NotificationKind::RequestApproved, "approved"),
        Decision::Reject => (NotificationKind::RequestRejected, "rejected"),
    };
    let mut message = format!("Your {} request #{} was {}", kind.label(), request_id, verb);
    if let Some(note) = note {
        message.push_str(&format!(": {note}"));
    }
    Notification::new(
        Target::User(user_id),
        notification_kind,
        format!("Request {verb}"),
        message,
    )
    .with_link(format!("/staff/requests/{}/{}", kind.as_ref().to_lowercase(), request_id))
}

/// Full review flow shared by the three request kinds.
#[allow(clippy::too_many_arguments)]
pub async fn review(
    pool: &MySqlPool,
    hub: &NotificationHub,
    audit: &AuditHelper<'_>,
    kind: RequestKind,
    request_id: u64,
    reviewer_id: u64,
    decision: Decision,
    note: Option<&str>,
) -> ApiResult<()> {
    let note = validate_note(decision, note)?;

    let owner = owner_of(pool, kind, request_id)
        .await
        .map_err(db_error("Failed to load request owner"))?
        .ok_or_else(|| ApiError::not_found(format!("{} request not found", kind)))?;

    // status change and attendance effects commit together
    let mut tx = pool.begin().await.map_err(db_error("Failed to open transaction"))?;

    let changed = transition(&mut *tx, kind, request_id, decision.status(), Some(reviewer_id), note.as_deref())
        .await
        .map_err(db_error("Failed to update request status"))?;

    if !changed {
        drop(tx);
        audit
            .log_failed_attempt(Some(reviewer_id), decision.audit_action(), kind.entity_name(), "Request already processed")
            .await;
        return Err(ApiError::bad_request(format!(
            "{} request not found or already processed",
            kind
        )));
    }

    let payroll_span = match decision {
        Decision::Approve => Some(
            apply_approval_effects(&mut tx, kind, request_id)
                .await
                .map_err(db_error("Failed to apply approval effects"))?,
        ),
        Decision::Reject => None,
    };

    tx.commit().await.map_err(db_error("Failed to commit review"))?;

    if let Some((user_id, start, end)) = payroll_span {
        payroll::recalculate_months(pool, user_id, start, end).await;
    }

    hub.publish(decision_notification(kind, owner, request_id, decision, note.as_deref()));

    audit
        .log(
            AuditEntry::new(decision.audit_action(), kind.entity_name())
                .by(reviewer_id)
                .entity(request_id)
                .old(json!({ "status": RequestStatus::Pending.as_ref() }))
                .new_values(json!({ "status": decision.status().as_ref(), "review_note": note }))
                .describe(format!("{} request #{} {}", kind, request_id, decision.status())),
        )
        .await;

    tracing::info!(request_id, kind = %kind, reviewer_id, status = %decision.status(), "Request reviewed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_requires_reason() {
        assert!(validate_note(Decision::Reject, None).is_err());
        assert!(validate_note(Decision::Reject, Some("   ")).is_err());
        assert_eq!(
            validate_note(Decision::Reject, Some(" overlaps audit week ")).unwrap(),
            Some("overlaps audit week".to_string())
        );
    }

    #[test]
    fn approval_note_is_optional() {
        assert_eq!(validate_note(Decision::Approve, None).unwrap(), None);
        assert!(validate_note(Decision::Approve, Some(&"x".repeat(1001))).is_err());
    }

    #[test]
    fn approvals_touch_attendance_except_for_leave() {
        assert_eq!(attendance_effect_sql(RequestKind::Leave), None);

        let overtime = attendance_effect_sql(RequestKind::Overtime).unwrap();
        assert!(overtime.contains("overtime_hours = ?"));
        assert_eq!(overtime.matches('?').count(), 3);

        let late = attendance_effect_sql(RequestKind::Late).unwrap();
        assert!(late.contains("late_excused = TRUE"));
        assert_eq!(late.matches('?').count(), 2);
    }

    #[test]
    fn decision_maps_to_status() {
        assert_eq!(Decision::Approve.status(), RequestStatus::Approved);
        assert_eq!(Decision::Reject.status(), RequestStatus::Rejected);
    }

    #[test]
    fn notification_targets_requester() {
        let n = decision_notification(RequestKind::Overtime, 8, 42, Decision::Reject, Some("no budget"));
        assert_eq!(n.target, Target::User(8));
        assert_eq!(n.kind, NotificationKind::RequestRejected);
        assert_eq!(n.message, "Your overtime request #42 was rejected: no budget");
        assert_eq!(n.link.as_deref(), Some("/staff/requests/overtime/42"));
    }
}
