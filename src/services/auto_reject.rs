use chrono::{Local, NaiveDate};
use serde_json::json;
use sqlx::MySqlPool;
use std::time::Duration as StdDuration;
use strum::IntoEnumIterator;

use crate::model::request::{RequestKind, RequestStatus};
use crate::model::task::week_start;
use crate::services::audit::{self, AuditEntry};
use crate::services::notifier::{Notification, NotificationHub, NotificationKind, Target};
use crate::services::review;

/// Pending rows older than `after_days` by the database clock, which is the
/// same clock that stamped `created_at`.
pub fn stale_requests_sql(kind: RequestKind) -> String {
    format!(
        "SELECT request_id, user_id FROM {} WHERE status = 'Pending' AND created_at < NOW() - INTERVAL ? DAY",
        kind.table()
    )
}

pub fn auto_reject_note(after_days: i64) -> String {
    format!("Automatically rejected: not reviewed within {after_days} days")
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub rejected: usize,
    pub counters_reset: u64,
}

async fn stale_requests(
    pool: &MySqlPool,
    kind: RequestKind,
    after_days: i64,
) -> Result<Vec<(u64, u64)>, sqlx::Error> {
    sqlx::query_as(&stale_requests_sql(kind))
        .bind(after_days.max(0))
        .fetch_all(pool)
        .await
}

/// Resets weekly counters on assignments whose week has ended.
pub async fn roll_weekly_counters(pool: &MySqlPool, today: NaiveDate) -> Result<u64, sqlx::Error> {
    let monday = week_start(today);
    let result = sqlx::query(
        r#"
        UPDATE user_tasks
        SET completed_this_week = 0, week_start_date = ?, updated_at = NOW()
        WHERE week_start_date < ?
        "#,
    )
    .bind(monday)
    .bind(monday)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// One pass of the background job.
pub async fn run_once(pool: &MySqlPool, hub: &NotificationHub, after_days: i64) -> Result<SweepReport, sqlx::Error> {
    let today = Local::now().date_naive();
    let note = auto_reject_note(after_days);
    let mut report = SweepReport::default();

    for kind in RequestKind::iter() {
        for (request_id, user_id) in stale_requests(pool, kind, after_days).await? {
            // a reviewer may have acted since the select
            if !review::transition(pool, kind, request_id, RequestStatus::Rejected, None, Some(&note)).await? {
                continue;
            }
            report.rejected += 1;

            hub.publish(Notification::new(
                Target::User(user_id),
                NotificationKind::RequestAutoRejected,
                "Request auto-rejected",
                format!("Your {} request #{} was not reviewed in time and has been rejected", kind.label(), request_id),
            ));

            audit::write(
                pool,
                None,
                AuditEntry::new("AUTO_REJECT", kind.entity_name())
                    .entity(request_id)
                    .old(json!({ "status": "Pending" }))
                    .new_values(json!({ "status": "Rejected", "review_note": note }))
                    .describe(format!("{kind} request #{request_id} auto-rejected")),
            )
            .await;
        }
    }

    report.counters_reset = roll_weekly_counters(pool, today).await?;
    Ok(report)
}

/// Spawns the periodic sweep on the actix runtime.
pub fn spawn(pool: MySqlPool, hub: NotificationHub, after_days: i64, interval_secs: u64) {
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_secs.max(1)));
        tracing::info!(after_days, interval_secs, "Auto-reject service started");
        loop {
            ticker.tick().await;
            match run_once(&pool, &hub, after_days).await {
                Ok(report) if report.rejected > 0 || report.counters_reset > 0 => {
                    tracing::info!(
                        rejected = report.rejected,
                        counters_reset = report.counters_reset,
                        "Auto-reject sweep finished"
                    );
                }
                Ok(_) => tracing::debug!("Auto-reject sweep found nothing to do"),
                Err(e) => tracing::error!(error = %e, "Auto-reject sweep failed"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staleness_is_measured_by_the_database_clock() {
        for kind in RequestKind::iter() {
            let sql = stale_requests_sql(kind);
            assert!(sql.contains(&format!("FROM {} ", kind.table())));
            assert!(sql.ends_with("created_at < NOW() - INTERVAL ? DAY"));
            assert_eq!(sql.matches('?').count(), 1);
        }
    }

    #[test]
    fn note_mentions_threshold() {
        assert_eq!(auto_reject_note(3), "Automatically rejected: not reviewed within 3 days");
    }
}
