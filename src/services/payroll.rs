use chrono::{Datelike, Local, Months, NaiveDate};
use serde::Serialize;
use sqlx::MySqlPool;
use utoipa::ToSchema;

use crate::services::settings::{self, SalaryRules};

/// Attendance and request figures for one user and month.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MonthlyFigures {
    pub days_worked: i32,
    pub overtime_hours: f64,
    pub late_days: i32,
    pub unpaid_leave_days: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SalaryBreakdown {
    pub base_salary: f64,
    pub daily_rate: f64,
    pub hourly_rate: f64,
    pub overtime_pay: f64,
    pub late_deduction: f64,
    pub unpaid_leave_deduction: f64,
    pub net_salary: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn compute_salary(rules: &SalaryRules, figures: &MonthlyFigures) -> SalaryBreakdown {
    let daily_rate = if rules.work_days_per_month > 0.0 {
        rules.base_salary / rules.work_days_per_month
    } else {
        0.0
    };
    let hourly_rate = if rules.standard_hours_per_day > 0.0 {
        daily_rate / rules.standard_hours_per_day
    } else {
        0.0
    };

    let overtime_pay = hourly_rate * rules.overtime_rate * figures.overtime_hours;
    let late_deduction = figures.late_days as f64 * rules.late_deduction;
    let unpaid_leave_deduction = figures.unpaid_leave_days as f64 * daily_rate;
    let net = rules.base_salary + overtime_pay - late_deduction - unpaid_leave_deduction;

    SalaryBreakdown {
        base_salary: round2(rules.base_salary),
        daily_rate: round2(daily_rate),
        hourly_rate: round2(hourly_rate),
        overtime_pay: round2(overtime_pay),
        late_deduction: round2(late_deduction),
        unpaid_leave_deduction: round2(unpaid_leave_deduction),
        net_salary: round2(net.max(0.0)),
    }
}

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .unwrap_or(first);
    (first, last)
}

/// Inclusive number of days shared by two date ranges.
pub fn overlap_days(start: NaiveDate, end: NaiveDate, from: NaiveDate, to: NaiveDate) -> i32 {
    let lo = start.max(from);
    let hi = end.min(to);
    if hi < lo {
        0
    } else {
        (hi - lo).num_days() as i32 + 1
    }
}

/// First day of every month touched by `[start, end]`.
pub fn months_touched(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let (mut cursor, _) = month_bounds(start);
    while cursor <= end {
        months.push(cursor);
        match cursor.checked_add_months(Months::new(1)) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    months
}

async fn gather_figures(
    pool: &MySqlPool,
    user_id: u64,
    first: NaiveDate,
    last: NaiveDate,
) -> Result<MonthlyFigures, sqlx::Error> {
    let (days_worked, late_days): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            CAST(COUNT(check_in_time) AS SIGNED),
            CAST(COALESCE(SUM(CASE WHEN is_late AND NOT late_excused THEN 1 ELSE 0 END), 0) AS SIGNED)
        FROM attendances
        WHERE user_id = ? AND work_date BETWEEN ? AND ?
        "#,
    )
    .bind(user_id)
    .bind(first)
    .bind(last)
    .fetch_one(pool)
    .await?;

    let overtime_hours: f64 = sqlx::query_scalar(
        r#"
        SELECT CAST(COALESCE(SUM(overtime_hours), 0) AS DOUBLE)
        FROM overtime_requests
        WHERE user_id = ? AND status = 'Approved' AND work_date BETWEEN ? AND ?
        "#,
    )
    .bind(user_id)
    .bind(first)
    .bind(last)
    .fetch_one(pool)
    .await?;

    let unpaid: Vec<(NaiveDate, NaiveDate)> = sqlx::query_as(
        r#"
        SELECT start_date, end_date
        FROM leave_requests
        WHERE user_id = ? AND status = 'Approved' AND leave_type = 'Unpaid'
          AND start_date <= ? AND end_date >= ?
        "#,
    )
    .bind(user_id)
    .bind(last)
    .bind(first)
    .fetch_all(pool)
    .await?;

    Ok(MonthlyFigures {
        days_worked: days_worked as i32,
        overtime_hours,
        late_days: late_days as i32,
        unpaid_leave_days: unpaid
            .iter()
            .map(|(s, e)| overlap_days(*s, *e, first, last))
            .sum(),
    })
}

/// Recomputes and upserts the payroll row for `user_id` in the month of `month`.
pub async fn recalculate(
    pool: &MySqlPool,
    user_id: u64,
    month: NaiveDate,
) -> Result<SalaryBreakdown, sqlx::Error> {
    let (first, last) = month_bounds(month);
    let rules = settings::salary_rules(pool).await?;
    let figures = gather_figures(pool, user_id, first, last).await?;
    let salary = compute_salary(&rules, &figures);

    sqlx::query(
        r#"
        INSERT INTO payroll
            (user_id, month, base_salary, days_worked, overtime_hours, overtime_pay,
             late_days, late_deduction, unpaid_leave_days, unpaid_leave_deduction,
             net_salary, calculated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            base_salary = VALUES(base_salary),
            days_worked = VALUES(days_worked),
            overtime_hours = VALUES(overtime_hours),
            overtime_pay = VALUES(overtime_pay),
            late_days = VALUES(late_days),
            late_deduction = VALUES(late_deduction),
            unpaid_leave_days = VALUES(unpaid_leave_days),
            unpaid_leave_deduction = VALUES(unpaid_leave_deduction),
            net_salary = VALUES(net_salary),
            calculated_at = VALUES(calculated_at)
        "#,
    )
    .bind(user_id)
    .bind(first)
    .bind(salary.base_salary)
    .bind(figures.days_worked)
    .bind(figures.overtime_hours)
    .bind(salary.overtime_pay)
    .bind(figures.late_days)
    .bind(salary.late_deduction)
    .bind(figures.unpaid_leave_days)
    .bind(salary.unpaid_leave_deduction)
    .bind(salary.net_salary)
    .bind(Local::now().naive_local())
    .execute(pool)
    .await?;

    tracing::info!(user_id, month = %first, net = salary.net_salary, "Payroll recalculated");
    Ok(salary)
}

/// Recalculation triggered by an approval; failures are logged, not raised.
pub async fn recalculate_months(pool: &MySqlPool, user_id: u64, start: NaiveDate, end: NaiveDate) {
    for month in months_touched(start, end) {
        if let Err(e) = recalculate(pool, user_id, month).await {
            tracing::error!(error = %e, user_id, month = %month, "Payroll recalculation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rules() -> SalaryRules {
        SalaryRules {
            base_salary: 5_200_000.0,
            overtime_rate: 1.5,
            late_deduction: 50_000.0,
            standard_hours_per_day: 8.0,
            work_days_per_month: 26.0,
        }
    }

    #[test]
    fn computes_overtime_and_deductions() {
        let figures = MonthlyFigures {
            days_worked: 22,
            overtime_hours: 4.0,
            late_days: 2,
            unpaid_leave_days: 1,
        };
        let s = compute_salary(&rules(), &figures);

        assert_eq!(s.daily_rate, 200_000.0);
        assert_eq!(s.hourly_rate, 25_000.0);
        assert_eq!(s.overtime_pay, 150_000.0);
        assert_eq!(s.late_deduction, 100_000.0);
        assert_eq!(s.unpaid_leave_deduction, 200_000.0);
        assert_eq!(s.net_salary, 5_050_000.0);
    }

    #[test]
    fn net_salary_never_negative() {
        let figures = MonthlyFigures { unpaid_leave_days: 40, ..Default::default() };
        assert_eq!(compute_salary(&rules(), &figures).net_salary, 0.0);
    }

    #[test]
    fn zero_divisors_do_not_panic() {
        let mut r = rules();
        r.work_days_per_month = 0.0;
        let s = compute_salary(&r, &MonthlyFigures { overtime_hours: 3.0, ..Default::default() });
        assert_eq!(s.overtime_pay, 0.0);
        assert_eq!(s.net_salary, 5_200_000.0);
    }

    #[test]
    fn month_bounds_handle_february() {
        assert_eq!(month_bounds(d(2024, 2, 14)), (d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(month_bounds(d(2025, 12, 31)), (d(2025, 12, 1), d(2025, 12, 31)));
    }

    #[test]
    fn overlap_is_inclusive() {
        assert_eq!(overlap_days(d(2025, 3, 30), d(2025, 4, 2), d(2025, 3, 1), d(2025, 3, 31)), 2);
        assert_eq!(overlap_days(d(2025, 4, 1), d(2025, 4, 2), d(2025, 3, 1), d(2025, 3, 31)), 0);
    }

    #[test]
    fn spans_touch_every_month() {
        assert_eq!(
            months_touched(d(2025, 12, 28), d(2026, 1, 3)),
            vec![d(2025, 12, 1), d(2026, 1, 1)]
        );
        assert_eq!(months_touched(d(2025, 5, 5), d(2025, 5, 6)), vec![d(2025, 5, 1)]);
    }
}
