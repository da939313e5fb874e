use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Payroll {
    pub payroll_id: u64,
    pub user_id: u64,
    pub full_name: String,
    /// First day of the payroll month.
    #[schema(value_type = String, format = "date", example = "2025-03-01")]
    pub month: NaiveDate,
    pub base_salary: f64,
    pub days_worked: i32,
    pub overtime_hours: f64,
    pub overtime_pay: f64,
    pub late_days: i32,
    pub late_deduction: f64,
    pub unpaid_leave_days: i32,
    pub unpaid_leave_deduction: f64,
    pub net_salary: f64,
    #[schema(value_type = String, format = "date-time")]
    pub calculated_at: NaiveDateTime,
}

pub const PAYROLL_SELECT: &str = r#"
    SELECT p.payroll_id, p.user_id, u.full_name, p.month, p.base_salary, p.days_worked,
           p.overtime_hours, p.overtime_pay, p.late_days, p.late_deduction,
           p.unpaid_leave_days, p.unpaid_leave_deduction, p.net_salary, p.calculated_at
    FROM payroll p
    JOIN users u ON u.user_id = p.user_id
"#;
