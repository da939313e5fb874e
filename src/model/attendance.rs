use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Attendance {
    pub attendance_id: u64,
    pub user_id: u64,
    #[schema(value_type = String, format = "date")]
    pub work_date: NaiveDate,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_in_time: Option<NaiveDateTime>,
    pub check_in_latitude: Option<f64>,
    pub check_in_longitude: Option<f64>,
    pub check_in_address: Option<String>,
    pub check_in_photo: Option<String>,
    pub check_in_notes: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub check_out_time: Option<NaiveDateTime>,
    pub check_out_latitude: Option<f64>,
    pub check_out_longitude: Option<f64>,
    pub check_out_address: Option<String>,
    pub check_out_photo: Option<String>,
    pub check_out_notes: Option<String>,
    pub total_hours: Option<f64>,
    pub overtime_hours: f64,
    pub is_late: bool,
    pub late_excused: bool,
    pub left_early: bool,
    pub is_within_geofence: bool,
}

pub const ATTENDANCE_COLUMNS: &str = r#"
    a.attendance_id, a.user_id, a.work_date, a.check_in_time, a.check_in_latitude,
    a.check_in_longitude, a.check_in_address, a.check_in_photo, a.check_in_notes,
    a.check_out_time, a.check_out_latitude, a.check_out_longitude, a.check_out_address,
    a.check_out_photo, a.check_out_notes, a.total_hours, a.overtime_hours, a.is_late,
    a.late_excused, a.left_early, a.is_within_geofence
"#;

/// Attendance row joined with the owner's name and department, for admin views.
#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AttendanceWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub attendance: Attendance,
    pub full_name: String,
    pub department_name: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq, ToSchema)]
pub struct AttendanceStats {
    pub total_records: usize,
    pub checked_in: usize,
    pub checked_out: usize,
    pub completed_days: usize,
    pub on_time: usize,
    pub late: usize,
    pub total_hours: f64,
    pub within_geofence: usize,
    pub outside_geofence: usize,
}

impl AttendanceStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Attendance>) -> Self {
        let mut stats = AttendanceStats::default();
        for a in records {
            stats.total_records += 1;
            if a.check_in_time.is_some() {
                stats.checked_in += 1;
                if a.is_late {
                    stats.late += 1;
                } else {
                    stats.on_time += 1;
                }
                if a.is_within_geofence {
                    stats.within_geofence += 1;
                } else {
                    stats.outside_geofence += 1;
                }
            }
            if a.check_out_time.is_some() {
                stats.checked_out += 1;
            }
            if a.check_in_time.is_some() && a.check_out_time.is_some() {
                stats.completed_days += 1;
            }
            stats.total_hours += a.total_hours.unwrap_or(0.0);
        }
        stats.total_hours = (stats.total_hours * 100.0).round() / 100.0;
        stats
    }
}

#[cfg(test)]
pub(crate) fn sample(day: u32, late: bool, hours: Option<f64>) -> Attendance {
    let date = NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
    Attendance {
        attendance_id: day as u64,
        user_id: 1,
        work_date: date,
        check_in_time: date.and_hms_opt(8, 0, 0),
        check_in_latitude: None,
        check_in_longitude: None,
        check_in_address: None,
        check_in_photo: None,
        check_in_notes: None,
        check_out_time: hours.and_then(|_| date.and_hms_opt(17, 0, 0)),
        check_out_latitude: None,
        check_out_longitude: None,
        check_out_address: None,
        check_out_photo: None,
        check_out_notes: None,
        total_hours: hours,
        overtime_hours: 0.0,
        is_late: late,
        late_excused: false,
        left_early: false,
        is_within_geofence: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_count_late_and_completed_days() {
        let records = vec![sample(3, false, Some(8.5)), sample(4, true, Some(7.25)), sample(5, true, None)];
        let stats = AttendanceStats::from_records(&records);

        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.checked_in, 3);
        assert_eq!(stats.checked_out, 2);
        assert_eq!(stats.completed_days, 2);
        assert_eq!(stats.on_time, 1);
        assert_eq!(stats.late, 2);
        assert_eq!(stats.total_hours, 15.75);
        assert_eq!(stats.within_geofence, 3);
    }
}
