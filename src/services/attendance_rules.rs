use chrono::{NaiveDateTime, NaiveTime};

use crate::error::{ApiError, ApiResult};
use crate::services::geocode::haversine_meters;
use crate::services::settings::AttendanceRules;

const PHOTO_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

pub fn validate_coordinates(latitude: f64, longitude: f64) -> ApiResult<()> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(ApiError::bad_request("Invalid GPS coordinates"));
    }
    Ok(())
}

pub fn validate_photo_path(path: &str) -> ApiResult<()> {
    let path = path.trim();
    if path.is_empty() {
        return Err(ApiError::bad_request("A photo is required"));
    }
    let lower = path.to_lowercase();
    if !PHOTO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return Err(ApiError::bad_request("Photo must be a .jpg, .jpeg or .png file"));
    }
    Ok(())
}

pub fn ensure_check_in_window(now: NaiveTime, rules: &AttendanceRules) -> ApiResult<()> {
    if now < rules.check_in_start {
        return Err(ApiError::bad_request(format!(
            "Check-in opens at {}",
            rules.check_in_start.format("%H:%M")
        )));
    }
    Ok(())
}

pub fn is_late(check_in: NaiveTime, rules: &AttendanceRules) -> bool {
    check_in > rules.check_in_standard
}

pub fn left_early(check_out: NaiveTime, rules: &AttendanceRules) -> bool {
    check_out < rules.check_out_min
}

/// `true` when geofencing is off or the point is inside the office radius.
pub fn within_geofence(latitude: f64, longitude: f64, rules: &AttendanceRules) -> bool {
    if !rules.geofence_enabled {
        return true;
    }
    haversine_meters(latitude, longitude, rules.office_latitude, rules.office_longitude)
        <= rules.geofence_radius_m
}

/// Worked hours rounded to two decimals, never negative.
pub fn total_hours(check_in: NaiveDateTime, check_out: NaiveDateTime) -> f64 {
    let hours = (check_out - check_in).num_seconds().max(0) as f64 / 3600.0;
    (hours * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rules() -> AttendanceRules {
        AttendanceRules {
            check_in_start: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            check_in_standard: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            check_out_min: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            geofence_enabled: true,
            geofence_radius_m: 100.0,
            office_latitude: 10.7769,
            office_longitude: 106.7009,
        }
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn coordinates_must_be_in_range() {
        assert!(validate_coordinates(10.0, 106.0).is_ok());
        assert!(validate_coordinates(90.5, 0.0).is_err());
        assert!(validate_coordinates(0.0, -180.1).is_err());
    }

    #[test]
    fn photo_extension_is_checked() {
        assert!(validate_photo_path("uploads/2025/03/in.JPG").is_ok());
        assert!(validate_photo_path("uploads/in.png").is_ok());
        assert!(validate_photo_path("uploads/in.gif").is_err());
        assert!(validate_photo_path("  ").is_err());
    }

    #[test]
    fn check_in_window_and_lateness() {
        let r = rules();
        assert!(ensure_check_in_window(t(6, 59), &r).is_err());
        assert!(ensure_check_in_window(t(7, 0), &r).is_ok());
        assert!(!is_late(t(8, 0), &r));
        assert!(is_late(t(8, 1), &r));
        assert!(left_early(t(16, 59), &r));
        assert!(!left_early(t(17, 0), &r));
    }

    #[test]
    fn geofence_uses_office_radius() {
        let mut r = rules();
        assert!(within_geofence(10.7770, 106.7009, &r));
        assert!(!within_geofence(10.80, 106.70, &r));
        r.geofence_enabled = false;
        assert!(within_geofence(10.80, 106.70, &r));
    }

    #[test]
    fn hours_are_rounded() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
        let inn = day.and_hms_opt(8, 0, 0).unwrap();
        assert_eq!(total_hours(inn, day.and_hms_opt(17, 20, 0).unwrap()), 9.33);
        assert_eq!(total_hours(inn, day.and_hms_opt(7, 0, 0).unwrap()), 0.0);
    }
}
