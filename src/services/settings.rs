use chrono::NaiveTime;
use serde::Serialize;
use sqlx::MySqlPool;
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::model::setting::{SettingCategory, SettingDataType};
use crate::utils::settings_cache::{self, SettingsSnapshot};

pub struct SettingDefault {
    pub key: &'static str,
    pub value: &'static str,
    pub description: &'static str,
    pub data_type: SettingDataType,
    pub category: SettingCategory,
}

const fn def(
    key: &'static str,
    value: &'static str,
    description: &'static str,
    data_type: SettingDataType,
    category: SettingCategory,
) -> SettingDefault {
    SettingDefault { key, value, description, data_type, category }
}

use SettingCategory as C;
use SettingDataType as T;

/// Factory defaults. Seeded on an empty table and restored by "reset".
pub const DEFAULT_SETTINGS: &[SettingDefault] = &[
    // Salary
    def("BASE_SALARY", "5000000", "Monthly base salary", T::Number, C::Salary),
    def("OVERTIME_RATE", "1.5", "Overtime pay multiplier", T::Decimal, C::Salary),
    def("LATE_DEDUCTION", "50000", "Deduction per unexcused late day", T::Number, C::Salary),
    def("STANDARD_HOURS_PER_DAY", "8", "Standard working hours per day", T::Number, C::Salary),
    def("WORK_DAYS_PER_MONTH", "26", "Working days per month", T::Number, C::Salary),
    // Attendance
    def("CHECK_IN_START_TIME", "07:00", "Earliest allowed check-in", T::Time, C::Attendance),
    def("CHECK_IN_STANDARD_TIME", "08:00", "Check-ins after this time are late", T::Time, C::Attendance),
    def("CHECK_OUT_MIN_TIME", "17:00", "Check-outs before this time leave early", T::Time, C::Attendance),
    def("GEOFENCE_ENABLED", "true", "Flag check-ins outside the office radius", T::Boolean, C::Attendance),
    def("GEOFENCE_RADIUS", "100", "Office radius in meters", T::Number, C::Attendance),
    def("OFFICE_LATITUDE", "10.7769", "Office latitude", T::Decimal, C::Attendance),
    def("OFFICE_LONGITUDE", "106.7009", "Office longitude", T::Decimal, C::Attendance),
    // General
    def("SYSTEM_NAME", "TMD System", "System name", T::String, C::General),
    def("COMPANY_NAME", "TMD Company", "Company name", T::String, C::General),
    def("COMPANY_ADDRESS", "", "Company address", T::String, C::General),
    def("COMPANY_PHONE", "", "Company phone number", T::String, C::General),
    def("ADMIN_EMAIL", "admin@tmd.local", "Administrator e-mail", T::String, C::General),
    // Notification
    def("ENABLE_EMAIL_NOTIFICATION", "false", "Send e-mail notifications", T::Boolean, C::Notification),
    def("ENABLE_LATE_WARNING", "true", "Warn staff about repeated lateness", T::Boolean, C::Notification),
    def("MAX_LATE_DAYS_PER_MONTH", "5", "Late days allowed per month", T::Number, C::Notification),
    // Custom code
    def("CUSTOM_CSS", "", "Custom CSS for all pages", T::Code, C::CustomCode),
    def("CUSTOM_JS", "", "Custom JavaScript for all pages", T::Code, C::CustomCode),
    def("ADMIN_CUSTOM_CSS", "", "Custom CSS for the admin area", T::Code, C::CustomCode),
    def("ADMIN_CUSTOM_JS", "", "Custom JavaScript for the admin area", T::Code, C::CustomCode),
    // Layout
    def("HEADER_HTML", "", "Extra header HTML", T::Code, C::Layout),
    def("FOOTER_HTML", "", "Extra footer HTML", T::Code, C::Layout),
    // Branding
    def("LOGO_URL", "", "Logo URL", T::String, C::Branding),
    def("PRIMARY_COLOR", "#E74C3C", "Primary color", T::String, C::Branding),
    def("SECONDARY_COLOR", "#F39C12", "Secondary color", T::String, C::Branding),
    def("FONT_FAMILY", "Segoe UI", "Base font family", T::String, C::Branding),
    def("FONT_SIZE_BASE", "16", "Base font size in px", T::Number, C::Branding),
    def("SYSTEM_DISPLAY_NAME", "TMD System", "Display name in the header", T::String, C::Branding),
    def("SYSTEM_TAGLINE", "", "Tagline under the display name", T::String, C::Branding),
];

pub fn default_for(key: &str) -> Option<&'static SettingDefault> {
    DEFAULT_SETTINGS.iter().find(|d| d.key == key)
}

/// Data type guessed from the key for settings created on the fly.
pub fn infer_data_type(key: &str) -> SettingDataType {
    if let Some(d) = default_for(key) {
        return d.data_type;
    }
    if key.contains("HTML") || key.contains("CSS") || key.contains("JS") {
        SettingDataType::Code
    } else if key.contains("SIZE") {
        SettingDataType::Number
    } else {
        SettingDataType::String
    }
}

pub fn infer_category(key: &str) -> SettingCategory {
    if let Some(d) = default_for(key) {
        return d.category;
    }
    if key.contains("HTML") {
        SettingCategory::Layout
    } else if key.contains("CSS") || key.contains("JS") {
        SettingCategory::CustomCode
    } else if ["COLOR", "LOGO", "FONT", "DISPLAY", "TAGLINE"]
        .iter()
        .any(|t| key.contains(t))
    {
        SettingCategory::Branding
    } else {
        SettingCategory::General
    }
}

pub fn infer_description(key: &str) -> String {
    default_for(key)
        .map(|d| d.description.to_string())
        .unwrap_or_else(|| key.replace('_', " ").to_lowercase())
}

/// Keys are stored upper-case with underscores.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 100
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Seeds the catalogue when the table is empty. Returns the number inserted.
pub async fn seed_defaults(pool: &MySqlPool) -> Result<usize, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM system_settings")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    for d in DEFAULT_SETTINGS {
        upsert(&mut tx, d.key, d.value, None).await?;
    }
    tx.commit().await?;

    settings_cache::invalidate().await;
    Ok(DEFAULT_SETTINGS.len())
}

/// Restores every catalogue key to its default value and reactivates it.
pub async fn reset_to_defaults(pool: &MySqlPool, user_id: u64) -> Result<usize, sqlx::Error> {
    let mut tx = pool.begin().await?;
    for d in DEFAULT_SETTINGS {
        upsert(&mut tx, d.key, d.value, Some(user_id)).await?;
    }
    tx.commit().await?;

    settings_cache::invalidate().await;
    Ok(DEFAULT_SETTINGS.len())
}

/// Updates an existing key or creates it with inferred metadata.
pub async fn upsert(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    key: &str,
    value: &str,
    user_id: Option<u64>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO system_settings
            (setting_key, setting_value, description, data_type, category, is_active, updated_by)
        VALUES (?, ?, ?, ?, ?, TRUE, ?)
        ON DUPLICATE KEY UPDATE
            setting_value = VALUES(setting_value),
            is_active = TRUE,
            updated_at = NOW(),
            updated_by = VALUES(updated_by)
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(infer_description(key))
    .bind(infer_data_type(key).as_ref())
    .bind(infer_category(key).as_ref())
    .bind(user_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// All active settings through the cache.
pub async fn snapshot(pool: &MySqlPool) -> Result<SettingsSnapshot, sqlx::Error> {
    let pool = pool.clone();
    settings_cache::get_or_load(|| async move {
        let rows = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT setting_key, setting_value FROM system_settings WHERE is_active = TRUE",
        )
        .fetch_all(&pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(k, v)| (k, v.unwrap_or_default()))
            .collect::<HashMap<_, _>>())
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to load settings");
        sqlx::Error::Protocol(format!("settings load failed: {e}"))
    })
}

/// Typed view over a settings snapshot with catalogue defaults as fallback.
pub struct SettingsView<'a>(pub &'a HashMap<String, String>);

impl SettingsView<'_> {
    pub fn raw(&self, key: &str) -> String {
        self.0
            .get(key)
            .cloned()
            .or_else(|| default_for(key).map(|d| d.value.to_string()))
            .unwrap_or_default()
    }

    fn parsed<V: std::str::FromStr>(&self, key: &str) -> Option<V> {
        self.0
            .get(key)
            .and_then(|v| v.trim().parse().ok())
            .or_else(|| default_for(key).and_then(|d| d.value.parse().ok()))
    }

    pub fn f64(&self, key: &str) -> f64 {
        self.parsed(key).unwrap_or(0.0)
    }

    pub fn bool(&self, key: &str) -> bool {
        self.parsed(key).unwrap_or(false)
    }

    pub fn time(&self, key: &str) -> NaiveTime {
        let parse = |v: &str| {
            NaiveTime::parse_from_str(v.trim(), "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(v.trim(), "%H:%M:%S"))
                .ok()
        };
        self.0
            .get(key)
            .and_then(|v| parse(v))
            .or_else(|| default_for(key).and_then(|d| parse(d.value)))
            .unwrap_or(NaiveTime::MIN)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SalaryRules {
    pub base_salary: f64,
    pub overtime_rate: f64,
    pub late_deduction: f64,
    pub standard_hours_per_day: f64,
    pub work_days_per_month: f64,
}

impl SalaryRules {
    pub fn from_view(view: &SettingsView<'_>) -> Self {
        Self {
            base_salary: view.f64("BASE_SALARY"),
            overtime_rate: view.f64("OVERTIME_RATE"),
            late_deduction: view.f64("LATE_DEDUCTION"),
            standard_hours_per_day: view.f64("STANDARD_HOURS_PER_DAY"),
            work_days_per_month: view.f64("WORK_DAYS_PER_MONTH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRules {
    pub check_in_start: NaiveTime,
    pub check_in_standard: NaiveTime,
    pub check_out_min: NaiveTime,
    pub geofence_enabled: bool,
    pub geofence_radius_m: f64,
    pub office_latitude: f64,
    pub office_longitude: f64,
}

impl AttendanceRules {
    pub fn from_view(view: &SettingsView<'_>) -> Self {
        Self {
            check_in_start: view.time("CHECK_IN_START_TIME"),
            check_in_standard: view.time("CHECK_IN_STANDARD_TIME"),
            check_out_min: view.time("CHECK_OUT_MIN_TIME"),
            geofence_enabled: view.bool("GEOFENCE_ENABLED"),
            geofence_radius_m: view.f64("GEOFENCE_RADIUS"),
            office_latitude: view.f64("OFFICE_LATITUDE"),
            office_longitude: view.f64("OFFICE_LONGITUDE"),
        }
    }
}

pub async fn salary_rules(pool: &MySqlPool) -> Result<SalaryRules, sqlx::Error> {
    let snap = snapshot(pool).await?;
    Ok(SalaryRules::from_view(&SettingsView(&snap)))
}

pub async fn attendance_rules(pool: &MySqlPool) -> Result<AttendanceRules, sqlx::Error> {
    let snap = snapshot(pool).await?;
    Ok(AttendanceRules::from_view(&SettingsView(&snap)))
}

/// Custom code, layout fragments and branding for page rendering.
#[derive(Debug, Serialize, ToSchema)]
pub struct CustomAssets {
    pub styles: String,
    pub scripts: String,
    pub header_html: String,
    pub footer_html: String,
    pub branding: HashMap<String, String>,
}

fn style_block(id: &str, css: &str) -> Option<String> {
    let css = css.trim();
    (!css.is_empty()).then(|| format!("<style id=\"{id}\">\n{css}\n</style>"))
}

fn script_block(id: &str, js: &str) -> Option<String> {
    let js = js.trim();
    (!js.is_empty()).then(|| format!("<script id=\"{id}\">\n(function() {{\n{js}\n}})();\n</script>"))
}

/// Admin-area blocks are appended only when `admin_area` is set.
pub fn render_custom_assets(view: &SettingsView<'_>, admin_area: bool) -> CustomAssets {
    let mut styles = vec![style_block("system-custom-css", &view.raw("CUSTOM_CSS"))];
    let mut scripts = vec![script_block("system-custom-js", &view.raw("CUSTOM_JS"))];
    if admin_area {
        styles.push(style_block("admin-custom-css", &view.raw("ADMIN_CUSTOM_CSS")));
        scripts.push(script_block("admin-custom-js", &view.raw("ADMIN_CUSTOM_JS")));
    }

    let branding = DEFAULT_SETTINGS
        .iter()
        .filter(|d| d.category == SettingCategory::Branding)
        .map(|d| (d.key.to_string(), view.raw(d.key)))
        .collect();

    CustomAssets {
        styles: styles.into_iter().flatten().collect::<Vec<_>>().join("\n"),
        scripts: scripts.into_iter().flatten().collect::<Vec<_>>().join("\n"),
        header_html: view.raw("HEADER_HTML"),
        footer_html: view.raw("FOOTER_HTML"),
        branding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn catalogue_keys_are_unique_and_valid() {
        for (i, d) in DEFAULT_SETTINGS.iter().enumerate() {
            assert!(is_valid_key(d.key), "{}", d.key);
            assert!(DEFAULT_SETTINGS[i + 1..].iter().all(|o| o.key != d.key), "{}", d.key);
        }
    }

    #[test]
    fn infers_metadata_for_unknown_keys() {
        assert_eq!(infer_data_type("LANDING_HTML"), SettingDataType::Code);
        assert_eq!(infer_category("LANDING_HTML"), SettingCategory::Layout);
        assert_eq!(infer_category("PRINT_CSS"), SettingCategory::CustomCode);
        assert_eq!(infer_category("ACCENT_COLOR"), SettingCategory::Branding);
        assert_eq!(infer_data_type("ICON_SIZE"), SettingDataType::Number);
        assert_eq!(infer_category("SUPPORT_HOTLINE"), SettingCategory::General);
        assert_eq!(infer_description("SUPPORT_HOTLINE"), "support hotline");
    }

    #[test]
    fn known_keys_keep_catalogue_metadata() {
        assert_eq!(infer_category("BASE_SALARY"), SettingCategory::Salary);
        assert_eq!(infer_data_type("CHECK_IN_STANDARD_TIME"), SettingDataType::Time);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(!is_valid_key("base salary"));
        assert!(!is_valid_key(""));
        assert!(is_valid_key("FONT_SIZE_2"));
    }

    #[test]
    fn view_falls_back_to_defaults() {
        let values = map(&[("BASE_SALARY", "6000000"), ("CHECK_IN_STANDARD_TIME", "bogus")]);
        let view = SettingsView(&values);

        assert_eq!(view.f64("BASE_SALARY"), 6_000_000.0);
        assert_eq!(view.f64("OVERTIME_RATE"), 1.5);
        assert_eq!(view.time("CHECK_IN_STANDARD_TIME"), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        assert!(view.bool("GEOFENCE_ENABLED"));
    }

    #[test]
    fn rules_load_from_view() {
        let values = map(&[("GEOFENCE_ENABLED", "false"), ("CHECK_OUT_MIN_TIME", "16:30")]);
        let rules = AttendanceRules::from_view(&SettingsView(&values));

        assert!(!rules.geofence_enabled);
        assert_eq!(rules.check_out_min, NaiveTime::from_hms_opt(16, 30, 0).unwrap());
        assert_eq!(rules.office_latitude, 10.7769);

        let salary = SalaryRules::from_view(&SettingsView(&values));
        assert_eq!(salary.work_days_per_month, 26.0);
    }

    #[test]
    fn renders_custom_code_blocks() {
        let values = map(&[
            ("CUSTOM_CSS", "body { margin: 0; }"),
            ("CUSTOM_JS", "console.log('hi');"),
            ("ADMIN_CUSTOM_CSS", ".admin { color: red; }"),
        ]);
        let view = SettingsView(&values);

        let staff = render_custom_assets(&view, false);
        assert!(staff.styles.contains("<style id=\"system-custom-css\">"));
        assert!(!staff.styles.contains("admin-custom-css"));
        assert!(staff.scripts.contains("(function() {\nconsole.log('hi');\n})();"));
        assert_eq!(staff.branding.get("PRIMARY_COLOR").map(String::as_str), Some("#E74C3C"));

        let admin = render_custom_assets(&view, true);
        assert!(admin.styles.contains("<style id=\"admin-custom-css\">"));
        // empty admin js produces no block
        assert!(!admin.scripts.contains("admin-custom-js"));
    }
}
