use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct SystemSetting {
    #[serde(default)]
    pub setting_id: u64,
    #[schema(example = "BASE_SALARY")]
    pub setting_key: String,
    #[schema(example = "5000000")]
    pub setting_value: Option<String>,
    pub description: Option<String>,
    #[schema(example = "Number")]
    pub data_type: String,
    #[schema(example = "Salary")]
    pub category: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    #[schema(value_type = Option<String>, format = "date-time")]
    pub updated_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub updated_by: Option<u64>,
}

fn default_true() -> bool {
    true
}

pub const SETTING_SELECT: &str = r#"
    SELECT setting_id, setting_key, setting_value, description, data_type, category,
           is_active, updated_at, updated_by
    FROM system_settings
"#;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema, Display, EnumString, AsRefStr)]
pub enum SettingDataType {
    String,
    Number,
    Decimal,
    Boolean,
    Time,
    Code,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, ToSchema, Display, EnumString, AsRefStr)]
pub enum SettingCategory {
    Salary,
    Attendance,
    General,
    Notification,
    CustomCode,
    Layout,
    Branding,
}
