use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Department {
    #[schema(example = 1)]
    pub department_id: u64,
    #[schema(example = "Operations")]
    pub department_name: String,
    pub description: Option<String>,
    pub is_active: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct DepartmentOverview {
    pub department_id: u64,
    pub department_name: String,
    pub description: Option<String>,
    pub is_active: bool,
    #[schema(example = 12)]
    pub total_users: i64,
    #[schema(example = 10)]
    pub active_users: i64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
}

/// Trims a department name and rejects empty input.
pub fn normalize_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_rejects_blank_names() {
        assert_eq!(normalize_name("  Sales "), Some("Sales".to_string()));
        assert_eq!(normalize_name("   "), None);
    }
}
