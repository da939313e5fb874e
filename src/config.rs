use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    // Background auto-reject
    pub auto_reject_after_days: i64,
    pub auto_reject_interval_secs: u64,

    pub layout_dir: String,
    pub layout_backup_dir: String,

    /// Nominatim-compatible reverse endpoint; `None` disables lookups.
    pub geocoding_url: Option<String>,
    pub notification_buffer: usize,
    pub log_dir: String,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

fn string_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let geocoding_url = string_or(
            "GEOCODING_URL",
            "https://nominatim.openstreetmap.org/reverse",
        );

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed_or("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed_or("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: parsed_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: parsed_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: string_or("API_PREFIX", "/api"),

            auto_reject_after_days: parsed_or("AUTO_REJECT_AFTER_DAYS", 3)?,
            auto_reject_interval_secs: parsed_or("AUTO_REJECT_INTERVAL_SECS", 3600)?,

            layout_dir: string_or("LAYOUT_DIR", "layouts"),
            layout_backup_dir: string_or("LAYOUT_BACKUP_DIR", "backups/layouts"),

            geocoding_url: Some(geocoding_url).filter(|u| !u.trim().is_empty()),
            notification_buffer: parsed_or("NOTIFICATION_BUFFER", 256)?,
            log_dir: string_or("LOG_DIR", "logs"),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://localhost/tmd_test".into(),
            jwt_secret: "test-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            access_token_ttl: 900,
            refresh_token_ttl: 604_800,
            rate_login_per_min: 60,
            rate_refresh_per_min: 30,
            rate_protected_per_min: 1000,
            api_prefix: "/api".into(),
            auto_reject_after_days: 3,
            auto_reject_interval_secs: 3600,
            layout_dir: "layouts".into(),
            layout_backup_dir: "backups/layouts".into(),
            geocoding_url: None,
            notification_buffer: 16,
            log_dir: "logs".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_value_falls_back_to_default() {
        let ttl: usize = parsed_or("TMD_TEST_UNSET_TTL", 900).unwrap();
        assert_eq!(ttl, 900);
    }

    #[test]
    fn missing_required_value_is_an_error() {
        let err = required("TMD_TEST_UNSET_REQUIRED").unwrap_err();
        assert!(err.to_string().contains("TMD_TEST_UNSET_REQUIRED"));
    }
}
