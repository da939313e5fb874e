pub mod db_utils;
pub mod identity_filter;
pub mod settings_cache;
pub mod user_agent;
