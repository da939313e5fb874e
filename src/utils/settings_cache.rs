use moka::future::Cache;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Snapshot of all active settings, keyed by setting key.
pub type SettingsSnapshot = Arc<HashMap<String, String>>;

const SNAPSHOT_KEY: &str = "active";

/// Settings change rarely; a short TTL bounds staleness if a write bypasses
/// `invalidate`.
static SETTINGS_CACHE: Lazy<Cache<&'static str, SettingsSnapshot>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(4)
        .time_to_live(Duration::from_secs(300))
        .build()
});

/// Returns the cached snapshot, loading it with `load` on a miss.
pub async fn get_or_load<F, Fut>(load: F) -> Result<SettingsSnapshot, Arc<sqlx::Error>>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<HashMap<String, String>, sqlx::Error>>,
{
    SETTINGS_CACHE
        .try_get_with(SNAPSHOT_KEY, async move { load().await.map(Arc::new) })
        .await
}

pub async fn invalidate() {
    SETTINGS_CACHE.invalidate(SNAPSHOT_KEY).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn caches_until_invalidated() {
        invalidate().await;
        let first = get_or_load(|| async {
            Ok(HashMap::from([("SYSTEM_NAME".to_string(), "TMD".to_string())]))
        })
        .await
        .unwrap();
        assert_eq!(first.get("SYSTEM_NAME").map(String::as_str), Some("TMD"));

        let cached = get_or_load(|| async { Ok(HashMap::new()) }).await.unwrap();
        assert!(cached.contains_key("SYSTEM_NAME"));

        invalidate().await;
        let reloaded = get_or_load(|| async { Ok(HashMap::new()) }).await.unwrap();
        assert!(reloaded.is_empty());
    }
}
