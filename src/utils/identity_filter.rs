use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures_util::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::{PoisonError, RwLock};

/// Expected capacity and false-positive rate.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Usernames and e-mails share one filter, namespaced by prefix.
static IDENTITY_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

#[derive(Debug, Copy, Clone)]
pub enum Identity<'a> {
    Username(&'a str),
    Email(&'a str),
}

impl Identity<'_> {
    fn key(&self) -> String {
        match self {
            Identity::Username(u) => format!("u:{}", u.trim().to_lowercase()),
            Identity::Email(e) => format!("e:{}", e.trim().to_lowercase()),
        }
    }
}

/// `false` means the identity is certainly unused; `true` needs a DB check.
pub fn might_exist(identity: Identity<'_>) -> bool {
    IDENTITY_FILTER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&identity.key())
}

pub fn insert(identity: Identity<'_>) {
    IDENTITY_FILTER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .add(&identity.key());
}

pub fn remove(identity: Identity<'_>) {
    IDENTITY_FILTER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&identity.key());
}

/// Warm up the filter from `users` using streaming + batching.
pub async fn warmup_identity_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream =
        sqlx::query_as::<_, (String, Option<String>)>("SELECT username, email FROM users").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (username, email) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(Identity::Username(&username).key());
        if let Some(email) = email.as_deref().filter(|e| !e.is_empty()) {
            batch.push(Identity::Email(email).key());
        }
        total += 1;

        if batch.len() >= batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    log::info!("Identity filter warmup complete: {} users", total);
    Ok(())
}

fn insert_batch(keys: &[String]) {
    let mut filter = IDENTITY_FILTER.write().unwrap_or_else(PoisonError::into_inner);
    for key in keys {
        filter.add(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_identities_are_reported() {
        insert(Identity::Username("Filter.Test.User"));
        assert!(might_exist(Identity::Username("filter.test.user")));
        assert!(!might_exist(Identity::Email("filter.test.user")));
    }

    #[test]
    fn removed_identities_disappear() {
        insert(Identity::Email("gone@tmd.local"));
        remove(Identity::Email("gone@tmd.local"));
        assert!(!might_exist(Identity::Email("gone@tmd.local")));
    }
}
