use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Key used by endpoints that cache one result for the whole source.
pub const GLOBAL_KEY: &str = "*";

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

/// Process-lifetime result cache with a fixed time-to-live.
///
/// Entries are overwritten on refresh and never evicted. Writes are
/// last-writer-wins; the lock is only held for the map access itself, never
/// across an upstream fetch.
pub struct ResultCache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> ResultCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_fresh(&self, entry: &CacheEntry<T>, now: DateTime<Utc>) -> bool {
        now - entry.cached_at < self.ttl
    }

    /// Raw lookup, fresh or not.
    pub async fn get(&self, key: &str) -> Option<CacheEntry<T>> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Returns the cached data only while it is younger than the TTL.
    pub async fn get_fresh(&self, key: &str) -> Option<T> {
        let entry = self.get(key).await?;
        if self.is_fresh(&entry, Utc::now()) {
            Some(entry.data)
        } else {
            None
        }
    }

    pub async fn put(&self, key: &str, data: T) {
        self.put_at(key, data, Utc::now()).await;
    }

    pub async fn put_at(&self, key: &str, data: T, cached_at: DateTime<Utc>) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), CacheEntry { data, cached_at });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_within_ttl() {
        let cache = ResultCache::new(Duration::minutes(15));
        cache.put(GLOBAL_KEY, vec![1, 2, 3]).await;
        assert_eq!(cache.get_fresh(GLOBAL_KEY).await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn stale_after_ttl() {
        let cache = ResultCache::new(Duration::minutes(15));
        let old = Utc::now() - Duration::minutes(16);
        cache.put_at(GLOBAL_KEY, "old".to_string(), old).await;

        assert_eq!(cache.get_fresh(GLOBAL_KEY).await, None);
        // the stale entry is still there until the next refresh overwrites it
        assert!(cache.get(GLOBAL_KEY).await.is_some());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let cache: ResultCache<Option<String>> = ResultCache::new(Duration::hours(1));
        cache.put("https://a.example/", Some("a.png".into())).await;
        cache.put("https://b.example/", None).await;

        assert_eq!(
            cache.get_fresh("https://a.example/").await,
            Some(Some("a.png".to_string()))
        );
        assert_eq!(cache.get_fresh("https://b.example/").await, Some(None));
        assert_eq!(cache.get_fresh("https://c.example/").await, None);
    }

    #[tokio::test]
    async fn put_overwrites() {
        let cache = ResultCache::new(Duration::minutes(10));
        cache.put(GLOBAL_KEY, 1).await;
        cache.put(GLOBAL_KEY, 2).await;
        assert_eq!(cache.get_fresh(GLOBAL_KEY).await, Some(2));
    }
}
