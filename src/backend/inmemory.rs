//! In-process backend.
//!
//! DashMap-backed, expiring entries lazily on access. Used for tests and for
//! single-node deployments that have no external store.

use super::CacheBackend;
use crate::error::Result;
use crate::key::KeyPattern;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct StoredEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl StoredEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        StoredEntry {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe in-memory store.
///
/// Clones share the same map.
///
/// # Example
///
/// ```no_run
/// use availability_cache::backend::{CacheBackend, InMemoryBackend};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = InMemoryBackend::new();
///     backend.set("k", b"v".to_vec(), Duration::from_secs(60)).await?;
///     assert!(backend.get("k").await?.is_some());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, StoredEntry>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Whether a live entry exists under `key`. Does not evict.
    pub fn contains(&self, key: &str) -> bool {
        self.store.get(key).is_some_and(|e| !e.is_expired())
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        let purged = before.saturating_sub(self.store.len());
        if purged > 0 {
            debug!("✓ InMemory PURGE {} expired entries", purged);
        }
        purged
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(entry.data.clone()));
            }
        }

        // The read guard is gone by now; drop the entry if it expired.
        self.store.remove_if(key, |_, entry| entry.is_expired());
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.store
            .insert(key.to_string(), StoredEntry::new(value, ttl));
        debug!("✓ InMemory SET {} (TTL: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.store.remove(*key);
        }
        debug!("✓ InMemory MDELETE {} keys", keys.len());
        Ok(())
    }

    async fn keys(&self, pattern: &KeyPattern) -> Result<Vec<String>> {
        let keys: Vec<String> = self
            .store
            .iter()
            .filter(|entry| !entry.is_expired() && pattern.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        debug!("✓ InMemory SCAN {} -> {} keys", pattern, keys.len());
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_inmemory_set_get() {
        let backend = InMemoryBackend::new();
        backend
            .set("key1", b"value1".to_vec(), TTL)
            .await
            .expect("Failed to set");

        let result = backend.get("key1").await.expect("Failed to get");
        assert_eq!(result, Some(b"value1".to_vec()));
        assert_eq!(backend.get("missing").await.expect("Failed to get"), None);
    }

    #[tokio::test]
    async fn test_inmemory_ttl_expiration() {
        let backend = InMemoryBackend::new();
        backend
            .set("key1", b"value1".to_vec(), Duration::from_millis(100))
            .await
            .expect("Failed to set");

        assert!(backend.get("key1").await.expect("Failed to get").is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(backend.get("key1").await.expect("Failed to get").is_none());
        // The expired entry is dropped on access.
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_inmemory_keys_by_pattern() {
        let backend = InMemoryBackend::new();
        for key in [
            "availability:package:pkg-9:date:2025-01-01:minPax:2",
            "availability:package:pkg-9:date:2025-01-02:minPax:2",
            "availability:package:pkg-8:date:2025-01-01:minPax:2",
        ] {
            backend.set(key, vec![1], TTL).await.expect("Failed to set");
        }

        let mut keys = backend
            .keys(&KeyPattern::package_availability("pkg-9"))
            .await
            .expect("Failed to scan");
        keys.sort();

        assert_eq!(
            keys,
            vec![
                "availability:package:pkg-9:date:2025-01-01:minPax:2".to_string(),
                "availability:package:pkg-9:date:2025-01-02:minPax:2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_inmemory_keys_skip_expired() {
        let backend = InMemoryBackend::new();
        backend
            .set("user:u1:profile", vec![1], Duration::from_millis(20))
            .await
            .expect("Failed to set");
        tokio::time::sleep(Duration::from_millis(40)).await;

        let keys = backend
            .keys(&KeyPattern::user("u1"))
            .await
            .expect("Failed to scan");
        assert!(keys.is_empty());
        assert_eq!(backend.purge_expired(), 1);
    }

    #[tokio::test]
    async fn test_inmemory_mdelete() {
        let backend = InMemoryBackend::new();
        for key in ["a", "b", "c"] {
            backend.set(key, vec![0], TTL).await.expect("Failed to set");
        }

        backend.mdelete(&["a", "b"]).await.expect("Failed to mdelete");

        assert_eq!(backend.len(), 1);
        assert!(backend.contains("c"));
    }

    #[tokio::test]
    async fn test_inmemory_clone_shares_store() {
        let first = InMemoryBackend::new();
        let second = first.clone();
        first.set("key", vec![7], TTL).await.expect("Failed to set");
        assert_eq!(
            second.get("key").await.expect("Failed to get"),
            Some(vec![7])
        );
    }

    #[tokio::test]
    async fn test_inmemory_concurrent_writers() {
        let backend = InMemoryBackend::new();
        let mut handles = vec![];

        for i in 0..10 {
            let b = backend.clone();
            handles.push(tokio::spawn(async move {
                b.set(&format!("key_{}", i), vec![i as u8], TTL)
                    .await
                    .expect("Failed to set");
            }));
        }

        for handle in handles {
            handle.await.expect("Task failed");
        }

        assert_eq!(backend.len(), 10);
    }
}
