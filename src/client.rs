//! The single point of contact with the key-value store.
//!
//! [`StoreClient`] wraps an optional backend. Without one (no endpoint
//! configured) every call succeeds as if the store were empty. With one,
//! every call is bounded by the per-call timeout and logged; failures are
//! returned to the caller, which decides how to degrade.

use crate::backend::CacheBackend;
use crate::config::{StoreSettings, DEFAULT_OP_TIMEOUT};
use crate::error::{Error, Result};
use crate::key::{CacheKey, KeyPattern};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

/// Keys removed per DEL when evicting by pattern.
const DELETE_CHUNK: usize = 500;

#[derive(Clone)]
pub struct StoreClient<B: CacheBackend> {
    backend: Option<B>,
    op_timeout: Duration,
}

impl<B: CacheBackend> StoreClient<B> {
    /// Client over a live backend.
    pub fn new(backend: B) -> Self {
        StoreClient {
            backend: Some(backend),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    /// Client with caching turned off.
    pub fn disabled() -> Self {
        StoreClient {
            backend: None,
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    /// `Ok(None)` on a miss, and always when disabled.
    ///
    /// # Errors
    /// Returns `Err` on a store failure or timeout.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let Some(backend) = &self.backend else {
            return Ok(None);
        };
        self.bounded("GET", key.as_str(), backend.get(key.as_str()))
            .await
    }

    /// Store bytes with a TTL. A no-op when disabled.
    ///
    /// # Errors
    /// Returns `Err` on a store failure or timeout.
    pub async fn set_with_ttl(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        self.bounded("SET", key.as_str(), backend.set(key.as_str(), value, ttl))
            .await
    }

    /// Remove one key. A no-op when disabled.
    ///
    /// # Errors
    /// Returns `Err` on a store failure or timeout.
    pub async fn delete(&self, key: &CacheKey) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        self.bounded("DEL", key.as_str(), backend.delete(key.as_str()))
            .await
    }

    /// Keys currently matching `pattern`. Empty when disabled.
    ///
    /// Walks the backend's cursor scan; the timeout applies to each page.
    ///
    /// # Errors
    /// Returns `Err` if any page fails or times out.
    pub async fn enumerate(&self, pattern: &KeyPattern) -> Result<Vec<String>> {
        let Some(backend) = &self.backend else {
            return Ok(Vec::new());
        };

        let mut keys = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next, page) = self
                .bounded("SCAN", pattern.as_str(), backend.scan(pattern, cursor))
                .await?;
            keys.extend(page);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    /// Scan and batch-delete every key matching `pattern`, page by page.
    ///
    /// Returns the number of keys deleted; zero matches is a silent no-op.
    /// Each scan page and each delete batch gets its own timeout, so a
    /// large keyspace only costs more round trips.
    ///
    /// # Errors
    /// Returns `Err` if a scan page or a delete batch fails. Keys deleted
    /// before the failure stay deleted.
    pub async fn delete_by_pattern(&self, pattern: &KeyPattern) -> Result<u64> {
        let Some(backend) = &self.backend else {
            return Ok(0);
        };

        let mut seen = HashSet::new();
        let mut deleted = 0u64;
        let mut cursor = 0u64;
        loop {
            let (next, page) = self
                .bounded("SCAN", pattern.as_str(), backend.scan(pattern, cursor))
                .await?;

            let fresh: Vec<String> = page
                .into_iter()
                .filter(|key| seen.insert(key.clone()))
                .collect();
            for chunk in fresh.chunks(DELETE_CHUNK) {
                let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
                self.bounded("DEL", pattern.as_str(), backend.mdelete(&refs))
                    .await?;
                deleted += chunk.len() as u64;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        if deleted > 0 {
            debug!("✓ Evicted {} keys matching {}", deleted, pattern);
        }
        Ok(deleted)
    }

    /// `Ok(false)` when disabled.
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be reached.
    pub async fn health_check(&self) -> Result<bool> {
        match &self.backend {
            Some(backend) => {
                self.bounded("PING", "-", backend.health_check())
                    .await
            }
            None => Ok(false),
        }
    }

    async fn bounded<T, F>(&self, op: &str, target: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!("✗ Store {} {} failed: {}", op, target, e);
                Err(e)
            }
            Err(_) => {
                warn!(
                    "✗ Store {} {} timed out after {:?}",
                    op, target, self.op_timeout
                );
                Err(Error::Timeout(format!(
                    "{} {} after {:?}",
                    op, target, self.op_timeout
                )))
            }
        }
    }
}

#[cfg(feature = "redis")]
impl StoreClient<crate::backend::RedisBackend> {
    /// Build a Redis-backed client, or a disabled one when no endpoint is
    /// configured or the endpoint is unusable.
    ///
    /// No connection is opened here; the pool connects on first use.
    pub fn from_settings(settings: &StoreSettings) -> Self {
        use crate::backend::{RedisBackend, RedisConfig};

        let client = match RedisConfig::from_settings(settings) {
            Some(config) => match RedisBackend::new(config) {
                Ok(backend) => StoreClient::new(backend),
                Err(e) => {
                    error!("Cache disabled: {}", e);
                    StoreClient::disabled()
                }
            },
            None => StoreClient::disabled(),
        };
        client.with_op_timeout(settings.op_timeout)
    }
}

#[cfg(feature = "inmemory")]
impl StoreClient<crate::backend::InMemoryBackend> {
    /// An in-process store, honouring the settings' timeout. The endpoint is
    /// ignored; use [`StoreClient::disabled`] to turn caching off.
    pub fn in_memory(settings: &StoreSettings) -> Self {
        StoreClient::new(crate::backend::InMemoryBackend::new())
            .with_op_timeout(settings.op_timeout)
    }
}
