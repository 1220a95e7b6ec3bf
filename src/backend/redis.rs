//! Redis backend.

use super::CacheBackend;
use crate::config::StoreSettings;
use crate::error::{Error, Result};
use crate::key::KeyPattern;
use deadpool_redis::{redis::AsyncCommands, Config as PoolConfig, Pool, Runtime};
use std::time::Duration;

/// Keys requested per SCAN round trip.
const SCAN_COUNT: usize = 200;

/// Pool statistics information.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub connections: u32,
    pub idle_connections: u32,
}

/// Connection settings for [`RedisBackend`].
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// `redis://host:port/db` or `rediss://...`. A bare `host:port` is
    /// treated as `redis://`.
    pub url: String,
    /// Credential injected as the password when `url` carries none.
    pub token: Option<String>,
    pub pool_size: u32,
    /// Bound on waiting for, or opening, a pooled connection.
    pub connection_timeout: Duration,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        RedisConfig {
            url: url.into(),
            token: None,
            pool_size: crate::config::DEFAULT_POOL_SIZE,
            connection_timeout: Duration::from_secs(5),
        }
    }

    /// `None` when no endpoint is configured, i.e. the cache is disabled.
    pub fn from_settings(settings: &StoreSettings) -> Option<Self> {
        let url = settings.url.clone()?;
        Some(RedisConfig {
            url,
            token: settings.token.clone(),
            pool_size: settings.pool_size,
            connection_timeout: settings.connect_timeout,
        })
    }

    /// Build the connection string handed to the pool.
    pub fn connection_string(&self) -> String {
        let (scheme, rest) = self
            .url
            .split_once("://")
            .unwrap_or(("redis", self.url.as_str()));

        match &self.token {
            Some(token) if !rest.contains('@') => format!(
                "{}://default:{}@{}",
                scheme,
                urlencoding::encode(token),
                rest
            ),
            _ => format!("{}://{}", scheme, rest),
        }
    }
}

/// Redis backend over a deadpool connection pool.
///
/// Creating the pool opens no connection; the first command does. Building a
/// backend is therefore cheap and safe at start-up even if Redis is down.
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// # Errors
    /// Returns `Err` if the connection string is invalid.
    pub fn new(config: RedisConfig) -> Result<Self> {
        let mut cfg = PoolConfig::from_url(config.connection_string());
        let mut pool_cfg = deadpool_redis::PoolConfig::new(config.pool_size as usize);
        pool_cfg.timeouts.wait = Some(config.connection_timeout);
        pool_cfg.timeouts.create = Some(config.connection_timeout);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::ConfigError(format!("Failed to create Redis pool: {}", e)))?;

        info!(
            "✓ Redis backend initialized (pool size: {})",
            config.pool_size
        );

        Ok(RedisBackend { pool })
    }

    /// # Errors
    /// Returns `Err` if the connection string is invalid.
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        Self::new(RedisConfig::new(conn_str))
    }

    pub fn pool_stats(&self) -> PoolStats {
        let status = self.pool.status();
        PoolStats {
            connections: status.size as u32,
            idle_connections: status.available as u32,
        }
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::BackendError(format!("Failed to get Redis connection: {}", e)))
    }
}

impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| Error::BackendError(format!("Redis GET failed for key {}: {}", key, e)))?;

        if value.is_some() {
            debug!("✓ Redis GET {} -> HIT", key);
        } else {
            debug!("✓ Redis GET {} -> MISS", key);
        }

        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;

        // PSETEX rejects zero.
        let millis = (ttl.as_millis() as u64).max(1);
        conn.pset_ex::<_, _, ()>(key, value, millis)
            .await
            .map_err(|e| {
                Error::BackendError(format!("Redis PSETEX failed for key {}: {}", key, e))
            })?;

        debug!("✓ Redis SET {} (TTL: {}ms)", key, millis);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Error::BackendError(format!("Redis DEL failed for key {}: {}", key, e)))?;

        debug!("✓ Redis DELETE {}", key);
        Ok(())
    }

    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection().await?;

        conn.del::<_, ()>(keys)
            .await
            .map_err(|e| Error::BackendError(format!("Redis DEL (bulk) failed: {}", e)))?;

        debug!("✓ Redis MDELETE {} keys", keys.len());
        Ok(())
    }

    async fn scan(&self, pattern: &KeyPattern, cursor: u64) -> Result<(u64, Vec<String>)> {
        let mut conn = self.connection().await?;

        // SCAN, never KEYS: iteration must not block the server.
        let (next, batch): (u64, Vec<String>) = deadpool_redis::redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern.as_str())
            .arg("COUNT")
            .arg(SCAN_COUNT)
            .query_async(&mut *conn)
            .await
            .map_err(|e| Error::BackendError(format!("Redis SCAN failed for {}: {}", pattern, e)))?;

        debug!(
            "Redis SCAN {} cursor {} -> {} keys, next {}",
            pattern,
            cursor,
            batch.len(),
            next
        );
        Ok((next, batch))
    }

    async fn keys(&self, pattern: &KeyPattern) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch) = self.scan(pattern, cursor).await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        keys.sort_unstable();
        keys.dedup();

        debug!("✓ Redis SCAN {} -> {} keys", pattern, keys.len());
        Ok(keys)
    }

    async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection().await?;

        let pong: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| Error::BackendError(format!("Redis PING failed: {}", e)))?;

        Ok(pong.contains("PONG"))
    }
}
