//! Key-value store backends.

use crate::error::Result;
use crate::key::KeyPattern;
use std::time::Duration;

#[cfg(feature = "inmemory")]
pub mod inmemory;
#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryBackend;
#[cfg(feature = "redis")]
pub use redis::{PoolStats, RedisBackend, RedisConfig};

/// Raw operations against a key-value store with per-key expiry.
///
/// Backends report failures honestly; absorbing them is the job of
/// [`StoreClient`](crate::client::StoreClient) and the layers above it.
///
/// **IMPORTANT:** All methods take `&self`. Implementations are shared across
/// tasks and must use interior mutability or external storage.
#[allow(async_fn_in_trait)]
pub trait CacheBackend: Send + Sync + Clone {
    /// Retrieve the bytes stored under `key`.
    ///
    /// # Returns
    /// - `Ok(Some(bytes))` - Value present and not expired
    /// - `Ok(None)` - Absent or expired
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be reached.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, expiring after `ttl`.
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be reached.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove a single key. Removing an absent key is not an error.
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be reached.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove many keys in one round trip where the store allows it.
    ///
    /// Default implementation calls `delete()` for each key.
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be reached.
    async fn mdelete(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// List the live keys matching `pattern`.
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be reached.
    async fn keys(&self, pattern: &KeyPattern) -> Result<Vec<String>>;

    /// One page of a cursor scan over the keys matching `pattern`.
    ///
    /// Start with cursor `0`. Returns the next cursor and the page's keys;
    /// a returned cursor of `0` ends the scan. A key may appear on more than
    /// one page.
    ///
    /// Default implementation returns everything from `keys()` as one page.
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be reached.
    async fn scan(&self, pattern: &KeyPattern, cursor: u64) -> Result<(u64, Vec<String>)> {
        if cursor != 0 {
            return Ok((0, Vec::new()));
        }
        Ok((0, self.keys(pattern).await?))
    }

    /// Verify the store is reachable.
    ///
    /// # Errors
    /// Returns `Err` if the store cannot be reached.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
