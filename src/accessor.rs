//! Cache-aside reads: return the stored value or compute and populate it.

use crate::backend::CacheBackend;
use crate::client::StoreClient;
use crate::key::CacheKey;
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::serialization;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Per-key slot shared by the callers of one computation. Holds the encoded
/// value once the first caller has computed it.
type FlightSlot = Arc<Mutex<Option<Vec<u8>>>>;

/// Outcome of reading one key from the store.
enum Lookup<T> {
    Hit(T),
    /// Absent, expired, or unreadable and evicted.
    Miss,
    /// The store failed or timed out.
    Unavailable,
}

/// Generic "get cached value or compute and populate" primitive.
///
/// Store failures never reach the caller: a failed or timed-out read is a
/// miss, a failed write-back is logged and the computed value is returned
/// anyway, an undecodable entry is deleted and recomputed. The only error a
/// caller sees is the one its own `compute` returned.
///
/// # Concurrent misses
///
/// With single-flight enabled (the default), concurrent misses on one key
/// are serialised on a per-key lock: the first caller computes, hands the
/// encoded value to the others in memory and then writes it back. Waiters
/// never touch the store, so a failing write-back does not make them
/// recompute. If the first caller's `compute` fails, the next waiter tries
/// its own.
///
/// Collapsing is skipped when the store is disabled, or when the initial
/// read already failed: with the store down every caller computes on its
/// own instead of queueing behind store timeouts.
///
/// # Example
///
/// ```ignore
/// let accessor = CacheAccessor::new(StoreClient::new(InMemoryBackend::new()));
/// let key = CacheKey::availability("pkg-1", date, 4);
/// let snapshot = accessor
///     .get_or_compute(&key, Duration::from_secs(300), || compute_availability(&db))
///     .await?;
/// ```
pub struct CacheAccessor<B: CacheBackend> {
    client: StoreClient<B>,
    metrics: Arc<dyn CacheMetrics>,
    single_flight: bool,
    in_flight: DashMap<String, FlightSlot>,
}

impl<B: CacheBackend> CacheAccessor<B> {
    pub fn new(client: StoreClient<B>) -> Self {
        CacheAccessor {
            client,
            metrics: Arc::new(NoOpMetrics),
            single_flight: true,
            in_flight: DashMap::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Turn per-key miss collapsing on or off.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    pub fn client(&self) -> &StoreClient<B> {
        &self.client
    }

    /// Return the value cached under `key`, or run `compute`, store its
    /// result for `ttl` and return it.
    ///
    /// # Errors
    ///
    /// Only errors produced by `compute`, unchanged.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let timer = Instant::now();

        let store_up = match self.read::<T>(key).await {
            Lookup::Hit(value) => {
                self.metrics.record_hit(key.as_str(), timer.elapsed());
                return Ok(value);
            }
            Lookup::Miss => true,
            Lookup::Unavailable => false,
        };

        if !(store_up && self.single_flight && self.client.is_enabled()) {
            let value = compute().await?;
            if let Some(bytes) = self.encode(key, &value) {
                self.write_back(key, bytes, ttl).await;
            }
            self.metrics.record_miss(key.as_str(), timer.elapsed());
            return Ok(value);
        }

        let flight = Flight::join(&self.in_flight, key.as_str());
        let mut shared = flight.slot.lock().await;

        if let Some(bytes) = shared.as_deref() {
            match serialization::decode::<T>(bytes) {
                Ok(value) => {
                    debug!("✓ Collapsed concurrent miss on {}", key);
                    self.metrics.record_hit(key.as_str(), timer.elapsed());
                    return Ok(value);
                }
                Err(e) => warn!("Shared value for {} did not decode: {}", key, e),
            }
        }

        let value = compute().await?;
        let encoded = self.encode(key, &value);
        *shared = encoded.clone();
        drop(shared);

        // Still registered: callers arriving during the write-back take the
        // shared value instead of missing the store again.
        if let Some(bytes) = encoded {
            self.write_back(key, bytes, ttl).await;
        }
        drop(flight);

        self.metrics.record_miss(key.as_str(), timer.elapsed());
        Ok(value)
    }

    /// Best-effort removal of one key. Returns whether the delete reached
    /// the store.
    pub async fn evict(&self, key: &CacheKey) -> bool {
        match self.client.delete(key).await {
            Ok(()) => true,
            Err(e) => {
                self.metrics.record_error(key.as_str(), &e.to_string());
                false
            }
        }
    }

    /// Number of keys with a computation in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    async fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Lookup<T> {
        let bytes = match self.client.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Lookup::Miss,
            Err(e) => {
                self.metrics.record_error(key.as_str(), &e.to_string());
                return Lookup::Unavailable;
            }
        };

        match serialization::decode::<T>(&bytes) {
            Ok(value) => Lookup::Hit(value),
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                if e.is_corrupt_entry() {
                    self.evict(key).await;
                }
                Lookup::Miss
            }
        }
    }

    fn encode<T: Serialize>(&self, key: &CacheKey, value: &T) -> Option<Vec<u8>> {
        match serialization::encode(value) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                self.metrics.record_error(key.as_str(), &e.to_string());
                None
            }
        }
    }

    async fn write_back(&self, key: &CacheKey, bytes: Vec<u8>, ttl: Duration) {
        let started = Instant::now();
        match self.client.set_with_ttl(key, bytes, ttl).await {
            Ok(()) => self.metrics.record_set(key.as_str(), started.elapsed()),
            Err(e) => self.metrics.record_error(key.as_str(), &e.to_string()),
        }
    }
}

/// A caller's membership in a key's flight. Dropping it, on return, error,
/// panic or cancellation, removes the table entry once nobody else holds it.
struct Flight<'a> {
    table: &'a DashMap<String, FlightSlot>,
    key: &'a str,
    slot: FlightSlot,
}

impl<'a> Flight<'a> {
    fn join(table: &'a DashMap<String, FlightSlot>, key: &'a str) -> Self {
        let slot = Arc::clone(table.entry(key.to_owned()).or_default().value());
        Flight { table, key, slot }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        // Two references left (the table's and ours) means nobody is waiting.
        let slot = &self.slot;
        self.table.remove_if(self.key, |_, held| {
            Arc::ptr_eq(held, slot) && Arc::strong_count(held) <= 2
        });
    }
}
