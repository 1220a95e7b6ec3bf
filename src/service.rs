//! High-level cache service for applications.
//!
//! Bundles the read path and the invalidation path over one store client so a
//! host can construct it once and clone it into request handlers.

use crate::accessor::CacheAccessor;
use crate::availability::{AvailabilityCache, AvailabilitySnapshot, AvailabilitySummary, DateRange};
use crate::backend::CacheBackend;
use crate::batch::{AvailabilityRequest, BatchAvailabilityFetcher};
use crate::client::StoreClient;
use crate::config::StoreSettings;
use crate::invalidation::{
    AvailabilityScope, InvalidationEvent, InvalidationOrchestrator, InvalidationReport, WalletKind,
};
use crate::observability::CacheMetrics;
use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;

/// Availability caching and invalidation behind one handle.
///
/// Cloning is cheap: every clone shares the same accessor, in-flight table and
/// store client.
///
/// # Example
///
/// ```ignore
/// use availability_cache::{CacheService, StoreSettings};
///
/// let settings = StoreSettings::from_env();
/// let cache = CacheService::from_settings(&settings);
///
/// let snapshot = cache
///     .get_availability("pkg-1", date, 4, || load_availability(&db, "pkg-1", date, 4))
///     .await?;
///
/// // After committing a booking:
/// cache.invalidate(&InvalidationEvent::booking("bk-42")).await;
/// ```
pub struct CacheService<B: CacheBackend> {
    accessor: Arc<CacheAccessor<B>>,
    availability: AvailabilityCache<B>,
    batch: BatchAvailabilityFetcher<B>,
    orchestrator: Arc<InvalidationOrchestrator<B>>,
}

impl<B: CacheBackend> Clone for CacheService<B> {
    fn clone(&self) -> Self {
        CacheService {
            accessor: Arc::clone(&self.accessor),
            availability: self.availability.clone(),
            batch: self.batch.clone(),
            orchestrator: Arc::clone(&self.orchestrator),
        }
    }
}

impl<B: CacheBackend> CacheService<B> {
    /// Create a service over `client`, taking TTL and batch size from
    /// `settings`.
    pub fn new(client: StoreClient<B>, settings: &StoreSettings) -> Self {
        Self::build(client, settings, None)
    }

    /// Create a service that reports cache traffic to `metrics`.
    pub fn with_metrics(
        client: StoreClient<B>,
        settings: &StoreSettings,
        metrics: Arc<dyn CacheMetrics>,
    ) -> Self {
        Self::build(client, settings, Some(metrics))
    }

    fn build(
        client: StoreClient<B>,
        settings: &StoreSettings,
        metrics: Option<Arc<dyn CacheMetrics>>,
    ) -> Self {
        let mut accessor = CacheAccessor::new(client.clone());
        let mut orchestrator = InvalidationOrchestrator::new(client);
        if let Some(metrics) = metrics {
            accessor = accessor.with_metrics(Arc::clone(&metrics));
            orchestrator = orchestrator.with_metrics(metrics);
        }

        let accessor = Arc::new(accessor);
        let availability =
            AvailabilityCache::new(Arc::clone(&accessor)).with_ttl(settings.availability_ttl);
        let batch =
            BatchAvailabilityFetcher::new(availability.clone()).with_batch_size(settings.batch_size);

        CacheService {
            accessor,
            availability,
            batch,
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// See [`AvailabilityCache::get_availability`].
    pub async fn get_availability<E, F, Fut>(
        &self,
        package_id: &str,
        date: NaiveDate,
        min_pax: u32,
        compute: F,
    ) -> Result<AvailabilitySnapshot, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AvailabilitySnapshot, E>>,
    {
        self.availability
            .get_availability(package_id, date, min_pax, compute)
            .await
    }

    /// See [`AvailabilityCache::get_availability_summary`].
    pub async fn get_availability_summary<E, F, Fut>(
        &self,
        package_id: &str,
        range: DateRange,
        min_pax: u32,
        compute: F,
    ) -> Result<AvailabilitySummary, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AvailabilitySummary, E>>,
    {
        self.availability
            .get_availability_summary(package_id, range, min_pax, compute)
            .await
    }

    /// See [`BatchAvailabilityFetcher::resolve_many`].
    pub async fn resolve_many<E, F, Fut>(
        &self,
        requests: &[AvailabilityRequest],
        compute: F,
    ) -> Result<Vec<(AvailabilityRequest, AvailabilitySnapshot)>, E>
    where
        F: Fn(&AvailabilityRequest) -> Fut,
        Fut: Future<Output = Result<AvailabilitySnapshot, E>>,
    {
        self.batch.resolve_many(requests, compute).await
    }

    /// See [`InvalidationOrchestrator::invalidate`].
    pub async fn invalidate(&self, event: &InvalidationEvent) -> InvalidationReport {
        self.orchestrator.invalidate(event).await
    }

    pub async fn booking_mutated(&self, booking_id: &str) -> InvalidationReport {
        self.orchestrator.booking_mutated(booking_id).await
    }

    pub async fn package_mutated(
        &self,
        package_id: &str,
        availability: AvailabilityScope,
    ) -> InvalidationReport {
        self.orchestrator
            .package_mutated(package_id, availability)
            .await
    }

    pub async fn trip_mutated(&self, trip_id: &str) -> InvalidationReport {
        self.orchestrator.trip_mutated(trip_id).await
    }

    pub async fn wallet_mutated(&self, user_id: &str, kind: WalletKind) -> InvalidationReport {
        self.orchestrator.wallet_mutated(user_id, kind).await
    }

    pub async fn user_mutated(&self, user_id: &str) -> InvalidationReport {
        self.orchestrator.user_mutated(user_id).await
    }

    /// Maintenance only; never call from a request path.
    pub async fn invalidate_all(&self) -> InvalidationReport {
        self.orchestrator.invalidate_all().await
    }

    pub fn accessor(&self) -> &CacheAccessor<B> {
        &self.accessor
    }

    pub fn availability(&self) -> &AvailabilityCache<B> {
        &self.availability
    }

    pub fn batch(&self) -> &BatchAvailabilityFetcher<B> {
        &self.batch
    }

    pub fn orchestrator(&self) -> &InvalidationOrchestrator<B> {
        &self.orchestrator
    }

    pub fn client(&self) -> &StoreClient<B> {
        self.accessor.client()
    }
}

#[cfg(feature = "redis")]
impl CacheService<crate::backend::RedisBackend> {
    /// Redis-backed service; caching is disabled when no endpoint is set.
    pub fn from_settings(settings: &StoreSettings) -> Self {
        Self::new(StoreClient::from_settings(settings), settings)
    }
}
