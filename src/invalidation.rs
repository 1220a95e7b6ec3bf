//! Translation of domain mutations into targeted cache evictions.
//!
//! Domain services describe what changed with an [`InvalidationEvent`]; the
//! [`InvalidationOrchestrator`] derives the key patterns and evicts them. Key
//! layout stays in this crate.

use crate::availability::DateRange;
use crate::backend::CacheBackend;
use crate::client::StoreClient;
use crate::key::KeyPattern;
use crate::observability::{CacheMetrics, NoOpMetrics};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Listing caches of bookings, keyed by audience.
const BOOKING_LISTINGS: [&str; 3] = ["user", "partner", "admin"];

/// Listing caches of trips, keyed by audience.
const TRIP_LISTINGS: [&str; 2] = ["guide", "admin"];

/// Owner of a wallet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WalletKind {
    Partner,
    Guide,
}

impl fmt::Display for WalletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletKind::Partner => write!(f, "partner"),
            WalletKind::Guide => write!(f, "guide"),
        }
    }
}

/// Which availability entries a package mutation touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AvailabilityScope {
    /// Availability is unaffected.
    #[default]
    Unchanged,
    /// Every per-date and summary entry of the package.
    All,
    /// Per-date entries inside the range, plus every summary of the package.
    Range(DateRange),
}

/// What changed in the system of record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutation {
    Booking {
        booking_id: String,
    },
    Package {
        package_id: String,
        availability: AvailabilityScope,
    },
    Trip {
        trip_id: String,
    },
    Wallet {
        user_id: String,
        kind: WalletKind,
    },
    User {
        user_id: String,
    },
}

impl Mutation {
    pub fn domain(&self) -> &'static str {
        match self {
            Mutation::Booking { .. } => "booking",
            Mutation::Package { .. } => "package",
            Mutation::Trip { .. } => "trip",
            Mutation::Wallet { .. } => "wallet",
            Mutation::User { .. } => "user",
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Mutation::Booking { booking_id } => booking_id,
            Mutation::Package { package_id, .. } => package_id,
            Mutation::Trip { trip_id } => trip_id,
            Mutation::Wallet { user_id, .. } | Mutation::User { user_id } => user_id,
        }
    }
}

/// A committed mutation, raised once by the domain service that made it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvalidationEvent {
    pub mutation: Mutation,
    pub occurred_at: DateTime<Utc>,
}

impl InvalidationEvent {
    pub fn new(mutation: Mutation) -> Self {
        InvalidationEvent {
            mutation,
            occurred_at: Utc::now(),
        }
    }

    pub fn booking(booking_id: impl Into<String>) -> Self {
        Self::new(Mutation::Booking {
            booking_id: booking_id.into(),
        })
    }

    pub fn package(package_id: impl Into<String>, availability: AvailabilityScope) -> Self {
        Self::new(Mutation::Package {
            package_id: package_id.into(),
            availability,
        })
    }

    pub fn trip(trip_id: impl Into<String>) -> Self {
        Self::new(Mutation::Trip {
            trip_id: trip_id.into(),
        })
    }

    pub fn wallet(user_id: impl Into<String>, kind: WalletKind) -> Self {
        Self::new(Mutation::Wallet {
            user_id: user_id.into(),
            kind,
        })
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(Mutation::User {
            user_id: user_id.into(),
        })
    }

    /// Patterns to evict, in eviction order.
    pub fn patterns(&self) -> Vec<KeyPattern> {
        match &self.mutation {
            Mutation::Booking { booking_id } => {
                let mut patterns = vec![KeyPattern::booking(booking_id)];
                patterns.extend(BOOKING_LISTINGS.into_iter().map(KeyPattern::booking_listings));
                patterns
            }
            Mutation::Package {
                package_id,
                availability,
            } => {
                let mut patterns = vec![
                    KeyPattern::package(package_id),
                    KeyPattern::package_listings(),
                ];
                match availability {
                    AvailabilityScope::Unchanged => {}
                    AvailabilityScope::All => {
                        patterns.push(KeyPattern::package_availability(package_id));
                        patterns.push(KeyPattern::package_availability_summaries(package_id));
                    }
                    AvailabilityScope::Range(range) => {
                        patterns.extend(
                            range
                                .days()
                                .map(|day| KeyPattern::package_availability_on(package_id, day)),
                        );
                        // Summaries may span any part of the range.
                        patterns.push(KeyPattern::package_availability_summaries(package_id));
                    }
                }
                patterns
            }
            Mutation::Trip { trip_id } => {
                let mut patterns = vec![KeyPattern::trip(trip_id)];
                patterns.extend(TRIP_LISTINGS.into_iter().map(KeyPattern::trip_listings));
                patterns
            }
            Mutation::Wallet { user_id, kind } => vec![
                KeyPattern::wallet(kind, user_id),
                KeyPattern::wallet_transactions(kind, user_id),
            ],
            Mutation::User { user_id } => {
                vec![KeyPattern::user(user_id), KeyPattern::notifications(user_id)]
            }
        }
    }
}

/// Outcome of one invalidation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Every pattern attempted, in order.
    pub patterns: Vec<KeyPattern>,
    /// Keys removed across all patterns.
    pub evicted: u64,
    /// Patterns whose eviction failed, with the store error.
    pub failed: Vec<(KeyPattern, String)>,
}

impl InvalidationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Evicts the cache entries made stale by a mutation.
///
/// Invalidation never fails from the caller's point of view: each pattern is
/// attempted even if an earlier one failed, and failures are logged and
/// reported, not returned. Repeating an event is harmless.
pub struct InvalidationOrchestrator<B: CacheBackend> {
    client: StoreClient<B>,
    metrics: Arc<dyn CacheMetrics>,
}

impl<B: CacheBackend> InvalidationOrchestrator<B> {
    pub fn new(client: StoreClient<B>) -> Self {
        InvalidationOrchestrator {
            client,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn invalidate(&self, event: &InvalidationEvent) -> InvalidationReport {
        debug!(
            "Invalidating {} {} (mutated at {})",
            event.mutation.domain(),
            event.mutation.entity_id(),
            event.occurred_at
        );

        let report = self.evict_all(event.patterns()).await;

        if report.is_clean() {
            info!(
                "✓ Invalidated {} {}: {} keys",
                event.mutation.domain(),
                event.mutation.entity_id(),
                report.evicted
            );
        } else {
            warn!(
                "Partial invalidation of {} {}: {} of {} patterns failed",
                event.mutation.domain(),
                event.mutation.entity_id(),
                report.failed.len(),
                report.patterns.len()
            );
        }
        report
    }

    pub async fn booking_mutated(&self, booking_id: &str) -> InvalidationReport {
        self.invalidate(&InvalidationEvent::booking(booking_id)).await
    }

    pub async fn package_mutated(
        &self,
        package_id: &str,
        availability: AvailabilityScope,
    ) -> InvalidationReport {
        self.invalidate(&InvalidationEvent::package(package_id, availability))
            .await
    }

    pub async fn trip_mutated(&self, trip_id: &str) -> InvalidationReport {
        self.invalidate(&InvalidationEvent::trip(trip_id)).await
    }

    pub async fn wallet_mutated(&self, user_id: &str, kind: WalletKind) -> InvalidationReport {
        self.invalidate(&InvalidationEvent::wallet(user_id, kind))
            .await
    }

    pub async fn user_mutated(&self, user_id: &str) -> InvalidationReport {
        self.invalidate(&InvalidationEvent::user(user_id)).await
    }

    /// Evict every key in the store. Maintenance use only.
    pub async fn invalidate_all(&self) -> InvalidationReport {
        warn!("Evicting the entire cache");
        self.evict_all(vec![KeyPattern::all()]).await
    }

    async fn evict_all(&self, patterns: Vec<KeyPattern>) -> InvalidationReport {
        let mut report = InvalidationReport::default();

        for pattern in &patterns {
            match self.client.delete_by_pattern(pattern).await {
                Ok(evicted) => {
                    self.metrics.record_eviction(pattern.as_str(), evicted);
                    report.evicted += evicted;
                }
                Err(e) => {
                    self.metrics.record_error(pattern.as_str(), &e.to_string());
                    report.failed.push((pattern.clone(), e.to_string()));
                }
            }
        }

        report.patterns = patterns;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).expect("valid date")
    }

    fn strings(patterns: Vec<KeyPattern>) -> Vec<String> {
        patterns.iter().map(|p| p.as_str().to_string()).collect()
    }

    #[test]
    fn test_booking_patterns() {
        assert_eq!(
            strings(InvalidationEvent::booking("bk-42").patterns()),
            vec![
                "booking:bk-42:*",
                "bookings:user:*",
                "bookings:partner:*",
                "bookings:admin:*",
            ]
        );
    }

    #[test]
    fn test_package_patterns_by_scope() {
        assert_eq!(
            strings(InvalidationEvent::package("p1", AvailabilityScope::Unchanged).patterns()),
            vec!["package:p1:*", "packages:list:*"]
        );
        assert_eq!(
            strings(InvalidationEvent::package("p1", AvailabilityScope::All).patterns()),
            vec![
                "package:p1:*",
                "packages:list:*",
                "availability:package:p1:*",
                "availability:summary:package:p1:*",
            ]
        );

        let range = DateRange::new(day(10), day(12));
        assert_eq!(
            strings(InvalidationEvent::package("p1", AvailabilityScope::Range(range)).patterns()),
            vec![
                "package:p1:*",
                "packages:list:*",
                "availability:package:p1:date:2025-01-10:*",
                "availability:package:p1:date:2025-01-11:*",
                "availability:package:p1:date:2025-01-12:*",
                "availability:summary:package:p1:*",
            ]
        );
    }

    #[test]
    fn test_trip_wallet_user_patterns() {
        assert_eq!(
            strings(InvalidationEvent::trip("t7").patterns()),
            vec!["trip:t7:*", "trips:guide:*", "trips:admin:*"]
        );
        assert_eq!(
            strings(InvalidationEvent::wallet("u1", WalletKind::Guide).patterns()),
            vec!["guide:wallet:u1:*", "guide:wallet:transactions:u1:*"]
        );
        assert_eq!(
            strings(InvalidationEvent::user("u1").patterns()),
            vec!["user:u1:*", "notifications:u1:*"]
        );
    }

    #[test]
    fn test_mutation_identity() {
        let event = InvalidationEvent::wallet("u9", WalletKind::Partner);
        assert_eq!(event.mutation.domain(), "wallet");
        assert_eq!(event.mutation.entity_id(), "u9");
        assert!(event.occurred_at <= Utc::now());
    }

    #[cfg(feature = "inmemory")]
    mod store {
        use super::*;
        use crate::backend::InMemoryBackend;
        use crate::key::CacheKey;
        use std::time::Duration;

        const TTL: Duration = Duration::from_secs(60);

        async fn seed(backend: &InMemoryBackend, keys: &[&str]) {
            for key in keys {
                backend
                    .set(key, vec![1], TTL)
                    .await
                    .expect("Failed to seed key");
            }
        }

        #[tokio::test]
        async fn test_range_invalidation_coverage() {
            let backend = InMemoryBackend::new();
            let orchestrator = InvalidationOrchestrator::new(StoreClient::new(backend.clone()));

            let per_day: Vec<CacheKey> = (9..=13)
                .map(|d| CacheKey::availability("P", day(d), 2))
                .collect();
            for key in &per_day {
                backend.set(key.as_str(), vec![1], TTL).await.expect("set");
            }
            let summary = CacheKey::availability_summary("P", day(1), day(31), 2);
            let other = CacheKey::availability("Q", day(11), 2);
            seed(&backend, &[summary.as_str(), other.as_str()]).await;

            let report = orchestrator
                .package_mutated("P", AvailabilityScope::Range(DateRange::new(day(10), day(12))))
                .await;

            assert!(report.is_clean());
            assert_eq!(report.evicted, 4);
            assert!(backend.contains(per_day[0].as_str()));
            assert!(!backend.contains(per_day[1].as_str()));
            assert!(!backend.contains(per_day[2].as_str()));
            assert!(!backend.contains(per_day[3].as_str()));
            assert!(backend.contains(per_day[4].as_str()));
            assert!(!backend.contains(summary.as_str()));
            assert!(backend.contains(other.as_str()));
        }

        #[tokio::test]
        async fn test_booking_mutation_clears_listings() {
            let backend = InMemoryBackend::new();
            let orchestrator = InvalidationOrchestrator::new(StoreClient::new(backend.clone()));
            seed(
                &backend,
                &[
                    "booking:bk-42:detail",
                    "booking:bk-43:detail",
                    "bookings:user:u1:page:1",
                    "bookings:partner:p1:page:1",
                    "bookings:admin:page:3",
                ],
            )
            .await;

            let report = orchestrator.booking_mutated("bk-42").await;

            assert_eq!(report.evicted, 4);
            assert!(orchestrator
                .client
                .enumerate(&KeyPattern::raw("bookings:user:*"))
                .await
                .expect("enumerate")
                .is_empty());
            assert!(backend.contains("booking:bk-43:detail"));
        }

        #[tokio::test]
        async fn test_repeated_event_is_idempotent() {
            let backend = InMemoryBackend::new();
            let orchestrator = InvalidationOrchestrator::new(StoreClient::new(backend.clone()));
            seed(&backend, &["user:u1:profile", "notifications:u1:unread", "user:u2:profile"]).await;

            let event = InvalidationEvent::user("u1");
            let first = orchestrator.invalidate(&event).await;
            let second = orchestrator.invalidate(&event).await;

            assert_eq!(first.evicted, 2);
            assert_eq!(second.evicted, 0);
            assert!(second.is_clean());
            assert_eq!(first.patterns, second.patterns);
            assert_eq!(backend.len(), 1);
        }

        #[tokio::test]
        async fn test_invalidate_all() {
            let backend = InMemoryBackend::new();
            let orchestrator = InvalidationOrchestrator::new(StoreClient::new(backend.clone()));
            seed(&backend, &["a:1", "b:2", "partner:wallet:u1:balance"]).await;

            let report = orchestrator.invalidate_all().await;

            assert_eq!(report.evicted, 3);
            assert!(backend.is_empty());
        }

        #[tokio::test]
        async fn test_disabled_store_reports_nothing_evicted() {
            let orchestrator: InvalidationOrchestrator<InMemoryBackend> =
                InvalidationOrchestrator::new(StoreClient::disabled());
            let report = orchestrator.trip_mutated("t1").await;
            assert!(report.is_clean());
            assert_eq!(report.evicted, 0);
            assert_eq!(report.patterns.len(), 3);
        }
    }
}
