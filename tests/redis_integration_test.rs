//! Redis Backend Integration Tests
//!
//! These tests require a running Redis instance and skip themselves when none
//! is reachable.
//!
//! ## Quick Start
//!
//! ```bash
//! docker run --rm -p 6379:6379 redis:7
//! cargo test --features redis --test redis_integration_test
//! ```
//!
//! ## Environment Variables
//!
//! - `TEST_REDIS_URL`: Redis connection URL (default: "redis://localhost:6379")
//!
//! ## What's Tested
//!
//! 1. Connection and health check
//! 2. Set/get with PSETEX expiry
//! 3. SCAN-based enumeration and pattern eviction
//! 4. Cache-aside reads and invalidation through the service
//! 5. Pool behaviour under concurrent load

#![cfg(feature = "redis")]

use availability_cache::availability::DepartureSlot;
use availability_cache::backend::{CacheBackend, RedisBackend, RedisConfig};
use availability_cache::invalidation::AvailabilityScope;
use availability_cache::{
    AvailabilitySnapshot, CacheKey, CacheService, DateRange, KeyPattern, StoreClient, StoreSettings,
};
use chrono::NaiveDate;
use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Helper: Get Redis connection URL from environment or use default
fn get_redis_url() -> String {
    env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
}

/// Helper: Create a test Redis backend
fn create_test_backend() -> RedisBackend {
    let redis_url = get_redis_url();
    println!("Connecting to Redis: {}", redis_url);
    RedisBackend::from_connection_string(&redis_url).expect("Failed to create Redis backend")
}

/// Helper: Check if Redis is available
async fn is_redis_available() -> bool {
    create_test_backend().health_check().await.unwrap_or(false)
}

/// Helper: a namespace unique to one test, so tests can run in parallel.
fn scope(test: &str) -> String {
    format!("itest-{}-{}", test, std::process::id())
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, d).expect("valid date")
}

fn snapshot(package_id: &str, date: NaiveDate) -> AvailabilitySnapshot {
    AvailabilitySnapshot {
        package_id: package_id.to_string(),
        date,
        min_pax: 2,
        departures: vec![DepartureSlot {
            trip_id: "trip-1".to_string(),
            capacity: 8,
            booked: 3,
        }],
    }
}

// =============================================================================
// Test 1: Connection
// =============================================================================

#[tokio::test]
async fn test_redis_connection() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let backend = create_test_backend();
    let is_healthy = backend
        .health_check()
        .await
        .expect("Health check should not error");

    assert!(is_healthy, "Redis health check should return true");
    println!("✓ Redis connection successful");
}

#[tokio::test]
async fn test_client_from_settings() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let settings = StoreSettings::default().with_url(get_redis_url());
    let client = StoreClient::from_settings(&settings);

    assert!(client.is_enabled());
    assert!(client.health_check().await.expect("Health check failed"));
}

#[tokio::test]
async fn test_unreachable_endpoint_degrades() {
    // No server needed: nothing listens on port 1.
    let settings = StoreSettings::default()
        .with_url("redis://127.0.0.1:1")
        .with_op_timeout(Duration::from_millis(200));
    let cache = CacheService::from_settings(&settings);
    let date = day(1);

    let value = cache
        .get_availability("pkg-1", date, 2, || async {
            Ok::<_, Infallible>(snapshot("pkg-1", date))
        })
        .await
        .expect("read-through");

    assert_eq!(value, snapshot("pkg-1", date));
    assert!(!cache.booking_mutated("bk-1").await.is_clean());
}

// =============================================================================
// Test 2: Set/Get and TTL
// =============================================================================

#[tokio::test]
async fn test_redis_set_get_and_expiry() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let backend = create_test_backend();
    let key = format!("{}:key", scope("ttl"));

    backend
        .set(&key, b"value".to_vec(), Duration::from_millis(300))
        .await
        .expect("Failed to set");
    assert_eq!(
        backend.get(&key).await.expect("Failed to get"),
        Some(b"value".to_vec())
    );

    tokio::time::sleep(Duration::from_millis(450)).await;
    assert_eq!(backend.get(&key).await.expect("Failed to get"), None);
}

// =============================================================================
// Test 3: Enumeration and pattern eviction
// =============================================================================

#[tokio::test]
async fn test_redis_delete_by_pattern() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let backend = create_test_backend();
    let client = StoreClient::new(backend.clone());
    let ns = scope("pattern");
    let keep = CacheKey::availability(&format!("{}-pkg-8", ns), day(1), 2);
    let gone: Vec<CacheKey> = (1..=3)
        .map(|d| CacheKey::availability(&format!("{}-pkg-9", ns), day(d), 2))
        .collect();

    for key in gone.iter().chain(std::iter::once(&keep)) {
        client
            .set_with_ttl(key, vec![1], Duration::from_secs(60))
            .await
            .expect("Failed to set");
    }

    let pattern = KeyPattern::package_availability(&format!("{}-pkg-9", ns));
    let mut found = client.enumerate(&pattern).await.expect("Failed to scan");
    found.sort();
    let mut expected: Vec<String> = gone.iter().map(|k| k.as_str().to_string()).collect();
    expected.sort();
    assert_eq!(found, expected);

    let deleted = client
        .delete_by_pattern(&pattern)
        .await
        .expect("Failed to delete by pattern");
    assert_eq!(deleted, 3);
    assert!(client.get(&keep).await.expect("Failed to get").is_some());

    client.delete(&keep).await.expect("cleanup");
}

// =============================================================================
// Test 4: Service end to end
// =============================================================================

#[tokio::test]
async fn test_redis_read_and_range_invalidation() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let settings = StoreSettings::default().with_url(get_redis_url());
    let cache = CacheService::from_settings(&settings);
    let package = scope("service");
    let counter = AtomicUsize::new(0);
    let calls = &counter;

    for d in 9..=13 {
        let date = day(d);
        let package = package.as_str();
        for _ in 0..2 {
            cache
                .get_availability(package, date, 2, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(snapshot(package, date))
                })
                .await
                .expect("read");
        }
    }
    assert_eq!(counter.load(Ordering::SeqCst), 5);

    let report = cache
        .package_mutated(
            &package,
            AvailabilityScope::Range(DateRange::new(day(10), day(12))),
        )
        .await;
    assert!(report.is_clean());
    assert_eq!(report.evicted, 3);

    let client = cache.client();
    assert!(client
        .get(&CacheKey::availability(&package, day(9), 2))
        .await
        .expect("get")
        .is_some());
    assert!(client
        .get(&CacheKey::availability(&package, day(11), 2))
        .await
        .expect("get")
        .is_none());

    cache
        .package_mutated(&package, AvailabilityScope::All)
        .await;
}

// =============================================================================
// Test 5: Concurrency
// =============================================================================

#[tokio::test]
async fn test_redis_concurrent_operations() {
    if !is_redis_available().await {
        println!("⚠️  Redis not available, skipping test");
        return;
    }

    let mut config = RedisConfig::new(get_redis_url());
    config.pool_size = 4;
    let backend = RedisBackend::new(config).expect("Failed to create Redis backend");
    let ns = scope("concurrent");

    let mut handles = vec![];
    for i in 0..20 {
        let backend = backend.clone();
        let key = format!("{}:{}", ns, i);
        handles.push(tokio::spawn(async move {
            backend
                .set(&key, vec![i as u8], Duration::from_secs(30))
                .await
                .expect("Failed to set");
            backend.get(&key).await.expect("Failed to get")
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let value = handle.await.expect("Task failed");
        assert_eq!(value, Some(vec![i as u8]));
    }

    let stats = backend.pool_stats();
    assert!(stats.connections <= 4);

    StoreClient::new(backend)
        .delete_by_pattern(&KeyPattern::raw(format!("{}:*", ns)))
        .await
        .expect("cleanup");
}
