//! # availability-cache
//!
//! Cache-aside availability views over an external key-value store, with
//! mutation-driven invalidation.
//!
//! ## Features
//!
//! - **Cache-aside reads:** [`CacheAccessor::get_or_compute`] returns the stored
//!   value or computes, stores and returns it. Store failures never surface.
//! - **Availability views:** per-date snapshots and date-window summaries with
//!   one shared TTL ([`AvailabilityCache`]).
//! - **Bounded batches:** many lookups resolved in fixed-size concurrent chunks
//!   ([`BatchAvailabilityFetcher`]).
//! - **Targeted invalidation:** domain mutations mapped to key patterns and
//!   evicted without early abort ([`InvalidationOrchestrator`]).
//! - **Backends:** in-memory (default) and Redis (`redis` feature). Without an
//!   endpoint the cache is disabled and behaves like an empty store.
//!
//! ## Quick Start
//!
//! ```ignore
//! use availability_cache::{
//!     CacheService, StoreClient, StoreSettings,
//!     invalidation::AvailabilityScope,
//!     availability::DateRange,
//! };
//!
//! let settings = StoreSettings::from_env();
//! let cache = CacheService::new(StoreClient::from_settings(&settings), &settings);
//!
//! // Read path
//! let snapshot = cache
//!     .get_availability("pkg-1", date, 4, || repo.availability("pkg-1", date, 4))
//!     .await?;
//!
//! // After committing a schedule change for three days
//! cache
//!     .package_mutated("pkg-1", AvailabilityScope::Range(DateRange::new(from, to)))
//!     .await;
//! ```

#[macro_use]
extern crate log;

pub mod accessor;
pub mod availability;
pub mod backend;
pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod observability;
pub mod serialization;
pub mod service;

// Re-exports for convenience
pub use accessor::CacheAccessor;
pub use availability::{AvailabilityCache, AvailabilitySnapshot, AvailabilitySummary, DateRange};
pub use backend::CacheBackend;
pub use batch::{AvailabilityRequest, BatchAvailabilityFetcher};
pub use client::StoreClient;
pub use config::StoreSettings;
pub use error::{Error, Result};
pub use invalidation::{InvalidationEvent, InvalidationOrchestrator, InvalidationReport};
pub use key::{CacheKey, KeyPattern};
pub use service::CacheService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
