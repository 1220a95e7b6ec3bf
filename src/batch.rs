//! Bounded-concurrency resolution of many availability lookups.

use crate::availability::{AvailabilityCache, AvailabilitySnapshot};
use crate::backend::CacheBackend;
use crate::config::DEFAULT_BATCH_SIZE;
use chrono::NaiveDate;
use futures::future::join_all;
use std::future::Future;

/// One (package, date, party size) lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AvailabilityRequest {
    pub package_id: String,
    pub date: NaiveDate,
    pub min_pax: u32,
}

impl AvailabilityRequest {
    pub fn new(package_id: impl Into<String>, date: NaiveDate, min_pax: u32) -> Self {
        AvailabilityRequest {
            package_id: package_id.into(),
            date,
            min_pax,
        }
    }
}

/// Resolves lookups through the availability cache in fixed-size chunks.
///
/// Lookups within a chunk run concurrently; chunks run one after another, so
/// at most `batch_size` computations hit the data store at once.
pub struct BatchAvailabilityFetcher<B: CacheBackend> {
    view: AvailabilityCache<B>,
    batch_size: usize,
}

impl<B: CacheBackend> Clone for BatchAvailabilityFetcher<B> {
    fn clone(&self) -> Self {
        BatchAvailabilityFetcher {
            view: self.view.clone(),
            batch_size: self.batch_size,
        }
    }
}

impl<B: CacheBackend> BatchAvailabilityFetcher<B> {
    pub fn new(view: AvailabilityCache<B>) -> Self {
        BatchAvailabilityFetcher {
            view,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Chunk size; zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Resolve every request, in input order.
    ///
    /// A chunk always runs to completion before its results are inspected,
    /// so successful lookups in a failing chunk still populate the cache.
    ///
    /// # Errors
    ///
    /// The first `compute` error, in input order. Later chunks are not
    /// started.
    pub async fn resolve_many<E, F, Fut>(
        &self,
        requests: &[AvailabilityRequest],
        compute: F,
    ) -> Result<Vec<(AvailabilityRequest, AvailabilitySnapshot)>, E>
    where
        F: Fn(&AvailabilityRequest) -> Fut,
        Fut: Future<Output = Result<AvailabilitySnapshot, E>>,
    {
        let compute = &compute;
        let mut resolved = Vec::with_capacity(requests.len());

        for (index, chunk) in requests.chunks(self.batch_size).enumerate() {
            debug!(
                "Resolving availability chunk {} ({} lookups)",
                index,
                chunk.len()
            );

            let lookups = chunk.iter().map(|request| {
                self.view.get_availability(
                    &request.package_id,
                    request.date,
                    request.min_pax,
                    move || compute(request),
                )
            });

            let snapshots = join_all(lookups)
                .await
                .into_iter()
                .collect::<Result<Vec<_>, E>>()?;

            resolved.extend(chunk.iter().cloned().zip(snapshots));
        }

        Ok(resolved)
    }
}
