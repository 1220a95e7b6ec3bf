//! Cached availability projections for tour packages.
//!
//! Two views share one TTL: availability of a package on a single date for a
//! party size, and a summary of that over a date window. The payloads are
//! plain values; they are recomputed on a miss and never patched.

use crate::accessor::CacheAccessor;
use crate::backend::CacheBackend;
use crate::config::DEFAULT_AVAILABILITY_TTL;
use crate::key::CacheKey;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Inclusive range of calendar days.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Callers are responsible for `start <= end`; an inverted range simply
    /// contains no days.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn single(day: NaiveDate) -> Self {
        DateRange { start: day, end: day }
    }

    /// Every day from `start` to `end`, both included.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Number of days in the range; zero when inverted.
    pub fn len_days(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start).num_days() as u64 + 1
        }
    }

    /// The range shifted forward by `days`.
    pub fn shifted(&self, days: u64) -> Option<Self> {
        Some(DateRange {
            start: self.start.checked_add_days(Days::new(days))?,
            end: self.end.checked_add_days(Days::new(days))?,
        })
    }
}

/// One scheduled departure of a package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartureSlot {
    pub trip_id: String,
    pub capacity: u32,
    pub booked: u32,
}

impl DepartureSlot {
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.booked)
    }
}

/// Availability of one package on one date for a minimum party size.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySnapshot {
    pub package_id: String,
    pub date: NaiveDate,
    pub min_pax: u32,
    pub departures: Vec<DepartureSlot>,
}

impl AvailabilitySnapshot {
    pub fn capacity(&self) -> u32 {
        self.departures.iter().map(|d| d.capacity).sum()
    }

    pub fn remaining(&self) -> u32 {
        self.departures.iter().map(DepartureSlot::remaining).sum()
    }

    /// Whether any single departure can seat the whole party.
    pub fn is_available(&self) -> bool {
        self.departures.iter().any(|d| d.remaining() >= self.min_pax)
    }
}

/// Per-day line of an [`AvailabilitySummary`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub capacity: u32,
    pub remaining: u32,
    pub available: bool,
}

impl From<&AvailabilitySnapshot> for DayAvailability {
    fn from(snapshot: &AvailabilitySnapshot) -> Self {
        DayAvailability {
            date: snapshot.date,
            capacity: snapshot.capacity(),
            remaining: snapshot.remaining(),
            available: snapshot.is_available(),
        }
    }
}

/// Availability of one package across a date window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySummary {
    pub package_id: String,
    pub range: DateRange,
    pub min_pax: u32,
    pub days: Vec<DayAvailability>,
}

impl AvailabilitySummary {
    /// Fold per-date snapshots into a summary, ordered by date.
    pub fn from_snapshots<I>(package_id: &str, range: DateRange, min_pax: u32, snapshots: I) -> Self
    where
        I: IntoIterator<Item = AvailabilitySnapshot>,
    {
        let mut days: Vec<DayAvailability> = snapshots
            .into_iter()
            .filter(|s| range.contains(s.date))
            .map(|s| DayAvailability::from(&s))
            .collect();
        days.sort_by_key(|d| d.date);

        AvailabilitySummary {
            package_id: package_id.to_string(),
            range,
            min_pax,
            days,
        }
    }

    pub fn available_days(&self) -> usize {
        self.days.iter().filter(|d| d.available).count()
    }

    pub fn total_remaining(&self) -> u32 {
        self.days.iter().map(|d| d.remaining).sum()
    }

    pub fn first_available(&self) -> Option<NaiveDate> {
        self.days.iter().find(|d| d.available).map(|d| d.date)
    }
}

/// Availability read path.
///
/// Within the TTL a repeated lookup returns the stored projection without
/// calling `compute`. There is no freshness guarantee inside that window: a
/// caller that has just changed bookings must invalidate through
/// [`InvalidationOrchestrator`](crate::invalidation::InvalidationOrchestrator)
/// before reading.
pub struct AvailabilityCache<B: CacheBackend> {
    accessor: Arc<CacheAccessor<B>>,
    ttl: Duration,
}

impl<B: CacheBackend> Clone for AvailabilityCache<B> {
    fn clone(&self) -> Self {
        AvailabilityCache {
            accessor: Arc::clone(&self.accessor),
            ttl: self.ttl,
        }
    }
}

impl<B: CacheBackend> AvailabilityCache<B> {
    pub fn new(accessor: Arc<CacheAccessor<B>>) -> Self {
        AvailabilityCache {
            accessor,
            ttl: DEFAULT_AVAILABILITY_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Availability of `package_id` on `date` for at least `min_pax` people.
    ///
    /// # Errors
    ///
    /// Only errors produced by `compute`.
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
        let key = CacheKey::availability(package_id, date, min_pax);
        self.accessor.get_or_compute(&key, self.ttl, compute).await
    }

    /// Summary of `package_id` over `range` for at least `min_pax` people.
    ///
    /// # Errors
    ///
    /// Only errors produced by `compute`.
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
        let key = CacheKey::availability_summary(package_id, range.start, range.end, min_pax);
        self.accessor.get_or_compute(&key, self.ttl, compute).await
    }
}
