// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Schedule limiter: the check-then-commit orchestration over a
//! [`QuotaStore`].
//!
//! [`ScheduleLimiter`] exposes five operations:
//!
//! * [`set_limit`](ScheduleLimiter::set_limit) / [`get_limit`](ScheduleLimiter::get_limit)
//! * [`get_usage`](ScheduleLimiter::get_usage)
//! * [`create_schedule`](ScheduleLimiter::create_schedule): spend tokens
//! * [`cancel_schedule`](ScheduleLimiter::cancel_schedule): release tokens
//!
//! ## Evaluation order
//!
//! Both mutating operations run the same single transition
//! `Idle -> Validating -> {Committed | Rejected}`:
//!
//! 1. Resolve the single-month shorthand and normalize every designator.
//!    An unknown month fails here, before the store is touched.
//! 2. Read the current counters (and the limit, for creation).
//! 3. Validate every bucket.  The first violation rejects the whole batch;
//!    nothing has been written at this point.
//! 4. Commit all buckets in one atomic store batch.
//!
//! The limit applies to each `(year, month)` bucket on its own.  A limit of
//! 10 admits 8 tokens in April and 8 in May.
//!
//! ## Concurrency
//!
//! Steps 2 and 4 are separate round trips.  Two concurrent calls for the same
//! identity can both pass validation against the same stale read and
//! together push a bucket past its limit.  Cancellations cannot overdraw a
//! bucket the same way: the store re-checks every counter when it commits a
//! decrement and refuses the batch with
//! [`StorageError::Underflow`](crate::error::StorageError::Underflow).  Calls
//! for different identities do not interact.

use tracing::{debug, info, warn};

use crate::error::LimiterError;
use crate::storage::QuotaStore;
use crate::types::{
    bucket_count, buckets, months_of, Identity, MonthQuery, Schedule, TokenRequest, UsageMap,
    UsageSnapshot,
};

/// Validates and commits month-bucket spends against per-identity limits.
///
/// # Examples
///
/// ```rust
/// use schedule_limiter_core::{
///     limiter::ScheduleLimiter,
///     storage::InMemoryStore,
///     types::ScheduleRequest,
///     LimiterError,
/// };
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let limiter = ScheduleLimiter::new(InMemoryStore::new());
/// limiter.set_limit(1, 10).await.unwrap();
///
/// let request = ScheduleRequest::new().with(2015, "Jan", 5).with(2015, "feb", 6);
/// let usage = limiter.create_schedule(1, request, false).await.unwrap();
/// assert_eq!(usage[&2015].values().copied().collect::<Vec<_>>(), vec![5, 6]);
///
/// let too_much = ScheduleRequest::new().with(2015, "Jan", 6);
/// let error = limiter.create_schedule(1, too_much, false).await.unwrap_err();
/// assert!(matches!(error, LimiterError::ExceedsLimit { overage: 1, .. }));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ScheduleLimiter<S: QuotaStore> {
    store: S,
}

impl<S: QuotaStore> ScheduleLimiter<S> {
    /// Create a limiter over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Borrow the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the limiter and return its store.
    pub fn into_store(self) -> S {
        self.store
    }

    // -----------------------------------------------------------------------
    // Limits
    // -----------------------------------------------------------------------

    /// Set (overwrite) the identity's per-bucket limit and return it.
    pub async fn set_limit(
        &self,
        identity: impl Into<Identity>,
        limit: u64,
    ) -> Result<u64, LimiterError> {
        let identity = identity.into();
        let stored = self.store.set_limit(&identity, limit).await?;
        debug!(%identity, limit = stored, "limit set");
        Ok(stored)
    }

    /// Read the identity's limit; `0` when never set.
    pub async fn get_limit(&self, identity: impl Into<Identity>) -> Result<u64, LimiterError> {
        let identity = identity.into();
        Ok(self.store.get_limit(&identity).await?)
    }

    /// Read the counters of `months`, plus the limit when `include_limit`.
    ///
    /// Months may be given in any designator form; the snapshot is keyed by
    /// canonical [`Month`](crate::months::Month)s.
    pub async fn get_usage(
        &self,
        identity: impl Into<Identity>,
        months: impl Into<MonthQuery>,
        include_limit: bool,
    ) -> Result<UsageSnapshot, LimiterError> {
        let identity = identity.into();
        let months = months.into().normalize()?;
        Ok(self.store.get_usage(&identity, &months, include_limit).await?)
    }

    // -----------------------------------------------------------------------
    // Schedules
    // -----------------------------------------------------------------------

    /// Spend tokens against one or more month buckets as a single batch.
    ///
    /// Every bucket must satisfy `usage + requested <= limit`; otherwise the
    /// batch is rejected with [`LimiterError::ExceedsLimit`] for the first
    /// offending bucket and no counter moves.  With `force` the check is
    /// skipped and the batch is applied unconditionally.
    ///
    /// Returns the post-increment counters of every touched bucket.
    pub async fn create_schedule(
        &self,
        identity: impl Into<Identity>,
        request: impl Into<TokenRequest>,
        force: bool,
    ) -> Result<UsageMap, LimiterError> {
        let identity = identity.into();
        let schedule = prepare(request)?;
        if schedule.is_empty() {
            return Ok(UsageMap::new());
        }
        debug!(%identity, buckets = bucket_count(&schedule), force, "create schedule");

        if force {
            warn!(%identity, "forced schedule creation, limit check skipped");
        } else {
            let snapshot = self
                .store
                .get_usage(&identity, &months_of(&schedule), true)
                .await?;
            let limit = snapshot.limit.unwrap_or(0);
            check_limit(&identity, &schedule, &snapshot, limit)?;
        }

        let usage = self.store.increase_values(&identity, &schedule).await?;
        info!(%identity, buckets = bucket_count(&schedule), force, "schedule committed");
        Ok(usage)
    }

    /// Release previously spent tokens from one or more month buckets as a
    /// single batch.
    ///
    /// Every bucket must satisfy `usage - requested >= 0`; otherwise the batch
    /// is rejected with [`LimiterError::NegativeUsage`] and no counter moves.
    /// With `force` the check is skipped, but each bucket's decrement is
    /// clamped to its current usage so no counter ever goes negative.
    ///
    /// Returns the post-decrement counters of every decremented bucket.
    pub async fn cancel_schedule(
        &self,
        identity: impl Into<Identity>,
        request: impl Into<TokenRequest>,
        force: bool,
    ) -> Result<UsageMap, LimiterError> {
        let identity = identity.into();
        let schedule = prepare(request)?;
        if schedule.is_empty() {
            return Ok(UsageMap::new());
        }
        debug!(%identity, buckets = bucket_count(&schedule), force, "cancel schedule");

        let snapshot = self
            .store
            .get_usage(&identity, &months_of(&schedule), false)
            .await?;

        let schedule = if force {
            warn!(%identity, "forced schedule cancellation, floor check skipped");
            clamp_to_usage(schedule, &snapshot)
        } else {
            check_floor(&identity, &schedule, &snapshot)?;
            schedule
        };
        if schedule.is_empty() {
            return Ok(UsageMap::new());
        }

        let usage = self.store.decrease_values(&identity, &schedule).await?;
        info!(%identity, buckets = bucket_count(&schedule), force, "cancellation committed");
        Ok(usage)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve the shorthand, normalize, and drop zero-token buckets.
fn prepare(request: impl Into<TokenRequest>) -> Result<Schedule, LimiterError> {
    let mut schedule = request.into().resolve().normalize()?;
    for months in schedule.values_mut() {
        months.retain(|_, tokens| *tokens > 0);
    }
    schedule.retain(|_, months| !months.is_empty());
    Ok(schedule)
}

fn check_limit(
    identity: &Identity,
    schedule: &Schedule,
    snapshot: &UsageSnapshot,
    limit: u64,
) -> Result<(), LimiterError> {
    for (year, month, requested) in buckets(schedule) {
        let usage = snapshot.get(year, month);
        let projected = usage.saturating_add(requested);
        if projected > limit {
            let overage = projected - limit;
            warn!(
                %identity, year, month = month.get(), requested, usage, limit, overage,
                "schedule rejected: limit exceeded"
            );
            return Err(LimiterError::ExceedsLimit {
                year,
                month,
                requested,
                usage,
                limit,
                overage,
            });
        }
    }
    Ok(())
}

fn check_floor(
    identity: &Identity,
    schedule: &Schedule,
    snapshot: &UsageSnapshot,
) -> Result<(), LimiterError> {
    for (year, month, requested) in buckets(schedule) {
        let usage = snapshot.get(year, month);
        if requested > usage {
            warn!(
                %identity, year, month = month.get(), requested, usage,
                "cancellation rejected: usage would go negative"
            );
            return Err(LimiterError::NegativeUsage {
                year,
                month,
                requested,
                usage,
            });
        }
    }
    Ok(())
}

fn clamp_to_usage(mut schedule: Schedule, snapshot: &UsageSnapshot) -> Schedule {
    for (year, months) in schedule.iter_mut() {
        for (month, tokens) in months.iter_mut() {
            *tokens = (*tokens).min(snapshot.get(*year, *month));
        }
        months.retain(|_, tokens| *tokens > 0);
    }
    schedule.retain(|_, months| !months.is_empty());
    schedule
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::months::Month;
    use crate::types::ScheduleRequest;

    fn month(value: u8) -> Month {
        Month::new(value).unwrap()
    }

    fn snapshot(entries: &[(i32, u8, u64)]) -> UsageSnapshot {
        let mut snapshot = UsageSnapshot::default();
        for (year, m, value) in entries {
            snapshot.usage.entry(*year).or_default().insert(month(*m), *value);
        }
        snapshot
    }

    #[test]
    fn test_prepare_drops_zero_buckets() {
        let request = ScheduleRequest::new().with(2015, "Jan", 0).with(2016, "Feb", 2);
        let schedule = prepare(request).unwrap();
        assert!(!schedule.contains_key(&2015));
        assert_eq!(schedule[&2016][&month(2)], 2);
    }

    #[test]
    fn test_check_limit_reports_first_offender() {
        let identity = Identity::from(1u64);
        let schedule = ScheduleRequest::new()
            .with(2015, 1, 4)
            .with(2015, 2, 9)
            .normalize()
            .unwrap();
        let error = check_limit(&identity, &schedule, &snapshot(&[(2015, 2, 3)]), 10).unwrap_err();
        match error {
            LimiterError::ExceedsLimit { year, month: m, requested, usage, limit, overage } => {
                assert_eq!((year, m, requested, usage, limit, overage), (2015, month(2), 9, 3, 10, 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_check_floor_boundary() {
        let identity = Identity::from(1u64);
        let exact = ScheduleRequest::new().with(2015, 1, 5).normalize().unwrap();
        assert!(check_floor(&identity, &exact, &snapshot(&[(2015, 1, 5)])).is_ok());

        let over = ScheduleRequest::new().with(2015, 1, 6).normalize().unwrap();
        assert!(matches!(
            check_floor(&identity, &over, &snapshot(&[(2015, 1, 5)])),
            Err(LimiterError::NegativeUsage { requested: 6, usage: 5, .. })
        ));
    }

    #[test]
    fn test_clamp_to_usage() {
        let schedule = ScheduleRequest::new()
            .with(2015, 1, 10)
            .with(2015, 2, 3)
            .with(2016, 1, 4)
            .normalize()
            .unwrap();
        let clamped = clamp_to_usage(schedule, &snapshot(&[(2015, 1, 7), (2015, 2, 5)]));
        assert_eq!(clamped[&2015][&month(1)], 7);
        assert_eq!(clamped[&2015][&month(2)], 3);
        assert!(!clamped.contains_key(&2016));
    }
}
