// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Storage abstraction for the schedule limiter.
//!
//! The [`QuotaStore`] trait is the single interface between the limiter and
//! any persistence layer.  This crate ships [`InMemoryStore`] for
//! development and testing.  The Redis implementation lives in
//! `schedule-limiter-redis` so that this core crate stays free of network
//! dependencies.
//!
//! # Batch contract
//!
//! [`increase_values`](QuotaStore::increase_values) and
//! [`decrease_values`](QuotaStore::decrease_values) MUST apply every bucket
//! of the batch in one backend transaction: either all counters move or
//! none do.  The limiter relies on this to guarantee that a batch is never
//! partially applied.
//!
//! [`decrease_values`](QuotaStore::decrease_values) MUST also refuse the
//! whole batch with [`StorageError::Underflow`] when any counter would end
//! below zero, checked inside the same transaction.  The limiter's own floor
//! check runs against an earlier read, so this is the only guard against two
//! concurrent cancellations overdrawing a bucket.
//!
//! # Implementing `QuotaStore`
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use schedule_limiter_core::error::StorageError;
//! use schedule_limiter_core::storage::QuotaStore;
//! use schedule_limiter_core::types::{Identity, MonthSet, Schedule, UsageMap, UsageSnapshot};
//!
//! struct MyStore;
//!
//! #[async_trait]
//! impl QuotaStore for MyStore {
//!     async fn set_limit(&self, _identity: &Identity, limit: u64) -> Result<u64, StorageError> {
//!         Ok(limit)
//!     }
//!     async fn get_limit(&self, _identity: &Identity) -> Result<u64, StorageError> {
//!         Ok(0)
//!     }
//!     async fn get_usage(
//!         &self,
//!         _identity: &Identity,
//!         _months: &MonthSet,
//!         _include_limit: bool,
//!     ) -> Result<UsageSnapshot, StorageError> {
//!         Ok(UsageSnapshot::default())
//!     }
//!     async fn increase_values(&self, _identity: &Identity, _deltas: &Schedule) -> Result<UsageMap, StorageError> {
//!         Ok(UsageMap::new())
//!     }
//!     async fn decrease_values(&self, _identity: &Identity, _deltas: &Schedule) -> Result<UsageMap, StorageError> {
//!         Ok(UsageMap::new())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::keys::{KeyEncoder, StorageKey};
use crate::months::Month;
use crate::types::{buckets, Identity, MonthSet, Schedule, UsageMap, UsageSnapshot};

// ---------------------------------------------------------------------------
// QuotaStore trait
// ---------------------------------------------------------------------------

/// Pluggable persistence interface for limits and month-bucket counters.
///
/// All methods take `&self`: implementations own whatever interior
/// synchronization or connection sharing they need, so a single store can be
/// shared by every caller in the process.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    // ------------------------------------------------------------------
    // Limit
    // ------------------------------------------------------------------

    /// Overwrite the identity's limit and return the stored value.
    async fn set_limit(&self, identity: &Identity, limit: u64) -> Result<u64, StorageError>;

    /// Read the identity's limit; `0` when never set.
    async fn get_limit(&self, identity: &Identity) -> Result<u64, StorageError>;

    // ------------------------------------------------------------------
    // Usage
    // ------------------------------------------------------------------

    /// Read the counters for every bucket in `months`, and the limit when
    /// `include_limit` is `true`.  Missing buckets read as `0`.
    async fn get_usage(
        &self,
        identity: &Identity,
        months: &MonthSet,
        include_limit: bool,
    ) -> Result<UsageSnapshot, StorageError>;

    /// Atomically add every delta and return the post-increment counters.
    async fn increase_values(
        &self,
        identity: &Identity,
        deltas: &Schedule,
    ) -> Result<UsageMap, StorageError>;

    /// Atomically subtract every delta and return the post-decrement counters.
    ///
    /// If any counter is smaller than its delta at commit time, nothing is
    /// applied and [`StorageError::Underflow`] names the first such field.
    async fn decrease_values(
        &self,
        identity: &Identity,
        deltas: &Schedule,
    ) -> Result<UsageMap, StorageError>;
}

#[async_trait]
impl<T: QuotaStore + ?Sized> QuotaStore for Arc<T> {
    async fn set_limit(&self, identity: &Identity, limit: u64) -> Result<u64, StorageError> {
        (**self).set_limit(identity, limit).await
    }

    async fn get_limit(&self, identity: &Identity) -> Result<u64, StorageError> {
        (**self).get_limit(identity).await
    }

    async fn get_usage(
        &self,
        identity: &Identity,
        months: &MonthSet,
        include_limit: bool,
    ) -> Result<UsageSnapshot, StorageError> {
        (**self).get_usage(identity, months, include_limit).await
    }

    async fn increase_values(
        &self,
        identity: &Identity,
        deltas: &Schedule,
    ) -> Result<UsageMap, StorageError> {
        (**self).increase_values(identity, deltas).await
    }

    async fn decrease_values(
        &self,
        identity: &Identity,
        deltas: &Schedule,
    ) -> Result<UsageMap, StorageError> {
        (**self).decrease_values(identity, deltas).await
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

/// shard -> field -> counter.
type Shards = HashMap<String, HashMap<String, u64>>;

/// A volatile [`QuotaStore`] backed by [`hashbrown::HashMap`].
///
/// Data is laid out with the same [`KeyEncoder`] addresses the Redis backend
/// uses.  Clones share the same underlying data, and every batch runs under
/// one write lock, so batches are atomic with respect to each other.
///
/// # Examples
///
/// ```rust
/// use schedule_limiter_core::storage::{InMemoryStore, QuotaStore};
/// use schedule_limiter_core::types::Identity;
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let store = InMemoryStore::new();
/// let identity = Identity::from(1u64);
/// store.set_limit(&identity, 10).await.unwrap();
/// assert_eq!(store.get_limit(&identity).await.unwrap(), 10);
/// assert_eq!(store.get_limit(&Identity::from(2u64)).await.unwrap(), 0);
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    encoder: KeyEncoder,
    shards: Arc<RwLock<Shards>>,
}

impl InMemoryStore {
    /// Create a new, empty [`InMemoryStore`] using the default tag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with a custom [`KeyEncoder`].
    pub fn with_encoder(encoder: KeyEncoder) -> Self {
        Self {
            encoder,
            shards: Arc::default(),
        }
    }

    /// Drop every shard.
    pub async fn clear(&self) {
        self.shards.write().await.clear();
    }

    /// Number of shards currently holding data.
    pub async fn shard_count(&self) -> usize {
        self.shards.read().await.len()
    }

    fn read(shards: &Shards, key: &StorageKey) -> u64 {
        shards
            .get(&key.shard)
            .and_then(|fields| fields.get(&key.field))
            .copied()
            .unwrap_or(0)
    }

    fn write(shards: &mut Shards, key: StorageKey, value: u64) {
        shards.entry(key.shard).or_default().insert(key.field, value);
    }

    /// Compute every new value before writing any of them.  Buckets that
    /// share a storage field see each other's staged value, and all of them
    /// report the field's final value.
    fn stage<F>(
        shards: &Shards,
        encoder: &KeyEncoder,
        identity: &Identity,
        deltas: &Schedule,
        apply: F,
    ) -> Result<Vec<(i32, Month, StorageKey, u64)>, StorageError>
    where
        F: Fn(&StorageKey, u64, u64) -> Result<u64, StorageError>,
    {
        let mut pending: HashMap<StorageKey, u64> = HashMap::new();
        let mut touched = Vec::new();
        for (year, month, delta) in buckets(deltas) {
            let key = encoder.usage_key(identity, year, month);
            let current = match pending.get(&key) {
                Some(value) => *value,
                None => Self::read(shards, &key),
            };
            let value = apply(&key, current, delta)?;
            pending.insert(key.clone(), value);
            touched.push((year, month, key));
        }
        Ok(touched
            .into_iter()
            .map(|(year, month, key)| {
                let value = pending.get(&key).copied().unwrap_or(0);
                (year, month, key, value)
            })
            .collect())
    }

    fn commit(shards: &mut Shards, staged: Vec<(i32, Month, StorageKey, u64)>) -> UsageMap {
        let mut result = UsageMap::new();
        for (year, month, key, value) in staged {
            Self::write(shards, key, value);
            result.entry(year).or_default().insert(month, value);
        }
        result
    }
}

#[async_trait]
impl QuotaStore for InMemoryStore {
    async fn set_limit(&self, identity: &Identity, limit: u64) -> Result<u64, StorageError> {
        let key = self.encoder.limit_key(identity);
        let mut shards = self.shards.write().await;
        Self::write(&mut shards, key, limit);
        Ok(limit)
    }

    async fn get_limit(&self, identity: &Identity) -> Result<u64, StorageError> {
        let key = self.encoder.limit_key(identity);
        let shards = self.shards.read().await;
        Ok(Self::read(&shards, &key))
    }

    async fn get_usage(
        &self,
        identity: &Identity,
        months: &MonthSet,
        include_limit: bool,
    ) -> Result<UsageSnapshot, StorageError> {
        let shards = self.shards.read().await;

        let mut snapshot = UsageSnapshot::default();
        for (year, set) in months {
            let row = snapshot.usage.entry(*year).or_default();
            for month in set {
                let key = self.encoder.usage_key(identity, *year, *month);
                row.insert(*month, Self::read(&shards, &key));
            }
        }
        if include_limit {
            snapshot.limit = Some(Self::read(&shards, &self.encoder.limit_key(identity)));
        }
        Ok(snapshot)
    }

    async fn increase_values(
        &self,
        identity: &Identity,
        deltas: &Schedule,
    ) -> Result<UsageMap, StorageError> {
        let mut shards = self.shards.write().await;

        let staged = Self::stage(&shards, &self.encoder, identity, deltas, |key, current, delta| {
            current
                .checked_add(delta)
                .ok_or_else(|| StorageError::InvalidValue {
                    field: key.field.clone(),
                    value: format!("{current} + {delta}"),
                })
        })?;
        Ok(Self::commit(&mut shards, staged))
    }

    async fn decrease_values(
        &self,
        identity: &Identity,
        deltas: &Schedule,
    ) -> Result<UsageMap, StorageError> {
        let mut shards = self.shards.write().await;

        let staged = Self::stage(&shards, &self.encoder, identity, deltas, |key, current, delta| {
            current
                .checked_sub(delta)
                .ok_or_else(|| StorageError::Underflow {
                    field: key.field.clone(),
                    current,
                    requested: delta,
                })
        })?;
        Ok(Self::commit(&mut shards, staged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{months_of, ScheduleRequest};

    fn month(value: u8) -> Month {
        Month::new(value).unwrap()
    }

    fn schedule() -> Schedule {
        ScheduleRequest::new()
            .with(2015, 1, 5)
            .with(2015, 2, 6)
            .with(2015, 3, 11)
            .with(2016, 4, 8)
            .normalize()
            .unwrap()
    }

    #[tokio::test]
    async fn test_increase_values_returns_post_increment_counters() {
        let store = InMemoryStore::new();
        let identity = Identity::from(1000u64);

        let values = store.increase_values(&identity, &schedule()).await.unwrap();
        assert_eq!(values[&2015][&month(1)], 5);
        assert_eq!(values[&2015][&month(2)], 6);
        assert_eq!(values[&2015][&month(3)], 11);
        assert_eq!(values[&2016][&month(4)], 8);

        let values = store.increase_values(&identity, &schedule()).await.unwrap();
        assert_eq!(values[&2015][&month(1)], 10);
    }

    #[tokio::test]
    async fn test_get_usage_reads_missing_buckets_as_zero() {
        let store = InMemoryStore::new();
        let identity = Identity::from(1000u64);
        let months = months_of(&schedule());

        let snapshot = store.get_usage(&identity, &months, false).await.unwrap();
        assert_eq!(snapshot.get(2015, month(1)), 0);
        assert_eq!(snapshot.get(2016, month(4)), 0);
        assert_eq!(snapshot.usage[&2015].len(), 3);
        assert_eq!(snapshot.limit, None);
    }

    #[tokio::test]
    async fn test_get_usage_includes_limit_on_request() {
        let store = InMemoryStore::new();
        let identity = Identity::from(1000u64);
        store.set_limit(&identity, 42).await.unwrap();
        store.increase_values(&identity, &schedule()).await.unwrap();

        let snapshot = store
            .get_usage(&identity, &months_of(&schedule()), true)
            .await
            .unwrap();
        assert_eq!(snapshot.limit, Some(42));
        assert_eq!(snapshot.get(2015, month(3)), 11);
    }

    #[tokio::test]
    async fn test_decrease_underflow_mutates_nothing() {
        let store = InMemoryStore::new();
        let identity = Identity::from(7u64);
        store.increase_values(&identity, &schedule()).await.unwrap();

        let too_much = ScheduleRequest::new()
            .with(2015, 1, 1)
            .with(2016, 4, 9)
            .normalize()
            .unwrap();
        let error = store.decrease_values(&identity, &too_much).await.unwrap_err();
        assert!(matches!(error, StorageError::Underflow { current: 8, requested: 9, .. }));

        let snapshot = store
            .get_usage(&identity, &months_of(&schedule()), false)
            .await
            .unwrap();
        assert_eq!(snapshot.get(2015, month(1)), 5);
        assert_eq!(snapshot.get(2016, month(4)), 8);
    }

    #[tokio::test]
    async fn test_buckets_sharing_a_field_report_the_stored_value() {
        let store = InMemoryStore::new();
        let identity = Identity::from(1000u64);

        // Built directly, so no year check applies: 201/11 and 2011/1 both
        // address field "0020111".
        let mut deltas = Schedule::new();
        deltas.entry(201).or_default().insert(month(11), 5);
        deltas.entry(2011).or_default().insert(month(1), 7);

        let values = store.increase_values(&identity, &deltas).await.unwrap();
        assert_eq!(values[&201][&month(11)], 12);
        assert_eq!(values[&2011][&month(1)], 12);

        let mut months = MonthSet::new();
        months.entry(2011).or_default().insert(month(1));
        let snapshot = store.get_usage(&identity, &months, false).await.unwrap();
        assert_eq!(snapshot.get(2011, month(1)), 12);

        let mut too_much = Schedule::new();
        too_much.entry(201).or_default().insert(month(11), 8);
        too_much.entry(2011).or_default().insert(month(1), 8);
        assert!(matches!(
            store.decrease_values(&identity, &too_much).await,
            Err(StorageError::Underflow { current: 4, requested: 8, .. })
        ));
    }

    #[tokio::test]
    async fn test_clones_share_data_and_layout_matches_encoder() {
        let store = InMemoryStore::new();
        let clone = store.clone();
        clone.set_limit(&Identity::from(1001u64), 3).await.unwrap();
        clone.set_limit(&Identity::from(1002u64), 4).await.unwrap();

        assert_eq!(store.get_limit(&Identity::from(1001u64)).await.unwrap(), 3);
        // Both identities live in shard "SL10".
        assert_eq!(store.shard_count().await, 1);

        store.clear().await;
        assert_eq!(clone.get_limit(&Identity::from(1001u64)).await.unwrap(), 0);
    }
}
