// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # schedule-limiter-core
//!
//! Per-identity, month-granular usage quotas.
//!
//! Each identity (a user or an application) has one limit.  Callers spend
//! tokens against `(year, month)` buckets; a spend is accepted only if no
//! bucket in the batch would end above the limit, and then every bucket is
//! committed in one atomic store batch.  Cancellation releases tokens and
//! never lets a bucket go below zero.
//!
//! ## Architecture
//!
//! ```text
//! ScheduleLimiter<S: QuotaStore>
//!   ├── months      - month designator normalization ("Jan", "1", 1 → 1)
//!   ├── keys        - identity/year/month → (shard, field) addressing
//!   └── S           - InMemoryStore here, RedisStore in schedule-limiter-redis
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use schedule_limiter_core::{InMemoryStore, ScheduleLimiter, ScheduleRequest};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let limiter = ScheduleLimiter::new(InMemoryStore::new());
//! limiter.set_limit(1, 10).await.unwrap();
//!
//! let request = ScheduleRequest::new()
//!     .with(2015, "Jan", 5)
//!     .with(2015, "feb", 6)
//!     .with(2015, 3, 7)
//!     .with(2015, "4", 8);
//! let usage = limiter.create_schedule(1, request, false).await.unwrap();
//! assert_eq!(usage[&2015].len(), 4);
//! # });
//! ```

pub mod config;
pub mod config_loader;
pub mod error;
pub mod keys;
pub mod limiter;
pub mod months;
pub mod storage;
pub mod types;

pub use config::{Config, DatabaseConfig, DatabaseKind};
pub use error::{ConfigurationError, LimiterError, RequestError, StorageError, UnknownMonthError};
pub use keys::{KeyEncoder, StorageKey};
pub use limiter::ScheduleLimiter;
pub use months::{normalize, Month, MonthDesignator};
pub use storage::{InMemoryStore, QuotaStore};
pub use types::{
    Identity, MonthQuery, MonthSet, Schedule, ScheduleRequest, TokenRequest, UsageMap,
    UsageSnapshot,
};
