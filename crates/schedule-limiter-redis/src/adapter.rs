// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Configuration-driven backend selection.
//!
//! [`Adapter`] is the single [`QuotaStore`] a deployment hands to the
//! limiter.  It is chosen once from `database.type` and forwards every call
//! to the selected backend.
//!
//! ```rust
//! use schedule_limiter_core::Config;
//! use schedule_limiter_redis::{connect, Adapter};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let limiter = connect(&Config::memory()).unwrap();
//! assert!(matches!(limiter.store(), Adapter::Memory(_)));
//! limiter.set_limit("app-7", 3).await.unwrap();
//! assert_eq!(limiter.get_limit("app-7").await.unwrap(), 3);
//! # });
//! ```

use async_trait::async_trait;
use schedule_limiter_core::{
    Config, ConfigurationError, DatabaseKind, Identity, InMemoryStore, MonthSet, QuotaStore,
    Schedule, ScheduleLimiter, StorageError, UsageMap, UsageSnapshot,
};
use tracing::info;

use crate::options::RedisOptions;
use crate::storage::RedisStore;

/// The backend selected by configuration.
#[derive(Debug, Clone)]
pub enum Adapter {
    /// Process-local counters.
    Memory(InMemoryStore),
    /// Redis hashes.
    Redis(RedisStore),
}

impl Adapter {
    /// Build the backend named by `config.database.type`.
    ///
    /// # Errors
    ///
    /// * [`ConfigurationError::UnknownBackend`] for an unrecognized type.
    /// * [`ConfigurationError::InvalidOptions`] when the backend rejects its
    ///   options.
    pub fn from_config(config: &Config) -> Result<Self, ConfigurationError> {
        let kind = config.database.kind()?;
        let encoder = config.key_encoder();
        let adapter = match kind {
            DatabaseKind::Memory => Adapter::Memory(InMemoryStore::with_encoder(encoder)),
            DatabaseKind::Redis => {
                let options = RedisOptions::from_value(&config.database.options)?;
                Adapter::Redis(RedisStore::open(&options, encoder)?)
            }
        };
        info!(backend = %kind, tag = %config.tag, "storage adapter selected");
        Ok(adapter)
    }

    /// The selected backend kind.
    pub fn kind(&self) -> DatabaseKind {
        match self {
            Adapter::Memory(_) => DatabaseKind::Memory,
            Adapter::Redis(_) => DatabaseKind::Redis,
        }
    }

    fn store(&self) -> &dyn QuotaStore {
        match self {
            Adapter::Memory(store) => store,
            Adapter::Redis(store) => store,
        }
    }
}

#[async_trait]
impl QuotaStore for Adapter {
    async fn set_limit(&self, identity: &Identity, limit: u64) -> Result<u64, StorageError> {
        self.store().set_limit(identity, limit).await
    }

    async fn get_limit(&self, identity: &Identity) -> Result<u64, StorageError> {
        self.store().get_limit(identity).await
    }

    async fn get_usage(
        &self,
        identity: &Identity,
        months: &MonthSet,
        include_limit: bool,
    ) -> Result<UsageSnapshot, StorageError> {
        self.store().get_usage(identity, months, include_limit).await
    }

    async fn increase_values(
        &self,
        identity: &Identity,
        deltas: &Schedule,
    ) -> Result<UsageMap, StorageError> {
        self.store().increase_values(identity, deltas).await
    }

    async fn decrease_values(
        &self,
        identity: &Identity,
        deltas: &Schedule,
    ) -> Result<UsageMap, StorageError> {
        self.store().decrease_values(identity, deltas).await
    }
}

/// Build a [`ScheduleLimiter`] over the backend named in `config`.
///
/// No network connection is opened here; the Redis backend connects on its
/// first operation.
pub fn connect(config: &Config) -> Result<ScheduleLimiter<Adapter>, ConfigurationError> {
    Ok(ScheduleLimiter::new(Adapter::from_config(config)?))
}
