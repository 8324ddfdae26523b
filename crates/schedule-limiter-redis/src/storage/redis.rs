// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Redis-backed [`QuotaStore`].
//!
//! ## Layout
//!
//! Each identity lives in one Redis hash, addressed by the
//! [`KeyEncoder`]:
//!
//! ```text
//! HGETALL SL10            (identity 1000)
//!   "00"       -> limit
//!   "0020151"  -> usage for 2015 / January
//!   "00201512" -> usage for 2015 / December
//! ```
//!
//! ## Atomicity
//!
//! Increments are one `MULTI` / `HINCRBY`... / `EXEC` pipeline.  Decrements
//! run as a Lua script that checks every field against its delta before
//! applying any of them, so a batch that would take a counter below zero is
//! refused with [`StorageError::Underflow`] and leaves the hash untouched.
//! Reads are a single `HMGET`.
//!
//! ## Connection
//!
//! The store opens one [`ConnectionManager`] on first use and shares it
//! between all clones and all callers.  The manager re-establishes the
//! connection after the server restarts or the link drops; only the call in
//! flight at that moment fails.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use schedule_limiter_core::keys::KeyEncoder;
use schedule_limiter_core::types::buckets;
use schedule_limiter_core::{
    ConfigurationError, Identity, Month, MonthSet, QuotaStore, Schedule, StorageError, UsageMap,
    UsageSnapshot,
};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::options::RedisOptions;

const BACKEND: &str = "redis";

/// Checked batch decrement.
///
/// `KEYS[1]` is the shard, `ARGV` holds `field, delta` pairs.  Replies
/// `{1, value...}` with the post-decrement values in argument order, or
/// `{0, pair_index, current}` for the first field that cannot cover its
/// delta, in which case nothing was written.
const DECREASE_SCRIPT: &str = r"
local pending = {}
for i = 1, #ARGV, 2 do
  local field = ARGV[i]
  local current = pending[field]
  if current == nil then
    current = tonumber(redis.call('HGET', KEYS[1], field) or '0')
    if current == nil then
      return redis.error_reply('field ' .. field .. ' holds a non-integer value')
    end
  end
  local delta = tonumber(ARGV[i + 1])
  if current < delta then
    return {0, (i + 1) / 2, current}
  end
  pending[field] = current - delta
end
local values = {1}
for i = 1, #ARGV, 2 do
  values[#values + 1] = redis.call('HINCRBY', KEYS[1], ARGV[i], '-' .. ARGV[i + 1])
end
return values
";

/// One bucket of a batch: where it lives and how much it moves.
struct Slot {
    year: i32,
    month: Month,
    field: String,
    delta: u64,
}

/// A [`QuotaStore`] persisting limits and counters in Redis hashes.
///
/// # Examples
///
/// ```rust,no_run
/// use schedule_limiter_core::{KeyEncoder, QuotaStore, Identity};
/// use schedule_limiter_redis::{RedisOptions, RedisStore};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisStore::open(&RedisOptions::default(), KeyEncoder::default())?;
/// store.set_limit(&Identity::from(1000u64), 10).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    encoder: KeyEncoder,
    connection: Arc<OnceCell<ConnectionManager>>,
    decrease: Arc<Script>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr)
            .field("tag", &self.encoder.tag())
            .field("connected", &self.connection.initialized())
            .finish()
    }
}

impl RedisStore {
    /// Build a store from connection options.  No connection is made until
    /// the first operation.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidOptions`] if the options do not describe
    /// a usable Redis endpoint.
    pub fn open(options: &RedisOptions, encoder: KeyEncoder) -> Result<Self, ConfigurationError> {
        let client = Client::open(options.connection_info()?).map_err(|error| {
            ConfigurationError::InvalidOptions {
                backend: BACKEND,
                reason: error.to_string(),
            }
        })?;
        Ok(Self::from_client(client, encoder))
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client, encoder: KeyEncoder) -> Self {
        Self {
            client,
            encoder,
            connection: Arc::new(OnceCell::new()),
            decrease: Arc::new(Script::new(DECREASE_SCRIPT)),
        }
    }

    /// The key encoder in use.
    pub fn encoder(&self) -> &KeyEncoder {
        &self.encoder
    }

    /// The shared, self-reconnecting connection.  A failed first connect
    /// leaves the cell empty so the next call tries again.
    async fn connection(&self) -> Result<ConnectionManager, StorageError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                debug!(addr = ?self.client.get_connection_info().addr, "opening redis connection");
                ConnectionManager::new(self.client.clone()).await
            })
            .await
            .map_err(backend_error)?;
        Ok(connection.clone())
    }

    fn slots(&self, identity: &Identity, deltas: &Schedule) -> Result<Vec<Slot>, StorageError> {
        buckets(deltas)
            .map(|(year, month, delta)| {
                let field = self.encoder.usage_key(identity, year, month).field;
                // HINCRBY takes a signed 64-bit delta.
                if i64::try_from(delta).is_err() {
                    return Err(StorageError::InvalidValue {
                        field,
                        value: delta.to_string(),
                    });
                }
                Ok(Slot {
                    year,
                    month,
                    field,
                    delta,
                })
            })
            .collect()
    }
}

#[async_trait]
impl QuotaStore for RedisStore {
    async fn set_limit(&self, identity: &Identity, limit: u64) -> Result<u64, StorageError> {
        let key = self.encoder.limit_key(identity);
        let mut connection = self.connection().await?;
        connection
            .hset::<_, _, _, ()>(&key.shard, &key.field, limit)
            .await
            .map_err(backend_error)?;
        Ok(limit)
    }

    async fn get_limit(&self, identity: &Identity) -> Result<u64, StorageError> {
        let key = self.encoder.limit_key(identity);
        let mut connection = self.connection().await?;
        let raw: Option<String> = connection
            .hget(&key.shard, &key.field)
            .await
            .map_err(backend_error)?;
        parse_counter(&key.field, raw)
    }

    async fn get_usage(
        &self,
        identity: &Identity,
        months: &MonthSet,
        include_limit: bool,
    ) -> Result<UsageSnapshot, StorageError> {
        let limit_key = self.encoder.limit_key(identity);

        let mut slots = Vec::new();
        let mut fields = Vec::new();
        for (year, set) in months {
            for month in set {
                let key = self.encoder.usage_key(identity, *year, *month);
                fields.push(key.field);
                slots.push((*year, *month));
            }
        }
        if include_limit {
            fields.push(limit_key.field.clone());
        }

        let mut snapshot = UsageSnapshot::default();
        if fields.is_empty() {
            return Ok(snapshot);
        }

        let mut connection = self.connection().await?;
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(&limit_key.shard)
            .arg(&fields)
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;

        let mut values = fields.iter().zip(values);
        for (year, month) in slots {
            let (field, raw) = values.next().ok_or_else(|| short_reply(fields.len()))?;
            let value = parse_counter(field, raw)?;
            snapshot.usage.entry(year).or_default().insert(month, value);
        }
        if include_limit {
            let (field, raw) = values.next().ok_or_else(|| short_reply(fields.len()))?;
            snapshot.limit = Some(parse_counter(field, raw)?);
        }
        Ok(snapshot)
    }

    async fn increase_values(
        &self,
        identity: &Identity,
        deltas: &Schedule,
    ) -> Result<UsageMap, StorageError> {
        let slots = self.slots(identity, deltas)?;
        if slots.is_empty() {
            return Ok(UsageMap::new());
        }
        let shard = self.encoder.limit_key(identity).shard;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for slot in &slots {
            pipe.hincr(&shard, &slot.field, slot.delta);
        }

        let mut connection = self.connection().await?;
        let values: Vec<i64> = pipe
            .query_async(&mut connection)
            .await
            .map_err(backend_error)?;
        debug!(%identity, buckets = slots.len(), "redis increment applied");
        collect_usage(&slots, &values)
    }

    async fn decrease_values(
        &self,
        identity: &Identity,
        deltas: &Schedule,
    ) -> Result<UsageMap, StorageError> {
        let slots = self.slots(identity, deltas)?;
        if slots.is_empty() {
            return Ok(UsageMap::new());
        }
        let shard = self.encoder.limit_key(identity).shard;

        let mut invocation = self.decrease.prepare_invoke();
        invocation.key(&shard);
        for slot in &slots {
            invocation.arg(&slot.field).arg(slot.delta);
        }

        let mut connection = self.connection().await?;
        let reply: Vec<i64> = invocation
            .invoke_async(&mut connection)
            .await
            .map_err(backend_error)?;

        match reply.split_first() {
            Some((&1, values)) => {
                debug!(%identity, buckets = slots.len(), "redis decrement applied");
                collect_usage(&slots, values)
            }
            Some((&0, &[index, current])) => {
                let slot = usize::try_from(index)
                    .ok()
                    .and_then(|index| index.checked_sub(1))
                    .and_then(|index| slots.get(index))
                    .ok_or_else(|| malformed_reply("decrement", reply.len()))?;
                warn!(%identity, field = %slot.field, current, requested = slot.delta, "redis decrement refused");
                Err(StorageError::Underflow {
                    field: slot.field.clone(),
                    current: u64::try_from(current).unwrap_or(0),
                    requested: slot.delta,
                })
            }
            _ => Err(malformed_reply("decrement", reply.len())),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn backend_error(error: RedisError) -> StorageError {
    StorageError::backend(BACKEND, error)
}

fn short_reply(expected: usize) -> StorageError {
    StorageError::backend(BACKEND, format!("HMGET returned fewer than {expected} values"))
}

fn malformed_reply(operation: &str, len: usize) -> StorageError {
    StorageError::backend(BACKEND, format!("malformed {operation} reply ({len} values)"))
}

/// Pair post-update values with their buckets.  Buckets that share a field
/// all report the field's final value.
fn collect_usage(slots: &[Slot], values: &[i64]) -> Result<UsageMap, StorageError> {
    if values.len() != slots.len() {
        return Err(malformed_reply("batch", values.len()));
    }
    let mut last: HashMap<&str, i64> = HashMap::new();
    for (slot, value) in slots.iter().zip(values) {
        last.insert(slot.field.as_str(), *value);
    }

    let mut usage = UsageMap::new();
    for slot in slots {
        let value = last.get(slot.field.as_str()).copied().unwrap_or(0);
        let value = u64::try_from(value).map_err(|_| StorageError::InvalidValue {
            field: slot.field.clone(),
            value: value.to_string(),
        })?;
        usage.entry(slot.year).or_default().insert(slot.month, value);
    }
    Ok(usage)
}

/// Interpret a hash field as a non-negative counter; absent reads as `0`.
fn parse_counter(field: &str, raw: Option<String>) -> Result<u64, StorageError> {
    match raw {
        None => Ok(0),
        Some(text) => text.parse::<u64>().map_err(|_| StorageError::InvalidValue {
            field: field.to_owned(),
            value: text,
        }),
    }
}
