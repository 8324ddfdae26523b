// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Storage address derivation.
//!
//! Every identity maps onto a two-part address in a hash-oriented key/value
//! store:
//!
//! * **shard**: the tag followed by all but the last two characters of the
//!   identity's string form;
//! * **field**: the last two characters (the limit), or the last two
//!   characters followed by the year and month (a usage bucket).
//!
//! ```text
//! identity 1000, tag "SL"
//!   limit        -> shard "SL10", field "00"
//!   2015 / month 3 -> shard "SL10", field "0020153"
//! ```
//!
//! The layout is a storage format.  Changing it orphans data written by
//! earlier deployments.

use serde::{Deserialize, Serialize};

use crate::months::Month;
use crate::types::Identity;

/// Default tag prepended to every shard key.
pub const DEFAULT_TAG: &str = "SL";

/// Number of trailing identity characters kept in the field.
const LOCAL_SUFFIX_CHARS: usize = 2;

/// A `(shard, field)` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageKey {
    /// Hash key selecting the partition.
    pub shard: String,
    /// Field within the shard.
    pub field: String,
}

/// Derives [`StorageKey`]s for limits and usage buckets.
///
/// ```rust
/// use schedule_limiter_core::keys::KeyEncoder;
/// use schedule_limiter_core::months::Month;
/// use schedule_limiter_core::types::Identity;
///
/// let encoder = KeyEncoder::default();
/// let identity = Identity::from(1000u64);
///
/// let limit = encoder.limit_key(&identity);
/// assert_eq!((limit.shard.as_str(), limit.field.as_str()), ("SL10", "00"));
///
/// let usage = encoder.usage_key(&identity, 2015, Month::new(3).unwrap());
/// assert_eq!((usage.shard.as_str(), usage.field.as_str()), ("SL10", "0020153"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEncoder {
    tag: String,
}

impl Default for KeyEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_TAG)
    }
}

impl KeyEncoder {
    /// Create an encoder with a custom shard tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    /// The shard tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Address of the identity's limit.
    pub fn limit_key(&self, identity: &Identity) -> StorageKey {
        let (prefix, suffix) = split_identity(identity.as_str());
        StorageKey {
            shard: self.shard(prefix),
            field: suffix.to_owned(),
        }
    }

    /// Address of one usage bucket.
    pub fn usage_key(&self, identity: &Identity, year: i32, month: Month) -> StorageKey {
        let (prefix, suffix) = split_identity(identity.as_str());
        StorageKey {
            shard: self.shard(prefix),
            field: format!("{suffix}{year}{month}"),
        }
    }

    fn shard(&self, prefix: &str) -> String {
        let mut shard = String::with_capacity(self.tag.len() + prefix.len());
        shard.push_str(&self.tag);
        shard.push_str(prefix);
        shard
    }
}

/// Split into (all but the last two characters, last two characters).
fn split_identity(identity: &str) -> (&str, &str) {
    let split_at = identity
        .char_indices()
        .rev()
        .nth(LOCAL_SUFFIX_CHARS - 1)
        .map(|(index, _)| index)
        .unwrap_or(0);
    identity.split_at(split_at)
}
