// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Error taxonomy shared by every layer of the limiter.
//!
//! Validation failures ([`LimiterError::ExceedsLimit`],
//! [`LimiterError::NegativeUsage`], [`UnknownMonthError`]) are always raised
//! before any mutating store call.  [`StorageError`] is the only failure that
//! can originate during a commit.

use std::error::Error as StdError;

use thiserror::Error;

use crate::months::Month;

/// Boxed source error carried by [`StorageError::Backend`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A month designator matched neither a known abbreviation nor a number in
/// `1..=12`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown month designator \"{designator}\"")]
pub struct UnknownMonthError {
    /// The designator as supplied by the caller.
    pub designator: String,
}

/// A caller request that cannot be mapped onto storage buckets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// A month designator did not normalize.
    #[error(transparent)]
    UnknownMonth(#[from] UnknownMonthError),

    /// Usage fields append the year as decimal digits, so only four-digit
    /// years are addressable.
    #[error("year {year} is outside the supported range 1000..=9999")]
    YearOutOfRange { year: i32 },
}

/// Construction-time configuration failures.  Always fatal, never retried.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// `database.type` named a backend this build does not know.
    #[error("unknown database type \"{kind}\" (expected one of: memory, redis)")]
    UnknownBackend { kind: String },

    /// `database.options` could not be interpreted for the selected backend.
    #[error("invalid options for {backend} backend: {reason}")]
    InvalidOptions { backend: &'static str, reason: String },

    /// A configuration file could not be read.
    #[error("failed to read config file \"{path}\": {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file was not valid TOML for [`Config`](crate::config::Config).
    #[cfg(feature = "config-loader")]
    #[error("failed to parse TOML config: {source}")]
    TomlParse {
        #[source]
        source: toml::de::Error,
    },

    /// An environment variable held a value of the wrong shape.
    #[error("field \"{field}\": cannot parse \"{value}\": {reason}")]
    ParseField {
        field: String,
        value: String,
        reason: String,
    },
}

/// Failures reported by a [`QuotaStore`](crate::storage::QuotaStore) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend itself failed (network, protocol, transaction abort).
    #[error("{backend} backend error: {source}")]
    Backend {
        backend: &'static str,
        #[source]
        source: BoxError,
    },

    /// A stored value could not be read back as a non-negative counter.
    #[error("field \"{field}\" holds invalid counter value {value}")]
    InvalidValue { field: String, value: String },

    /// A decrement would have taken a counter below zero.
    #[error("field \"{field}\" cannot be decreased by {requested} (current {current})")]
    Underflow {
        field: String,
        current: u64,
        requested: u64,
    },
}

impl StorageError {
    /// Wrap a backend-specific error.
    pub fn backend<E>(backend: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        StorageError::Backend {
            backend,
            source: source.into(),
        }
    }
}

/// Errors returned by [`ScheduleLimiter`](crate::limiter::ScheduleLimiter)
/// operations.
#[derive(Debug, Error)]
pub enum LimiterError {
    /// Normalization rejected a month designator.  No store access happened.
    #[error(transparent)]
    UnknownMonth(#[from] UnknownMonthError),

    /// The request named a year that cannot be stored.  No store access
    /// happened.
    #[error("year {year} is outside the supported range 1000..=9999")]
    YearOutOfRange { year: i32 },

    /// Committing the batch would push one bucket over the identity's limit.
    /// Nothing was written.
    #[error(
        "requested {requested} tokens for {year}-{month} exceeds limit {limit} \
         (current usage {usage}, over by {overage})"
    )]
    ExceedsLimit {
        year: i32,
        month: Month,
        requested: u64,
        usage: u64,
        limit: u64,
        overage: u64,
    },

    /// Cancelling the batch would take one bucket below zero.  Nothing was
    /// written.
    #[error("cancelling {requested} tokens for {year}-{month} would leave negative usage (current usage {usage})")]
    NegativeUsage {
        year: i32,
        month: Month,
        requested: u64,
        usage: u64,
    },

    /// The store failed; propagated unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<RequestError> for LimiterError {
    fn from(error: RequestError) -> Self {
        match error {
            RequestError::UnknownMonth(error) => LimiterError::UnknownMonth(error),
            RequestError::YearOutOfRange { year } => LimiterError::YearOutOfRange { year },
        }
    }
}

impl LimiterError {
    /// `true` for the two validation rejections that guarantee zero side
    /// effects.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LimiterError::ExceedsLimit { .. } | LimiterError::NegativeUsage { .. }
        )
    }
}
