// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Shared data types used across the limiter, the key encoder and every
//! store backend.
//!
//! Request-side maps are keyed by caller-supplied [`MonthDesignator`]s;
//! everything downstream of normalization is keyed by canonical [`Month`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{Datelike, Utc};
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::months::{normalize, Month, MonthDesignator};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque identifier (user or application) that scopes a limit and its usage
/// buckets.
///
/// Integers and strings are both accepted; the key encoder only ever sees the
/// string form.
///
/// ```rust
/// use schedule_limiter_core::types::Identity;
///
/// assert_eq!(Identity::from(1000u64).as_str(), "1000");
/// assert_eq!(Identity::from("app-7").to_string(), "app-7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// The string form used for key derivation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity(value.to_owned())
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Identity(value)
    }
}

impl From<&Identity> for Identity {
    fn from(value: &Identity) -> Self {
        value.clone()
    }
}

macro_rules! identity_from_integer {
    ($($int:ty),*) => {
        $(
            impl From<$int> for Identity {
                fn from(value: $int) -> Self {
                    Identity(value.to_string())
                }
            }
        )*
    };
}

identity_from_integer!(u32, u64, i32, i64);

// ---------------------------------------------------------------------------
// Year/month maps
// ---------------------------------------------------------------------------

/// Normalized per-bucket token amounts: year → month → tokens.
pub type Schedule = BTreeMap<i32, BTreeMap<Month, u64>>;

/// Per-bucket usage counters as read from or written to a store.
pub type UsageMap = BTreeMap<i32, BTreeMap<Month, u64>>;

/// The buckets touched by a request: year → months.
pub type MonthSet = BTreeMap<i32, BTreeSet<Month>>;

/// Derive the [`MonthSet`] covered by a normalized schedule.
pub fn months_of(schedule: &Schedule) -> MonthSet {
    schedule
        .iter()
        .map(|(year, months)| (*year, months.keys().copied().collect()))
        .collect()
}

/// Iterate every `(year, month, value)` triple of a year/month map in order.
pub fn buckets<V: Copy>(
    map: &BTreeMap<i32, BTreeMap<Month, V>>,
) -> impl Iterator<Item = (i32, Month, V)> + '_ {
    map.iter().flat_map(|(year, months)| {
        months
            .iter()
            .map(move |(month, value)| (*year, *month, *value))
    })
}

/// Number of buckets in a year/month map.
pub fn bucket_count<V>(map: &BTreeMap<i32, BTreeMap<Month, V>>) -> usize {
    map.values().map(BTreeMap::len).sum()
}

// ---------------------------------------------------------------------------
// Years
// ---------------------------------------------------------------------------

/// Smallest year a request may name.
pub const MIN_YEAR: i32 = 1000;

/// Largest year a request may name.
pub const MAX_YEAR: i32 = 9999;

fn check_year(year: i32) -> Result<i32, RequestError> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(year)
    } else {
        Err(RequestError::YearOutOfRange { year })
    }
}

/// Year map key.  Accepts integers and numeric strings, because JSON and
/// TOML object keys are always strings and untagged enums hand them over
/// unparsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct YearKey(i32);

impl<'de> Deserialize<'de> for YearKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct YearVisitor;

        impl<'de> Visitor<'de> for YearVisitor {
            type Value = YearKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a year as an integer or a numeric string")
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<YearKey, E> {
                i32::try_from(value)
                    .map(YearKey)
                    .map_err(|_| E::invalid_value(Unexpected::Signed(value), &self))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<YearKey, E> {
                i32::try_from(value)
                    .map(YearKey)
                    .map_err(|_| E::invalid_value(Unexpected::Unsigned(value), &self))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<YearKey, E> {
                value
                    .trim()
                    .parse::<i32>()
                    .map(YearKey)
                    .map_err(|_| E::invalid_value(Unexpected::Str(value), &self))
            }
        }

        deserializer.deserialize_any(YearVisitor)
    }
}

fn deserialize_year_map<'de, D, V>(deserializer: D) -> Result<BTreeMap<i32, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    let raw = BTreeMap::<YearKey, V>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(YearKey(year), value)| (year, value)).collect())
}

// ---------------------------------------------------------------------------
// ScheduleRequest
// ---------------------------------------------------------------------------

/// A caller's spend or cancel request before normalization:
/// year → month designator → tokens.
///
/// ```rust
/// use schedule_limiter_core::types::ScheduleRequest;
///
/// let request = ScheduleRequest::new()
///     .with(2015, "Jan", 5)
///     .with(2015, "feb", 6)
///     .with(2015, 3, 7)
///     .with(2015, "4", 8);
///
/// let schedule = request.normalize().unwrap();
/// assert_eq!(schedule[&2015].len(), 4);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScheduleRequest(BTreeMap<i32, BTreeMap<MonthDesignator, u64>>);

impl<'de> Deserialize<'de> for ScheduleRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_year_map(deserializer).map(ScheduleRequest)
    }
}

impl ScheduleRequest {
    /// An empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.  A repeated `(year, designator)` pair is
    /// overwritten; distinct designators for the same month are summed at
    /// normalization.
    pub fn with(mut self, year: i32, month: impl Into<MonthDesignator>, tokens: u64) -> Self {
        self.insert(year, month, tokens);
        self
    }

    /// Insert one bucket amount.
    pub fn insert(&mut self, year: i32, month: impl Into<MonthDesignator>, tokens: u64) {
        self.0.entry(year).or_default().insert(month.into(), tokens);
    }

    /// `true` when no bucket is named.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    /// Normalize every designator, merging designators that name the same
    /// month.  Fails on the first unknown designator or unsupported year.
    pub fn normalize(&self) -> Result<Schedule, RequestError> {
        let mut schedule = Schedule::new();
        for (year, months) in &self.0 {
            if months.is_empty() {
                continue;
            }
            let year = check_year(*year)?;
            for (designator, tokens) in months {
                let month = normalize(designator)?;
                let slot = schedule.entry(year).or_default().entry(month).or_insert(0);
                *slot = slot.saturating_add(*tokens);
            }
        }
        Ok(schedule)
    }
}

impl From<BTreeMap<i32, BTreeMap<MonthDesignator, u64>>> for ScheduleRequest {
    fn from(value: BTreeMap<i32, BTreeMap<MonthDesignator, u64>>) -> Self {
        ScheduleRequest(value)
    }
}

impl From<&Schedule> for ScheduleRequest {
    fn from(schedule: &Schedule) -> Self {
        ScheduleRequest(
            schedule
                .iter()
                .map(|(year, months)| {
                    let months = months
                        .iter()
                        .map(|(month, tokens)| (MonthDesignator::from(*month), *tokens))
                        .collect();
                    (*year, months)
                })
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// MonthQuery
// ---------------------------------------------------------------------------

/// The buckets a usage read asks for, before normalization:
/// year → month designators.
///
/// ```rust
/// use schedule_limiter_core::types::MonthQuery;
///
/// let query: MonthQuery = serde_json::from_str(r#"{"2015": ["1", "Feb", 3]}"#).unwrap();
/// let months = query.normalize().unwrap();
/// assert_eq!(months[&2015].len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MonthQuery(BTreeMap<i32, BTreeSet<MonthDesignator>>);

impl<'de> Deserialize<'de> for MonthQuery {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_year_map(deserializer).map(MonthQuery)
    }
}

impl MonthQuery {
    /// An empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, year: i32, month: impl Into<MonthDesignator>) -> Self {
        self.insert(year, month);
        self
    }

    /// Add one month.
    pub fn insert(&mut self, year: i32, month: impl Into<MonthDesignator>) {
        self.0.entry(year).or_default().insert(month.into());
    }

    /// Normalize into a [`MonthSet`].  Fails on the first unknown designator
    /// or unsupported year.
    pub fn normalize(&self) -> Result<MonthSet, RequestError> {
        let mut set = MonthSet::new();
        for (year, months) in &self.0 {
            if months.is_empty() {
                continue;
            }
            let year = check_year(*year)?;
            for designator in months {
                set.entry(year).or_default().insert(normalize(designator)?);
            }
        }
        Ok(set)
    }
}

impl From<&MonthSet> for MonthQuery {
    fn from(set: &MonthSet) -> Self {
        MonthQuery(
            set.iter()
                .map(|(year, months)| {
                    (*year, months.iter().map(|m| MonthDesignator::from(*m)).collect())
                })
                .collect(),
        )
    }
}

impl From<MonthSet> for MonthQuery {
    fn from(set: MonthSet) -> Self {
        MonthQuery::from(&set)
    }
}

// ---------------------------------------------------------------------------
// TokenRequest
// ---------------------------------------------------------------------------

/// Either a full schedule or the single-number shorthand meaning "this many
/// tokens in the current calendar month".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenRequest {
    /// Shorthand for the current UTC year and month.
    SingleMonth(u64),
    /// Explicit year → month → tokens request.
    Schedule(ScheduleRequest),
}

impl TokenRequest {
    /// Expand the shorthand against the current UTC date.
    pub fn resolve(self) -> ScheduleRequest {
        let today = Utc::now().date_naive();
        self.resolve_at(today.year(), Month::from_calendar(today.month()))
    }

    /// Expand the shorthand against an explicit year and month.
    pub fn resolve_at(self, year: i32, month: Month) -> ScheduleRequest {
        match self {
            TokenRequest::SingleMonth(tokens) => ScheduleRequest::new().with(year, month, tokens),
            TokenRequest::Schedule(request) => request,
        }
    }
}

impl From<u64> for TokenRequest {
    fn from(tokens: u64) -> Self {
        TokenRequest::SingleMonth(tokens)
    }
}

impl From<ScheduleRequest> for TokenRequest {
    fn from(request: ScheduleRequest) -> Self {
        TokenRequest::Schedule(request)
    }
}

// ---------------------------------------------------------------------------
// UsageSnapshot
// ---------------------------------------------------------------------------

/// Result of a usage read: per-bucket counters plus, when requested, the
/// identity's limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Counters for every requested bucket; missing buckets read as `0`.
    pub usage: UsageMap,
    /// The identity's limit, present only when it was asked for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl UsageSnapshot {
    /// Counter for one bucket, `0` if absent.
    pub fn get(&self, year: i32, month: Month) -> u64 {
        self.usage
            .get(&year)
            .and_then(|months| months.get(&month))
            .copied()
            .unwrap_or(0)
    }
}
