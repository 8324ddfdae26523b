// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Tests against a live Redis server.
//!
//! Ignored by default.  Run with:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1:6379/15 cargo test -p schedule-limiter-redis -- --ignored
//! ```
//!
//! Every test writes under its own tag, so runs do not collide.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use schedule_limiter_core::{
    Config, Identity, KeyEncoder, LimiterError, Month, MonthSet, QuotaStore, ScheduleLimiter,
    ScheduleRequest,
};
use schedule_limiter_redis::{connect, Adapter, RedisOptions, RedisStore};

const DEFAULT_URL: &str = "redis://127.0.0.1:6379/15";

static COUNTER: AtomicU32 = AtomicU32::new(0);

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_URL.to_owned())
}

fn unique_tag() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    format!("T{nanos}x{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

fn limiter() -> ScheduleLimiter<Adapter> {
    let mut config = Config::redis(redis_url());
    config.tag = unique_tag();
    connect(&config).unwrap()
}

fn month(value: u8) -> Month {
    Month::new(value).unwrap()
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_limit_round_trip() {
    let limiter = limiter();
    assert_eq!(limiter.get_limit(1000u64).await.unwrap(), 0);
    assert_eq!(limiter.set_limit(1000u64, 10).await.unwrap(), 10);
    assert_eq!(limiter.get_limit(1000u64).await.unwrap(), 10);
    limiter.set_limit(1000u64, 4).await.unwrap();
    assert_eq!(limiter.get_limit(1000u64).await.unwrap(), 4);
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_create_then_cancel() {
    let limiter = limiter();
    limiter.set_limit(1000u64, 10).await.unwrap();

    let request = ScheduleRequest::new()
        .with(2015, "Jan", 5)
        .with(2015, "feb", 6)
        .with(2015, 3, 7)
        .with(2015, "4", 8);
    let usage = limiter.create_schedule(1000u64, request, false).await.unwrap();
    let values: Vec<u64> = usage[&2015].values().copied().collect();
    assert_eq!(values, vec![5, 6, 7, 8]);

    let again = ScheduleRequest::new().with(2015, "Jan", 6);
    assert!(matches!(
        limiter.create_schedule(1000u64, again, false).await,
        Err(LimiterError::ExceedsLimit { overage: 1, .. })
    ));

    let cancel = ScheduleRequest::new().with(2015, "Jan", 11);
    assert!(matches!(
        limiter.cancel_schedule(1000u64, cancel, false).await,
        Err(LimiterError::NegativeUsage { requested: 11, usage: 5, .. })
    ));

    let cancel = ScheduleRequest::new().with(2015, "Jan", 5).with(2015, "Apr", 3);
    let usage = limiter.cancel_schedule(1000u64, cancel, false).await.unwrap();
    assert_eq!(usage[&2015][&month(1)], 0);
    assert_eq!(usage[&2015][&month(4)], 5);
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_rejected_batch_leaves_counters_unchanged() {
    let limiter = limiter();
    limiter.set_limit(7u64, 10).await.unwrap();
    limiter
        .create_schedule(7u64, ScheduleRequest::new().with(2016, 2, 9), false)
        .await
        .unwrap();

    let request = ScheduleRequest::new().with(2016, 1, 3).with(2016, 2, 2);
    assert!(limiter.create_schedule(7u64, request, false).await.is_err());

    let mut months = MonthSet::new();
    months.insert(2016, [month(1), month(2)].into_iter().collect());
    let snapshot = limiter.get_usage(7u64, &months, true).await.unwrap();
    assert_eq!(snapshot.get(2016, month(1)), 0);
    assert_eq!(snapshot.get(2016, month(2)), 9);
    assert_eq!(snapshot.limit, Some(10));
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_store_shares_one_hash_per_identity() {
    let tag = unique_tag();
    let options = RedisOptions {
        url: Some(redis_url()),
        ..RedisOptions::default()
    };
    let store = RedisStore::open(&options, KeyEncoder::new(tag.clone())).unwrap();
    let identity = Identity::from(1000u64);
    store.set_limit(&identity, 3).await.unwrap();

    let mut deltas = schedule_limiter_core::Schedule::new();
    deltas.entry(2015).or_default().insert(month(12), 2);
    let usage = store.increase_values(&identity, &deltas).await.unwrap();
    assert_eq!(usage[&2015][&month(12)], 2);

    let client = redis::Client::open(redis_url()).unwrap();
    let mut connection = client.get_multiplexed_async_connection().await.unwrap();
    let mut fields: Vec<String> = redis::cmd("HKEYS")
        .arg(format!("{tag}10"))
        .query_async(&mut connection)
        .await
        .unwrap();
    fields.sort();
    assert_eq!(fields, vec!["00".to_owned(), "00201512".to_owned()]);

    let _: () = redis::cmd("DEL")
        .arg(format!("{tag}10"))
        .query_async(&mut connection)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_decrease_refuses_underflow_atomically() {
    let options = RedisOptions {
        url: Some(redis_url()),
        ..RedisOptions::default()
    };
    let store = RedisStore::open(&options, KeyEncoder::new(unique_tag())).unwrap();
    let identity = Identity::from(4242u64);

    let mut deltas = schedule_limiter_core::Schedule::new();
    deltas.entry(2015).or_default().insert(month(1), 5);
    deltas.entry(2015).or_default().insert(month(2), 3);
    store.increase_values(&identity, &deltas).await.unwrap();

    let mut too_much = schedule_limiter_core::Schedule::new();
    too_much.entry(2015).or_default().insert(month(1), 1);
    too_much.entry(2015).or_default().insert(month(2), 4);
    let error = store.decrease_values(&identity, &too_much).await.unwrap_err();
    assert!(matches!(
        error,
        schedule_limiter_core::StorageError::Underflow { current: 3, requested: 4, .. }
    ));

    let mut months = MonthSet::new();
    months.insert(2015, [month(1), month(2)].into_iter().collect());
    let snapshot = store.get_usage(&identity, &months, false).await.unwrap();
    assert_eq!(snapshot.get(2015, month(1)), 5);
    assert_eq!(snapshot.get(2015, month(2)), 3);

    let usage = store.decrease_values(&identity, &deltas).await.unwrap();
    assert_eq!(usage[&2015][&month(1)], 0);
    assert_eq!(usage[&2015][&month(2)], 0);
}

#[tokio::test]
#[ignore = "requires a running Redis server"]
async fn test_concurrent_cancellations_never_go_negative() {
    let limiter = limiter();
    limiter.set_limit(9u64, 10).await.unwrap();
    limiter
        .create_schedule(9u64, ScheduleRequest::new().with(2017, "Mar", 5), false)
        .await
        .unwrap();

    let cancel = || limiter.cancel_schedule(9u64, ScheduleRequest::new().with(2017, "Mar", 5), false);
    let (first, second) = tokio::join!(cancel(), cancel());
    let succeeded = [&first, &second].iter().filter(|result| result.is_ok()).count();
    assert_eq!(succeeded, 1);
    for result in [first, second] {
        if let Err(error) = result {
            assert!(matches!(
                error,
                LimiterError::NegativeUsage { .. }
                    | LimiterError::Storage(schedule_limiter_core::StorageError::Underflow { .. })
            ));
        }
    }

    let mut months = MonthSet::new();
    months.insert(2017, [month(3)].into_iter().collect());
    let snapshot = limiter.get_usage(9u64, &months, false).await.unwrap();
    assert_eq!(snapshot.get(2017, month(3)), 0);
}
