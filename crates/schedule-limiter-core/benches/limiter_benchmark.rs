// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Criterion benchmark suite for the schedule limiter.
//!
//! Covers month normalization, key encoding, and the full
//! check-then-commit path over the in-memory store.
//!
//! Run with: `cargo bench --bench limiter_benchmark`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use schedule_limiter_core::{
    keys::KeyEncoder,
    limiter::ScheduleLimiter,
    months::{normalize, Month, MonthDesignator},
    storage::InMemoryStore,
    types::{Identity, ScheduleRequest},
};

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn normalize_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("normalize");

    let designators = [
        ("name", MonthDesignator::from("Sep")),
        ("name_lowercase", MonthDesignator::from("sep")),
        ("numeric_string", MonthDesignator::from("9")),
        ("number", MonthDesignator::from(9)),
        ("unknown", MonthDesignator::from("Sept")),
    ];
    for (label, designator) in &designators {
        group.bench_with_input(BenchmarkId::from_parameter(label), designator, |bencher, d| {
            bencher.iter(|| black_box(normalize(black_box(d))));
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Key encoding
// ---------------------------------------------------------------------------

fn key_encoding_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("key_encoding");
    let encoder = KeyEncoder::default();
    let identity = Identity::from(123_456_789u64);
    let december = Month::new(12).unwrap();

    group.bench_function("limit_key", |bencher| {
        bencher.iter(|| black_box(encoder.limit_key(black_box(&identity))));
    });
    group.bench_function("usage_key", |bencher| {
        bencher.iter(|| black_box(encoder.usage_key(black_box(&identity), 2015, december)));
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Limiter over the in-memory store
// ---------------------------------------------------------------------------

fn limiter_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("limiter");
    let runtime = Runtime::new().unwrap();

    for months in [1u8, 4, 12] {
        let limiter = ScheduleLimiter::new(InMemoryStore::new());
        runtime.block_on(async {
            limiter.set_limit(1, u64::MAX).await.unwrap();
        });
        let mut request = ScheduleRequest::new();
        for month in 1..=months {
            request.insert(2015, u32::from(month), 1);
        }

        group.bench_with_input(
            BenchmarkId::new("create_then_cancel", months),
            &request,
            |bencher, request| {
                bencher.to_async(&runtime).iter(|| async {
                    limiter.create_schedule(1, request.clone(), false).await.unwrap();
                    limiter.cancel_schedule(1, request.clone(), false).await.unwrap();
                });
            },
        );
    }

    let limiter = ScheduleLimiter::new(InMemoryStore::new());
    runtime.block_on(async {
        limiter.set_limit(1, 0).await.unwrap();
    });
    let rejected = ScheduleRequest::new().with(2015, "Jan", 1);
    group.bench_function("create_rejected", |bencher| {
        bencher.to_async(&runtime).iter(|| async {
            black_box(limiter.create_schedule(1, rejected.clone(), false).await.is_err());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    normalize_benchmark,
    key_encoding_benchmark,
    limiter_benchmark
);
criterion_main!(benches);
