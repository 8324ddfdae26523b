// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # Basic Schedule Limiter Example
//!
//! Walks through limits, spends, rejections and cancellations over the
//! in-memory store.  Run with:
//!
//! ```bash
//! RUST_LOG=schedule_limiter_core=debug cargo run --example basic
//! ```

use schedule_limiter_core::{
    InMemoryStore, LimiterError, MonthQuery, ScheduleLimiter, ScheduleRequest,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), LimiterError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("Schedule Limiter: Basic Example\n");

    // -----------------------------------------------------------------------
    // 1. Construct the limiter and assign a limit
    // -----------------------------------------------------------------------
    let limiter = ScheduleLimiter::new(InMemoryStore::new());
    limiter.set_limit(1000, 10).await?;
    println!("Limit for 1000: {}\n", limiter.get_limit(1000).await?);

    // -----------------------------------------------------------------------
    // 2. Spend against four months; designators may be names or numbers
    // -----------------------------------------------------------------------
    let request = ScheduleRequest::new()
        .with(2015, "Jan", 5)
        .with(2015, "feb", 6)
        .with(2015, 3, 7)
        .with(2015, "4", 8);
    let usage = limiter.create_schedule(1000, request, false).await?;
    println!("After first spend:");
    for (month, value) in &usage[&2015] {
        println!("  2015 {month}: {value}");
    }
    println!();

    // -----------------------------------------------------------------------
    // 3. A spend that would push January over the limit is rejected whole
    // -----------------------------------------------------------------------
    let over = ScheduleRequest::new().with(2015, "Jan", 6).with(2015, "May", 1);
    match limiter.create_schedule(1000, over, false).await {
        Err(error @ LimiterError::ExceedsLimit { .. }) => println!("Rejected: {error}\n"),
        other => println!("Unexpected: {other:?}\n"),
    }

    // -----------------------------------------------------------------------
    // 4. Cancellation cannot drive a counter below zero
    // -----------------------------------------------------------------------
    let too_many = ScheduleRequest::new().with(2015, "Jan", 11);
    if let Err(error) = limiter.cancel_schedule(1000, too_many, false).await {
        println!("Rejected: {error}");
    }
    let release = ScheduleRequest::new().with(2015, "Jan", 5);
    limiter.cancel_schedule(1000, release, false).await?;

    // -----------------------------------------------------------------------
    // 5. Read back counters together with the limit
    // -----------------------------------------------------------------------
    let months = ["Jan", "Feb", "Mar", "Apr", "May"]
        .into_iter()
        .fold(MonthQuery::new(), |query, month| query.with(2015, month));
    let snapshot = limiter.get_usage(1000, months, true).await?;
    println!("\nUsage (limit {:?}):", snapshot.limit);
    for (month, value) in &snapshot.usage[&2015] {
        println!("  2015 {month}: {value}");
    }

    Ok(())
}
