// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # schedule-limiter-redis
//!
//! Redis storage for `schedule-limiter-core`, plus the configuration-driven
//! [`Adapter`] that picks between the in-memory and Redis backends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use schedule_limiter_core::{Config, ScheduleRequest};
//! use schedule_limiter_redis::connect;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let limiter = connect(&Config::redis("redis://127.0.0.1:6379/0"))?;
//! limiter.set_limit(1000u64, 10).await?;
//!
//! let request = ScheduleRequest::new().with(2015, "Jan", 5).with(2015, 3, 7);
//! let usage = limiter.create_schedule(1000u64, request, false).await?;
//! println!("{usage:?}");
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod options;
pub mod storage;

pub use adapter::{connect, Adapter};
pub use options::RedisOptions;
pub use storage::RedisStore;
