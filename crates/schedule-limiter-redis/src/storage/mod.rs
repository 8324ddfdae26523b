// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Storage backends that need a network client.

pub mod redis;

pub use self::redis::RedisStore;
