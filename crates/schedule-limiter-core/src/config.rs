// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Construction-time configuration.
//!
//! [`Config`] selects the storage backend and the shard tag.  It is
//! validated once when a limiter is built and never changes afterwards.
//!
//! ```rust
//! use schedule_limiter_core::config::{Config, DatabaseKind};
//!
//! let config: Config = serde_json::from_str(r#"{
//!     "database": { "type": "REDIS", "options": { "host": "127.0.0.1", "port": 6379 } }
//! }"#).unwrap();
//!
//! assert_eq!(config.database.kind().unwrap(), DatabaseKind::Redis);
//! assert_eq!(config.tag, "SL");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigurationError;
use crate::keys::{KeyEncoder, DEFAULT_TAG};

/// Storage backends known to this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    /// Non-persistent, process-local.
    Memory,
    /// Redis hashes.
    Redis,
}

impl DatabaseKind {
    /// Parse a backend name, ignoring ASCII case.
    pub fn from_str_case_insensitive(s: &str) -> Result<Self, ConfigurationError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(DatabaseKind::Memory),
            "redis" => Ok(DatabaseKind::Redis),
            _ => Err(ConfigurationError::UnknownBackend { kind: s.to_owned() }),
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseKind::Memory => write!(f, "Memory"),
            DatabaseKind::Redis => write!(f, "Redis"),
        }
    }
}

/// The `database` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Backend name as written by the operator.  Case-insensitive; checked by
    /// [`DatabaseConfig::kind`].
    #[serde(rename = "type")]
    pub backend: String,

    /// Backend-specific options, interpreted by the backend itself.
    #[serde(default)]
    pub options: Value,
}

impl DatabaseConfig {
    /// Validate and return the selected backend.
    pub fn kind(&self) -> Result<DatabaseKind, ConfigurationError> {
        DatabaseKind::from_str_case_insensitive(&self.backend)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tag prepended to every shard key.  Defaults to `"SL"`.
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Storage backend selection.
    pub database: DatabaseConfig,
}

fn default_tag() -> String {
    DEFAULT_TAG.to_owned()
}

impl Default for Config {
    fn default() -> Self {
        Self::memory()
    }
}

impl Config {
    /// In-memory backend, default tag.
    pub fn memory() -> Self {
        Self {
            tag: default_tag(),
            database: DatabaseConfig {
                backend: DatabaseKind::Memory.to_string(),
                options: Value::Null,
            },
        }
    }

    /// Redis backend at `url`, default tag.
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            tag: default_tag(),
            database: DatabaseConfig {
                backend: DatabaseKind::Redis.to_string(),
                options: serde_json::json!({ "url": url.into() }),
            },
        }
    }

    /// Key encoder for the configured tag.
    pub fn key_encoder(&self) -> KeyEncoder {
        KeyEncoder::new(self.tag.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names_are_case_insensitive() {
        for name in ["Memory", "memory", "MEMORY", " Memory "] {
            assert_eq!(DatabaseKind::from_str_case_insensitive(name).unwrap(), DatabaseKind::Memory);
        }
        for name in ["Redis", "redis", "rEdIs"] {
            assert_eq!(DatabaseKind::from_str_case_insensitive(name).unwrap(), DatabaseKind::Redis);
        }
    }

    #[test]
    fn test_unknown_backend_is_a_configuration_error() {
        let config: Config =
            serde_json::from_str(r#"{"database": {"type": "Mongo"}}"#).unwrap();
        match config.database.kind() {
            Err(ConfigurationError::UnknownBackend { kind }) => assert_eq!(kind, "Mongo"),
            other => panic!("expected UnknownBackend, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tag, "SL");
        assert_eq!(config.database.kind().unwrap(), DatabaseKind::Memory);
        assert_eq!(config.key_encoder().tag(), "SL");
    }

    #[test]
    fn test_redis_constructor_carries_url() {
        let config = Config::redis("redis://cache:6379/2");
        assert_eq!(config.database.kind().unwrap(), DatabaseKind::Redis);
        assert_eq!(config.database.options["url"], "redis://cache:6379/2");
    }
}
