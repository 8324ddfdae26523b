// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Configuration loader for [`Config`].
//!
//! Supports two load strategies:
//!
//! 1. **TOML file**: [`load_config`] reads and deserialises a TOML file.
//! 2. **Environment variables**: [`load_config_from_env`] reads
//!    `SCHEDULE_LIMITER_`-prefixed variables.
//!
//! Both loaders validate the backend name before returning, so an unknown
//! `type` fails here rather than on first use.
//!
//! # File format
//!
//! ```toml
//! tag = "SL"
//!
//! [database]
//! type = "Redis"
//!
//! [database.options]
//! host = "127.0.0.1"
//! port = 6379
//! ```
//!
//! # Environment variables
//!
//! | Variable                          | Type    | Default    |
//! |-----------------------------------|---------|------------|
//! | `SCHEDULE_LIMITER_TAG`            | string  | `"SL"`     |
//! | `SCHEDULE_LIMITER_DATABASE_TYPE`  | string  | `"memory"` |
//! | `SCHEDULE_LIMITER_REDIS_URL`      | string  | unset      |
//! | `SCHEDULE_LIMITER_REDIS_HOST`     | string  | unset      |
//! | `SCHEDULE_LIMITER_REDIS_PORT`     | u16     | unset      |

#![cfg(feature = "config-loader")]

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::config::{Config, DatabaseConfig, DatabaseKind};
use crate::error::ConfigurationError;

/// Variable name prefix.
pub const ENV_PREFIX: &str = "SCHEDULE_LIMITER_";

// ---------------------------------------------------------------------------
// TOML loader
// ---------------------------------------------------------------------------

/// Load a [`Config`] from a TOML file.
///
/// # Errors
///
/// [`ConfigurationError::FileRead`] if the file cannot be read,
/// [`ConfigurationError::TomlParse`] if it does not match the schema, and
/// [`ConfigurationError::UnknownBackend`] if `database.type` is not a known
/// backend.
///
/// # Example
///
/// ```rust,no_run
/// use schedule_limiter_core::config_loader::load_config;
///
/// let config = load_config("/etc/schedule-limiter/limiter.toml").unwrap();
/// println!("backend: {}", config.database.backend);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigurationError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigurationError::FileRead {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&content)
}

/// Parse TOML text into a validated [`Config`].
pub fn parse_config(content: &str) -> Result<Config, ConfigurationError> {
    let config: Config =
        toml::from_str(content).map_err(|source| ConfigurationError::TomlParse { source })?;
    config.database.kind()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable loader
// ---------------------------------------------------------------------------

/// Load a [`Config`] from `SCHEDULE_LIMITER_`-prefixed environment
/// variables.  Unset variables fall back to their defaults.
///
/// # Errors
///
/// [`ConfigurationError::UnknownBackend`] for an unknown backend name and
/// [`ConfigurationError::ParseField`] for a malformed port.
pub fn load_config_from_env() -> Result<Config, ConfigurationError> {
    load_config_with(|key| std::env::var(key).ok())
}

/// Same as [`load_config_from_env`], with an injectable variable lookup.
pub fn load_config_with<F>(lookup: F) -> Result<Config, ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    let mut config = Config::default();
    if let Some(tag) = var("TAG") {
        config.tag = tag;
    }

    let backend = var("DATABASE_TYPE").unwrap_or_else(|| DatabaseKind::Memory.to_string());
    let kind = DatabaseKind::from_str_case_insensitive(&backend)?;

    let mut options = Map::new();
    if kind == DatabaseKind::Redis {
        if let Some(url) = var("REDIS_URL") {
            options.insert("url".into(), Value::String(url));
        }
        if let Some(host) = var("REDIS_HOST") {
            options.insert("host".into(), Value::String(host));
        }
        if let Some(port) = var("REDIS_PORT") {
            let parsed = port.trim().parse::<u16>().map_err(|source| {
                ConfigurationError::ParseField {
                    field: format!("{ENV_PREFIX}REDIS_PORT"),
                    value: port.clone(),
                    reason: source.to_string(),
                }
            })?;
            options.insert("port".into(), Value::from(parsed));
        }
    }

    config.database = DatabaseConfig {
        backend,
        options: if options.is_empty() {
            Value::Null
        } else {
            Value::Object(options)
        },
    };
    Ok(config)
}
