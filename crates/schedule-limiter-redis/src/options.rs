// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Redis connection options, read from `database.options`.

use redis::{ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo};
use schedule_limiter_core::ConfigurationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection settings for [`RedisStore`](crate::storage::redis::RedisStore).
///
/// When `url` is set it wins over every other field.  Otherwise the fields
/// are handed to the client as-is, so credentials need no URL escaping.
///
/// ```rust
/// use redis::ConnectionAddr;
/// use schedule_limiter_redis::RedisOptions;
///
/// let options = RedisOptions::from_value(&serde_json::json!({ "port": 6380, "db": 2 })).unwrap();
/// let info = options.connection_info().unwrap();
/// assert_eq!(info.addr, ConnectionAddr::Tcp("127.0.0.1".into(), 6380));
/// assert_eq!(info.redis.db, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisOptions {
    /// Full `redis://` URL.
    #[serde(default)]
    pub url: Option<String>,

    /// Host name or address.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logical database index.
    #[serde(default)]
    pub db: i64,

    /// ACL user name.
    #[serde(default)]
    pub username: Option<String>,

    /// Password (or ACL password).
    #[serde(default)]
    pub password: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    6379
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            db: 0,
            username: None,
            password: None,
        }
    }
}

impl RedisOptions {
    /// Interpret a `database.options` value.  `null` means all defaults.
    pub fn from_value(value: &Value) -> Result<Self, ConfigurationError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone()).map_err(|error| ConfigurationError::InvalidOptions {
            backend: "redis",
            reason: error.to_string(),
        })
    }

    /// Connection parameters handed to the Redis client.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidOptions`] if `url` does not parse.
    pub fn connection_info(&self) -> Result<ConnectionInfo, ConfigurationError> {
        if let Some(url) = &self.url {
            return url
                .as_str()
                .into_connection_info()
                .map_err(|error| ConfigurationError::InvalidOptions {
                    backend: "redis",
                    reason: error.to_string(),
                });
        }
        Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                username: self.username.clone(),
                password: self.password.clone(),
                ..RedisConnectionInfo::default()
            },
        })
    }
}
