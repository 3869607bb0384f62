//! Limiter and counter store configuration.

use std::{path::PathBuf, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Limiter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Enforce throttle rules. When off, identities are still resolved.
    pub enabled: bool,
    /// Forward requests when the counter store fails instead of answering
    /// with an error.
    pub fail_open: bool,
    /// Prepended to every counter key.
    pub key_prefix: String,
    /// Where counters live.
    pub storage: StorageConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_open: false,
            key_prefix: "gatekeeper:throttle:".to_string(),
            storage: StorageConfig::default(),
        }
    }
}

/// Counter store selection.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Counters kept in this process. Instances do not share them.
    #[default]
    Memory,
    /// Counters kept in Redis, shared by every instance using the same
    /// server and key prefix.
    Redis(Box<RedisConfig>),
}

/// Redis counter store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisConfig {
    /// `redis://` or `rediss://` URL.
    pub url: String,
    /// Connection pool settings.
    pub pool: RedisPoolConfig,
    /// Certificates for `rediss://` URLs.
    pub tls: Option<RedisTlsConfig>,
    /// Upper bound on one evaluation round-trip.
    #[serde(deserialize_with = "deserialize_duration")]
    pub response_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            pool: RedisPoolConfig::default(),
            tls: None,
            response_timeout: Duration::from_secs(1),
        }
    }
}

/// Redis connection pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisPoolConfig {
    /// Connections kept open at most.
    pub max_connections: usize,
    /// Time allowed to open a new connection.
    #[serde(deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,
    /// Time a caller waits for a free connection.
    #[serde(deserialize_with = "deserialize_duration")]
    pub wait_timeout: Duration,
    /// Time allowed for the health check of an idle connection.
    #[serde(deserialize_with = "deserialize_duration")]
    pub recycle_timeout: Duration,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            connect_timeout: Duration::from_secs(5),
            wait_timeout: Duration::from_secs(5),
            recycle_timeout: Duration::from_secs(300),
        }
    }
}

/// Certificates for a TLS connection to Redis.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisTlsConfig {
    /// Skip server certificate verification.
    pub insecure: bool,
    /// CA bundle, PEM encoded.
    pub ca_cert: Option<PathBuf>,
    /// Client certificate for mutual TLS. Requires `client_key`.
    pub client_cert: Option<PathBuf>,
    /// Client key for mutual TLS. Requires `client_cert`.
    pub client_key: Option<PathBuf>,
}
