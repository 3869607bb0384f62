//! Signed token configuration.

use std::{fmt, time::Duration};

use duration_str::deserialize_duration;
use secrecy::SecretString;
use serde::Deserialize;

/// Signed token configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    /// Signing algorithm.
    #[serde(default)]
    pub algorithm: TokenAlgorithm,
    /// Signing secret. A raw string for HMAC algorithms, a base64 encoded
    /// 32 byte private scalar for `ES256`.
    pub secret: SecretString,
    /// Lifetime of minted tokens when the caller does not set `exp`.
    #[serde(default = "default_ttl", deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
    /// Clock skew tolerated when checking `exp` and `nbf`.
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub leeway: Duration,
}

fn default_ttl() -> Duration {
    Duration::from_secs(15 * 60)
}

/// Supported token signing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TokenAlgorithm {
    /// HMAC with SHA-256.
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
    /// ECDSA over P-256 with SHA-256.
    #[default]
    ES256,
}

impl TokenAlgorithm {
    /// The `alg` header value for this algorithm.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenAlgorithm::HS256 => "HS256",
            TokenAlgorithm::HS384 => "HS384",
            TokenAlgorithm::HS512 => "HS512",
            TokenAlgorithm::ES256 => "ES256",
        }
    }
}

impl fmt::Display for TokenAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
