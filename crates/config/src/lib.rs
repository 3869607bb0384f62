//! Gatekeeper configuration structures to map the gatekeeper.toml configuration.

#![deny(missing_docs)]

mod health;
mod identity;
mod loader;
mod rate_limit;
mod routes;
mod server;
mod token;

use std::path::Path;

pub use health::HealthConfig;
pub use identity::{BackendKind, IdentityConfig, SameSite, SessionConfig};
pub use rate_limit::*;
pub use routes::{LimitConfig, RouteConfig};
pub use server::ServerConfig;
pub use token::{TokenAlgorithm, TokenConfig};

use serde::Deserialize;

/// Main configuration structure for the Gatekeeper application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    /// Identity resolution configuration.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Signed token configuration. Required when the token backend is in the chain.
    pub token: Option<TokenConfig>,
    /// Throttle rules declared per route.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates cross-section constraints that serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}
