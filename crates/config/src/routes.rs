//! Per-route throttle rule declarations.

use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Throttle rules attached to one route.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Route path template as registered with the router, e.g. `/users/{id}`.
    pub path: String,
    /// Fully-qualified operation name. Used as the default rule key.
    pub operation: Option<String>,
    /// Rules for this route.
    #[serde(default)]
    pub limits: Vec<LimitConfig>,
}

/// One throttle rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitConfig {
    /// Requests admitted per window.
    pub capacity: u32,
    /// Sliding window length. Must be a whole number of seconds.
    #[serde(deserialize_with = "deserialize_duration")]
    pub window: Duration,
    /// Counter key. Defaults to the operation name.
    pub key: Option<String>,
    /// HTTP methods the rule applies to. All methods when omitted.
    pub methods: Option<Vec<String>>,
    /// Identity scopes the rule applies to. All scopes when omitted.
    pub scopes: Option<Vec<String>>,
}
