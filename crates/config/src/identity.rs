//! Identity resolution configuration.

use std::{borrow::Cow, fmt, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Identity resolution configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Backends tried in order; the first one that resolves an identity wins.
    pub chain: Vec<BackendKind>,
    /// Trust `X-Forwarded-For` and `X-Real-IP` when resolving the client address.
    pub trust_forwarded_headers: bool,
    /// Session cookie settings used by the session backend.
    pub session: SessionConfig,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            chain: vec![BackendKind::Token, BackendKind::Session],
            trust_forwarded_headers: false,
            session: SessionConfig::default(),
        }
    }
}

/// The kind of identity backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Validated bearer token from the `Authorization` header.
    Token,
    /// Anonymous session cookie.
    Session,
    /// Originating network address.
    Ip,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Token => f.write_str("token"),
            BackendKind::Session => f.write_str("session"),
            BackendKind::Ip => f.write_str("ip"),
        }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Name of the cookie carrying the session identifier.
    pub cookie_name: Cow<'static, str>,
    /// Mint a new session and redirect when a request carries none.
    pub issue: bool,
    /// `Max-Age` of issued cookies.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_age: Duration,
    /// Mark issued cookies `Secure`.
    pub secure: bool,
    /// Mark issued cookies `HttpOnly`.
    pub http_only: bool,
    /// `SameSite` attribute of issued cookies.
    pub same_site: SameSite,
    /// `Path` attribute of issued cookies.
    pub path: Cow<'static, str>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: Cow::Borrowed("th-session"),
            issue: true,
            max_age: Duration::from_secs(14 * 24 * 60 * 60),
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
            path: Cow::Borrowed("/"),
        }
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// `SameSite=Strict`
    Strict,
    /// `SameSite=Lax`
    #[default]
    Lax,
    /// `SameSite=None`
    None,
}
