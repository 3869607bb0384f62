use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use http::request::Parts;

use super::{Identity, IdentityBackend};

/// Identifies callers by their network address.
pub struct IpBackend {
    trust_forwarded_headers: bool,
}

impl IpBackend {
    /// With `trust_forwarded_headers`, `X-Forwarded-For` (first hop) and then
    /// `X-Real-IP` take precedence over the peer address. Only enable this
    /// behind a proxy that overwrites those headers.
    pub fn new(trust_forwarded_headers: bool) -> Self {
        Self { trust_forwarded_headers }
    }

    fn forwarded_address(parts: &Parts) -> Option<IpAddr> {
        if let Some(forwarded_for) = parts.headers.get("x-forwarded-for") {
            let first = forwarded_for.to_str().ok()?.split(',').next()?;

            return first.trim().parse().ok();
        }

        parts.headers.get("x-real-ip")?.to_str().ok()?.trim().parse().ok()
    }
}

impl IdentityBackend for IpBackend {
    fn authenticate(&self, parts: &Parts) -> Option<Identity> {
        let forwarded = if self.trust_forwarded_headers {
            Self::forwarded_address(parts)
        } else {
            None
        };

        let address = forwarded.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })?;

        Some(Identity::Anonymous { id: address.to_string() })
    }
}
