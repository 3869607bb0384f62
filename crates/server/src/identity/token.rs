use std::sync::Arc;

use http::{header::AUTHORIZATION, request::Parts};

use super::{Identity, IdentityBackend};
use crate::token::TokenCodec;

const BEARER: &str = "bearer";

/// Identifies callers by a validated `Authorization: Bearer` token.
pub struct TokenBackend {
    codec: Arc<TokenCodec>,
}

impl TokenBackend {
    /// Validate tokens with `codec`.
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }
}

/// The token of a `Bearer` authorization header. The scheme is case-insensitive.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case(BEARER) {
        return None;
    }

    let token = token.trim();

    (!token.is_empty()).then_some(token)
}

impl IdentityBackend for TokenBackend {
    fn authenticate(&self, parts: &Parts) -> Option<Identity> {
        let token = bearer_token(parts)?;
        let claims = self.codec.decode(token)?;

        Some(Identity::Authenticated { claims })
    }
}
