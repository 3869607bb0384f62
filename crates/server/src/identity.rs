//! Resolving who is making a request.

mod ip;
mod session;
mod token;

use std::sync::Arc;

use axum::body::Body;
use config::{BackendKind, IdentityConfig};
use http::{Response, request::Parts};
use serde::Serialize;
use serde_json::Value;

use crate::token::{ClaimMap, TokenCodec};

pub use ip::IpBackend;
pub use session::{AnonymousSessionBackend, SessionBackend};
pub use token::TokenBackend;

/// Scope held by every anonymous caller.
pub const ANONYMOUS_SCOPE: &str = "anonymous";

/// The caller of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Identity {
    /// A caller known only by a session token or network address.
    Anonymous {
        /// Session token or address.
        id: String,
    },
    /// A caller holding a validated token.
    Authenticated {
        /// The validated claims.
        claims: ClaimMap,
    },
}

impl Identity {
    /// The identifier counters are kept under.
    pub fn identifier(&self) -> String {
        match self {
            Identity::Anonymous { id } => format!("anon:{id}"),
            Identity::Authenticated { claims } => {
                let subject = ["sub", "jti"]
                    .iter()
                    .find_map(|name| claims.get(*name).and_then(claim_to_string));

                match subject {
                    Some(subject) => format!("user:{subject}"),
                    None => "user:unknown".to_string(),
                }
            }
        }
    }

    /// Scopes of the caller. Anonymous callers hold only [`ANONYMOUS_SCOPE`].
    ///
    /// Authenticated scopes come from the `scope` claim, either a
    /// space-separated string or an array, or from `scopes`.
    pub fn scopes(&self) -> Vec<String> {
        match self {
            Identity::Anonymous { .. } => vec![ANONYMOUS_SCOPE.to_string()],
            Identity::Authenticated { claims } => {
                let Some(value) = claims.get("scope").or_else(|| claims.get("scopes")) else {
                    return Vec::new();
                };

                match value {
                    Value::String(s) => s.split_whitespace().map(str::to_string).collect(),
                    Value::Array(values) => values.iter().filter_map(claim_to_string).collect(),
                    _ => Vec::new(),
                }
            }
        }
    }
}

fn claim_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A strategy for deriving an identity from a request.
///
/// Absence of an identity is a normal outcome, not an error.
pub trait IdentityBackend: Send + Sync {
    /// Resolve the caller, if this backend can.
    fn authenticate(&self, parts: &Parts) -> Option<Identity>;
}

/// A backend that can mint a new identity when none was resolved.
pub trait IssuingBackend: IdentityBackend {
    /// Build the response that hands the client a new identity.
    fn issue(&self, parts: &Parts) -> Response<Body>;
}

/// Outcome of running the backend chain.
#[derive(Debug)]
pub enum Resolution {
    /// A backend resolved the caller.
    Resolved(Identity),
    /// No backend resolved the caller and the issuer answered instead.
    Issue(Response<Body>),
    /// No backend resolved the caller and there is no issuer.
    Unresolved,
}

/// Ordered identity backends, tried first to last.
#[derive(Clone, Default)]
pub struct BackendChain {
    backends: Vec<Arc<dyn IdentityBackend>>,
    issuer: Option<Arc<dyn IssuingBackend>>,
}

impl BackendChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a backend to the chain.
    pub fn with(mut self, backend: impl IdentityBackend + 'static) -> Self {
        self.backends.push(Arc::new(backend));
        self
    }

    /// Append an issuing backend. It is tried in order like any other
    /// backend, and takes over when no backend resolves the caller.
    pub fn with_issuer(mut self, backend: impl IssuingBackend + 'static) -> Self {
        let backend = Arc::new(backend);

        self.backends.push(backend.clone());
        self.issuer = Some(backend);

        self
    }

    /// Build the chain named by `identity.chain`.
    pub fn from_config(config: &IdentityConfig, codec: Option<Arc<TokenCodec>>) -> anyhow::Result<Self> {
        let mut chain = Self::new();

        for kind in &config.chain {
            chain = match kind {
                BackendKind::Token => {
                    let Some(codec) = codec.clone() else {
                        anyhow::bail!("The token backend needs a [token] section");
                    };

                    chain.with(TokenBackend::new(codec))
                }
                BackendKind::Session if config.session.issue => {
                    chain.with_issuer(AnonymousSessionBackend::new(config.session.clone()))
                }
                BackendKind::Session => chain.with(SessionBackend::new(config.session.cookie_name.clone())),
                BackendKind::Ip => chain.with(IpBackend::new(config.trust_forwarded_headers)),
            };
        }

        Ok(chain)
    }

    /// Number of backends in the chain.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether the chain has no backend.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Run the chain. The first backend that resolves the caller wins.
    pub fn resolve(&self, parts: &Parts) -> Resolution {
        if let Some(identity) = self.backends.iter().find_map(|backend| backend.authenticate(parts)) {
            return Resolution::Resolved(identity);
        }

        match &self.issuer {
            Some(issuer) => Resolution::Issue(issuer.issue(parts)),
            None => Resolution::Unresolved,
        }
    }
}
