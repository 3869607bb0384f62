//! Stateless signing and verification of claim-bearing tokens.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use config::{TokenAlgorithm, TokenConfig};
use jwt_compact::{
    Algorithm, AlgorithmExt, Claims, Header, TimeOptions, Token, UntrustedToken,
    alg::{Es256, Hs256, Hs256Key, Hs384, Hs384Key, Hs512, Hs512Key, SigningKey},
};
use secrecy::ExposeSecret;
use serde_json::Value;

/// A JSON claim map.
pub type ClaimMap = serde_json::Map<String, Value>;

/// Errors raised while building a codec or minting a token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The configured secret is not a usable key for the algorithm.
    #[error("Invalid {algorithm} signing key: {reason}")]
    InvalidKey {
        /// Configured algorithm.
        algorithm: TokenAlgorithm,
        /// Why the key was rejected.
        reason: String,
    },

    /// A system-managed claim holds a value of the wrong type.
    #[error("Claim '{0}' must be an integer timestamp")]
    InvalidClaim(&'static str),

    /// Signing failed.
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

enum Keys {
    Hs256(Hs256Key),
    Hs384(Hs384Key),
    Hs512(Hs512Key),
    Es256 {
        signing: <Es256 as Algorithm>::SigningKey,
        verifying: <Es256 as Algorithm>::VerifyingKey,
    },
}

/// Signs and verifies tokens with one configured algorithm and key.
pub struct TokenCodec {
    algorithm: TokenAlgorithm,
    keys: Keys,
    ttl: Duration,
    time_options: TimeOptions,
}

impl TokenCodec {
    /// Build a codec from the `[token]` configuration section.
    pub fn new(config: &TokenConfig) -> Result<Self, TokenError> {
        let secret = config.secret.expose_secret();
        let algorithm = config.algorithm;

        let invalid = |reason: String| TokenError::InvalidKey { algorithm, reason };

        if secret.is_empty() {
            return Err(invalid("secret is empty".into()));
        }

        let keys = match algorithm {
            TokenAlgorithm::HS256 => Keys::Hs256(Hs256Key::new(secret.as_bytes())),
            TokenAlgorithm::HS384 => Keys::Hs384(Hs384Key::new(secret.as_bytes())),
            TokenAlgorithm::HS512 => Keys::Hs512(Hs512Key::new(secret.as_bytes())),
            TokenAlgorithm::ES256 => {
                let raw = STANDARD
                    .decode(secret.trim())
                    .map_err(|e| invalid(format!("secret is not base64: {e}")))?;

                let signing = <Es256 as Algorithm>::SigningKey::from_slice(&raw).map_err(|e| invalid(e.to_string()))?;
                let verifying = signing.to_verifying_key();

                Keys::Es256 { signing, verifying }
            }
        };

        let leeway = chrono::Duration::from_std(config.leeway).map_err(|e| invalid(format!("leeway: {e}")))?;

        Ok(Self {
            algorithm,
            keys,
            ttl: config.ttl,
            time_options: TimeOptions::from_leeway(leeway),
        })
    }

    /// The configured algorithm.
    pub fn algorithm(&self) -> TokenAlgorithm {
        self.algorithm
    }

    /// The configured default lifetime of minted tokens.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a copy of `claims`. `exp`, `iat` and `jti` are filled in when the
    /// caller did not set them; caller values are kept as they are.
    pub fn encode(&self, claims: &ClaimMap, ttl: Duration) -> Result<String, TokenError> {
        let mut claims = claims.clone();
        let now = chrono::Utc::now().timestamp();

        let ttl = i64::try_from(ttl.as_secs()).map_err(|_| TokenError::InvalidClaim("exp"))?;

        claims
            .entry("exp")
            .or_insert_with(|| Value::from(now.saturating_add(ttl)));

        claims.entry("iat").or_insert_with(|| Value::from(now));

        claims
            .entry("jti")
            .or_insert_with(|| Value::from(uuid::Uuid::new_v4().simple().to_string()));

        for name in ["exp", "iat", "nbf"] {
            if claims.get(name).is_some_and(|value| !value.is_i64()) {
                return Err(TokenError::InvalidClaim(name));
            }
        }

        let claims = Claims::new(claims);
        let header = Header::empty().with_token_type("JWT");

        let token = match &self.keys {
            Keys::Hs256(key) => Hs256.token(&header, &claims, key),
            Keys::Hs384(key) => Hs384.token(&header, &claims, key),
            Keys::Hs512(key) => Hs512.token(&header, &claims, key),
            Keys::Es256 { signing, .. } => Es256.token(&header, &claims, signing),
        };

        token.map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token and return its claims. Any failure yields `None`.
    pub fn decode(&self, token: &str) -> Option<ClaimMap> {
        let untrusted = match UntrustedToken::new(token) {
            Ok(untrusted) => untrusted,
            Err(e) => {
                log::debug!("Rejecting malformed token: {e}");
                return None;
            }
        };

        if untrusted.algorithm() != self.algorithm.as_str() {
            log::debug!(
                "Rejecting token signed with {}, expected {}",
                untrusted.algorithm(),
                self.algorithm
            );

            return None;
        }

        let validated = match &self.keys {
            Keys::Hs256(key) => Hs256.validator::<ClaimMap>(key).validate(&untrusted),
            Keys::Hs384(key) => Hs384.validator::<ClaimMap>(key).validate(&untrusted),
            Keys::Hs512(key) => Hs512.validator::<ClaimMap>(key).validate(&untrusted),
            Keys::Es256 { verifying, .. } => Es256.validator::<ClaimMap>(verifying).validate(&untrusted),
        };

        let token = match validated {
            Ok(token) => token,
            Err(e) => {
                log::debug!("Rejecting token with invalid signature: {e}");
                return None;
            }
        };

        self.check_time(token)
    }

    fn check_time(&self, token: Token<ClaimMap>) -> Option<ClaimMap> {
        let claims = token.claims();

        if let Err(e) = claims.validate_expiration(&self.time_options) {
            log::debug!("Rejecting token: {e}");
            return None;
        }

        if claims.not_before.is_some()
            && let Err(e) = claims.validate_maturity(&self.time_options)
        {
            log::debug!("Rejecting token: {e}");
            return None;
        }

        let Claims {
            expiration,
            not_before,
            issued_at,
            custom: mut map,
            ..
        } = token.into_parts().1;

        for (name, time) in [("exp", expiration), ("nbf", not_before), ("iat", issued_at)] {
            if let Some(time) = time {
                map.insert(name.to_string(), Value::from(time.timestamp()));
            }
        }

        Some(map)
    }
}
