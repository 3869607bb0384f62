//! Gatekeeper server library.
//!
//! Provides the gate middleware, identity backends and token codec, plus a
//! reusable server function for the binary and the integration tests.

#![deny(missing_docs)]

pub mod gate;
mod health;
pub mod identity;
pub mod token;
mod whoami;

use std::{net::SocketAddr, sync::Arc};

use anyhow::anyhow;
use axum::{Router, routing::get};
use config::Config;
use rate_limit::{Limiter, RuleRegistry, RuleRegistryBuilder};
use tokio::net::TcpListener;

pub use gate::GateLayer;
pub use identity::{BackendChain, Identity};
pub use token::{ClaimMap, TokenCodec};

/// Configuration for serving Gatekeeper.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized Gatekeeper TOML configuration.
    pub config: Config,
}

/// Build the gate from configuration.
///
/// `declarations` holds rules declared in code; they are merged with the
/// `[[routes]]` section of the configuration.
pub async fn gate_layer(config: &Config, declarations: RuleRegistryBuilder) -> anyhow::Result<GateLayer> {
    let registry = declarations.merge(RuleRegistry::builder().routes(&config.routes)).build()?;

    let codec = match &config.token {
        Some(token) => Some(Arc::new(TokenCodec::new(token)?)),
        None => None,
    };

    let chain = BackendChain::from_config(&config.identity, codec)?;

    if chain.is_empty() {
        anyhow::bail!("identity.chain must name at least one backend");
    }

    log::debug!("Resolving identities through {} backend(s)", chain.len());

    let limiter = if config.rate_limits.enabled {
        log::debug!("Initializing rate limiter for {} protected route(s)", registry.len());
        Some(Limiter::new(&config.rate_limits).await?)
    } else {
        log::debug!("Rate limiting disabled - identities are resolved but no limit is enforced");
        None
    };

    Ok(GateLayer::new(
        registry.shared(),
        chain,
        limiter,
        config.rate_limits.fail_open,
    ))
}

/// The router served by the binary: the built-in routes behind the gate,
/// and the health endpoint outside of it.
pub async fn router(config: &Config) -> anyhow::Result<Router> {
    let gate = gate_layer(config, RuleRegistry::builder()).await?;
    let mut app = Router::new().route("/whoami", get(whoami::whoami)).layer(gate);

    if config.server.health.enabled {
        app = app.merge(Router::new().route(&config.server.health.path, get(health::health)));
    }

    Ok(app)
}

/// Starts and runs the Gatekeeper server with the provided configuration.
pub async fn serve(ServeConfig { listen_address, config }: ServeConfig) -> anyhow::Result<()> {
    let app = router(&config).await?;

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    log::info!("Gatekeeper listening on http://{listen_address}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode, header::COOKIE};
    use indoc::indoc;
    use tower::ServiceExt;

    use super::*;

    async fn get(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn parse(toml: &str) -> Config {
        let config: Config = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        config
    }

    #[tokio::test]
    async fn whoami_echoes_the_resolved_identity() {
        let config = parse(indoc! {r#"
            [identity]
            chain = ["session"]

            [[routes]]
            path = "/whoami"
            operation = "gatekeeper::whoami"

            [[routes.limits]]
            capacity = 10
            window = "60s"
        "#});

        let app = router(&config).await.unwrap();
        let request = Request::builder()
            .uri("/whoami")
            .header(COOKIE, "th-session=abc")
            .body(Body::empty())
            .unwrap();

        let (status, body) = get(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        insta::assert_snapshot!(body, @r#"{"identifier":"anon:abc","scopes":["anonymous"],"identity":{"kind":"anonymous","id":"abc"}}"#);
    }

    #[tokio::test]
    async fn unprotected_whoami_has_no_identity() {
        let config = parse(indoc! {r#"
            [identity]
            chain = ["session"]
        "#});

        let app = router(&config).await.unwrap();
        let (status, body) = get(&app, Request::builder().uri("/whoami").body(Body::empty()).unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        insta::assert_snapshot!(body, @r#"{"identifier":null,"scopes":[],"identity":null}"#);
    }

    #[tokio::test]
    async fn health_is_never_gated() {
        let config = parse(indoc! {r#"
            [identity]
            chain = ["session"]

            [[routes]]
            path = "/whoami"

            [[routes.limits]]
            capacity = 1
            window = "60s"
        "#});

        let app = router(&config).await.unwrap();

        for _ in 0..3 {
            let (status, body) = get(&app, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, r#"{"status":"healthy"}"#);
        }
    }

    #[tokio::test]
    async fn invalid_rule_fails_startup() {
        let mut config = parse(indoc! {r#"
            [identity]
            chain = ["session"]
        "#});

        config.routes.push(config::RouteConfig {
            path: "/whoami".into(),
            operation: None,
            limits: vec![config::LimitConfig {
                capacity: 1,
                window: std::time::Duration::from_secs(1),
                key: None,
                methods: Some(Vec::new()),
                scopes: None,
            }],
        });

        let error = router(&config).await.err().unwrap();

        insta::assert_snapshot!(error, @"Method filter on rule '/whoami' is empty; omit it to match every method");
    }

    #[tokio::test]
    async fn empty_identity_chain_fails_startup() {
        let mut config = parse(indoc! {r#"
            [identity]
            chain = ["session"]
        "#});

        config.identity.chain.clear();

        let error = router(&config).await.err().unwrap();

        insta::assert_snapshot!(error, @"identity.chain must name at least one backend");
    }
}
