//! The middleware that enforces throttle rules on protected operations.

use std::{
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use axum::{
    Json,
    body::Body,
    extract::MatchedPath,
    response::{IntoResponse, Response},
};
use http::{HeaderValue, Request, StatusCode, header::RETRY_AFTER};
use rate_limit::{Limiter, RuleRegistry};
use serde::Serialize;
use tower::Layer;

use crate::identity::{ANONYMOUS_SCOPE, BackendChain, Resolution};

/// Counter identifier shared by every caller no backend could identify.
pub const UNIDENTIFIED: &str = "unidentified";

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    error_description: String,
}

fn too_many_requests(retry_after: Duration) -> Response {
    let seconds = retry_after.as_secs();

    let body = ErrorResponse {
        error: "too_many_requests",
        error_description: format!("Rate limit exceeded, retry in {seconds} seconds"),
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(seconds));

    response
}

fn internal_error() -> Response {
    let body = ErrorResponse {
        error: "internal_server_error",
        error_description: "An internal error occurred".to_string(),
    };

    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

/// Applies the [`Gate`](GateService) to every route of a router.
///
/// Add it with `Router::layer` so the matched route is known when it runs.
#[derive(Clone)]
pub struct GateLayer(Arc<GateInner>);

struct GateInner {
    registry: Arc<RuleRegistry>,
    chain: BackendChain,
    limiter: Option<Limiter>,
    fail_open: bool,
}

impl GateLayer {
    /// Enforce `registry` with callers resolved by `chain`.
    ///
    /// Without a limiter, identities are still resolved and issued but no
    /// limit is enforced. With `fail_open`, requests are forwarded when the
    /// limiter fails instead of being answered with an error.
    pub fn new(registry: Arc<RuleRegistry>, chain: BackendChain, limiter: Option<Limiter>, fail_open: bool) -> Self {
        Self(Arc::new(GateInner {
            registry,
            chain,
            limiter,
            fail_open,
        }))
    }
}

impl<Service> Layer<Service> for GateLayer
where
    Service: Send + Clone,
{
    type Service = GateService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        GateService {
            next,
            gate: self.0.clone(),
        }
    }
}

/// Per-request orchestration: route lookup, rule lookup, identity
/// resolution, then either a limit check or identity issuance.
#[derive(Clone)]
pub struct GateService<Service> {
    next: Service,
    gate: Arc<GateInner>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for GateService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let gate = self.gate.clone();

        let (mut parts, body) = req.into_parts();

        Box::pin(async move {
            let Some(path) = parts.extensions.get::<MatchedPath>().map(|path| path.as_str().to_string()) else {
                return next.call(Request::from_parts(parts, body)).await;
            };

            let Some(rules) = gate.registry.rules_for(&path) else {
                return next.call(Request::from_parts(parts, body)).await;
            };

            let identity = match gate.chain.resolve(&parts) {
                Resolution::Resolved(identity) => Some(identity),
                Resolution::Issue(response) => return Ok(response),
                Resolution::Unresolved => None,
            };

            let (identifier, scopes) = match &identity {
                Some(identity) => (identity.identifier(), identity.scopes()),
                None => (UNIDENTIFIED.to_string(), vec![ANONYMOUS_SCOPE.to_string()]),
            };

            let applicable = rules.applicable(&parts.method, &scopes);

            if let Some(limiter) = &gate.limiter
                && !applicable.is_empty()
            {
                match limiter.check(&identifier, &applicable).await {
                    Ok(evaluation) if evaluation.is_denied() => {
                        let retry_after = evaluation.retry_after().unwrap_or_default();

                        log::debug!(
                            "Throttled {} {path} for '{identifier}', retry in {}s",
                            parts.method,
                            retry_after.as_secs()
                        );

                        return Ok(too_many_requests(retry_after));
                    }
                    Ok(_) => (),
                    Err(e) if gate.fail_open => {
                        log::warn!("Rate limiter failed, forwarding {} {path} unchecked: {e}", parts.method);
                    }
                    Err(e) => {
                        log::error!("Rate limiter failed for {} {path}: {e}", parts.method);
                        return Ok(internal_error());
                    }
                }
            }

            if let Some(identity) = identity {
                parts.extensions.insert(identity);
            }

            next.call(Request::from_parts(parts, body)).await
        })
    }
}
