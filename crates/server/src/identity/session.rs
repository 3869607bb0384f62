use std::{borrow::Cow, sync::Arc};

use axum::body::Body;
use config::{SameSite, SessionConfig};
use cookie::Cookie;
use http::{
    HeaderValue, Response, StatusCode,
    header::{COOKIE, LOCATION, SET_COOKIE},
    request::Parts,
};

use super::{Identity, IdentityBackend, IssuingBackend};

/// Identifies callers by the value of a named cookie.
pub struct SessionBackend {
    cookie_name: Cow<'static, str>,
}

impl SessionBackend {
    /// Read the session from the cookie called `cookie_name`.
    pub fn new(cookie_name: Cow<'static, str>) -> Self {
        Self { cookie_name }
    }

    fn session(&self, parts: &Parts) -> Option<String> {
        parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.cookie_name)
            .map(|cookie| cookie.value_trimmed().to_string())
            .filter(|value| !value.is_empty())
    }
}

impl IdentityBackend for SessionBackend {
    fn authenticate(&self, parts: &Parts) -> Option<Identity> {
        self.session(parts).map(|id| Identity::Anonymous { id })
    }
}

type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// A session backend that mints a session when the caller has none.
///
/// Issuing answers with a `307 Temporary Redirect` back to the same path and
/// query, setting the new session cookie, so the client retries with it.
pub struct AnonymousSessionBackend {
    session: SessionBackend,
    config: SessionConfig,
    generate_id: IdGenerator,
}

impl AnonymousSessionBackend {
    /// Sessions are random UUIDs rendered as 32 hex digits.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_id_generator(config, || uuid::Uuid::new_v4().simple().to_string())
    }

    /// Use `generate_id` to mint session identifiers.
    pub fn with_id_generator(config: SessionConfig, generate_id: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self {
            session: SessionBackend::new(config.cookie_name.clone()),
            config,
            generate_id: Arc::new(generate_id),
        }
    }

    fn cookie(&self, id: String) -> Cookie<'static> {
        let config = &self.config;

        let same_site = match config.same_site {
            SameSite::Strict => cookie::SameSite::Strict,
            SameSite::Lax => cookie::SameSite::Lax,
            SameSite::None => cookie::SameSite::None,
        };

        let max_age = cookie::time::Duration::try_from(config.max_age).unwrap_or(cookie::time::Duration::MAX);

        Cookie::build((config.cookie_name.to_string(), id))
            .path(config.path.to_string())
            .max_age(max_age)
            .same_site(same_site)
            .http_only(config.http_only)
            .secure(config.secure)
            .build()
    }
}

impl IdentityBackend for AnonymousSessionBackend {
    fn authenticate(&self, parts: &Parts) -> Option<Identity> {
        self.session.authenticate(parts)
    }
}

impl IssuingBackend for AnonymousSessionBackend {
    fn issue(&self, parts: &Parts) -> Response<Body> {
        let id = (self.generate_id)();

        let location = parts
            .uri
            .path_and_query()
            .map(|target| target.as_str())
            .unwrap_or("/");

        log::debug!("Issuing anonymous session for {location}");

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;

        if let Ok(value) = HeaderValue::from_str(location) {
            response.headers_mut().insert(LOCATION, value);
        }

        match HeaderValue::from_str(&self.cookie(id).to_string()) {
            Ok(value) => {
                response.headers_mut().insert(SET_COOKIE, value);
            }
            Err(e) => log::error!("Session cookie is not a valid header value: {e}"),
        }

        response
    }
}
