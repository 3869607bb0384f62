use axum::{Extension, Json};
use serde::Serialize;

use crate::identity::Identity;

#[derive(Debug, Serialize)]
pub(crate) struct WhoAmI {
    identifier: Option<String>,
    scopes: Vec<String>,
    identity: Option<Identity>,
}

/// Echoes the identity the gate resolved for this request.
///
/// The identity is only present when the route carries throttle rules.
pub(crate) async fn whoami(identity: Option<Extension<Identity>>) -> Json<WhoAmI> {
    let identity = identity.map(|Extension(identity)| identity);

    Json(WhoAmI {
        identifier: identity.as_ref().map(Identity::identifier),
        scopes: identity.as_ref().map(Identity::scopes).unwrap_or_default(),
        identity,
    })
}
