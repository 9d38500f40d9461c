use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

use crate::api::upstream::GenerativeUpstream;
use crate::error::RelayError;
use crate::router::RelayState;

/// Resolve the shared upstream client, or fail fast when the service was
/// started without a credential.
///
/// Runs on request parts, so the body is never read for an unconfigured
/// service.
pub struct RequireUpstream(pub Arc<dyn GenerativeUpstream>);

impl FromRequestParts<RelayState> for RequireUpstream {
    type Rejection = RelayError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &RelayState,
    ) -> Result<Self, Self::Rejection> {
        state
            .upstream
            .clone()
            .map(RequireUpstream)
            .ok_or(RelayError::MissingCredential)
    }
}
