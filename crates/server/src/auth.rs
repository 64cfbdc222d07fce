//! Caller identity, as installed by the upstream auth gateway.
//!
//! The gateway terminates authentication and forwards the verified user id
//! in [`USER_ID_HEADER`]; this extractor only parses it. The ledger never
//! checks credentials itself.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use centime_core::OwnerId;

use crate::api::ErrorBody;

pub const USER_ID_HEADER: &str = "x-centime-user-id";

pub struct AuthenticatedUser(pub OwnerId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorBody>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized("missing user identity"))?;

        let owner_id =
            Uuid::parse_str(raw).map_err(|_| unauthorized("malformed user identity"))?;
        Ok(Self(owner_id))
    }
}

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
}
