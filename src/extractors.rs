use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::error::ErrorResponse;

/// Header carrying the caller identity, set by the upstream gateway
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Trusted caller identity taken from the `X-User-Id` header.
///
/// Authentication happens upstream; this only rejects requests where the
/// header is absent, blank or not valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = UserIdRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(UserIdRejection)?;

        Ok(UserId(value.to_string()))
    }
}

#[derive(Debug)]
pub struct UserIdRejection;

impl IntoResponse for UserIdRejection {
    fn into_response(self) -> Response {
        tracing::warn!("Request without caller identity");
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::with_code(
                "Missing X-User-Id header.",
                "MISSING_USER_ID",
            )),
        )
            .into_response()
    }
}
