use axum::{
    body::Body,
    extract::Extension,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::ErrorResponse;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Key expected on admin routes; `None` leaves them open
#[derive(Clone)]
pub struct AdminApiKey(pub Option<String>);

/// Rejects admin requests whose `X-API-Key` does not match the configured key
pub async fn require_api_key(
    Extension(AdminApiKey(expected)): Extension<AdminApiKey>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = expected else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == expected => next.run(request).await,
        Some(_) => unauthorized("Invalid API key", "INVALID_API_KEY"),
        None => unauthorized(
            "API key required. Provide X-API-Key header.",
            "MISSING_API_KEY",
        ),
    }
}

fn unauthorized(message: &str, code: &str) -> Response {
    tracing::warn!(code, "Admin request rejected");
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::with_code(message, code)),
    )
        .into_response()
}
