use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ledger::UsageSnapshot;
use crate::error::{ErrorResponse, HttpError};
use crate::extractors::UserId;
use crate::AppState;

/// Body returned with 429 when a metered call is refused
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QuotaExceededResponse {
    pub error: String,
    pub code: String,
    /// Human-readable text a chat client can display as the assistant reply
    pub reply: String,
}

/// A non-permissive ledger outcome, rendered for the HTTP caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaRejection {
    Exhausted,
    Unavailable,
}

impl QuotaRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Exhausted => "QUOTA_EXHAUSTED",
            Self::Unavailable => "QUOTA_UNAVAILABLE",
        }
    }
}

impl IntoResponse for QuotaRejection {
    fn into_response(self) -> Response {
        let body = match self {
            Self::Exhausted => QuotaExceededResponse {
                error: "Quota exhausted.".to_string(),
                code: self.code().to_string(),
                reply: "Monthly limit reached.".to_string(),
            },
            Self::Unavailable => QuotaExceededResponse {
                error: "Quota could not be verified.".to_string(),
                code: self.code().to_string(),
                reply: "The service is having trouble right now. Please try again later."
                    .to_string(),
            },
        };

        tracing::warn!(code = %body.code, "Metered request refused");
        (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Quota store error: {0}")]
pub struct UsageError(#[from] super::StoreError);

impl HttpError for UsageError {
    fn status_code(&self) -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }

    fn error_code(&self) -> Option<&'static str> {
        Some("QUOTA_STORE_UNAVAILABLE")
    }
}

crate::impl_into_response!(UsageError);

/// Current quota usage for the calling user
///
/// GET /api/quota
#[utoipa::path(
    get,
    path = "/api/quota",
    tag = "quota",
    params(("X-User-Id" = String, Header, description = "Trusted caller identity")),
    responses(
        (status = 200, description = "Usage for the current period", body = UsageSnapshot),
        (status = 400, description = "Missing identity header", body = ErrorResponse),
        (status = 503, description = "Quota store unreachable", body = ErrorResponse)
    )
)]
pub async fn get_usage(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<Json<UsageSnapshot>, UsageError> {
    let snapshot = state.quota_ledger.usage_default(&user_id).await?;
    Ok(Json(snapshot))
}
