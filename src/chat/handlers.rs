use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};

use super::models::{ChatRequest, ChatResponse};
use super::service::ChatError;
use crate::error::ErrorResponse;
use crate::extractors::UserId;
use crate::quota::handlers::{QuotaExceededResponse, QuotaRejection};
use crate::quota::Outcome;
use crate::AppState;

/// Metered chat completion
///
/// The caller's quota is charged before the completion runs and is not
/// refunded if the completion fails.
///
/// POST /api/chat
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    params(("X-User-Id" = String, Header, description = "Trusted caller identity")),
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "Missing identity or message", body = ErrorResponse),
        (status = 429, description = "Quota exhausted or unverifiable", body = QuotaExceededResponse),
        (status = 502, description = "Completion API failure", body = ErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(request): Json<ChatRequest>,
) -> Response {
    let message = match request.message.as_deref().map(str::trim) {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => return ChatError::MissingMessage.into_response(),
    };

    let remaining = match state.quota_ledger.check_and_increment_default(&user_id).await {
        Outcome::Allowed { remaining } => remaining,
        Outcome::Denied => return QuotaRejection::Exhausted.into_response(),
        Outcome::Unavailable => return QuotaRejection::Unavailable.into_response(),
    };

    match state.chat_service.complete(&message).await {
        Ok(reply) => Json(ChatResponse {
            reply,
            vs_id: request.vs_id,
            remaining_quota: remaining,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Chat failed after quota was charged");
            e.into_response()
        }
    }
}
