use axum::{extract::State, Json};

use super::models::{UploadRequest, UploadResponse};
use super::service::UploadError;
use crate::error::ErrorResponse;
use crate::AppState;

/// Upload a base64 data URL into a vector store
///
/// POST /api/upload
#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "uploads",
    request_body = UploadRequest,
    responses(
        (status = 200, description = "File uploaded and indexed", body = UploadResponse),
        (status = 400, description = "Missing or malformed data URL", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse),
        (status = 502, description = "Files API failure", body = ErrorResponse)
    )
)]
pub async fn upload_file(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, UploadError> {
    let response = state.upload_service.relay(request).await?;
    Ok(Json(response))
}
