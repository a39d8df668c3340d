use axum::{extract::State, Json};

use super::service::{PurgeError, PurgeReport};
use crate::error::ErrorResponse;
use crate::AppState;

/// Run the vector store purge immediately
///
/// POST /api/admin/purge
#[utoipa::path(
    post,
    path = "/api/admin/purge",
    tag = "admin",
    params(("X-API-Key" = Option<String>, Header, description = "Admin key, when configured")),
    responses(
        (status = 200, description = "Sweep finished", body = PurgeReport),
        (status = 401, description = "Missing or invalid API key", body = ErrorResponse),
        (status = 502, description = "Vector store API failure", body = ErrorResponse)
    )
)]
pub async fn trigger_purge(
    State(state): State<AppState>,
) -> Result<Json<PurgeReport>, PurgeError> {
    tracing::info!("Manual vector store purge requested");
    let report = state.purge_service.run().await?;
    Ok(Json(report))
}
