use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::chat::models::{ChatRequest, ChatResponse};
use crate::error::ErrorResponse;
use crate::observability::HealthResponse;
use crate::purge::PurgeReport;
use crate::quota::handlers::QuotaExceededResponse;
use crate::quota::UsageSnapshot;
use crate::uploads::models::{UploadRequest, UploadResponse};

/// OpenAPI documentation for the Chatgate API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Chatgate API",
        version = "1.0.0",
        description = "Quota-metered relay in front of an Azure OpenAI chat deployment. Every chat call is charged against a per-user monthly quota before it reaches the model.",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    paths(
        crate::observability::health,
        crate::quota::handlers::get_usage,
        crate::chat::handlers::chat,
        crate::uploads::handlers::upload_file,
        crate::purge::handlers::trigger_purge,
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "quota", description = "Per-user usage metering"),
        (name = "chat", description = "Metered chat completions"),
        (name = "uploads", description = "File relay into vector stores"),
        (name = "admin", description = "Maintenance operations, guarded by X-API-Key")
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            UsageSnapshot,
            QuotaExceededResponse,
            ChatRequest,
            ChatResponse,
            UploadRequest,
            UploadResponse,
            PurgeReport,
        )
    )
)]
pub struct ApiDoc;

/// Create the Swagger UI router
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
