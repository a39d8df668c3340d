use std::path::Path;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Extension, Router,
};
use tower_http::services::{ServeDir, ServeFile};

use crate::chat::handlers as chat_handlers;
use crate::middleware::{require_api_key, AdminApiKey};
use crate::observability;
use crate::openapi::swagger_ui;
use crate::purge::handlers as purge_handlers;
use crate::quota::handlers as quota_handlers;
use crate::uploads::handlers as uploads_handlers;
use crate::AppState;

/// Slack on top of the encoded payload for the JSON envelope and data URL header
const UPLOAD_ENVELOPE_BYTES: usize = 64 * 1024;

/// Build the metered chat routes
fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat_handlers::chat))
        .route("/quota", get(quota_handlers::get_usage))
}

/// Build the upload relay routes
fn upload_routes(max_encoded_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/upload", post(uploads_handlers::upload_file))
        .layer(DefaultBodyLimit::max(
            max_encoded_bytes.saturating_add(UPLOAD_ENVELOPE_BYTES),
        ))
}

/// Build the admin routes (protected by API key auth)
fn admin_routes(api_key: Option<String>) -> Router<AppState> {
    Router::new()
        .route("/admin/purge", post(purge_handlers::trigger_purge))
        .layer(middleware::from_fn(require_api_key))
        .layer(Extension(AdminApiKey(api_key)))
}

/// Build all /api routes
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(chat_routes())
        .merge(upload_routes(state.config.uploads.max_encoded_bytes))
        .merge(admin_routes(state.config.admin_api_key.clone()))
}

/// Build the complete application router
pub fn build_router(state: AppState) -> Router<AppState> {
    let static_dir = Path::new(&state.config.static_dir);
    Router::new()
        .route("/health", get(observability::health))
        .route("/metrics", get(observability::metrics))
        .nest("/api", api_routes(&state))
        .nest_service("/static", ServeDir::new(static_dir))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        // Swagger UI for API documentation
        .merge(swagger_ui())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use reqwest::Client;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::chat::ChatService;
    use crate::config::{test_config, AppConfig};
    use crate::purge::PurgeService;
    use crate::quota::{
        LedgerSettings, MemoryQuotaStore, QuotaLedger, QuotaRecord, QuotaStore, StoreError,
        StoredRecord, VersionToken,
    };
    use crate::uploads::UploadService;

    const COMPLETIONS: &str = "/openai/deployments/gpt-test/chat/completions";

    fn app_with(config: AppConfig, store: Arc<dyn QuotaStore>) -> Router {
        let client = Client::new();
        let state = AppState {
            quota_ledger: Arc::new(QuotaLedger::new(
                store,
                LedgerSettings::from(&config.quota),
            )),
            chat_service: Arc::new(ChatService::new(client.clone(), &config.openai)),
            upload_service: Arc::new(UploadService::new(
                client.clone(),
                &config.openai,
                &config.uploads,
            )),
            purge_service: Arc::new(PurgeService::new(client, &config.openai, &config.purge)),
            metrics: PrometheusBuilder::new().build_recorder().handle(),
            config: Arc::new(config),
        };
        build_router(state.clone()).with_state(state)
    }

    fn app(uri: &str, limit: u64) -> Router {
        let mut config = test_config(uri);
        config.quota.limit = limit;
        app_with(config, Arc::new(MemoryQuotaStore::new()))
    }

    fn chat_request(user: Option<&str>, message: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json");
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user);
        }
        builder
            .body(Body::from(json!({ "message": message }).to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn mount_completion(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path(COMPLETIONS))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hola"}}]
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    struct Unreachable;

    #[async_trait]
    impl QuotaStore for Unreachable {
        async fn fetch(&self, _identity: &str) -> Result<Option<StoredRecord>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn create(
            &self,
            _record: &QuotaRecord,
            _version: &VersionToken,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn replace(
            &self,
            _record: &QuotaRecord,
            _expected: &VersionToken,
            _next: &VersionToken,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_health() {
        let response = app("http://127.0.0.1:9", 3)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_chat_without_identity_is_bad_request() {
        let response = app("http://127.0.0.1:9", 3)
            .oneshot(chat_request(None, "hola"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "MISSING_USER_ID");
    }

    #[tokio::test]
    async fn test_chat_empty_message_is_not_charged() {
        let server = MockServer::start().await;
        mount_completion(&server, 0).await;
        let app = app(&server.uri(), 1);

        let response = app.clone().oneshot(chat_request(Some("u1"), "  ")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(Request::get("/api/quota").header("X-User-Id", "u1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["used"], 0);
    }

    #[tokio::test]
    async fn test_chat_until_quota_exhausted() {
        let server = MockServer::start().await;
        mount_completion(&server, 3).await;
        let app = app(&server.uri(), 2);

        let first = app.clone().oneshot(chat_request(Some("u1"), "hola")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let body = json_body(first).await;
        assert_eq!(body["reply"], "hola");
        assert_eq!(body["remaining_quota"], 1);

        let second = app.clone().oneshot(chat_request(Some("u1"), "hola")).await.unwrap();
        assert_eq!(json_body(second).await["remaining_quota"], 0);

        let third = app.clone().oneshot(chat_request(Some("u1"), "hola")).await.unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = json_body(third).await;
        assert_eq!(body["code"], "QUOTA_EXHAUSTED");
        assert_eq!(body["reply"], "Monthly limit reached.");

        let other = app.oneshot(chat_request(Some("u2"), "hola")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
        assert_eq!(json_body(other).await["remaining_quota"], 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_closed() {
        let server = MockServer::start().await;
        mount_completion(&server, 0).await;
        let app = app_with(test_config(&server.uri()), Arc::new(Unreachable));

        let response = app.clone().oneshot(chat_request(Some("u1"), "hola")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(response).await["code"], "QUOTA_UNAVAILABLE");

        let usage = app
            .oneshot(Request::get("/api/quota").header("X-User-Id", "u1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(usage.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_upstream_failure_after_charge_is_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMPLETIONS))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let app = app(&server.uri(), 5);

        let response = app.clone().oneshot(chat_request(Some("u1"), "hola")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let usage = app
            .oneshot(Request::get("/api/quota").header("X-User-Id", "u1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(usage).await;
        assert_eq!(body["used"], 1);
        assert_eq!(body["remaining"], 4);
    }

    #[tokio::test]
    async fn test_admin_purge_requires_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/openai/vectorstores"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;
        let mut config = test_config(&server.uri());
        config.admin_api_key = Some("secret".to_string());
        let app = app_with(config, Arc::new(MemoryQuotaStore::new()));

        let purge = |key: Option<&str>| {
            let mut builder = Request::post("/api/admin/purge");
            if let Some(key) = key {
                builder = builder.header("X-API-Key", key);
            }
            builder.body(Body::empty()).unwrap()
        };

        let missing = app.clone().oneshot(purge(None)).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(missing).await["code"], "MISSING_API_KEY");

        let wrong = app.clone().oneshot(purge(Some("nope"))).await.unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(wrong).await["code"], "INVALID_API_KEY");

        let ok = app.oneshot(purge(Some("secret"))).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(json_body(ok).await["scanned"], 0);
    }

    #[tokio::test]
    async fn test_upload_too_large_is_rejected() {
        let mut config = test_config("http://127.0.0.1:9");
        config.uploads.max_encoded_bytes = 16;
        let app = app_with(config, Arc::new(MemoryQuotaStore::new()));

        let body = json!({ "file_data_url": format!("data:text/plain;base64,{}", "A".repeat(32)) });
        let response = app
            .oneshot(
                Request::post("/api/upload")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json_body(response).await["code"], "FILE_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders() {
        let response = app("http://127.0.0.1:9", 3)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
