mod chat;
mod config;
mod db;
mod error;
mod extractors;
mod middleware;
mod observability;
mod openapi;
mod purge;
mod quota;
mod routes;
mod uploads;

use axum::{error_handling::HandleErrorLayer, http::StatusCode, BoxError};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use reqwest::Client;
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::chat::ChatService;
use crate::config::{AppConfig, QuotaBackend};
use crate::db::{DbConfig, SqliteQuotaStore};
use crate::purge::{PurgeScheduler, PurgeService};
use crate::quota::{LedgerSettings, MemoryQuotaStore, QuotaLedger, QuotaStore};
use crate::uploads::UploadService;

/// Shared HTTP client configuration
const HTTP_TIMEOUT_SECS: u64 = 90;
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 5;
const HTTP_POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Whole-request budget; uploads make three sequential upstream calls
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Clone)]
pub struct AppState {
    pub quota_ledger: Arc<QuotaLedger>,
    pub chat_service: Arc<ChatService>,
    pub upload_service: Arc<UploadService>,
    pub purge_service: Arc<PurgeService>,
    pub metrics: PrometheusHandle,
    pub config: Arc<AppConfig>,
}

/// Create shared HTTP client with connection pooling
fn create_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .pool_idle_timeout(Duration::from_secs(HTTP_POOL_IDLE_TIMEOUT_SECS))
        .pool_max_idle_per_host(10)
        .build()
}

/// Open the configured quota backend
async fn create_quota_store(config: &AppConfig) -> anyhow::Result<Arc<dyn QuotaStore>> {
    match config.quota.backend {
        QuotaBackend::Sqlite => {
            let pool = db::create_pool(&DbConfig {
                url: config.database_url.clone(),
                ..Default::default()
            })
            .await?;
            db::run_migrations(&pool).await?;
            tracing::info!(url = %config.database_url, "Using SQLite quota store");
            Ok(Arc::new(SqliteQuotaStore::new(pool)))
        }
        QuotaBackend::Memory => {
            tracing::warn!("Using in-memory quota store; counters reset on restart");
            Ok(Arc::new(MemoryQuotaStore::new()))
        }
    }
}

/// Handle request timeout errors
async fn handle_timeout_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "Request timed out".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal error: {}", err),
        )
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load()?;
    tracing::info!(
        limit = config.quota.limit,
        period_days = config.quota.period_days,
        "Configuration loaded successfully"
    );

    let metrics = PrometheusBuilder::new().install_recorder()?;

    // Create shared HTTP client with connection pooling
    let http_client = create_http_client()?;
    tracing::debug!("Shared HTTP client created");

    let store = create_quota_store(&config).await?;
    let quota_ledger = Arc::new(QuotaLedger::new(
        store,
        LedgerSettings::from(&config.quota),
    ));

    // Initialize services with shared client
    let chat_service = Arc::new(ChatService::new(http_client.clone(), &config.openai));
    let upload_service = Arc::new(UploadService::new(
        http_client.clone(),
        &config.openai,
        &config.uploads,
    ));
    let purge_service = Arc::new(PurgeService::new(
        http_client,
        &config.openai,
        &config.purge,
    ));

    // Vector store purge job
    let purge_scheduler = if config.purge.enabled {
        let scheduler = PurgeScheduler::new(Arc::clone(&purge_service)).await?;
        scheduler.schedule(&config.purge).await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Vector store purge disabled");
        None
    };

    // Create shared application state
    let state = AppState {
        quota_ledger,
        chat_service,
        upload_service,
        purge_service,
        metrics,
        config: Arc::new(config.clone()),
    };

    let app = routes::build_router(state.clone())
        .layer(
            ServiceBuilder::new()
                // Handle timeout errors
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server with graceful shutdown
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = purge_scheduler {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "Purge scheduler did not shut down cleanly");
        }
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}
