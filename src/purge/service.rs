use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::{OpenAiConfig, PurgeConfig};
use crate::error::HttpError;
use crate::impl_into_response;

#[derive(Error, Debug)]
pub enum PurgeError {
    #[error("Failed to reach vector store API: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Vector store API error: {0}")]
    UpstreamError(String),
}

impl HttpError for PurgeError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_GATEWAY
    }

    fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::RequestError(_) => Some("REQUEST_ERROR"),
            Self::UpstreamError(_) => Some("UPSTREAM_ERROR"),
        }
    }
}

impl_into_response!(PurgeError);

#[derive(Debug, Clone, Deserialize)]
pub struct VectorStore {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Unix seconds
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
struct VectorStoreList {
    data: Vec<VectorStore>,
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct PurgeReport {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Deletes relay-created vector stores once they outlive their TTL
pub struct PurgeService {
    client: Client,
    base_url: String,
    api_key: String,
    api_version: String,
    ttl: Duration,
    name_prefix: String,
}

impl PurgeService {
    pub fn new(client: Client, openai: &OpenAiConfig, purge: &PurgeConfig) -> Self {
        Self {
            client,
            base_url: format!("{}/openai", openai.endpoint.trim_end_matches('/')),
            api_key: openai.api_key.clone(),
            api_version: openai.files_api_version.clone(),
            ttl: i64::try_from(purge.ttl_minutes)
                .ok()
                .and_then(Duration::try_minutes)
                .unwrap_or(Duration::MAX),
            name_prefix: purge.name_prefix.clone(),
        }
    }

    pub async fn run(&self) -> Result<PurgeReport, PurgeError> {
        self.run_at(Utc::now()).await
    }

    /// Sweep once, treating `now` as the current time
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<PurgeReport, PurgeError> {
        let stores = self.list_vector_stores().await?;
        let mut report = PurgeReport {
            scanned: stores.len(),
            ..Default::default()
        };

        for store in stores
            .iter()
            .filter(|s| is_stale(s, now, self.ttl, &self.name_prefix))
        {
            match self.delete_vector_store(&store.id).await {
                Ok(()) => {
                    tracing::debug!(vs_id = %store.id, "Deleted stale vector store");
                    report.deleted += 1;
                }
                Err(e) => {
                    tracing::error!(vs_id = %store.id, error = %e, "Failed to delete vector store");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            deleted = report.deleted,
            failed = report.failed,
            "Vector store purge completed"
        );
        Ok(report)
    }

    async fn list_vector_stores(&self) -> Result<Vec<VectorStore>, PurgeError> {
        let response = self
            .client
            .get(format!("{}/vectorstores", self.base_url))
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PurgeError::UpstreamError(format!("HTTP {}", status)));
        }

        let list: VectorStoreList = response.json().await?;
        Ok(list.data)
    }

    async fn delete_vector_store(&self, id: &str) -> Result<(), PurgeError> {
        let response = self
            .client
            .delete(format!("{}/vectorstores/{}", self.base_url, id))
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PurgeError::UpstreamError(format!("HTTP {}", status)));
        }
        Ok(())
    }
}

/// A store is stale when it carries the relay prefix and is strictly older than `ttl`
pub fn is_stale(store: &VectorStore, now: DateTime<Utc>, ttl: Duration, prefix: &str) -> bool {
    let owned = store
        .name
        .as_deref()
        .is_some_and(|name| name.starts_with(prefix));
    if !owned {
        return false;
    }

    match DateTime::<Utc>::from_timestamp(store.created_at, 0) {
        Some(created) => now.signed_duration_since(created) > ttl,
        None => false,
    }
}
