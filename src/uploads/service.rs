use std::time::Duration;

use axum::http::StatusCode;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use super::models::{DataUrl, UploadRequest, UploadResponse};
use crate::config::{OpenAiConfig, UploadConfig};
use crate::error::HttpError;
use crate::impl_into_response;

/// Name prefix of vector stores created by the relay; the purge job keys on it
pub const VECTOR_STORE_PREFIX: &str = "vs-";

const DEFAULT_FILE_NAME: &str = "uploaded_file";
const JSON_CALL_TIMEOUT_SECS: u64 = 30;
const FILE_UPLOAD_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Missing 'file_data_url' in request")]
    MissingDataUrl,

    #[error("Invalid data URL")]
    InvalidDataUrl,

    #[error("File too large: {size} encoded bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Invalid vector store id")]
    InvalidVectorStoreId,

    #[error("Invalid base64 payload: {0}")]
    InvalidBase64(String),

    #[error("Failed to reach files API: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Files API error: {0}")]
    UpstreamError(String),
}

impl HttpError for UploadError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingDataUrl => StatusCode::BAD_REQUEST,
            Self::InvalidDataUrl => StatusCode::BAD_REQUEST,
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidVectorStoreId => StatusCode::BAD_REQUEST,
            Self::InvalidBase64(_) => StatusCode::BAD_REQUEST,
            Self::RequestError(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::MissingDataUrl => Some("MISSING_FILE"),
            Self::InvalidDataUrl => Some("INVALID_DATA_URL"),
            Self::TooLarge { .. } => Some("FILE_TOO_LARGE"),
            Self::InvalidVectorStoreId => Some("INVALID_VS_ID"),
            Self::InvalidBase64(_) => Some("INVALID_BASE64"),
            Self::RequestError(_) => Some("REQUEST_ERROR"),
            Self::UpstreamError(_) => Some("UPSTREAM_ERROR"),
        }
    }
}

impl_into_response!(UploadError);

#[derive(Debug, Deserialize)]
struct CreatedObject {
    id: String,
}

/// Relays browser uploads into Azure OpenAI files and vector stores
pub struct UploadService {
    client: Client,
    base_url: String,
    api_key: String,
    api_version: String,
    max_encoded_bytes: usize,
}

impl UploadService {
    pub fn new(client: Client, openai: &OpenAiConfig, uploads: &UploadConfig) -> Self {
        Self {
            client,
            base_url: format!("{}/openai", openai.endpoint.trim_end_matches('/')),
            api_key: openai.api_key.clone(),
            api_version: openai.files_api_version.clone(),
            max_encoded_bytes: uploads.max_encoded_bytes,
        }
    }

    /// Decode the data URL, upload the file and index it into a vector store
    pub async fn relay(&self, request: UploadRequest) -> Result<UploadResponse, UploadError> {
        let data_url = request
            .file_data_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(UploadError::MissingDataUrl)?;
        let file = DataUrl::parse(data_url, self.max_encoded_bytes)?;
        let file_name = request
            .file_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

        let existing = request.vs_id.filter(|id| !id.is_empty());
        if existing.as_deref().is_some_and(|id| !is_valid_vector_store_id(id)) {
            return Err(UploadError::InvalidVectorStoreId);
        }

        let vs_id = match existing {
            Some(id) => id,
            None => self.create_vector_store().await?,
        };

        let file_id = self.upload_file(&file_name, file).await?;
        self.attach_file(&vs_id, &file_id).await?;

        tracing::info!(vs_id = %vs_id, file_id = %file_id, file_name = %file_name, "File relayed");
        Ok(UploadResponse { vs_id, file_id })
    }

    async fn create_vector_store(&self) -> Result<String, UploadError> {
        let name = vector_store_name();
        tracing::debug!(name = %name, "Creating vector store");

        let response = self
            .client
            .post(format!("{}/vectorstores", self.base_url))
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&json!({ "name": name }))
            .timeout(Duration::from_secs(JSON_CALL_TIMEOUT_SECS))
            .send()
            .await?;

        Self::created_id(response).await
    }

    async fn upload_file(&self, file_name: &str, file: DataUrl) -> Result<String, UploadError> {
        let part = Part::bytes(file.bytes)
            .file_name(file_name.to_string())
            .mime_str(&file.content_type)
            .map_err(|_| UploadError::InvalidDataUrl)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .query(&[
                ("api-version", self.api_version.as_str()),
                ("purpose", "assistants"),
            ])
            .header("api-key", &self.api_key)
            .multipart(form)
            .timeout(Duration::from_secs(FILE_UPLOAD_TIMEOUT_SECS))
            .send()
            .await?;

        Self::created_id(response).await
    }

    async fn attach_file(&self, vs_id: &str, file_id: &str) -> Result<(), UploadError> {
        let response = self
            .client
            .post(format!("{}/vectorstores/{}/file_batches", self.base_url, vs_id))
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&json!({ "file_ids": [file_id] }))
            .timeout(Duration::from_secs(JSON_CALL_TIMEOUT_SECS))
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn ensure_success(response: Response) -> Result<Response, UploadError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(UploadError::UpstreamError(format!("HTTP {}: {}", status, body)))
    }

    async fn created_id(response: Response) -> Result<String, UploadError> {
        let created: CreatedObject = Self::ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| UploadError::UpstreamError(format!("Invalid response: {}", e)))?;
        Ok(created.id)
    }
}

/// Vector store ids are spliced into upstream URL paths
fn is_valid_vector_store_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// `vs-` followed by eight hex characters
fn vector_store_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}{}", VECTOR_STORE_PREFIX, &id[..8])
}
