use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::service::UploadError;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Request body for POST /api/upload
#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadRequest {
    /// `data:<mime>;base64,<payload>`
    pub file_data_url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Existing vector store to attach to; a new one is created when absent
    #[serde(default)]
    pub vs_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub vs_id: String,
    pub file_id: String,
}

/// Decoded `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    /// Decode a base64 data URL, refusing payloads whose encoded part exceeds
    /// `max_encoded_bytes`
    pub fn parse(input: &str, max_encoded_bytes: usize) -> Result<Self, UploadError> {
        let (header, encoded) = input.split_once(',').ok_or(UploadError::InvalidDataUrl)?;

        if encoded.len() > max_encoded_bytes {
            return Err(UploadError::TooLarge {
                size: encoded.len(),
                max: max_encoded_bytes,
            });
        }

        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| UploadError::InvalidBase64(e.to_string()))?;

        let content_type = header
            .split_once(':')
            .and_then(|(_, rest)| rest.split(';').next())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        Ok(Self {
            content_type,
            bytes,
        })
    }
}
