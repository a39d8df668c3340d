use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body for POST /api/chat
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    /// User message forwarded to the model
    pub message: Option<String>,
    /// Vector store id from a previous upload, echoed back to the client
    #[serde(default)]
    pub vs_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub reply: String,
    pub vs_id: Option<String>,
    /// Metered calls left in the current period
    pub remaining_quota: u64,
}

// Azure OpenAI chat completions wire types

#[derive(Debug, Serialize)]
pub(super) struct CompletionRequest<'a> {
    pub messages: Vec<CompletionMessage<'a>>,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize)]
pub(super) struct CompletionMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CompletionChoice {
    pub message: CompletionChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub(super) struct CompletionChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpstreamErrorBody {
    pub error: UpstreamErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpstreamErrorDetail {
    pub message: String,
}
