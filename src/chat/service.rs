use axum::http::StatusCode;
use reqwest::Client;
use thiserror::Error;

use super::models::{
    CompletionMessage, CompletionRequest, CompletionResponse, UpstreamErrorBody,
};
use crate::config::OpenAiConfig;
use crate::error::HttpError;
use crate::impl_into_response;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Missing 'message' in request")]
    MissingMessage,

    #[error("Failed to reach completion API: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Completion API error: {0}")]
    UpstreamError(String),

    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),
}

impl HttpError for ChatError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingMessage => StatusCode::BAD_REQUEST,
            Self::RequestError(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::MissingMessage => Some("MISSING_MESSAGE"),
            Self::RequestError(_) => Some("REQUEST_ERROR"),
            Self::UpstreamError(_) => Some("UPSTREAM_ERROR"),
            Self::InvalidResponse(_) => Some("INVALID_RESPONSE"),
        }
    }
}

impl_into_response!(ChatError);

/// Forwards a single user message to an Azure OpenAI chat deployment
pub struct ChatService {
    client: Client,
    completions_url: String,
    api_key: String,
    api_version: String,
    system_prompt: String,
    max_tokens: u32,
}

impl ChatService {
    pub fn new(client: Client, config: &OpenAiConfig) -> Self {
        let completions_url = format!(
            "{}/openai/deployments/{}/chat/completions",
            config.endpoint.trim_end_matches('/'),
            config.deployment
        );

        Self {
            client,
            completions_url,
            api_key: config.api_key.clone(),
            api_version: config.chat_api_version.clone(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
        }
    }

    /// Run one completion and return the assistant's text
    pub async fn complete(&self, message: &str) -> Result<String, ChatError> {
        let body = CompletionRequest {
            messages: vec![
                CompletionMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                CompletionMessage {
                    role: "user",
                    content: message,
                },
            ],
            max_tokens: self.max_tokens,
        };

        tracing::debug!(url = %self.completions_url, "Requesting chat completion");

        let response = self
            .client
            .post(&self.completions_url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<UpstreamErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("HTTP {}", status),
            };
            return Err(ChatError::UpstreamError(message));
        }

        let data: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::InvalidResponse(e.to_string()))?;

        let reply = data
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ChatError::InvalidResponse("No choices in response".to_string()))?;

        tracing::info!(reply_len = reply.len(), "Chat completion received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COMPLETIONS_PATH: &str = "/openai/deployments/gpt-test/chat/completions";

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .and(query_param("api-version", "2024-02-01"))
            .and(header("api-key", "test-key"))
            .and(body_partial_json(json!({
                "max_tokens": 800,
                "messages": [{"role": "system"}, {"role": "user", "content": "hola"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Buenos días"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let service = ChatService::new(Client::new(), &test_config(&server.uri()).openai);
        let reply = service.complete("hola").await.unwrap();
        assert_eq!(reply, "Buenos días");
    }

    #[tokio::test]
    async fn test_upstream_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "content filtered"}
            })))
            .mount(&server)
            .await;

        let service = ChatService::new(Client::new(), &test_config(&server.uri()).openai);
        match service.complete("hola").await {
            Err(ChatError::UpstreamError(message)) => assert_eq!(message, "content filtered"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let service = ChatService::new(Client::new(), &test_config(&server.uri()).openai);
        let err = service.complete("hola").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidResponse(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_trailing_slash_in_endpoint() {
        let config = test_config("https://example.openai.azure.com/");
        let service = ChatService::new(Client::new(), &config.openai);
        assert_eq!(
            service.completions_url,
            "https://example.openai.azure.com/openai/deployments/gpt-test/chat/completions"
        );
    }
}
