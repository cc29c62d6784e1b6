
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{ChatMessage, ChatModel};
use crate::config::LanguageModelConfig;
use crate::http::RetryingAgent;
use crate::{Result, ScholarError};

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    authorization: String,
    http: RetryingAgent,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("authorization", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &LanguageModelConfig, api_key: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ScholarError::LanguageModel("API key is empty".to_string()));
        }

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            authorization: format!("Bearer {}", api_key),
            http: RetryingAgent::new(Duration::from_secs(config.timeout_secs.max(1))),
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.http = self.http.with_retry_attempts(attempts);
        self
    }

    #[inline]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.http = self.http.with_backoff_unit(unit);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ChatModel for OpenAiClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = serde_json::to_string(&CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        })
        .map_err(|e| ScholarError::LanguageModel(format!("Failed to encode request: {}", e)))?;

        debug!(
            "Requesting completion from {} ({} messages)",
            self.model,
            messages.len()
        );
        let body = self
            .http
            .post_json(
                &format!("{}/chat/completions", self.base_url),
                &[("Authorization", self.authorization.as_str())],
                &request,
            )
            .map_err(|e| ScholarError::LanguageModel(format!("Completion request failed: {}", e)))?;

        let response: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ScholarError::LanguageModel(format!("Invalid completion response: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| ScholarError::LanguageModel("Completion had no content".to_string()))
    }
}
