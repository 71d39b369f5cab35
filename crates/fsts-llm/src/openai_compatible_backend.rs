//! OpenAI-compatible chat completions backend
//!
//! Speaks the `/chat/completions` wire format used by OpenAI, OpenRouter and
//! Gemini's OpenAI endpoint (the default).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use fsts_config::LlmConfig;
use fsts_utils::error::LlmError;

use crate::content::flatten_content;
use crate::http_client::HttpClient;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message};

const PROVIDER: &str = "openai-compatible";

/// Request parameters with per-invocation overrides.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl HttpParams {
    pub(crate) fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// `metadata["max_tokens"]` / `metadata["temperature"]` override the defaults.
    pub(crate) fn resolve(&self, inv: &LlmInvocation) -> Self {
        Self {
            max_tokens: inv
                .metadata
                .get("max_tokens")
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(self.max_tokens),
            temperature: inv
                .metadata
                .get("temperature")
                .and_then(Value::as_f64)
                .map(|v| v as f32)
                .unwrap_or(self.temperature),
        }
    }
}

pub(crate) struct OpenAiCompatibleBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl OpenAiCompatibleBackend {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the HTTP client cannot be constructed
    pub fn new(
        api_key: String,
        base_url: String,
        default_model: String,
        default_params: HttpParams,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: HttpClient::new()?,
            base_url,
            api_key,
            default_model,
            default_params,
        })
    }

    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the API key variable is unset or
    /// no endpoint is configured.
    pub fn new_from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = crate::read_api_key(config)?;
        let base_url = config.base_url.clone().ok_or_else(|| {
            LlmError::Misconfiguration("llm.base_url is not set for openai-compatible".to_string())
        })?;

        Self::new(
            api_key,
            base_url,
            config.model.clone(),
            HttpParams::from_config(config),
        )
    }

    fn resolve_model(&self, inv: &LlmInvocation) -> String {
        if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        }
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage<'_>> {
        messages
            .iter()
            .map(|msg| ChatMessage {
                role: msg.role.as_str(),
                content: &msg.content,
            })
            .collect()
    }

    /// Pull the completion text and usage out of a response body.
    fn parse_response(body: ChatResponse) -> Result<(String, Map<String, Value>), LlmError> {
        let choice = body.choices.into_iter().next().ok_or_else(|| {
            LlmError::MalformedResponse("response has no choices".to_string())
        })?;

        if let Some(reason) = choice.finish_reason.as_deref()
            && reason != "stop"
        {
            debug!(provider = PROVIDER, finish_reason = reason, "Completion did not stop cleanly");
        }

        let content = flatten_content(&choice.message.content);
        if content.trim().is_empty() {
            return Err(LlmError::MalformedResponse(
                "choices[0].message.content is empty".to_string(),
            ));
        }

        Ok((content, body.usage.unwrap_or_default()))
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let model = self.resolve_model(&inv);
        let params = self.default_params.resolve(&inv);

        debug!(
            provider = PROVIDER,
            stage = %inv.stage,
            model = %model,
            max_tokens = params.max_tokens,
            temperature = params.temperature,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking completion backend"
        );

        let request_body = ChatRequest {
            model: &model,
            messages: Self::convert_messages(&inv.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };

        let request = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&request_body);

        let response = self.client.execute(request, inv.timeout, PROVIDER).await?;
        let body: ChatResponse = response.json().await.map_err(|e| {
            LlmError::MalformedResponse(format!("failed to decode response body: {e}"))
        })?;

        let (content, usage) = Self::parse_response(body)?;

        debug!(
            provider = PROVIDER,
            stage = %inv.stage,
            content_chars = content.len(),
            usage_keys = usage.len(),
            "Completion received"
        );

        Ok(LlmResult::new(content, PROVIDER, model).with_usage(usage))
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

/// `content` may be a string or a list of parts.
#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use fsts_utils::types::StageId;
    use serde_json::json;
    use std::time::Duration;

    fn backend() -> OpenAiCompatibleBackend {
        OpenAiCompatibleBackend::new(
            "test-key".to_string(),
            "http://localhost:9/v1/chat/completions".to_string(),
            "default-model".to_string(),
            HttpParams {
                max_tokens: 1024,
                temperature: 0.5,
            },
        )
        .unwrap()
    }

    fn invocation(model: &str) -> LlmInvocation {
        LlmInvocation::new(
            "run-1",
            StageId::ManagerAgent,
            model,
            Duration::from_secs(60),
            vec![],
        )
    }

    #[test]
    fn test_resolve_uses_defaults() {
        let backend = backend();
        let inv = invocation("");
        assert_eq!(backend.resolve_model(&inv), "default-model");
        assert_eq!(
            backend.default_params.resolve(&inv),
            HttpParams {
                max_tokens: 1024,
                temperature: 0.5
            }
        );
    }

    #[test]
    fn test_resolve_applies_overrides() {
        let backend = backend();
        let inv = invocation("custom-model")
            .with_metadata("max_tokens", json!(2048))
            .with_metadata("temperature", json!(0.0));
        assert_eq!(backend.resolve_model(&inv), "custom-model");
        let params = backend.default_params.resolve(&inv);
        assert_eq!(params.max_tokens, 2048);
        assert_eq!(params.temperature, 0.0);
    }

    #[test]
    fn test_convert_messages() {
        let messages = vec![
            Message::new(Role::System, "You are a project manager"),
            Message::new(Role::User, "Consolidate"),
        ];
        let converted = OpenAiCompatibleBackend::convert_messages(&messages);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[1].role, "user");
        assert_eq!(converted[1].content, "Consolidate");
    }

    #[test]
    fn test_parse_response_passes_usage_through() {
        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "Doc [ROUTE: final_output]"}, "finish_reason": "stop"}],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 5,
                "completion_tokens_details": {"reasoning_tokens": 2}
            }
        }))
        .unwrap();

        let (content, usage) = OpenAiCompatibleBackend::parse_response(body).unwrap();
        assert_eq!(content, "Doc [ROUTE: final_output]");
        assert_eq!(usage["prompt_tokens"], json!(10));
        assert_eq!(usage["completion_tokens_details"]["reasoning_tokens"], json!(2));
    }

    #[test]
    fn test_parse_response_flattens_content_parts() {
        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": [{"type": "text", "text": "part one"}, {"type": "text", "text": "part two"}]}}]
        }))
        .unwrap();
        let (content, usage) = OpenAiCompatibleBackend::parse_response(body).unwrap();
        assert_eq!(content, "part one part two");
        assert!(usage.is_empty());
    }

    #[test]
    fn test_parse_response_rejects_empty_completion() {
        let body: ChatResponse =
            serde_json::from_value(json!({"choices": [{"message": {"content": "  "}}]})).unwrap();
        assert!(matches!(
            OpenAiCompatibleBackend::parse_response(body),
            Err(LlmError::MalformedResponse(_))
        ));

        let body: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(
            OpenAiCompatibleBackend::parse_response(body),
            Err(LlmError::MalformedResponse(_))
        ));
    }
}
