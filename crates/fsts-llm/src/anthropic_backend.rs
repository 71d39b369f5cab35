//! Anthropic Messages API backend
//!
//! System messages are lifted into the top-level `system` field; the response's
//! text blocks are concatenated into the completion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use fsts_config::LlmConfig;
use fsts_utils::error::LlmError;

use crate::http_client::HttpClient;
use crate::openai_compatible_backend::HttpParams;
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

const PROVIDER: &str = "anthropic";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) struct AnthropicBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl AnthropicBackend {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the API key variable is unset,
    /// no endpoint is configured, or the HTTP client cannot be built.
    pub fn new_from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = crate::read_api_key(config)?;
        let base_url = config.base_url.clone().ok_or_else(|| {
            LlmError::Misconfiguration("llm.base_url is not set for anthropic".to_string())
        })?;

        Ok(Self {
            client: HttpClient::new()?,
            base_url,
            api_key,
            default_model: config.model.clone(),
            default_params: HttpParams::from_config(config),
        })
    }

    /// Split messages into the system prompt and the conversation turns.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage<'_>>) {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let turns = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| AnthropicMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();

        let system = (!system.is_empty()).then(|| system.join("\n\n"));
        (system, turns)
    }

    fn extract_text(blocks: &[ContentBlock]) -> String {
        blocks
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };
        let params = self.default_params.resolve(&inv);
        let (system, messages) = Self::convert_messages(&inv.messages);

        debug!(
            provider = PROVIDER,
            stage = %inv.stage,
            model = %model,
            max_tokens = params.max_tokens,
            "Invoking completion backend"
        );

        let request_body = AnthropicRequest {
            model: &model,
            system,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let request = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request_body);

        let response = self.client.execute(request, inv.timeout, PROVIDER).await?;
        let body: AnthropicResponse = response.json().await.map_err(|e| {
            LlmError::MalformedResponse(format!("failed to decode response body: {e}"))
        })?;

        let content = Self::extract_text(&body.content);
        if content.trim().is_empty() {
            return Err(LlmError::MalformedResponse(
                "response contains no text blocks".to_string(),
            ));
        }

        Ok(LlmResult::new(content, PROVIDER, body.model.unwrap_or(model))
            .with_usage(body.usage.unwrap_or_default()))
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    usage: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}
