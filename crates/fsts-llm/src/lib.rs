//! Completion backends for fsts.
//!
//! [`LlmBackend`] is the single-call text-generation contract used by every
//! stage. HTTP backends speak the OpenAI-compatible and Anthropic wire
//! formats; [`BudgetedBackend`] and [`RetryingBackend`] are decorators a host
//! layers on top. [`ScriptedBackend`] never touches the network.

mod anthropic_backend;
mod budgeted_backend;
mod content;
mod http_client;
mod openai_compatible_backend;
mod retrying_backend;
mod scripted_backend;
mod types;

use std::sync::Arc;
use tracing::info;

use fsts_config::{LlmConfig, Provider};
use fsts_utils::error::LlmError;

pub use budgeted_backend::BudgetedBackend;
pub use content::flatten_content;
pub use retrying_backend::RetryingBackend;
pub use scripted_backend::{ScriptedBackend, ScriptedReply};
pub use types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

use anthropic_backend::AnthropicBackend;
use openai_compatible_backend::OpenAiCompatibleBackend;

/// Build the configured backend, wrapped in the retry and budget decorators
/// when enabled.
///
/// The budget wraps the retry layer so that every retried attempt is charged.
///
/// # Errors
///
/// Returns `LlmError::Misconfiguration` when the API key or endpoint is missing.
pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let mut backend: Arc<dyn LlmBackend> = match config.provider {
        Provider::OpenaiCompatible => Arc::new(OpenAiCompatibleBackend::new_from_config(config)?),
        Provider::Anthropic => Arc::new(AnthropicBackend::new_from_config(config)?),
        Provider::Scripted => Arc::new(ScriptedBackend::dry_run()),
    };

    if config.retries > 0 {
        backend = Arc::new(RetryingBackend::new(backend, config.retries));
    }
    if let Some(limit) = config.budget {
        backend = Arc::new(BudgetedBackend::new(backend, limit));
    }

    info!(
        provider = %config.provider,
        model = %config.model,
        retries = config.retries,
        budget = ?config.budget,
        "Completion backend ready"
    );
    Ok(backend)
}

/// Read the API key from the environment variable named in the config.
pub(crate) fn read_api_key(config: &LlmConfig) -> Result<String, LlmError> {
    let var = config.api_key_env.as_deref().ok_or_else(|| {
        LlmError::Misconfiguration(format!(
            "llm.api_key_env is not set for provider '{}'",
            config.provider
        ))
    })?;

    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(LlmError::Misconfiguration(format!(
            "environment variable {var} is not set or empty"
        ))),
    }
}
