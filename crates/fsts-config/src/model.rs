use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use fsts_utils::types::ReworkRoutes;

/// Gemini's OpenAI-compatible chat completions endpoint.
pub const DEFAULT_OPENAI_COMPATIBLE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";
pub const DEFAULT_OPENAI_COMPATIBLE_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_OPENAI_COMPATIBLE_KEY_ENV: &str = "GEMINI_API_KEY";

pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_ANTHROPIC_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Where an effective configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Command-line flag (highest precedence).
    Cli,
    /// Configuration file.
    Config(PathBuf),
    /// Built-in default (lowest precedence).
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Config(path) => write!(f, "config file {}", path.display()),
            Self::Default => write!(f, "defaults"),
        }
    }
}

/// Completion backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// OpenAI chat-completions wire format (Gemini, OpenRouter, OpenAI).
    #[default]
    OpenaiCompatible,
    /// Anthropic Messages API.
    Anthropic,
    /// Canned responses; no network.
    Scripted,
}

impl Provider {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenaiCompatible => "openai-compatible",
            Self::Anthropic => "anthropic",
            Self::Scripted => "scripted",
        }
    }

    /// Parse a provider name. `openai`, `gemini` and `openrouter` are
    /// accepted as aliases of `openai-compatible`.
    ///
    /// # Errors
    ///
    /// Returns a message listing the known providers.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "openai-compatible" | "openai_compatible" | "openai" | "gemini" | "openrouter" => {
                Ok(Self::OpenaiCompatible)
            }
            "anthropic" => Ok(Self::Anthropic),
            "scripted" | "dry-run" => Ok(Self::Scripted),
            _ => Err(format!(
                "Unknown LLM provider '{s}'. Available providers: openai-compatible, anthropic, scripted"
            )),
        }
    }

    #[must_use]
    pub const fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::OpenaiCompatible => Some(DEFAULT_OPENAI_COMPATIBLE_URL),
            Self::Anthropic => Some(DEFAULT_ANTHROPIC_URL),
            Self::Scripted => None,
        }
    }

    #[must_use]
    pub const fn default_model(&self) -> &'static str {
        match self {
            Self::OpenaiCompatible => DEFAULT_OPENAI_COMPATIBLE_MODEL,
            Self::Anthropic => DEFAULT_ANTHROPIC_MODEL,
            Self::Scripted => "scripted",
        }
    }

    #[must_use]
    pub const fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Self::OpenaiCompatible => Some(DEFAULT_OPENAI_COMPATIBLE_KEY_ENV),
            Self::Anthropic => Some(DEFAULT_ANTHROPIC_KEY_ENV),
            Self::Scripted => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub min_output_reviews: u32,
    pub max_output_reviews: u32,
    pub rework_routes: ReworkRoutes,
    /// Honored rework routes per run under `loop_back`.
    pub max_rework_passes: u32,
    /// Maximum stage executions per run.
    pub recursion_limit: usize,
    /// Wall-clock budget for one run.
    pub run_timeout_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_output_reviews: 1,
            max_output_reviews: 2,
            rework_routes: ReworkRoutes::Collapse,
            max_rework_passes: 1,
            recursion_limit: 25,
            run_timeout_secs: None,
        }
    }
}

/// `[llm]` section, after defaults have been filled in for the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Maximum completion calls per process.
    pub budget: Option<u32>,
    /// Host-level retries for transient failures; 0 disables retrying.
    pub retries: u32,
}

impl LlmConfig {
    #[must_use]
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            base_url: provider.default_base_url().map(str::to_string),
            api_key_env: provider.default_api_key_env().map(str::to_string),
            max_tokens: 8192,
            temperature: 0.2,
            timeout_secs: 300,
            budget: None,
            retries: 0,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::for_provider(Provider::default())
    }
}

/// `[prompts]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory of `<stage>.yaml` files; built-in prompts when unset.
    pub dir: Option<PathBuf>,
}

/// `[logging]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub verbose: bool,
    pub json: bool,
}

/// Effective configuration with per-key source attribution.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub llm: LlmConfig,
    pub prompts: PromptsConfig,
    pub logging: LoggingConfig,
    /// Config file that was loaded, if any.
    pub config_path: Option<PathBuf>,
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// Command-line overrides. `None` leaves the file/default value alone.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub min_output_reviews: Option<u32>,
    pub max_output_reviews: Option<u32>,
    pub rework_routes: Option<ReworkRoutes>,
    pub recursion_limit: Option<usize>,
    pub run_timeout_secs: Option<u64>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub prompts_dir: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub log_json: Option<bool>,
}

/// On-disk shape of `config.toml`: every key optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct TomlConfig {
    pub pipeline: Option<PipelineFile>,
    pub llm: Option<LlmFile>,
    pub prompts: Option<PromptsConfig>,
    pub logging: Option<LoggingFile>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct PipelineFile {
    pub min_output_reviews: Option<u32>,
    pub max_output_reviews: Option<u32>,
    pub rework_routes: Option<ReworkRoutes>,
    pub max_rework_passes: Option<u32>,
    pub recursion_limit: Option<usize>,
    pub run_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct LlmFile {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
    pub budget: Option<u32>,
    pub retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub(crate) struct LoggingFile {
    pub verbose: Option<bool>,
    pub json: Option<bool>,
}
