use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::exit_codes::ExitCode;
use crate::redaction::redact;
use crate::types::StageId;

/// Library-level error type with user-friendly reporting.
///
/// `FstsError` is what the host facade and the CLI return. It provides:
/// - detailed variants for programmatic handling
/// - user-facing messages with context and suggestions
/// - a mapping to CLI exit codes
///
/// # Exit Code Mapping
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration/CLI argument errors |
/// | 3 | Prompt configuration or missing parameter |
/// | 4 | Routing errors (unknown node, invalid graph, recursion limit) |
/// | 10 | Run timeout |
/// | 70 | Completion backend failure |
/// | 1 | Other errors |
///
/// # Example
///
/// ```rust
/// use fsts_utils::error::{ConfigError, FstsError};
/// use fsts_utils::exit_codes::ExitCode;
///
/// let err = FstsError::Config(ConfigError::InvalidFile("bad toml".to_string()));
/// assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
/// ```
#[derive(Error, Debug)]
pub enum FstsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a pipeline run.
///
/// None of these are recovered inside the run; the orchestrator unwinds and the
/// host sees a single failure. Malformed route text is deliberately absent: the
/// directive parser absorbs it by defaulting to another review pass.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A stage's prompt definition is missing or malformed.
    #[error("Prompt configuration for {stage} is invalid: {reason}")]
    Configuration { stage: StageId, reason: String },

    /// A placeholder could not be bound from the pipeline state.
    #[error("Stage {stage} requires '{parameter}' but it is not available")]
    MissingParameter { stage: StageId, parameter: String },

    /// The completion backend call failed.
    #[error("Completion backend failed during {stage}: {source}")]
    CompletionBackend {
        stage: StageId,
        #[source]
        source: LlmError,
    },

    /// A resolved routing target has no entry in the graph.
    #[error("Stage {from} routed to '{target}', which is not wired in the graph")]
    UnknownNode { from: StageId, target: String },

    /// The graph definition itself is inconsistent.
    #[error("Invalid pipeline graph: {reason}")]
    InvalidGraph { reason: String },

    /// The run executed more nodes than the configured limit.
    #[error("Run exceeded the recursion limit of {limit} stage executions")]
    RecursionLimit { limit: usize },

    /// The host's wall-clock budget for the run elapsed.
    #[error("Run timed out after {seconds}s")]
    RunTimedOut { seconds: u64 },
}

impl PipelineError {
    /// The stage the error is attributed to, when there is one.
    #[must_use]
    pub fn stage(&self) -> Option<StageId> {
        match self {
            Self::Configuration { stage, .. }
            | Self::MissingParameter { stage, .. }
            | Self::CompletionBackend { stage, .. } => Some(*stage),
            Self::UnknownNode { from, .. } => Some(*from),
            Self::InvalidGraph { .. } | Self::RecursionLimit { .. } | Self::RunTimedOut { .. } => {
                None
            }
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

/// Errors that can occur during LLM backend operations
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, unexpected status)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Budget limit exceeded
    #[error("Budget exceeded: attempted {attempted} calls, limit is {limit}")]
    BudgetExceeded { limit: u32, attempted: u32 },

    /// The provider answered, but not with usable completion text
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl LlmError {
    /// Whether a host-level retry could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ProviderOutage(_) | Self::Timeout { .. }
        )
    }
}

/// Trait for errors that can be shown to a person at a terminal.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for grouping in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Prompting,
    Routing,
    LlmIntegration,
    FileSystem,
    ResourceLimits,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Prompting => write!(f, "Prompting"),
            Self::Routing => write!(f, "Routing"),
            Self::LlmIntegration => write!(f, "LLM Integration"),
            Self::FileSystem => write!(f, "File System"),
            Self::ResourceLimits => write!(f, "Resource Limits"),
        }
    }
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::ValidationFailed { errors, .. } => {
                format!("Configuration is invalid: {}", errors.join("; "))
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "Configuration is read from .fsts/config.toml (searched upward from the working \
             directory), then overridden by command-line flags."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of the configuration file".to_string(),
                "Run 'fsts config' to see the effective configuration".to_string(),
            ],
            Self::InvalidValue { key, .. } => {
                vec![format!("Fix the value of '{key}' in the config file or CLI flags")]
            }
            Self::NotFound { .. } => vec![
                "Pass --config with an existing file, or remove the flag to use defaults"
                    .to_string(),
            ],
            Self::ValidationFailed { .. } => vec![
                "Ensure min_output_reviews <= max_output_reviews".to_string(),
                "Raise recursion_limit if the review bounds were increased".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

impl UserFriendlyError for PipelineError {
    fn user_message(&self) -> String {
        match self {
            Self::CompletionBackend { stage, source } => {
                format!("Stage '{stage}' failed: {}", source.user_message())
            }
            other => other.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Configuration { .. } => Some(
                "Every stage needs a prompt definition with a system prompt, a user prompt and \
                 the list of parameters the user prompt references."
                    .to_string(),
            ),
            Self::MissingParameter { .. } => Some(
                "A stage ran before the stage that produces one of its inputs. This points at \
                 the graph wiring or at a prompt that references the wrong field."
                    .to_string(),
            ),
            Self::CompletionBackend { source, .. } => source.context(),
            Self::UnknownNode { .. } | Self::InvalidGraph { .. } => Some(
                "The manager's route is looked up in the conditional edge table; only wired \
                 targets can be followed."
                    .to_string(),
            ),
            Self::RecursionLimit { .. } => Some(
                "The step cap bounds the total number of stage executions in a single run."
                    .to_string(),
            ),
            Self::RunTimedOut { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Configuration { stage, .. } => vec![
                format!("Check prompts/{stage}.yaml"),
                "Run 'fsts prompts' to validate every prompt definition".to_string(),
            ],
            Self::MissingParameter { parameter, .. } => vec![format!(
                "Remove '{{{parameter}}}' from the prompt or make sure an earlier stage produces it"
            )],
            Self::CompletionBackend { source, .. } => source.suggestions(),
            Self::UnknownNode { .. } => vec![
                "Set pipeline.rework_routes = \"collapse\" to fold rework routes into a review"
                    .to_string(),
            ],
            Self::InvalidGraph { .. } => vec!["Check the graph definition".to_string()],
            Self::RecursionLimit { .. } => vec![
                "Raise pipeline.recursion_limit or lower max_output_reviews".to_string(),
            ],
            Self::RunTimedOut { .. } => vec![
                "Raise pipeline.run_timeout_secs or use a faster model".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } | Self::MissingParameter { .. } => ErrorCategory::Prompting,
            Self::CompletionBackend { source, .. } => source.category(),
            Self::UnknownNode { .. } | Self::InvalidGraph { .. } | Self::RecursionLimit { .. } => {
                ErrorCategory::Routing
            }
            Self::RunTimedOut { .. } => ErrorCategory::ResourceLimits,
        }
    }
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider service outage: {msg}"),
            Self::Timeout { duration } => {
                format!("LLM invocation timed out after {duration:?}")
            }
            Self::BudgetExceeded { limit, attempted } => {
                format!("LLM budget exceeded: attempted {attempted} calls, limit is {limit}")
            }
            Self::MalformedResponse(msg) => format!("LLM returned an unusable response: {msg}"),
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
            Self::Unsupported(msg) => format!("LLM feature not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Transport(_) => {
                Some("The LLM endpoint could not be reached or answered unexpectedly.".to_string())
            }
            Self::ProviderAuth(_) => Some(
                "The provider rejected the API key. The key is read from the environment \
                 variable named by llm.api_key_env."
                    .to_string(),
            ),
            Self::ProviderQuota(_) => {
                Some("The provider is rate limiting this account.".to_string())
            }
            Self::BudgetExceeded { .. } => Some(
                "llm.budget caps the number of completion calls a single process may make."
                    .to_string(),
            ),
            Self::Timeout { .. }
            | Self::ProviderOutage(_)
            | Self::MalformedResponse(_)
            | Self::Misconfiguration(_)
            | Self::Unsupported(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Transport(_) | Self::ProviderOutage(_) => vec![
                "Check network connectivity and the provider status page".to_string(),
                "Set llm.retries to retry transient failures".to_string(),
            ],
            Self::ProviderAuth(_) => {
                vec!["Export a valid API key in the configured environment variable".to_string()]
            }
            Self::ProviderQuota(_) => vec!["Wait and retry, or raise the provider quota".to_string()],
            Self::Timeout { .. } => vec!["Raise llm.timeout_secs".to_string()],
            Self::BudgetExceeded { .. } => vec!["Raise llm.budget".to_string()],
            Self::MalformedResponse(_) => {
                vec!["Check that llm.base_url points at a chat completions endpoint".to_string()]
            }
            Self::Misconfiguration(_) | Self::Unsupported(_) => {
                vec!["Run 'fsts config' to review the [llm] section".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::BudgetExceeded { .. } | Self::Timeout { .. } => ErrorCategory::ResourceLimits,
            Self::Misconfiguration(_) | Self::Unsupported(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::LlmIntegration,
        }
    }
}

impl UserFriendlyError for FstsError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Pipeline(e) => e.user_message(),
            Self::Llm(e) => e.user_message(),
            Self::Io(e) => format!("File system error: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Pipeline(e) => e.context(),
            Self::Llm(e) => e.context(),
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Pipeline(e) => e.suggestions(),
            Self::Llm(e) => e.suggestions(),
            Self::Io(_) => vec!["Check that the input files exist and are readable".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Pipeline(e) => e.category(),
            Self::Llm(e) => e.category(),
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl FstsError {
    /// Get a user-friendly error message with context and actionable suggestions.
    ///
    /// The result is redacted, so it is safe to print.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        redact(&output)
    }

    /// Map this error to the CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Pipeline(e) => pipeline_exit_code(e),
            Self::Llm(e) => llm_exit_code(e),
            Self::Io(_) => ExitCode::INTERNAL,
        }
    }
}

fn pipeline_exit_code(err: &PipelineError) -> ExitCode {
    match err {
        PipelineError::Configuration { .. } | PipelineError::MissingParameter { .. } => {
            ExitCode::PROMPT_CONFIG
        }
        PipelineError::CompletionBackend { source, .. } => llm_exit_code(source),
        PipelineError::UnknownNode { .. }
        | PipelineError::InvalidGraph { .. }
        | PipelineError::RecursionLimit { .. } => ExitCode::ROUTING,
        PipelineError::RunTimedOut { .. } => ExitCode::RUN_TIMEOUT,
    }
}

fn llm_exit_code(err: &LlmError) -> ExitCode {
    match err {
        LlmError::Timeout { .. } => ExitCode::RUN_TIMEOUT,
        LlmError::Misconfiguration(_) | LlmError::Unsupported(_) => ExitCode::CLI_ARGS,
        _ => ExitCode::LLM_FAILURE,
    }
}
