//! Configuration for fsts.
//!
//! Values are layered CLI > `.fsts/config.toml` > built-in defaults, and each
//! effective value remembers which layer supplied it.

mod discovery;
mod model;
mod sources;
mod validation;

pub use discovery::{CONFIG_DIR, CONFIG_FILE, HOME_ENV};
pub use model::{
    CliArgs, Config, ConfigSource, LlmConfig, LoggingConfig, PipelineConfig, PromptsConfig,
    Provider,
};
