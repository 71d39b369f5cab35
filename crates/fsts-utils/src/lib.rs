//! Foundation crate for fsts: stage identifiers, the error taxonomy, exit
//! codes, redaction and tracing setup.

pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod redaction;
pub mod types;

pub use error::{ConfigError, ErrorCategory, FstsError, LlmError, PipelineError, UserFriendlyError};
pub use exit_codes::ExitCode;
pub use types::{ReworkRoutes, StageId};
