//! Exit code constants for the fsts CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Run completed and the deliverable was written |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `PROMPT_CONFIG` | Prompt definition missing/malformed, or unbound parameter |
//! | 4 | `ROUTING` | Unknown route target, invalid graph or recursion limit |
//! | 10 | `RUN_TIMEOUT` | Run or completion call exceeded its time budget |
//! | 70 | `LLM_FAILURE` | Completion backend call failed |

/// Type-safe process exit code.
///
/// The numeric values are part of the CLI contract.
///
/// ```rust
/// use fsts_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::from_i32(70), ExitCode::LLM_FAILURE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - run completed
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Prompt definition missing or malformed, or a parameter could not be bound
    pub const PROMPT_CONFIG: ExitCode = ExitCode(3);

    /// Routing failure - unknown target, invalid graph or step cap hit
    pub const ROUTING: ExitCode = ExitCode(4);

    /// Run timeout - wall-clock budget or completion timeout exceeded
    pub const RUN_TIMEOUT: ExitCode = ExitCode(10);

    /// Completion backend failure
    pub const LLM_FAILURE: ExitCode = ExitCode(70);

    /// Get the numeric exit code value.
    ///
    /// Use this with `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}
