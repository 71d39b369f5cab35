//! Tracing setup and the structured stage log events.

use std::io::IsTerminal;
use tracing::{Level, error, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::redaction::redact;
use crate::types::StageId;

/// Output options for [`init_tracing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Debug-level events for fsts crates, span close timings.
    pub verbose: bool,
    /// One JSON object per line instead of the compact human format.
    pub json: bool,
}

/// Color only when stdout is a TTY and NO_COLOR is unset.
fn use_color() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise fsts crates log at `info`
/// (`debug` with `verbose`) and everything else at `warn`.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(options: LogOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let default_directives = if options.verbose {
        "fsts=debug,fsts_orchestrator=debug,fsts_stages=debug,fsts_llm=debug,warn"
    } else {
        "fsts=info,fsts_orchestrator=info,fsts_stages=info,fsts_llm=info,warn"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let span_events = if options.verbose {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    // Logs go to stderr; stdout carries the deliverable.
    if options.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(span_events),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(use_color())
                    .with_target(options.verbose)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(span_events)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one stage execution.
pub fn stage_span(run_id: &str, stage: StageId) -> tracing::Span {
    span!(
        Level::INFO,
        "stage",
        run_id = %run_id,
        stage = %stage,
    )
}

pub fn log_stage_start(run_id: &str, stage: StageId, step: usize) {
    info!(run_id = %run_id, stage = %stage, step, "Starting stage");
}

pub fn log_stage_complete(run_id: &str, stage: StageId, next: Option<StageId>, duration_ms: u128) {
    match next {
        Some(next) => info!(
            run_id = %run_id,
            stage = %stage,
            next = %next,
            duration_ms = %duration_ms,
            "Stage completed"
        ),
        None => info!(
            run_id = %run_id,
            stage = %stage,
            duration_ms = %duration_ms,
            "Terminal stage reached"
        ),
    }
}

/// Error messages are redacted before they reach the subscriber.
pub fn log_stage_error(run_id: &str, stage: StageId, error: &str, duration_ms: u128) {
    let sanitized = redact(error);
    error!(
        run_id = %run_id,
        stage = %stage,
        duration_ms = %duration_ms,
        error = %sanitized,
        "Stage failed"
    );
}
