//! fsts - functional/technical specifications from ABAP sources
//!
//! An ABAP report and a specification template go in; a consolidated
//! functional/technical specification document comes out. In between, a
//! fixed graph of LLM stages analyses the code, extracts its external
//! dependencies, drafts both specifications, and then loops a manager and a
//! reviewer until the manager routes to `final_output` within the configured
//! review bounds.
//!
//! fsts can be used in two ways:
//! - **CLI**: `fsts run --code zreport.abap --template template.md`
//! - **Library**: build an [`OrchestratorHandle`] and call `run`
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fsts::{Config, OrchestratorHandle, ScriptedBackend};
//!
//! # async fn demo() -> Result<(), fsts::FstsError> {
//! let handle = OrchestratorHandle::from_config(Config::default())?
//!     .with_backend(Arc::new(ScriptedBackend::dry_run()));
//! let outcome = handle.run(handle.input("REPORT zdemo.", "# Template")).await?;
//! let document = fsts::deliverable::clean_markdown(&outcome.deliverable);
//! println!("{}", document.text);
//! # Ok(())
//! # }
//! ```
//!
//! # Crates
//!
//! | Crate | Role |
//! |-------|------|
//! | `fsts-utils` | stage ids, errors, exit codes, logging |
//! | `fsts-prompt-template` | prompt catalog and binding |
//! | `fsts-llm` | completion backends and decorators |
//! | `fsts-usage` | usage log and aggregation |
//! | `fsts-stage-api` | pipeline state and the stage contract |
//! | `fsts-stages` | the seven stages, route parsing, routing policy |
//! | `fsts-config` | configuration model and discovery |
//! | `fsts-orchestrator` | graph engine and host facade |

pub mod cli;
pub mod deliverable;

pub use fsts_config::{CliArgs, Config, Provider};
pub use fsts_llm::{LlmBackend, ScriptedBackend, ScriptedReply};
pub use fsts_orchestrator::{
    DEFAULT_RECURSION_LIMIT, GraphBuilder, OrchestratorHandle, PipelineGraph, RunOutcome,
};
pub use fsts_prompt_template::{PromptCatalog, PromptDefinition, PromptStore};
pub use fsts_stage_api::{OutputField, PipelineInput, PipelineState, ReviewBounds};
pub use fsts_stages::{RouteDecision, RoutePolicy, parse_route};
pub use fsts_usage::{UsageLog, UsageSummary};
pub use fsts_utils::{ExitCode, FstsError, PipelineError, ReworkRoutes, StageId};
