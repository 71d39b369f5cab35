//! Orchestrator for executing the specification pipeline
//!
//! This crate holds the graph engine and the host facade:
//! - **GraphBuilder / PipelineGraph**: node set, static edges, and the
//!   manager's conditional route table, validated at build time
//! - **PipelineGraph::run**: the sequential run loop with the recursion limit
//! - **OrchestratorHandle**: builds everything from `Config` and runs the
//!   pipeline, applying the optional wall-clock budget
//!
//! # Integration Rule
//!
//! **Outside this crate, use `OrchestratorHandle` for production runs.**
//! Direct graph usage is meant for tests and custom wiring.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fsts_config::{CliArgs, Config};
//! use fsts_orchestrator::OrchestratorHandle;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::discover(&CliArgs::default())?;
//!     let handle = OrchestratorHandle::from_config(config)?;
//!
//!     let input = handle.input("REPORT zdemo.", "# Template");
//!     let outcome = handle.run(input).await?;
//!     println!("{}", outcome.deliverable);
//!     Ok(())
//! }
//! ```

mod engine;
mod graph;
mod handle;
mod render;

pub use engine::DEFAULT_RECURSION_LIMIT;
pub use graph::{Edge, GraphBuilder, PipelineGraph};
pub use handle::{OrchestratorHandle, RunOutcome};
