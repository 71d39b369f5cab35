//! Stage trait system for the fsts pipeline
//!
//! This crate provides the shared contract between the orchestrator and the
//! stage implementations: the typed [`PipelineState`] threaded through a run,
//! the [`StageContext`] carrying the run's collaborators, and the [`Stage`]
//! trait itself.

mod context;
mod state;

use async_trait::async_trait;

pub use context::StageContext;
pub use fsts_utils::error::PipelineError;
pub use fsts_utils::types::StageId;
pub use state::{OutputField, PipelineInput, PipelineState, ReviewBounds};

/// Core trait that every graph node implements.
///
/// A stage reads what it needs from the state, performs at most one
/// completion call, writes its output field, and sets `next_node`. Stages
/// never run concurrently within a run, so they take the state mutably.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Returns the node this stage implements
    fn id(&self) -> StageId;

    /// Execute the stage against `state`.
    ///
    /// # Errors
    ///
    /// Any [`PipelineError`]; all of them abort the run.
    async fn run(&self, state: &mut PipelineState, ctx: &StageContext)
    -> Result<(), PipelineError>;
}
