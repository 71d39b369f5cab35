//! Concrete implementations of the pipeline stages
//!
//! Four drafting stages with fixed successors, the reviewer, the branching
//! manager and the terminal node. The manager's free-text answer is routed
//! through [`parse_route`] and bounded by [`RoutePolicy`].

mod manager;
mod policy;
mod prompted;
mod route;

use std::sync::Arc;

use fsts_stage_api::{Stage, StageId};

pub use manager::ManagerStage;
pub use policy::{RouteDecision, RouteOverride, RoutePolicy, clamp_route};
pub use prompted::{FinalOutputStage, PromptedStage, ReviewerStage};
pub use route::{DEFAULT_ROUTE, parse_route, parse_route_value, route_token};

/// The implementation of `stage`.
#[must_use]
pub fn stage_for(stage: StageId, policy: RoutePolicy) -> Arc<dyn Stage> {
    match stage {
        StageId::AbapCodeAnalyst => Arc::new(PromptedStage::abap_code_analyst()),
        StageId::ForeignDependencyAgent => Arc::new(PromptedStage::foreign_dependency_agent()),
        StageId::FunctionalSpecDrafter => Arc::new(PromptedStage::functional_spec_drafter()),
        StageId::TechnicalSpecWriter => Arc::new(PromptedStage::technical_spec_writer()),
        StageId::ManagerAgent => Arc::new(ManagerStage::new(policy)),
        StageId::OutputReviewer => Arc::new(ReviewerStage),
        StageId::FinalOutput => Arc::new(FinalOutputStage),
    }
}

/// All seven stages, in pipeline order.
#[must_use]
pub fn standard_stages(policy: RoutePolicy) -> Vec<Arc<dyn Stage>> {
    StageId::all().map(|id| stage_for(id, policy)).collect()
}
