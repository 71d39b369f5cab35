//! The branching node: consolidates drafts, revises on feedback, and picks
//! the next stage from the directive at the end of its answer.

use async_trait::async_trait;
use tracing::{debug, info};

use fsts_prompt_template::ParameterOverlay;
use fsts_stage_api::{OutputField, PipelineError, PipelineState, Stage, StageContext, StageId};

use crate::policy::RoutePolicy;
use crate::route::{parse_route, route_token};

const CONSOLIDATION_BRIEF: &str = "consolidation";
const REVISION_BRIEF: &str = "revision";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStage {
    policy: RoutePolicy,
}

impl ManagerStage {
    #[must_use]
    pub const fn new(policy: RoutePolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> RoutePolicy {
        self.policy
    }
}

/// The three drafting outputs, as the consolidation body presents them.
fn drafts_block(state: &PipelineState) -> Result<String, PipelineError> {
    let stage = StageId::ManagerAgent;
    let fs = state.require_output(stage, OutputField::FsOutput)?;
    let ts = state.require_output(stage, OutputField::TsOutput)?;
    let fd = state.require_output(stage, OutputField::ForeignDependencies)?;
    Ok(format!(
        "--- Functional Spec ---\n{fs}\n\n--- Technical Spec ---\n{ts}\n--- Foreign Dependencies ---\n{fd}\n"
    ))
}

/// Whether the manager is running straight after a rework pass re-ran the
/// drafting stages.
fn returning_from_rework(state: &PipelineState) -> bool {
    let history = state.history();
    state.rework_count() > 0
        && history.len() >= 2
        && history[history.len() - 2] == StageId::TechnicalSpecWriter
}

#[async_trait]
impl Stage for ManagerStage {
    fn id(&self) -> StageId {
        StageId::ManagerAgent
    }

    async fn run(
        &self,
        state: &mut PipelineState,
        ctx: &StageContext,
    ) -> Result<(), PipelineError> {
        let stage = StageId::ManagerAgent;
        let prompt = ctx.prompts.resolve(stage)?;
        let has_feedback = state.has_feedback();

        let (brief_name, previous_manager_block, feedback_block) = if has_feedback {
            let previous = state.require_output(stage, OutputField::ManagerOutput)?;
            let feedback = state.require_output(stage, OutputField::ReviewFeedback)?;
            let mut feedback_block = format!("Reviewer Feedback:\n{feedback}\n");
            if returning_from_rework(state) {
                feedback_block.push('\n');
                feedback_block.push_str(&drafts_block(state)?);
            }
            (
                REVISION_BRIEF,
                format!("--- Manager Previous Output ---\n{previous}\n"),
                feedback_block,
            )
        } else {
            (CONSOLIDATION_BRIEF, String::new(), drafts_block(state)?)
        };

        let brief = prompt.brief(brief_name)?;
        let user_prompt = {
            let overlay = ParameterOverlay::new(&*state)
                .with("task_description", brief.description.clone())
                .with("task_expected_output", brief.expected_output.clone())
                .with("previous_manager_block", previous_manager_block)
                .with("feedback_block", feedback_block);
            prompt.bind(&overlay)?
        };
        state.set_last_user_prompt(user_prompt.clone());

        debug!(brief = brief_name, has_feedback, "Manager prompt bound");

        let content = ctx
            .complete(stage, &prompt.system_prompt, &user_prompt, &prompt.fingerprint)
            .await?;

        let proposed = parse_route(&content);
        let decision = self.policy.decide(
            proposed,
            state.review_count(),
            state.rework_count(),
            state.bounds(),
        );

        info!(
            run_id = %ctx.run_id,
            directive = route_token(&content).unwrap_or("<none>"),
            proposed = %decision.proposed,
            resolved = %decision.resolved,
            overridden_by = decision.overridden_by.map(|o| o.as_str()).unwrap_or("none"),
            review_count = state.review_count(),
            "Manager route resolved"
        );

        if decision.is_rework() {
            state.record_rework();
        }
        state.set_output(OutputField::ManagerOutput, content);
        state.set_next_node(Some(decision.resolved));
        Ok(())
    }
}
