//! Linear stages: resolve the prompt, bind it, call the model, store the answer.

use async_trait::async_trait;
use tracing::debug;

use fsts_stage_api::{OutputField, PipelineError, PipelineState, Stage, StageContext, StageId};

/// Prompt, bind, invoke and store the answer in `output`. Shared by every
/// stage with a fixed successor.
pub(crate) async fn prompt_and_store(
    stage: StageId,
    output: OutputField,
    state: &mut PipelineState,
    ctx: &StageContext,
) -> Result<(), PipelineError> {
    let prompt = ctx.prompts.resolve(stage)?;
    let user_prompt = prompt.bind(&*state)?;
    state.set_last_user_prompt(user_prompt.clone());

    let content = ctx
        .complete(stage, &prompt.system_prompt, &user_prompt, &prompt.fingerprint)
        .await?;

    debug!(stage = %stage, field = %output, chars = content.len(), "Stage output stored");
    state.set_output(output, content);
    Ok(())
}

/// One of the four drafting stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptedStage {
    id: StageId,
    output: OutputField,
    successor: StageId,
}

impl PromptedStage {
    #[must_use]
    pub const fn new(id: StageId, output: OutputField, successor: StageId) -> Self {
        Self {
            id,
            output,
            successor,
        }
    }

    #[must_use]
    pub const fn abap_code_analyst() -> Self {
        Self::new(
            StageId::AbapCodeAnalyst,
            OutputField::AbapAnalysis,
            StageId::ForeignDependencyAgent,
        )
    }

    #[must_use]
    pub const fn foreign_dependency_agent() -> Self {
        Self::new(
            StageId::ForeignDependencyAgent,
            OutputField::ForeignDependencies,
            StageId::FunctionalSpecDrafter,
        )
    }

    #[must_use]
    pub const fn functional_spec_drafter() -> Self {
        Self::new(
            StageId::FunctionalSpecDrafter,
            OutputField::FsOutput,
            StageId::TechnicalSpecWriter,
        )
    }

    #[must_use]
    pub const fn technical_spec_writer() -> Self {
        Self::new(
            StageId::TechnicalSpecWriter,
            OutputField::TsOutput,
            StageId::ManagerAgent,
        )
    }

    #[must_use]
    pub const fn successor(&self) -> StageId {
        self.successor
    }
}

#[async_trait]
impl Stage for PromptedStage {
    fn id(&self) -> StageId {
        self.id
    }

    async fn run(
        &self,
        state: &mut PipelineState,
        ctx: &StageContext,
    ) -> Result<(), PipelineError> {
        prompt_and_store(self.id, self.output, state, ctx).await?;
        state.set_next_node(Some(self.successor));
        Ok(())
    }
}

/// Reviews the manager's document; the only stage that counts reviews.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewerStage;

#[async_trait]
impl Stage for ReviewerStage {
    fn id(&self) -> StageId {
        StageId::OutputReviewer
    }

    async fn run(
        &self,
        state: &mut PipelineState,
        ctx: &StageContext,
    ) -> Result<(), PipelineError> {
        prompt_and_store(StageId::OutputReviewer, OutputField::ReviewFeedback, state, ctx).await?;
        let review_count = state.record_review();
        debug!(review_count, "Review pass recorded");
        state.set_next_node(Some(StageId::ManagerAgent));
        Ok(())
    }
}

/// Terminal node. Performs no work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalOutputStage;

#[async_trait]
impl Stage for FinalOutputStage {
    fn id(&self) -> StageId {
        StageId::FinalOutput
    }

    async fn run(
        &self,
        state: &mut PipelineState,
        _ctx: &StageContext,
    ) -> Result<(), PipelineError> {
        state.set_next_node(None);
        Ok(())
    }
}
