//! The run loop: execute nodes from the entry until the terminal node.

use std::time::Instant;
use tracing::{Instrument, debug};

use fsts_stage_api::{PipelineError, PipelineState, StageContext};
use fsts_utils::logging::{log_stage_complete, log_stage_error, log_stage_start, stage_span};

use crate::graph::PipelineGraph;

/// Default cap on node executions per run.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

impl PipelineGraph {
    /// Drive `state` through the graph.
    ///
    /// Nodes run strictly one after another. The terminal node is executed
    /// and then the run stops. At most `recursion_limit` nodes execute.
    ///
    /// # Errors
    ///
    /// The first stage failure, [`PipelineError::UnknownNode`] for an
    /// unrouted target, or [`PipelineError::RecursionLimit`].
    pub async fn run(
        &self,
        mut state: PipelineState,
        ctx: &StageContext,
        recursion_limit: usize,
    ) -> Result<PipelineState, PipelineError> {
        let mut current = self.entry;
        let mut steps = 0usize;

        loop {
            if steps >= recursion_limit {
                return Err(PipelineError::RecursionLimit {
                    limit: recursion_limit,
                });
            }
            steps += 1;

            let stage = self.stage(current)?;
            state.push_history(current);
            log_stage_start(&ctx.run_id, current, steps);

            let started = Instant::now();
            let span = stage_span(&ctx.run_id, current);
            if let Err(err) = stage.run(&mut state, ctx).instrument(span).await {
                log_stage_error(
                    &ctx.run_id,
                    current,
                    &err.to_string(),
                    started.elapsed().as_millis(),
                );
                return Err(err);
            }
            let duration_ms = started.elapsed().as_millis();

            if current == self.terminal {
                log_stage_complete(&ctx.run_id, current, None, duration_ms);
                return Ok(state);
            }

            let next = self.next_node(current, &state)?;
            if state.next_node() != Some(next) {
                debug!(
                    stage = %current,
                    declared = ?state.next_node(),
                    wired = %next,
                    "Static edge overrides declared successor"
                );
                state.set_next_node(Some(next));
            }
            log_stage_complete(&ctx.run_id, current, Some(next), duration_ms);
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fsts_llm::ScriptedBackend;
    use fsts_prompt_template::PromptCatalog;
    use fsts_stage_api::{PipelineInput, ReviewBounds, Stage, StageId};
    use fsts_stages::{RoutePolicy, stage_for};
    use fsts_usage::UsageLog;
    use std::sync::Arc;

    use crate::graph::GraphBuilder;

    fn ctx(backend: Arc<ScriptedBackend>) -> StageContext {
        StageContext::new(
            "engine-test",
            backend,
            Arc::new(PromptCatalog::builtin().unwrap()),
            Arc::new(UsageLog::new()),
        )
    }

    fn input(min: u32, max: u32) -> PipelineState {
        PipelineState::new(
            PipelineInput::new("REPORT z.", "# T").with_bounds(ReviewBounds::new(min, max)),
        )
    }

    /// Manager stand-in that always routes to a fixed value.
    struct FixedRoute(StageId);

    #[async_trait]
    impl Stage for FixedRoute {
        fn id(&self) -> StageId {
            StageId::ManagerAgent
        }

        async fn run(
            &self,
            state: &mut PipelineState,
            _ctx: &StageContext,
        ) -> Result<(), PipelineError> {
            state.set_next_node(Some(self.0));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_always_finish_passes_reviewer_once() {
        let backend = Arc::new(
            ScriptedBackend::new().with_fallback(StageId::ManagerAgent, "doc [ROUTE: final_output]"),
        );
        let graph = PipelineGraph::standard(RoutePolicy::default()).unwrap();
        let state = graph
            .run(input(1, 2), &ctx(Arc::clone(&backend)), 25)
            .await
            .unwrap();

        assert_eq!(state.review_count(), 1);
        assert_eq!(state.visits(StageId::OutputReviewer), 1);
        assert_eq!(state.visits(StageId::ManagerAgent), 2);
        assert_eq!(state.history().last(), Some(&StageId::FinalOutput));
        assert_eq!(backend.call_count(), 7);
    }

    #[tokio::test]
    async fn test_recursion_limit_aborts() {
        let backend = Arc::new(ScriptedBackend::new());
        let graph = PipelineGraph::standard(RoutePolicy::default()).unwrap();
        let err = graph
            .run(input(1, 2), &ctx(backend), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RecursionLimit { limit: 3 }));
    }

    #[tokio::test]
    async fn test_unwired_route_is_unknown_node() {
        let graph = GraphBuilder::new()
            .add_node(Arc::new(FixedRoute(StageId::TechnicalSpecWriter)))
            .add_node(stage_for(StageId::OutputReviewer, RoutePolicy::default()))
            .add_node(stage_for(StageId::FinalOutput, RoutePolicy::default()))
            .set_entry(StageId::ManagerAgent)
            .set_terminal(StageId::FinalOutput)
            .add_edge(StageId::OutputReviewer, StageId::ManagerAgent)
            .add_conditional_edges(
                StageId::ManagerAgent,
                [
                    (StageId::OutputReviewer, StageId::OutputReviewer),
                    (StageId::FinalOutput, StageId::FinalOutput),
                ],
            )
            .build()
            .unwrap();

        let err = graph
            .run(input(0, 0), &ctx(Arc::new(ScriptedBackend::new())), 25)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnknownNode { from: StageId::ManagerAgent, ref target }
                if target == "technical_spec_writer"
        ));
    }

    #[tokio::test]
    async fn test_stage_error_aborts_run() {
        let graph = PipelineGraph::standard(RoutePolicy::default()).unwrap();
        let mut context = ctx(Arc::new(ScriptedBackend::new()));
        context.prompts = Arc::new(PromptCatalog::new());

        let err = graph.run(input(1, 2), &context, 25).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Configuration { stage: StageId::AbapCodeAnalyst, .. }
        ));
    }
}
