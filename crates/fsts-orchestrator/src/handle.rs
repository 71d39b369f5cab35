//! Host facade: builds the collaborators from configuration and runs the
//! pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use fsts_config::Config;
use fsts_llm::LlmBackend;
use fsts_prompt_template::{PromptCatalog, PromptStore};
use fsts_stage_api::{
    OutputField, PipelineError, PipelineInput, PipelineState, ReviewBounds, StageContext, StageId,
};
use fsts_stages::RoutePolicy;
use fsts_usage::{UsageLog, UsageSummary};
use fsts_utils::error::FstsError;

use crate::graph::PipelineGraph;

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_run_id() -> String {
    let seq = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{}-{seq:04}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ"))
}

/// Everything a host gets back from a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    /// `manager_output` at termination, unmodified.
    pub deliverable: String,
    pub state: PipelineState,
    /// Usage of this run only.
    pub usage: UsageSummary,
    pub duration: Duration,
}

/// Stable entry point for running the pipeline.
///
/// One handle can serve many runs, sequentially or concurrently; each run
/// gets its own state while the usage log is shared.
pub struct OrchestratorHandle {
    config: Config,
    backend: Arc<dyn LlmBackend>,
    prompts: Arc<dyn PromptStore>,
    usage: Arc<UsageLog>,
    graph: PipelineGraph,
}

impl OrchestratorHandle {
    /// Build backend, prompt catalog, usage log and graph from `config`.
    ///
    /// # Errors
    ///
    /// Invalid configuration, a backend that cannot be constructed, or a
    /// prompt directory that cannot be loaded.
    pub fn from_config(config: Config) -> Result<Self, FstsError> {
        config.validate()?;

        let backend = fsts_llm::from_config(&config.llm)?;
        let prompts: Arc<dyn PromptStore> = match &config.prompts.dir {
            Some(dir) => Arc::new(PromptCatalog::load_dir(dir)?),
            None => Arc::new(PromptCatalog::builtin()?),
        };
        let graph = PipelineGraph::standard(policy_of(&config))?;

        Ok(Self {
            config,
            backend,
            prompts,
            usage: Arc::new(UsageLog::new()),
            graph,
        })
    }

    /// Swap the completion backend (tests, dry runs, custom providers).
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.backend = backend;
        self
    }

    #[must_use]
    pub fn with_prompts(mut self, prompts: Arc<dyn PromptStore>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Share an existing process-wide usage log.
    #[must_use]
    pub fn with_usage_log(mut self, usage: Arc<UsageLog>) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn with_graph(mut self, graph: PipelineGraph) -> Self {
        self.graph = graph;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    #[must_use]
    pub fn usage_log(&self) -> &Arc<UsageLog> {
        &self.usage
    }

    /// A run input carrying the configured review bounds.
    #[must_use]
    pub fn input(&self, code_input: impl Into<String>, template_text: impl Into<String>) -> PipelineInput {
        PipelineInput::new(code_input, template_text).with_bounds(ReviewBounds::new(
            self.config.pipeline.min_output_reviews,
            self.config.pipeline.max_output_reviews,
        ))
    }

    /// Execute one run.
    ///
    /// # Errors
    ///
    /// Any [`PipelineError`] from the run, including
    /// [`PipelineError::RunTimedOut`] when `run_timeout_secs` elapses.
    pub async fn run(&self, input: PipelineInput) -> Result<RunOutcome, FstsError> {
        let run_id = next_run_id();
        let started = Instant::now();
        let bounds = input.bounds;
        info!(
            run_id = %run_id,
            backend = self.backend.name(),
            min_output_reviews = bounds.min_output_reviews,
            max_output_reviews = bounds.max_output_reviews,
            rework_routes = %self.graph.policy().rework_routes,
            "Starting pipeline run"
        );

        let ctx = StageContext::new(
            run_id.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.prompts),
            Arc::clone(&self.usage),
        )
        .with_model(self.config.llm.model.clone())
        .with_timeout(Duration::from_secs(self.config.llm.timeout_secs));

        let recursion_limit = self.config.pipeline.recursion_limit;
        let run = self.graph.run(PipelineState::new(input), &ctx, recursion_limit);
        let state = match self.config.pipeline.run_timeout_secs {
            Some(seconds) => tokio::time::timeout(Duration::from_secs(seconds), run)
                .await
                .map_err(|_| {
                    warn!(run_id = %run_id, seconds, "Run timed out");
                    PipelineError::RunTimedOut { seconds }
                })??,
            None => run.await?,
        };

        let deliverable = state
            .require_output(StageId::FinalOutput, OutputField::ManagerOutput)?
            .to_string();
        let duration = started.elapsed();

        info!(
            run_id = %run_id,
            steps = state.history().len(),
            review_count = state.review_count(),
            rework_count = state.rework_count(),
            duration_ms = duration.as_millis() as u64,
            "Pipeline run completed"
        );

        Ok(RunOutcome {
            usage: self.usage.summarize_run(&run_id),
            run_id,
            deliverable,
            state,
            duration,
        })
    }
}

fn policy_of(config: &Config) -> RoutePolicy {
    RoutePolicy::new(
        config.pipeline.rework_routes,
        config.pipeline.max_rework_passes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsts_config::{LlmConfig, Provider};
    use fsts_llm::ScriptedBackend;
    use fsts_utils::error::ConfigError;

    fn scripted_config() -> Config {
        Config {
            llm: LlmConfig::for_provider(Provider::Scripted),
            ..Config::default()
        }
    }

    #[test]
    fn test_from_config_rejects_invalid_bounds() {
        let mut config = scripted_config();
        config.pipeline.min_output_reviews = 3;
        config.pipeline.max_output_reviews = 1;
        match OrchestratorHandle::from_config(config) {
            Err(FstsError::Config(ConfigError::ValidationFailed { .. })) => {}
            Err(other) => panic!("expected validation failure, got {other}"),
            Ok(_) => panic!("expected validation failure"),
        }
    }

    #[test]
    fn test_input_uses_configured_bounds() {
        let mut config = scripted_config();
        config.pipeline.min_output_reviews = 0;
        config.pipeline.max_output_reviews = 4;
        config.pipeline.recursion_limit = 30;
        let handle = OrchestratorHandle::from_config(config).unwrap();
        assert_eq!(handle.input("c", "t").bounds, ReviewBounds::new(0, 4));
    }

    #[tokio::test]
    async fn test_dry_run_provider_completes() {
        let handle = OrchestratorHandle::from_config(scripted_config()).unwrap();
        let outcome = handle.run(handle.input("REPORT z.", "# T")).await.unwrap();

        assert!(outcome.deliverable.contains("[ROUTE: final_output]"));
        assert_eq!(outcome.state.review_count(), 1);
        assert!(outcome.usage.contains_key("total_tokens"));
        assert_eq!(handle.usage_log().len(), 7);
    }

    #[tokio::test]
    async fn test_run_timeout_is_reported() {
        struct Slow;

        #[async_trait::async_trait]
        impl LlmBackend for Slow {
            async fn invoke(
                &self,
                _inv: fsts_llm::LlmInvocation,
            ) -> Result<fsts_llm::LlmResult, fsts_utils::error::LlmError> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(fsts_llm::LlmResult::new("late", "slow", "slow"))
            }

            fn name(&self) -> &str {
                "slow"
            }
        }

        let mut config = scripted_config();
        config.pipeline.run_timeout_secs = Some(1);
        let handle = OrchestratorHandle::from_config(config)
            .unwrap()
            .with_backend(Arc::new(Slow));

        let err = handle.run(handle.input("c", "t")).await.unwrap_err();
        assert!(matches!(
            err,
            FstsError::Pipeline(PipelineError::RunTimedOut { seconds: 1 })
        ));
    }

    #[tokio::test]
    async fn test_runs_share_usage_log_but_report_their_own() {
        let shared = Arc::new(UsageLog::new());
        let handle = OrchestratorHandle::from_config(scripted_config())
            .unwrap()
            .with_backend(Arc::new(ScriptedBackend::dry_run()))
            .with_usage_log(Arc::clone(&shared));

        let a = handle.run(handle.input("a", "t")).await.unwrap();
        let b = handle.run(handle.input("b", "t")).await.unwrap();

        assert_ne!(a.run_id, b.run_id);
        assert_eq!(shared.len(), 14);
        assert_eq!(shared.summarize_run(&a.run_id).len(), a.usage.len());
    }
}
