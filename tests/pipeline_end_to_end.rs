//! End-to-end runs of the standard graph through `OrchestratorHandle`.
//!
//! Every test drives a `ScriptedBackend`, so no network is involved. Replies
//! pushed for a stage are consumed in order; once a stage's queue is empty its
//! fallback (or the backend default) answers.

use std::sync::Arc;

use fsts::{
    Config, OrchestratorHandle, PipelineError, Provider, ReworkRoutes, ScriptedBackend, StageId,
};
use fsts_config::LlmConfig;
use fsts_utils::ExitCode;

fn config(min: u32, max: u32) -> Config {
    let mut config = Config::default();
    config.llm = LlmConfig::for_provider(Provider::Scripted);
    config.pipeline.min_output_reviews = min;
    config.pipeline.max_output_reviews = max;
    config
}

fn handle(config: Config, backend: &Arc<ScriptedBackend>) -> OrchestratorHandle {
    OrchestratorHandle::from_config(config)
        .expect("valid config")
        .with_backend(Arc::clone(backend) as Arc<dyn fsts::LlmBackend>)
}

fn manager_prompts(backend: &ScriptedBackend) -> Vec<String> {
    backend
        .invocations()
        .into_iter()
        .filter(|inv| inv.stage == StageId::ManagerAgent)
        .map(|inv| {
            inv.messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect()
}

#[tokio::test]
async fn test_single_review_run_makes_seven_calls() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.push(StageId::ManagerAgent, "# Draft v1\n[ROUTE: final_output]");
    backend.push(StageId::OutputReviewer, "Section 3 lacks the selection screen.");
    backend.push(StageId::ManagerAgent, "# Final Spec\nBody\n[ROUTE: final_output]");

    let handle = handle(config(1, 2), &backend);
    let outcome = handle
        .run(handle.input("REPORT zdemo.", "# Template"))
        .await
        .unwrap();

    assert_eq!(backend.call_count(), 7);
    assert_eq!(
        backend.call_sequence(),
        vec![
            StageId::AbapCodeAnalyst,
            StageId::ForeignDependencyAgent,
            StageId::FunctionalSpecDrafter,
            StageId::TechnicalSpecWriter,
            StageId::ManagerAgent,
            StageId::OutputReviewer,
            StageId::ManagerAgent,
        ]
    );
    assert_eq!(outcome.deliverable, "# Final Spec\nBody\n[ROUTE: final_output]");
    assert_eq!(outcome.state.review_count(), 1);
    assert_eq!(outcome.state.history().len(), 8);
    assert_eq!(outcome.state.history().last(), Some(&StageId::FinalOutput));

    // The revision pass sees both its previous answer and the feedback.
    let prompts = manager_prompts(&backend);
    assert_eq!(prompts.len(), 2);
    assert!(!prompts[0].contains("Reviewer Feedback:"));
    assert!(prompts[1].contains("--- Manager Previous Output ---\n# Draft v1"));
    assert!(prompts[1].contains("Reviewer Feedback:\nSection 3 lacks the selection screen."));
}

#[tokio::test]
async fn test_zero_bounds_skip_review_entirely() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_fallback(StageId::ManagerAgent, "# Spec\n[ROUTE: output_reviewer]"),
    );
    let handle = handle(config(0, 0), &backend);
    let outcome = handle.run(handle.input("REPORT z.", "# T")).await.unwrap();

    assert_eq!(outcome.state.review_count(), 0);
    assert_eq!(outcome.state.visits(StageId::OutputReviewer), 0);
    assert_eq!(backend.call_count(), 5);
}

#[tokio::test]
async fn test_endless_review_requests_stop_at_max() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_fallback(StageId::ManagerAgent, "# Spec\n[ROUTE: output_reviewer]"),
    );
    let handle = handle(config(1, 2), &backend);
    let outcome = handle.run(handle.input("REPORT z.", "# T")).await.unwrap();

    assert_eq!(outcome.state.review_count(), 2);
    assert_eq!(outcome.state.visits(StageId::ManagerAgent), 3);
    assert_eq!(backend.call_count(), 4 + 3 + 2);
}

#[tokio::test]
async fn test_missing_directive_is_treated_as_review_request() {
    let backend = Arc::new(ScriptedBackend::new().with_fallback(StageId::ManagerAgent, "# Spec"));
    let handle = handle(config(0, 1), &backend);
    let outcome = handle.run(handle.input("REPORT z.", "# T")).await.unwrap();
    assert_eq!(outcome.state.review_count(), 1);
}

#[tokio::test]
async fn test_rework_collapses_to_review_by_default() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_fallback(StageId::ManagerAgent, "# Spec\n[ROUTE: technical_spec_writer]"),
    );
    let handle = handle(config(0, 1), &backend);
    let outcome = handle.run(handle.input("REPORT z.", "# T")).await.unwrap();

    assert_eq!(outcome.state.visits(StageId::TechnicalSpecWriter), 1);
    assert_eq!(outcome.state.rework_count(), 0);
    assert_eq!(outcome.state.review_count(), 1);
}

#[tokio::test]
async fn test_loop_back_reruns_the_named_stage() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.push(StageId::FunctionalSpecDrafter, "FS v1");
    backend.push(StageId::FunctionalSpecDrafter, "FS v2");
    backend.push(StageId::ManagerAgent, "# Spec\n[ROUTE: functional_spec_drafter]");
    backend.push(StageId::ManagerAgent, "# Spec v2\n[ROUTE: final_output]");

    let mut cfg = config(0, 0);
    cfg.pipeline.rework_routes = ReworkRoutes::LoopBack;
    cfg.pipeline.max_rework_passes = 1;
    let handle = handle(cfg, &backend);
    let outcome = handle.run(handle.input("REPORT z.", "# T")).await.unwrap();

    assert_eq!(outcome.state.rework_count(), 1);
    assert_eq!(outcome.state.visits(StageId::FunctionalSpecDrafter), 2);
    assert_eq!(outcome.state.visits(StageId::TechnicalSpecWriter), 2);
    assert_eq!(outcome.deliverable, "# Spec v2\n[ROUTE: final_output]");

    let prompts = manager_prompts(&backend);
    assert!(prompts[1].contains("FS v2"));
}

#[tokio::test]
async fn test_loop_back_passes_are_bounded() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_fallback(StageId::ManagerAgent, "# Spec\n[ROUTE: functional_spec_drafter]"),
    );
    let mut cfg = config(0, 1);
    cfg.pipeline.rework_routes = ReworkRoutes::LoopBack;
    cfg.pipeline.max_rework_passes = 1;
    let handle = handle(cfg, &backend);
    let outcome = handle.run(handle.input("REPORT z.", "# T")).await.unwrap();

    assert_eq!(outcome.state.rework_count(), 1);
    assert_eq!(outcome.state.visits(StageId::FunctionalSpecDrafter), 2);
    assert_eq!(outcome.state.review_count(), 1);
    assert_eq!(outcome.state.history().last(), Some(&StageId::FinalOutput));
}

#[tokio::test]
async fn test_backend_failure_aborts_with_stage() {
    let backend = Arc::new(ScriptedBackend::new().with_fallback(
        StageId::ForeignDependencyAgent,
        fsts::ScriptedReply::Fail(fsts_utils::LlmError::ProviderOutage("503".to_string())),
    ));
    let handle = handle(config(1, 2), &backend);
    let err = handle.run(handle.input("REPORT z.", "# T")).await.unwrap_err();

    assert!(matches!(
        err,
        fsts::FstsError::Pipeline(PipelineError::CompletionBackend {
            stage: StageId::ForeignDependencyAgent,
            ..
        })
    ));
    assert_eq!(err.to_exit_code(), ExitCode::LLM_FAILURE);
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test]
async fn test_blank_review_aborts_instead_of_counting() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.push(StageId::ManagerAgent, "# Draft\n[ROUTE: final_output]");
    backend.push(StageId::OutputReviewer, "   ");
    backend.push(StageId::ManagerAgent, "# Final\n[ROUTE: final_output]");

    let handle = handle(config(1, 2), &backend);
    let err = handle.run(handle.input("REPORT z.", "# T")).await.unwrap_err();

    assert!(matches!(
        err,
        fsts::FstsError::Pipeline(PipelineError::CompletionBackend {
            stage: StageId::OutputReviewer,
            source: fsts_utils::LlmError::MalformedResponse(_),
        })
    ));
    assert_eq!(err.to_exit_code(), ExitCode::LLM_FAILURE);
    // The second manager pass never runs on blank feedback.
    assert_eq!(backend.call_count(), 6);
    assert_eq!(manager_prompts(&backend).len(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_share_usage_log() {
    let backend = Arc::new(ScriptedBackend::dry_run());
    let handle = Arc::new(handle(config(0, 2), &backend));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                handle
                    .run(handle.input(format!("REPORT z{i}."), "# T"))
                    .await
            })
        })
        .collect();

    let mut run_ids = Vec::new();
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.state.review_count(), 0);
        run_ids.push(outcome.run_id);
    }
    run_ids.sort();
    run_ids.dedup();
    assert_eq!(run_ids.len(), 4);
    assert_eq!(handle.usage_log().len(), 4 * 5);
}
