//! Collaborators handed to every stage of a run.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use fsts_llm::{LlmBackend, LlmInvocation, Message};
use fsts_prompt_template::PromptStore;
use fsts_usage::UsageLog;
use fsts_utils::error::{LlmError, PipelineError};
use fsts_utils::types::StageId;

/// Context information passed to stages during execution
#[derive(Clone)]
pub struct StageContext {
    /// Identifier of the current run, carried into logs and usage entries
    pub run_id: String,
    pub backend: Arc<dyn LlmBackend>,
    pub prompts: Arc<dyn PromptStore>,
    /// Process-wide usage log shared with other runs
    pub usage: Arc<UsageLog>,
    /// Model requested per call; empty means the backend default
    pub model: String,
    /// Per-call timeout handed to the backend
    pub timeout: Duration,
}

impl StageContext {
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        backend: Arc<dyn LlmBackend>,
        prompts: Arc<dyn PromptStore>,
        usage: Arc<UsageLog>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            backend,
            prompts,
            usage,
            model: String::new(),
            timeout: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Issue one completion call for `stage` and record its usage.
    ///
    /// # Errors
    ///
    /// [`PipelineError::CompletionBackend`] wrapping the backend failure, or
    /// [`LlmError::MalformedResponse`] when the reply is blank. Usage of a
    /// blank reply is still recorded.
    pub async fn complete(
        &self,
        stage: StageId,
        system_prompt: &str,
        user_prompt: &str,
        prompt_fingerprint: &str,
    ) -> Result<String, PipelineError> {
        let invocation = LlmInvocation::new(
            self.run_id.clone(),
            stage,
            self.model.clone(),
            self.timeout,
            vec![Message::system(system_prompt), Message::user(user_prompt)],
        );

        debug!(
            run_id = %self.run_id,
            stage = %stage,
            backend = self.backend.name(),
            prompt_fingerprint,
            prompt_chars = user_prompt.len(),
            "Invoking completion backend"
        );
        trace!(stage = %stage, user_prompt, "User prompt");

        let started = Instant::now();
        let result = self
            .backend
            .invoke(invocation)
            .await
            .map_err(|source| PipelineError::CompletionBackend { stage, source })?;

        debug!(
            run_id = %self.run_id,
            stage = %stage,
            model = %result.model_used,
            duration_ms = started.elapsed().as_millis() as u64,
            response_chars = result.content.len(),
            "Completion received"
        );

        self.usage.record(&self.run_id, stage, result.usage);

        // Output fields in state are never blank.
        if result.content.trim().is_empty() {
            return Err(PipelineError::CompletionBackend {
                stage,
                source: LlmError::MalformedResponse(format!(
                    "{} returned an empty completion",
                    self.backend.name()
                )),
            });
        }
        Ok(result.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsts_llm::{ScriptedBackend, ScriptedReply};
    use fsts_prompt_template::PromptCatalog;

    fn context(backend: Arc<ScriptedBackend>) -> StageContext {
        StageContext::new(
            "run-ctx",
            backend,
            Arc::new(PromptCatalog::new()),
            Arc::new(UsageLog::new()),
        )
        .with_model("m-1")
    }

    #[tokio::test]
    async fn test_complete_records_usage_and_messages() {
        let backend = Arc::new(ScriptedBackend::new().with_default("answer"));
        let ctx = context(Arc::clone(&backend));

        let content = ctx
            .complete(StageId::AbapCodeAnalyst, "sys", "user", "abc")
            .await
            .unwrap();

        assert_eq!(content, "answer");
        assert_eq!(ctx.usage.len(), 1);
        assert_eq!(ctx.usage.entries()[0].run_id, "run-ctx");

        let calls = backend.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "m-1");
        assert_eq!(calls[0].messages[0], Message::system("sys"));
        assert_eq!(calls[0].messages[1], Message::user("user"));
    }

    #[tokio::test]
    async fn test_backend_failure_is_attributed_to_stage() {
        let backend = Arc::new(ScriptedBackend::new().with_reply(
            StageId::OutputReviewer,
            ScriptedReply::Fail(LlmError::ProviderOutage("503".into())),
        ));
        let ctx = context(backend);

        let err = ctx
            .complete(StageId::OutputReviewer, "sys", "user", "abc")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::CompletionBackend {
                stage: StageId::OutputReviewer,
                source: LlmError::ProviderOutage(_)
            }
        ));
        assert!(ctx.usage.is_empty());
    }

    #[tokio::test]
    async fn test_blank_reply_is_malformed_response() {
        let backend = Arc::new(ScriptedBackend::new().with_reply(StageId::OutputReviewer, "  \n\t "));
        let ctx = context(backend);

        let err = ctx
            .complete(StageId::OutputReviewer, "sys", "user", "abc")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::CompletionBackend {
                stage: StageId::OutputReviewer,
                source: LlmError::MalformedResponse(_)
            }
        ));
        assert_eq!(ctx.usage.len(), 1);
    }
}
