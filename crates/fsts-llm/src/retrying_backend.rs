//! Host-level retry decorator.
//!
//! Backends never retry on their own. When a host opts in (`llm.retries > 0`),
//! this wrapper re-issues a call that failed with a transient error, using
//! exponential backoff. Auth, quota, budget and malformed-response errors are
//! returned immediately.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use fsts_utils::error::LlmError;

use crate::types::{LlmBackend, LlmInvocation, LlmResult};

/// Initial backoff; doubles on every further attempt.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

pub struct RetryingBackend {
    inner: Arc<dyn LlmBackend>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl RetryingBackend {
    pub fn new(inner: Arc<dyn LlmBackend>, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            initial_backoff: INITIAL_BACKOFF,
        }
    }

    #[must_use]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    fn backoff_for(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

#[async_trait]
impl LlmBackend for RetryingBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let mut retry = 0;
        loop {
            match self.inner.invoke(inv.clone()).await {
                Err(e) if e.is_transient() && retry < self.max_retries => {
                    retry += 1;
                    let backoff = self.backoff_for(retry);
                    warn!(
                        stage = %inv.stage,
                        retry,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient completion failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                other => return other,
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
