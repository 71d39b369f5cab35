//! Budgeted backend wrapper limiting completion calls per process

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use fsts_utils::error::LlmError;

use crate::types::{LlmBackend, LlmInvocation, LlmResult};

/// Wraps a backend and fails once `limit` calls have been attempted.
///
/// The budget tracks attempted calls, not successful requests: a failed call
/// still consumes its slot, so a retry loop cannot bypass the limit. The
/// counter lives as long as the wrapper, which the host keeps for the life of
/// the process and shares across runs.
pub struct BudgetedBackend {
    inner: Arc<dyn LlmBackend>,
    budget: AtomicU32,
    limit: u32,
}

impl BudgetedBackend {
    pub fn new(inner: Arc<dyn LlmBackend>, limit: u32) -> Self {
        debug!(limit, "Creating BudgetedBackend");
        Self {
            inner,
            budget: AtomicU32::new(0),
            limit,
        }
    }

    /// Number of calls attempted so far, including rejected ones.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.budget.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[async_trait]
impl LlmBackend for BudgetedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        // Count before calling so failures consume budget too.
        let current = self.budget.fetch_add(1, Ordering::SeqCst);

        if current >= self.limit {
            let attempted = current + 1;
            warn!(limit = self.limit, attempted, "Budget limit exceeded");
            return Err(LlmError::BudgetExceeded {
                limit: self.limit,
                attempted,
            });
        }

        debug!(
            call_count = current + 1,
            limit = self.limit,
            stage = %inv.stage,
            "Budget check passed"
        );

        let result = self.inner.invoke(inv).await;
        if let Err(e) = &result {
            debug!(
                call_count = current + 1,
                error = %e,
                "Inner backend failed (budget slot still consumed)"
            );
        }
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
