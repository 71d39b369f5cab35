//! Canned-response backend for tests and `--dry-run`.
//!
//! Answers come from a per-stage queue; once a stage's queue is empty the
//! stage's fallback (or the global default) is returned. Every invocation is
//! recorded so callers can assert on call counts and prompts.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

use fsts_utils::error::LlmError;
use fsts_utils::types::StageId;

use crate::types::{LlmBackend, LlmInvocation, LlmResult};

const PROVIDER: &str = "scripted";

/// A scripted answer: text, or an error to surface.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(LlmError),
}

impl From<&str> for ScriptedReply {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ScriptedReply {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

#[derive(Default)]
struct Script {
    queues: HashMap<StageId, VecDeque<ScriptedReply>>,
    fallbacks: HashMap<StageId, ScriptedReply>,
    invocations: Vec<LlmInvocation>,
}

pub struct ScriptedBackend {
    script: Mutex<Script>,
    default_reply: String,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::default()),
            default_reply: "scripted response".to_string(),
        }
    }

    /// Script used by `fsts run --dry-run`: every stage answers with a short
    /// placeholder and the manager asks to finish straight away.
    #[must_use]
    pub fn dry_run() -> Self {
        let mut backend = Self::new();
        for stage in StageId::all().filter(|s| s.invokes_model()) {
            let reply = if stage == StageId::ManagerAgent {
                "# Functional Specification\n\n(dry run)\n\n# Technical Specification\n\n(dry run)\n\n[ROUTE: final_output]"
                    .to_string()
            } else {
                format!("({stage} dry run)")
            };
            backend = backend.with_fallback(stage, reply);
        }
        backend
    }

    #[must_use]
    pub fn with_default(mut self, reply: impl Into<String>) -> Self {
        self.default_reply = reply.into();
        self
    }

    /// Reply used for `stage` whenever its queue is empty.
    #[must_use]
    pub fn with_fallback(self, stage: StageId, reply: impl Into<ScriptedReply>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.fallbacks.insert(stage, reply.into());
        }
        self
    }

    /// Queue one reply for the next call made by `stage`.
    #[must_use]
    pub fn with_reply(self, stage: StageId, reply: impl Into<ScriptedReply>) -> Self {
        self.push(stage, reply);
        self
    }

    pub fn push(&self, stage: StageId, reply: impl Into<ScriptedReply>) {
        if let Ok(mut script) = self.script.lock() {
            script.queues.entry(stage).or_default().push_back(reply.into());
        }
    }

    /// All invocations seen so far, in call order.
    #[must_use]
    pub fn invocations(&self) -> Vec<LlmInvocation> {
        self.script
            .lock()
            .map(|s| s.invocations.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.script.lock().map(|s| s.invocations.len()).unwrap_or(0)
    }

    /// Stages in the order they called the backend.
    #[must_use]
    pub fn call_sequence(&self) -> Vec<StageId> {
        self.invocations().iter().map(|inv| inv.stage).collect()
    }

    fn usage_for(inv: &LlmInvocation, content: &str) -> Map<String, Value> {
        let prompt_chars: usize = inv.messages.iter().map(|m| m.content.len()).sum();
        let prompt_tokens = prompt_chars.div_ceil(4);
        let completion_tokens = content.len().div_ceil(4);
        let usage = json!({
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens,
        });
        match usage {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let reply = {
            let mut script = self
                .script
                .lock()
                .map_err(|_| LlmError::Transport("scripted backend lock poisoned".to_string()))?;
            script.invocations.push(inv.clone());
            let queued = script.queues.get_mut(&inv.stage).and_then(VecDeque::pop_front);
            queued
                .or_else(|| script.fallbacks.get(&inv.stage).cloned())
                .unwrap_or_else(|| ScriptedReply::Text(self.default_reply.clone()))
        };

        debug!(stage = %inv.stage, "Scripted backend answering");

        match reply {
            ScriptedReply::Text(content) => {
                let usage = Self::usage_for(&inv, &content);
                let model = if inv.model.is_empty() {
                    PROVIDER.to_string()
                } else {
                    inv.model.clone()
                };
                Ok(LlmResult::new(content, PROVIDER, model).with_usage(usage))
            }
            ScriptedReply::Fail(err) => Err(err),
        }
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
