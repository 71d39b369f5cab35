//! The typed record threaded through every stage of a run.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use fsts_prompt_template::ParameterSource;
use fsts_utils::error::PipelineError;
use fsts_utils::types::StageId;

/// Bounds of the review loop, fixed for the life of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewBounds {
    pub min_output_reviews: u32,
    pub max_output_reviews: u32,
}

impl ReviewBounds {
    #[must_use]
    pub const fn new(min_output_reviews: u32, max_output_reviews: u32) -> Self {
        Self {
            min_output_reviews,
            max_output_reviews,
        }
    }
}

impl Default for ReviewBounds {
    fn default() -> Self {
        Self::new(1, 2)
    }
}

/// A stage-produced field of the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputField {
    AbapAnalysis,
    ForeignDependencies,
    FsOutput,
    TsOutput,
    ManagerOutput,
    ReviewFeedback,
}

impl OutputField {
    pub const ALL: [Self; 6] = [
        Self::AbapAnalysis,
        Self::ForeignDependencies,
        Self::FsOutput,
        Self::TsOutput,
        Self::ManagerOutput,
        Self::ReviewFeedback,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AbapAnalysis => "abap_analysis",
            Self::ForeignDependencies => "foreign_dependencies",
            Self::FsOutput => "fs_output",
            Self::TsOutput => "ts_output",
            Self::ManagerOutput => "manager_output",
            Self::ReviewFeedback => "review_feedback",
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    /// The stage that writes this field.
    #[must_use]
    pub const fn producer(&self) -> StageId {
        match self {
            Self::AbapAnalysis => StageId::AbapCodeAnalyst,
            Self::ForeignDependencies => StageId::ForeignDependencyAgent,
            Self::FsOutput => StageId::FunctionalSpecDrafter,
            Self::TsOutput => StageId::TechnicalSpecWriter,
            Self::ManagerOutput => StageId::ManagerAgent,
            Self::ReviewFeedback => StageId::OutputReviewer,
        }
    }
}

impl fmt::Display for OutputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a host supplies to start a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineInput {
    pub code_input: String,
    pub template_text: String,
    pub bounds: ReviewBounds,
}

impl PipelineInput {
    #[must_use]
    pub fn new(code_input: impl Into<String>, template_text: impl Into<String>) -> Self {
        Self {
            code_input: code_input.into(),
            template_text: template_text.into(),
            bounds: ReviewBounds::default(),
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: ReviewBounds) -> Self {
        self.bounds = bounds;
        self
    }
}

/// Shared state of one pipeline run.
///
/// Inputs and bounds are fixed at construction. Output fields start empty and
/// are written by their producing stage; `manager_output` and
/// `review_feedback` are rewritten on each loop iteration. `review_count` only
/// moves up, through [`PipelineState::record_review`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    code_input: String,
    template_text: String,
    abap_analysis: Option<String>,
    foreign_dependencies: Option<String>,
    fs_output: Option<String>,
    ts_output: Option<String>,
    manager_output: Option<String>,
    review_feedback: Option<String>,
    review_count: u32,
    rework_count: u32,
    bounds: ReviewBounds,
    next_node: Option<StageId>,
    last_user_prompt: String,
    history: Vec<StageId>,
}

impl PipelineState {
    #[must_use]
    pub fn new(input: PipelineInput) -> Self {
        Self {
            code_input: input.code_input,
            template_text: input.template_text,
            abap_analysis: None,
            foreign_dependencies: None,
            fs_output: None,
            ts_output: None,
            manager_output: None,
            review_feedback: None,
            review_count: 0,
            rework_count: 0,
            bounds: input.bounds,
            next_node: None,
            last_user_prompt: String::new(),
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn code_input(&self) -> &str {
        &self.code_input
    }

    #[must_use]
    pub fn template_text(&self) -> &str {
        &self.template_text
    }

    #[must_use]
    pub fn output(&self, field: OutputField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set_output(&mut self, field: OutputField, value: impl Into<String>) {
        *self.slot_mut(field) = Some(value.into());
    }

    /// A populated, non-blank output or [`PipelineError::MissingParameter`].
    ///
    /// # Errors
    ///
    /// When `field` has not been written yet or holds only whitespace.
    pub fn require_output(&self, stage: StageId, field: OutputField) -> Result<&str, PipelineError> {
        match self.output(field) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(PipelineError::MissingParameter {
                stage,
                parameter: field.as_str().to_string(),
            }),
        }
    }

    /// Whether the reviewer has left non-blank feedback.
    #[must_use]
    pub fn has_feedback(&self) -> bool {
        self.review_feedback
            .as_deref()
            .is_some_and(|fb| !fb.trim().is_empty())
    }

    #[must_use]
    pub fn manager_output(&self) -> Option<&str> {
        self.manager_output.as_deref()
    }

    #[must_use]
    pub const fn review_count(&self) -> u32 {
        self.review_count
    }

    /// Count one completed review pass.
    pub fn record_review(&mut self) -> u32 {
        self.review_count = self.review_count.saturating_add(1);
        self.review_count
    }

    #[must_use]
    pub const fn rework_count(&self) -> u32 {
        self.rework_count
    }

    /// Count one honored rework route.
    pub fn record_rework(&mut self) -> u32 {
        self.rework_count = self.rework_count.saturating_add(1);
        self.rework_count
    }

    #[must_use]
    pub const fn bounds(&self) -> ReviewBounds {
        self.bounds
    }

    #[must_use]
    pub const fn next_node(&self) -> Option<StageId> {
        self.next_node
    }

    pub fn set_next_node(&mut self, next: Option<StageId>) {
        self.next_node = next;
    }

    #[must_use]
    pub fn last_user_prompt(&self) -> &str {
        &self.last_user_prompt
    }

    pub fn set_last_user_prompt(&mut self, prompt: impl Into<String>) {
        self.last_user_prompt = prompt.into();
    }

    /// Nodes executed so far, in order.
    #[must_use]
    pub fn history(&self) -> &[StageId] {
        &self.history
    }

    pub fn push_history(&mut self, stage: StageId) {
        self.history.push(stage);
    }

    /// Number of times `stage` has executed.
    #[must_use]
    pub fn visits(&self, stage: StageId) -> usize {
        self.history.iter().filter(|s| **s == stage).count()
    }

    fn slot(&self, field: OutputField) -> &Option<String> {
        match field {
            OutputField::AbapAnalysis => &self.abap_analysis,
            OutputField::ForeignDependencies => &self.foreign_dependencies,
            OutputField::FsOutput => &self.fs_output,
            OutputField::TsOutput => &self.ts_output,
            OutputField::ManagerOutput => &self.manager_output,
            OutputField::ReviewFeedback => &self.review_feedback,
        }
    }

    fn slot_mut(&mut self, field: OutputField) -> &mut Option<String> {
        match field {
            OutputField::AbapAnalysis => &mut self.abap_analysis,
            OutputField::ForeignDependencies => &mut self.foreign_dependencies,
            OutputField::FsOutput => &mut self.fs_output,
            OutputField::TsOutput => &mut self.ts_output,
            OutputField::ManagerOutput => &mut self.manager_output,
            OutputField::ReviewFeedback => &mut self.review_feedback,
        }
    }
}

impl ParameterSource for PipelineState {
    fn parameter(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "code_input" => Some(Cow::Borrowed(&self.code_input)),
            "template_text" => Some(Cow::Borrowed(&self.template_text)),
            "review_count" => Some(Cow::Owned(self.review_count.to_string())),
            "min_output_reviews" => Some(Cow::Owned(self.bounds.min_output_reviews.to_string())),
            "max_output_reviews" => Some(Cow::Owned(self.bounds.max_output_reviews.to_string())),
            other => OutputField::parse(other)
                .and_then(|field| self.output(field))
                .map(Cow::Borrowed),
        }
    }
}
