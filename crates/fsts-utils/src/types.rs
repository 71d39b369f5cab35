//! Identifiers shared by every fsts crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{EnumIter, EnumString, IntoEnumIterator};

/// Identifies one node of the specification pipeline.
///
/// The seven stages run in a fixed graph: four linear drafting stages feed the
/// manager, which loops with the reviewer until the review bounds allow it to
/// finish at [`StageId::FinalOutput`].
///
/// # Example
///
/// ```rust
/// use fsts_utils::types::StageId;
///
/// let stage = StageId::ManagerAgent;
/// assert_eq!(stage.as_str(), "manager_agent");
/// assert_eq!(StageId::parse("final_output"), Some(StageId::FinalOutput));
/// ```
///
/// # Serialization
///
/// `StageId` serializes to its snake_case name (e.g. `"output_reviewer"`), which
/// is also the token a model writes inside a `[ROUTE: ...]` directive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageId {
    /// Reads the ABAP source and produces a structural analysis.
    AbapCodeAnalyst,
    /// Extracts tables, function modules and other external dependencies.
    ForeignDependencyAgent,
    /// Drafts the functional specification.
    FunctionalSpecDrafter,
    /// Writes the technical specification.
    TechnicalSpecWriter,
    /// Consolidates drafts and decides where the run goes next.
    ManagerAgent,
    /// Reviews the manager's document and produces feedback.
    OutputReviewer,
    /// Terminal node; does no work.
    FinalOutput,
}

impl StageId {
    /// Returns the canonical snake_case name used in prompts, logs and routes.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AbapCodeAnalyst => "abap_code_analyst",
            Self::ForeignDependencyAgent => "foreign_dependency_agent",
            Self::FunctionalSpecDrafter => "functional_spec_drafter",
            Self::TechnicalSpecWriter => "technical_spec_writer",
            Self::ManagerAgent => "manager_agent",
            Self::OutputReviewer => "output_reviewer",
            Self::FinalOutput => "final_output",
        }
    }

    /// Parses a stage name. Matching is exact and case-sensitive.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    /// All stages in pipeline order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }

    /// Stages the manager may re-run to rework a section of the document.
    #[must_use]
    pub const fn is_rework(&self) -> bool {
        matches!(
            self,
            Self::ForeignDependencyAgent | Self::FunctionalSpecDrafter | Self::TechnicalSpecWriter
        )
    }

    /// Whether the manager may name this stage in a route directive.
    #[must_use]
    pub const fn is_route_target(&self) -> bool {
        self.is_rework() || matches!(self, Self::OutputReviewer | Self::FinalOutput)
    }

    /// Whether the stage calls the completion backend.
    #[must_use]
    pub const fn invokes_model(&self) -> bool {
        !matches!(self, Self::FinalOutput)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the manager's rework directives are wired into the graph.
///
/// The model may ask to re-run the foreign-dependency, functional or technical
/// stage. Production wiring only honors review and finish, so rework routes
/// collapse into another review unless `LoopBack` is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReworkRoutes {
    /// Rework directives are treated as `output_reviewer`.
    #[default]
    Collapse,
    /// Rework directives re-run the named stage, which then flows back to the
    /// manager through the static edges.
    LoopBack,
}

impl ReworkRoutes {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Collapse => "collapse",
            Self::LoopBack => "loop_back",
        }
    }

    /// Parse a mode name (`collapse`, `loop_back` or `loop-back`).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "collapse" => Some(Self::Collapse),
            "loop_back" | "loop-back" => Some(Self::LoopBack),
            _ => None,
        }
    }

    /// Largest number of stage executions a run can need.
    ///
    /// Four drafting stages and the first manager pass, a reviewer and a
    /// manager per review, the terminal node, and under `LoopBack` up to four
    /// more executions per rework pass (re-running from the foreign-dependency
    /// stage back to the manager).
    #[must_use]
    pub const fn worst_case_steps(&self, max_output_reviews: u32, max_rework_passes: u32) -> usize {
        let base = 6 + 2 * max_output_reviews as usize;
        match self {
            Self::Collapse => base,
            Self::LoopBack => base + 4 * max_rework_passes as usize,
        }
    }
}

impl fmt::Display for ReworkRoutes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
