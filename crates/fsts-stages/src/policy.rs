//! Review-loop bounding and rework handling for the manager's route.

use std::fmt;

use fsts_stage_api::ReviewBounds;
use fsts_utils::types::{ReworkRoutes, StageId};

/// The two-sided review clamp.
///
/// - `final_output` before `min_output_reviews` passes becomes `output_reviewer`
/// - `output_reviewer` once `max_output_reviews` passes are done becomes `final_output`
///
/// Every other route passes through unchanged.
#[must_use]
pub fn clamp_route(route: StageId, review_count: u32, bounds: ReviewBounds) -> StageId {
    match route {
        StageId::FinalOutput if review_count < bounds.min_output_reviews => StageId::OutputReviewer,
        StageId::OutputReviewer if review_count >= bounds.max_output_reviews => StageId::FinalOutput,
        other => other,
    }
}

/// Why a proposed route was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOverride {
    /// Finish requested before the minimum number of reviews.
    BelowMinReviews,
    /// Another review requested after the maximum was reached.
    MaxReviewsReached,
    /// Rework route folded into a review because rework routes collapse.
    ReworkCollapsed,
    /// Rework route folded into a review because the pass budget is spent.
    ReworkPassesExhausted,
}

impl RouteOverride {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BelowMinReviews => "below_min_reviews",
            Self::MaxReviewsReached => "max_reviews_reached",
            Self::ReworkCollapsed => "rework_collapsed",
            Self::ReworkPassesExhausted => "rework_passes_exhausted",
        }
    }
}

impl fmt::Display for RouteOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying the policy to a parsed route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    pub proposed: StageId,
    pub resolved: StageId,
    /// The last rule that changed the route, if any.
    pub overridden_by: Option<RouteOverride>,
}

impl RouteDecision {
    /// Whether the resolved route re-runs a drafting stage.
    #[must_use]
    pub const fn is_rework(&self) -> bool {
        self.resolved.is_rework()
    }
}

/// How the manager treats rework routes, plus the review clamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    pub rework_routes: ReworkRoutes,
    pub max_rework_passes: u32,
}

impl RoutePolicy {
    #[must_use]
    pub const fn new(rework_routes: ReworkRoutes, max_rework_passes: u32) -> Self {
        Self {
            rework_routes,
            max_rework_passes,
        }
    }

    /// Resolve the manager's proposed route.
    ///
    /// Rework routes are folded into `output_reviewer` unless loop-back is
    /// enabled and passes remain; the review clamp then applies to the result.
    #[must_use]
    pub fn decide(
        &self,
        proposed: StageId,
        review_count: u32,
        rework_count: u32,
        bounds: ReviewBounds,
    ) -> RouteDecision {
        let mut overridden_by = None;
        let mut route = proposed;

        if route.is_rework() {
            match self.rework_routes {
                ReworkRoutes::Collapse => {
                    route = StageId::OutputReviewer;
                    overridden_by = Some(RouteOverride::ReworkCollapsed);
                }
                ReworkRoutes::LoopBack if rework_count >= self.max_rework_passes => {
                    route = StageId::OutputReviewer;
                    overridden_by = Some(RouteOverride::ReworkPassesExhausted);
                }
                ReworkRoutes::LoopBack => {}
            }
        }

        let clamped = clamp_route(route, review_count, bounds);
        if clamped != route {
            overridden_by = Some(if clamped == StageId::OutputReviewer {
                RouteOverride::BelowMinReviews
            } else {
                RouteOverride::MaxReviewsReached
            });
        }

        RouteDecision {
            proposed,
            resolved: clamped,
            overridden_by,
        }
    }
}
