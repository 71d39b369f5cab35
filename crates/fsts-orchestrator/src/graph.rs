//! Pipeline graph: node set, static successors, and conditional route tables.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use fsts_stage_api::{PipelineError, PipelineState, Stage, StageId};
use fsts_stages::{RoutePolicy, standard_stages};
use fsts_utils::types::ReworkRoutes;

/// Outgoing edge of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edge {
    /// Fixed successor.
    Static(StageId),
    /// Successor chosen by the `next_node` the stage wrote, looked up in
    /// this route table.
    Conditional(BTreeMap<StageId, StageId>),
}

/// A validated, runnable graph.
pub struct PipelineGraph {
    pub(crate) nodes: BTreeMap<StageId, Arc<dyn Stage>>,
    pub(crate) edges: BTreeMap<StageId, Edge>,
    pub(crate) entry: StageId,
    pub(crate) terminal: StageId,
    pub(crate) policy: RoutePolicy,
}

impl std::fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .field("entry", &self.entry)
            .field("terminal", &self.terminal)
            .finish()
    }
}

impl PipelineGraph {
    /// The seven-stage production graph.
    ///
    /// Under [`ReworkRoutes::Collapse`] the manager's route table only has
    /// `output_reviewer` and `final_output`; under [`ReworkRoutes::LoopBack`]
    /// the three drafting stages are reachable from the manager as well, and
    /// flow back to it through their static edges.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidGraph`] if the wiring is inconsistent.
    pub fn standard(policy: RoutePolicy) -> Result<Self, PipelineError> {
        let mut routes = vec![
            (StageId::OutputReviewer, StageId::OutputReviewer),
            (StageId::FinalOutput, StageId::FinalOutput),
        ];
        if policy.rework_routes == ReworkRoutes::LoopBack {
            routes.extend(
                StageId::all()
                    .filter(StageId::is_rework)
                    .map(|stage| (stage, stage)),
            );
        }

        let mut builder = GraphBuilder::new().with_policy(policy);
        for stage in standard_stages(policy) {
            builder = builder.add_node(stage);
        }
        builder
            .set_entry(StageId::AbapCodeAnalyst)
            .set_terminal(StageId::FinalOutput)
            .add_edge(StageId::AbapCodeAnalyst, StageId::ForeignDependencyAgent)
            .add_edge(StageId::ForeignDependencyAgent, StageId::FunctionalSpecDrafter)
            .add_edge(StageId::FunctionalSpecDrafter, StageId::TechnicalSpecWriter)
            .add_edge(StageId::TechnicalSpecWriter, StageId::ManagerAgent)
            .add_edge(StageId::OutputReviewer, StageId::ManagerAgent)
            .add_conditional_edges(StageId::ManagerAgent, routes)
            .build()
    }

    #[must_use]
    pub const fn entry(&self) -> StageId {
        self.entry
    }

    #[must_use]
    pub const fn terminal(&self) -> StageId {
        self.terminal
    }

    #[must_use]
    pub const fn policy(&self) -> RoutePolicy {
        self.policy
    }

    pub fn nodes(&self) -> impl Iterator<Item = StageId> + '_ {
        self.nodes.keys().copied()
    }

    #[must_use]
    pub fn edge(&self, from: StageId) -> Option<&Edge> {
        self.edges.get(&from)
    }

    pub(crate) fn stage(&self, id: StageId) -> Result<&Arc<dyn Stage>, PipelineError> {
        self.nodes.get(&id).ok_or_else(|| PipelineError::InvalidGraph {
            reason: format!("node {id} has no implementation"),
        })
    }

    /// Successor of `from` after it ran against `state`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownNode`] when a conditional node wrote a route
    /// its table does not contain.
    pub fn next_node(&self, from: StageId, state: &PipelineState) -> Result<StageId, PipelineError> {
        match self.edges.get(&from) {
            Some(Edge::Static(to)) => Ok(*to),
            Some(Edge::Conditional(routes)) => {
                let Some(route) = state.next_node() else {
                    return Err(PipelineError::UnknownNode {
                        from,
                        target: "<unset>".to_string(),
                    });
                };
                routes
                    .get(&route)
                    .copied()
                    .ok_or_else(|| PipelineError::UnknownNode {
                        from,
                        target: route.as_str().to_string(),
                    })
            }
            None => Err(PipelineError::InvalidGraph {
                reason: format!("node {from} has no outgoing edge"),
            }),
        }
    }
}

/// Builder for a [`PipelineGraph`], validated at [`GraphBuilder::build`].
#[derive(Default)]
pub struct GraphBuilder {
    nodes: BTreeMap<StageId, Arc<dyn Stage>>,
    edges: Vec<(StageId, Edge)>,
    entry: Option<StageId>,
    terminal: Option<StageId>,
    policy: RoutePolicy,
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route policy recorded on the graph for reporting.
    #[must_use]
    pub fn with_policy(mut self, policy: RoutePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register a node; a later node with the same id replaces the earlier one.
    #[must_use]
    pub fn add_node(mut self, stage: Arc<dyn Stage>) -> Self {
        self.nodes.insert(stage.id(), stage);
        self
    }

    #[must_use]
    pub fn add_edge(mut self, from: StageId, to: StageId) -> Self {
        self.edges.push((from, Edge::Static(to)));
        self
    }

    /// Route table for a branching node: route value to target node.
    #[must_use]
    pub fn add_conditional_edges(
        mut self,
        from: StageId,
        routes: impl IntoIterator<Item = (StageId, StageId)>,
    ) -> Self {
        self.edges
            .push((from, Edge::Conditional(routes.into_iter().collect())));
        self
    }

    #[must_use]
    pub fn set_entry(mut self, entry: StageId) -> Self {
        self.entry = Some(entry);
        self
    }

    #[must_use]
    pub fn set_terminal(mut self, terminal: StageId) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Requires an entry and a terminal node, edges between known nodes only,
    /// exactly one outgoing edge for every node except the terminal (which has
    /// none), a non-empty table on each conditional edge, and every node
    /// reachable from the entry.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidGraph`] naming the first problem found.
    pub fn build(self) -> Result<PipelineGraph, PipelineError> {
        let invalid = |reason: String| PipelineError::InvalidGraph { reason };

        let entry = self
            .entry
            .ok_or_else(|| invalid("entry node not set".to_string()))?;
        let terminal = self
            .terminal
            .ok_or_else(|| invalid("terminal node not set".to_string()))?;
        for (role, id) in [("entry", entry), ("terminal", terminal)] {
            if !self.nodes.contains_key(&id) {
                return Err(invalid(format!("{role} node {id} is not in the node set")));
            }
        }

        let mut edges = BTreeMap::new();
        for (from, edge) in self.edges {
            if !self.nodes.contains_key(&from) {
                return Err(invalid(format!("edge from unknown node {from}")));
            }
            if from == terminal {
                return Err(invalid(format!("terminal node {from} cannot have a successor")));
            }
            let targets: Vec<StageId> = match &edge {
                Edge::Static(to) => vec![*to],
                Edge::Conditional(routes) if routes.is_empty() => {
                    return Err(invalid(format!("conditional edge from {from} has no routes")));
                }
                Edge::Conditional(routes) => routes.values().copied().collect(),
            };
            if let Some(unknown) = targets.iter().find(|t| !self.nodes.contains_key(*t)) {
                return Err(invalid(format!("edge {from} -> {unknown} targets an unknown node")));
            }
            if edges.insert(from, edge).is_some() {
                return Err(invalid(format!("node {from} has more than one outgoing edge")));
            }
        }

        if let Some(dangling) = self
            .nodes
            .keys()
            .find(|id| **id != terminal && !edges.contains_key(*id))
        {
            return Err(invalid(format!("node {dangling} has no successor")));
        }

        let reachable = reachable_from(entry, &edges);
        let unreachable: Vec<&str> = self
            .nodes
            .keys()
            .filter(|id| !reachable.contains(*id))
            .map(StageId::as_str)
            .collect();
        if !unreachable.is_empty() {
            return Err(invalid(format!(
                "nodes unreachable from {entry}: {}",
                unreachable.join(", ")
            )));
        }

        Ok(PipelineGraph {
            nodes: self.nodes,
            edges,
            entry,
            terminal,
            policy: self.policy,
        })
    }
}

fn reachable_from(entry: StageId, edges: &BTreeMap<StageId, Edge>) -> BTreeSet<StageId> {
    let mut seen = BTreeSet::new();
    let mut queue = vec![entry];
    while let Some(current) = queue.pop() {
        if !seen.insert(current) {
            continue;
        }
        match edges.get(&current) {
            Some(Edge::Static(to)) => queue.push(*to),
            Some(Edge::Conditional(routes)) => queue.extend(routes.values().copied()),
            None => {}
        }
    }
    seen
}
