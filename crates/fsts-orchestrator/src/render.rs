//! Text renderings of a pipeline graph.

use std::fmt::Write as _;

use crate::graph::{Edge, PipelineGraph};

impl PipelineGraph {
    /// Mermaid `flowchart` source for the graph.
    #[must_use]
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        let _ = writeln!(out, "    Start([Start]) --> {}", self.entry);
        for node in self.nodes.keys() {
            let _ = writeln!(out, "    {node}[{node}]");
        }
        for (from, edge) in &self.edges {
            match edge {
                Edge::Static(to) => {
                    let _ = writeln!(out, "    {from} --> {to}");
                }
                Edge::Conditional(routes) => {
                    for (route, to) in routes {
                        let _ = writeln!(out, "    {from} -.->|{route}| {to}");
                    }
                }
            }
        }
        let _ = writeln!(out, "    {} --> End([End])", self.terminal);
        out
    }

    /// One edge per line: `from -> to`, conditional routes as `from -[route]-> to`.
    #[must_use]
    pub fn to_edge_list(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "entry: {}", self.entry);
        let _ = writeln!(out, "terminal: {}", self.terminal);
        let _ = writeln!(out, "rework_routes: {}", self.policy.rework_routes);
        for (from, edge) in &self.edges {
            match edge {
                Edge::Static(to) => {
                    let _ = writeln!(out, "{from} -> {to}");
                }
                Edge::Conditional(routes) => {
                    for (route, to) in routes {
                        let _ = writeln!(out, "{from} -[{route}]-> {to}");
                    }
                }
            }
        }
        out
    }
}
