//! Edge targets and typed routing outcomes.

use std::fmt;

/// Destination of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Run the node with this id next.
    Node(&'static str),
    /// Stop and return the current state.
    End,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => f.write_str(id),
            Self::End => f.write_str("END"),
        }
    }
}

/// Closed set of outcomes a conditional edge can produce.
///
/// `ALL` lists every variant so `StateGraph::compile` can check that each
/// outcome maps to a registered node before the graph is ever run.
pub trait Route: Copy + fmt::Debug + Send + Sync + 'static {
    /// Every variant of the route.
    const ALL: &'static [Self];

    /// Human-readable label used in logs and graph descriptions.
    fn label(self) -> &'static str;
}
