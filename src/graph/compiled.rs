//! Compiled state graph: immutable, supports invoke only.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Instant;

use tracing::{Instrument, debug, debug_span};

use super::node::{GraphState, Node};
use super::route::Target;
use crate::error::AgentError;

/// Router closure installed by `StateGraph::add_conditional_edges`.
pub(super) type RouterFn<S> = Box<dyn Fn(&mut S) -> Result<Target, AgentError> + Send + Sync>;

/// Outgoing edge of a node.
pub(super) enum Edge<S> {
    Fixed(Target),
    Conditional {
        router: RouterFn<S>,
        /// `(route label, target)` for every route variant.
        branches: Vec<(&'static str, Target)>,
    },
}

impl<S> Edge<S> {
    pub(super) fn targets(&self) -> Vec<Target> {
        match self {
            Self::Fixed(target) => vec![*target],
            Self::Conditional { branches, .. } => branches.iter().map(|(_, t)| *t).collect(),
        }
    }
}

/// Executable graph.
///
/// Created by `StateGraph::compile`. Holds no per-run data, so one instance
/// is built at startup and shared (`Arc`) by every concurrent run.
pub struct CompiledGraph<S, C>
where
    S: GraphState,
    C: Send + Sync,
{
    pub(super) nodes: HashMap<&'static str, Box<dyn Node<S, C>>>,
    pub(super) order: Vec<&'static str>,
    pub(super) edges: HashMap<&'static str, Edge<S>>,
    pub(super) entry: &'static str,
    pub(super) recursion_limit: usize,
}

impl<S, C> CompiledGraph<S, C>
where
    S: GraphState,
    C: Send + Sync,
{
    /// Runs the graph to completion with the default step budget.
    ///
    /// # Errors
    ///
    /// Propagates the first node, merge or router failure, and returns
    /// [`AgentError::RecursionLimit`] when the step budget is exhausted.
    pub async fn invoke(&self, state: S, ctx: &C) -> Result<S, AgentError> {
        self.invoke_with_limit(state, ctx, self.recursion_limit)
            .await
    }

    /// Runs the graph to completion with an explicit step budget.
    ///
    /// Starting at the entry node: run the node, merge its update, follow
    /// the node's outgoing edge. A router may annotate the state before the
    /// next node sees it. The run ends when an edge targets [`Target::End`].
    ///
    /// # Errors
    ///
    /// See [`CompiledGraph::invoke`].
    pub async fn invoke_with_limit(
        &self,
        mut state: S,
        ctx: &C,
        limit: usize,
    ) -> Result<S, AgentError> {
        let mut current = self.entry;

        for step in 0..limit {
            let node = self.nodes.get(current).ok_or_else(|| {
                AgentError::Compilation(crate::error::CompilationError::NodeNotFound(
                    current.to_string(),
                ))
            })?;

            let started = Instant::now();
            let update = node
                .run(&state, ctx)
                .instrument(debug_span!("node", id = current, step))
                .await?;
            state.merge(update)?;
            debug!(
                node = current,
                step,
                elapsed_ms = started.elapsed().as_millis(),
                "node completed"
            );

            let next = match self.edges.get(current) {
                Some(Edge::Fixed(target)) => *target,
                Some(Edge::Conditional { router, .. }) => router(&mut state)?,
                None => Target::End,
            };

            match next {
                Target::End => return Ok(state),
                Target::Node(id) => current = id,
            }
        }

        Err(AgentError::RecursionLimit { limit })
    }

    /// Id of the entry node.
    #[must_use]
    pub const fn entry(&self) -> &'static str {
        self.entry
    }

    /// Node ids in insertion order.
    #[must_use]
    pub fn node_ids(&self) -> &[&'static str] {
        &self.order
    }

    /// Default step budget.
    #[must_use]
    pub const fn recursion_limit(&self) -> usize {
        self.recursion_limit
    }

    /// Renders the topology as a Mermaid flowchart.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::from("flowchart TD\n");
        let _ = writeln!(out, "    START --> {}", self.entry);
        for id in &self.order {
            match self.edges.get(id) {
                Some(Edge::Fixed(target)) => {
                    let _ = writeln!(out, "    {id} --> {target}");
                }
                Some(Edge::Conditional { branches, .. }) => {
                    for (label, target) in branches {
                        let _ = writeln!(out, "    {id} -.->|{label}| {target}");
                    }
                }
                None => {}
            }
        }
        out
    }
}

impl<S, C> std::fmt::Debug for CompiledGraph<S, C>
where
    S: GraphState,
    C: Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("entry", &self.entry)
            .field("nodes", &self.order)
            .field("recursion_limit", &self.recursion_limit)
            .finish()
    }
}
