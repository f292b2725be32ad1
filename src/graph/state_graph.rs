//! Graph builder: nodes, fixed edges and conditional edges.

use std::collections::HashMap;

use tracing::debug;

use super::compiled::{CompiledGraph, Edge, RouterFn};
use super::node::{GraphState, Node};
use super::route::{Route, Target};
use crate::error::{AgentError, CompilationError};

/// Default maximum number of node executions per run.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Mutable graph definition.
///
/// Generic over the state `S` and the per-run context `C`. Every node needs
/// exactly one outgoing edge: either a fixed [`Target`] or a router whose
/// [`Route`] outcomes are mapped to targets.
pub struct StateGraph<S, C>
where
    S: GraphState,
    C: Send + Sync,
{
    nodes: HashMap<&'static str, Box<dyn Node<S, C>>>,
    /// Insertion order, used for deterministic descriptions.
    order: Vec<&'static str>,
    edges: HashMap<&'static str, Edge<S>>,
    entry: Option<&'static str>,
    duplicate_edges: Vec<&'static str>,
    recursion_limit: usize,
}

impl<S, C> Default for StateGraph<S, C>
where
    S: GraphState,
    C: Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S, C> StateGraph<S, C>
where
    S: GraphState,
    C: Send + Sync,
{
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: HashMap::new(),
            entry: None,
            duplicate_edges: Vec::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    /// Adds a node under its own id. Replaces a node with the same id.
    pub fn add_node(&mut self, node: impl Node<S, C> + 'static) -> &mut Self {
        let id = node.id();
        if self.nodes.insert(id, Box::new(node)).is_none() {
            self.order.push(id);
        }
        self
    }

    /// Sets the node the run starts from.
    pub fn set_entry_point(&mut self, id: &'static str) -> &mut Self {
        self.entry = Some(id);
        self
    }

    /// Sets the default step budget for [`CompiledGraph::invoke`].
    pub const fn set_recursion_limit(&mut self, limit: usize) -> &mut Self {
        self.recursion_limit = limit;
        self
    }

    /// Adds a fixed edge `from → to`.
    pub fn add_edge(&mut self, from: &'static str, to: Target) -> &mut Self {
        self.insert_edge(from, Edge::Fixed(to));
        self
    }

    /// Adds a conditional edge leaving `from`.
    ///
    /// `router` inspects (and may annotate) the state after `from` ran and
    /// returns a route; `branches` maps every route to its target. The
    /// mapping is evaluated for every `R::ALL` variant at compile time so an
    /// unmapped or dangling branch is rejected before any run.
    pub fn add_conditional_edges<R, F, M>(
        &mut self,
        from: &'static str,
        router: F,
        branches: M,
    ) -> &mut Self
    where
        R: Route,
        F: Fn(&mut S) -> Result<R, AgentError> + Send + Sync + 'static,
        M: Fn(R) -> Target + Send + Sync + 'static,
    {
        let table: Vec<(&'static str, Target)> =
            R::ALL.iter().map(|r| (r.label(), branches(*r))).collect();
        let router: RouterFn<S> = Box::new(move |state: &mut S| {
            let route = router(state)?;
            let target = branches(route);
            debug!(from, route = route.label(), to = %target, "conditional edge");
            Ok(target)
        });
        self.insert_edge(
            from,
            Edge::Conditional {
                router,
                branches: table,
            },
        );
        self
    }

    fn insert_edge(&mut self, from: &'static str, edge: Edge<S>) {
        if self.edges.insert(from, edge).is_some() {
            self.duplicate_edges.push(from);
        }
    }

    /// Validates the topology and freezes it.
    ///
    /// # Errors
    ///
    /// Returns [`CompilationError`] when the entry point is missing, an edge
    /// references an unknown node, a node has two outgoing edges, or a node
    /// has none.
    pub fn compile(self) -> Result<CompiledGraph<S, C>, CompilationError> {
        if let Some(from) = self.duplicate_edges.first() {
            return Err(CompilationError::DuplicateEdge((*from).to_string()));
        }
        let entry = self.entry.ok_or(CompilationError::MissingEntry)?;
        self.check_known(entry)?;

        for (from, edge) in &self.edges {
            self.check_known(from)?;
            for target in edge.targets() {
                if let Target::Node(id) = target {
                    self.check_known(id)?;
                }
            }
        }
        for id in &self.order {
            if !self.edges.contains_key(id) {
                return Err(CompilationError::NoOutgoingEdge((*id).to_string()));
            }
        }

        Ok(CompiledGraph {
            nodes: self.nodes,
            order: self.order,
            edges: self.edges,
            entry,
            recursion_limit: self.recursion_limit,
        })
    }

    fn check_known(&self, id: &str) -> Result<(), CompilationError> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(CompilationError::NodeNotFound(id.to_string()))
        }
    }
}
