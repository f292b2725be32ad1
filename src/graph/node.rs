//! Graph node trait and the state merge contract.

use async_trait::async_trait;

use crate::error::AgentError;

/// State threaded through a graph run.
///
/// Nodes never mutate the state directly: they return an
/// [`GraphState::Update`] which the runtime folds in with
/// [`GraphState::merge`]. Field-level reducers (append, deep-union,
/// write-once) live in the `merge` implementation.
pub trait GraphState: Send + Sync + 'static {
    /// Partial update produced by one node.
    type Update: Send;

    /// Folds a node's update into the running state.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::StateViolation`] when the update breaks a state
    /// invariant.
    fn merge(&mut self, update: Self::Update) -> Result<(), AgentError>;
}

/// One step in a graph: state in, partial update out.
///
/// `C` is the per-run context (collaborators, registries, emitters) handed
/// to every node of the run.
#[async_trait]
pub trait Node<S, C>: Send + Sync
where
    S: GraphState,
    C: Send + Sync,
{
    /// Node id. Must be unique within a graph.
    fn id(&self) -> &'static str;

    /// Runs the node against a read-only view of the state.
    async fn run(&self, state: &S, ctx: &C) -> Result<S::Update, AgentError>;
}
