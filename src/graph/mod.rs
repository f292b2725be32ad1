//! State graph runtime: nodes, fixed edges, conditional edges.
//!
//! Build a [`StateGraph`] with `add_node`, `add_edge` and
//! `add_conditional_edges`, then `compile` it into an immutable
//! [`CompiledGraph`] that can be shared across runs and invoked with a state
//! and a per-run context.
//!
//! ```text
//! StateGraph ─ compile ─► CompiledGraph::invoke(state, ctx)
//!                             │
//!                             ├─► Node::run(&state, ctx) ─► S::Update
//!                             ├─► GraphState::merge(update)
//!                             └─► Edge: fixed Target, or Router(&mut state) ─► Route ─► Target
//! ```
//!
//! Nodes run strictly one after another; a node either returns a complete
//! update or fails the run.

mod compiled;
mod node;
mod route;
mod state_graph;

pub use compiled::CompiledGraph;
pub use node::{GraphState, Node};
pub use route::{Route, Target};
pub use state_graph::{DEFAULT_RECURSION_LIMIT, StateGraph};
