//! Topology of the chat graph.
//!
//! ```text
//! START → query_preprocess → intention_detection
//!   intention_detection ─similar query found→ matched_query_return → final_results_preparation → END
//!   intention_detection ─intention detected──→ agent
//!   agent ─valid tool calling──→ tools_execution → agent
//!   agent ─no need tool calling→ final_results_preparation
//! ```

use super::nodes::{
    AGENT, AgentNode, FINAL_RESULTS_PREPARATION, FinalResultsPreparation, INTENTION_DETECTION,
    IntentionDetection, MATCHED_QUERY_RETURN, MatchedQueryReturn, QUERY_PREPROCESS,
    QueryPreprocess, TOOLS_EXECUTION, ToolsExecution,
};
use super::router::{AgentRoute, IntentRoute, agent_route, intent_route};
use super::runner::RunContext;
use super::state::ChatState;
use crate::error::CompilationError;
use crate::graph::{CompiledGraph, StateGraph, Target};

/// Compiled chat graph.
pub type ChatGraph = CompiledGraph<ChatState, RunContext>;

/// Builds and compiles the chat graph.
///
/// `recursion_limit` bounds node executions per run.
///
/// # Errors
///
/// Returns [`CompilationError`] if the topology is inconsistent.
pub fn build_chat_graph(recursion_limit: usize) -> Result<ChatGraph, CompilationError> {
    let mut graph: StateGraph<ChatState, RunContext> = StateGraph::new();
    graph
        .add_node(QueryPreprocess)
        .add_node(IntentionDetection)
        .add_node(MatchedQueryReturn)
        .add_node(AgentNode)
        .add_node(ToolsExecution)
        .add_node(FinalResultsPreparation)
        .set_entry_point(QUERY_PREPROCESS)
        .set_recursion_limit(recursion_limit);

    graph
        .add_edge(QUERY_PREPROCESS, Target::Node(INTENTION_DETECTION))
        .add_conditional_edges(INTENTION_DETECTION, intent_route, |route| match route {
            IntentRoute::SimilarQueryFound => Target::Node(MATCHED_QUERY_RETURN),
            IntentRoute::IntentionDetected => Target::Node(AGENT),
        })
        .add_edge(MATCHED_QUERY_RETURN, Target::Node(FINAL_RESULTS_PREPARATION))
        .add_conditional_edges(AGENT, agent_route, |route| match route {
            AgentRoute::ValidToolCalling => Target::Node(TOOLS_EXECUTION),
            AgentRoute::NoNeedToolCalling => Target::Node(FINAL_RESULTS_PREPARATION),
        })
        .add_edge(TOOLS_EXECUTION, Target::Node(AGENT))
        .add_edge(FINAL_RESULTS_PREPARATION, Target::End);

    graph.compile()
}
