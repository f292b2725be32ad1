//! Agent trait definition.
//!
//! The planning step of the agent loop is a collaborator behind this trait:
//! the graph's `agent` node hands it the current state and the run's tool
//! registry and merges whatever update it returns. [`LlmToolCallPlanner`]
//! is the function-calling implementation; tests plug in scripted agents.
//!
//! [`LlmToolCallPlanner`]: super::planner::LlmToolCallPlanner

use async_trait::async_trait;

use super::registry::RequestToolRegistry;
use super::state::{ChatState, ChatStateUpdate};
use crate::error::AgentError;

/// A tool-call planner.
///
/// Implementations own the call counter: every successful `plan` must set
/// `agent_current_call_number` to one more than the state's value, whether
/// or not the output parsed.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier used when the request does not name one.
    fn model(&self) -> &str;

    /// Sampling temperature.
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for one planning reply.
    fn max_tokens(&self) -> u32 {
        1024
    }

    /// Plans the next tool calls.
    ///
    /// The update carries the incremented call number, the parse flag,
    /// the parsed calls and one `agent_tool_history` record (the planner
    /// turn, or an error record when the output could not be parsed).
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] when the model cannot be reached. Unparseable
    /// output is not an error.
    async fn plan(
        &self,
        state: &ChatState,
        tools: &RequestToolRegistry,
    ) -> Result<ChatStateUpdate, AgentError>;
}
