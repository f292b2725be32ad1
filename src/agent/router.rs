//! Conditional-edge routers of the chat graph.

use tracing::debug;

use super::state::{ChatState, IntentType};
use crate::error::AgentError;
use crate::graph::Route;

/// Outcome of the intent router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentRoute {
    /// A stored answer matched; skip the agent.
    SimilarQueryFound,
    /// Plan with the agent.
    IntentionDetected,
}

impl Route for IntentRoute {
    const ALL: &'static [Self] = &[Self::SimilarQueryFound, Self::IntentionDetected];

    fn label(self) -> &'static str {
        match self {
            Self::SimilarQueryFound => IntentType::SimilarQueryFound.as_str(),
            Self::IntentionDetected => IntentType::IntentionDetected.as_str(),
        }
    }
}

/// Outcome of the agent router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRoute {
    /// A ONCE tool produced the answer.
    NoNeedToolCalling,
    /// Execute the planned calls and plan again.
    ValidToolCalling,
}

impl Route for AgentRoute {
    const ALL: &'static [Self] = &[Self::NoNeedToolCalling, Self::ValidToolCalling];

    fn label(self) -> &'static str {
        match self {
            Self::NoNeedToolCalling => "no need tool calling",
            Self::ValidToolCalling => "valid tool calling",
        }
    }
}

/// Routes on the intent set by intention detection.
///
/// # Errors
///
/// Returns [`AgentError::StateViolation`] if intention detection left no
/// intent behind.
pub fn intent_route(state: &mut ChatState) -> Result<IntentRoute, AgentError> {
    match state.intent_type {
        Some(IntentType::SimilarQueryFound) => Ok(IntentRoute::SimilarQueryFound),
        Some(IntentType::IntentionDetected) => Ok(IntentRoute::IntentionDetected),
        None => Err(AgentError::StateViolation {
            field: "intent_type",
            message: "intent router reached before intention detection".to_string(),
        }),
    }
}

/// Routes after the agent node and refreshes the call-budget flag.
///
/// # Errors
///
/// Returns [`AgentError::RepeatedCallLimitExceeded`] once the call budget
/// is spent without a ONCE tool answering. The run fails; no default
/// answer is substituted.
pub fn agent_route(state: &mut ChatState) -> Result<AgentRoute, AgentError> {
    if state.function_calling_is_run_once {
        return Ok(AgentRoute::NoNeedToolCalling);
    }

    let current = state.agent_current_call_number;
    let limit = state.agent_repeated_call_limit;
    state.agent_repeated_call_validation = current < limit;
    debug!(current, limit, valid = state.agent_repeated_call_validation, "agent call budget");

    if state.agent_repeated_call_validation {
        Ok(AgentRoute::ValidToolCalling)
    } else {
        Err(AgentError::RepeatedCallLimitExceeded { limit, current })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::agent::chatbot::ChatbotConfig;

    fn state() -> ChatState {
        ChatState::new("q", ChatbotConfig::default())
    }

    #[test_case(IntentType::SimilarQueryFound, IntentRoute::SimilarQueryFound ; "similar query")]
    #[test_case(IntentType::IntentionDetected, IntentRoute::IntentionDetected ; "intention")]
    fn test_intent_route(intent: IntentType, expected: IntentRoute) {
        let mut s = state();
        s.intent_type = Some(intent);
        assert_eq!(intent_route(&mut s).ok(), Some(expected));
    }

    #[test]
    fn test_intent_route_requires_intent() {
        assert!(intent_route(&mut state()).is_err());
    }

    #[test_case(0, 5, true ; "first cycle")]
    #[test_case(4, 5, true ; "last allowed cycle")]
    #[test_case(5, 5, false ; "budget spent")]
    #[test_case(1, 1, false ; "limit of one")]
    fn test_agent_route_budget(current: u32, limit: u32, valid: bool) {
        let mut s = state();
        s.agent_current_call_number = current;
        s.agent_repeated_call_limit = limit;

        let route = agent_route(&mut s);
        assert_eq!(s.agent_repeated_call_validation, valid);
        if valid {
            assert_eq!(route.ok(), Some(AgentRoute::ValidToolCalling));
        } else {
            assert!(matches!(
                route,
                Err(AgentError::RepeatedCallLimitExceeded { limit: l, current: c }) if l == limit && c == current
            ));
        }
    }

    #[test]
    fn test_run_once_wins_over_spent_budget() {
        let mut s = state();
        s.agent_current_call_number = 9;
        s.function_calling_is_run_once = true;
        assert_eq!(agent_route(&mut s).ok(), Some(AgentRoute::NoNeedToolCalling));
    }

    #[test]
    fn test_route_labels_are_distinct() {
        assert_eq!(IntentRoute::ALL.len(), 2);
        assert_ne!(AgentRoute::NoNeedToolCalling.label(), AgentRoute::ValidToolCalling.label());
    }
}
