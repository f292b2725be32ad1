//! Chat state threaded through one graph run, and its merge reducers.
//!
//! [`ChatState`] is created per request by the runner, owned by exactly one
//! graph invocation and dropped once the answer is extracted. Nodes return a
//! [`ChatStateUpdate`]; [`ChatState::merge`] applies it field by field:
//!
//! | field                      | reducer                               |
//! |----------------------------|---------------------------------------|
//! | `chat_history`             | append                                |
//! | `trace_infos`              | append                                |
//! | `agent_tool_history`       | append                                |
//! | `extra_response`           | deep union (nested objects merge)     |
//! | `intent_type`              | set once                              |
//! | `answer`                   | write once (identical rewrite allowed)|
//! | `agent_current_call_number`| monotonic                             |
//! | everything else            | replace when present                  |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::chatbot::ChatbotConfig;
use super::message::ChatMessage;
use crate::error::AgentError;
use crate::graph::GraphState;

/// Default bound on agent planning cycles per run.
pub const DEFAULT_REPEATED_CALL_LIMIT: u32 = 5;

/// Outcome of intention detection. Drives the intent router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentType {
    /// A stored query is close enough that its answer is returned directly.
    #[serde(rename = "similar query found")]
    SimilarQueryFound,
    /// Regular path: few-shot examples feed the agent.
    #[serde(rename = "intention detected")]
    IntentionDetected,
}

impl IntentType {
    /// Wire name of the intent type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimilarQueryFound => "similar query found",
            Self::IntentionDetected => "intention detected",
        }
    }
}

impl std::fmt::Display for IntentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Few-shot example returned by the intention service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentExample {
    /// Tool name the example implies.
    pub intent: String,
    /// Retrieval score, when the service reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Stored answer for the example query, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    /// Remaining service fields, kept opaque.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A structured tool call produced by the agent node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedToolCall {
    /// Provider-assigned call id, or a synthetic one.
    #[serde(default)]
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Tool arguments (always a JSON object).
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    /// Model that planned the call.
    pub model_id: String,
}

/// Output of one tool execution.
///
/// `code == 0` means success and `result` holds the tool output; any other
/// code carries a failure description in `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Status code, `0` on success.
    pub code: i32,
    /// Tool result.
    #[serde(default)]
    pub result: Value,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutput {
    /// Successful output.
    #[must_use]
    pub const fn ok(result: Value) -> Self {
        Self {
            code: 0,
            result,
            error: None,
        }
    }

    /// Failed output.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            code: 1,
            result: Value::Null,
            error: Some(error.into()),
        }
    }

    /// Whether the tool succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Raw result of one executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToolCallResult {
    /// Id of the call this result answers.
    #[serde(default)]
    pub tool_call_id: String,
    /// Tool name.
    pub name: String,
    /// Arguments the tool ran with.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
    /// Tool output.
    pub output: ToolOutput,
}

/// One agent/tool turn in the planning loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum AgentToolRecord {
    /// Planner output: optional text plus the calls it requested.
    Agent {
        /// Text content of the planner reply.
        content: String,
        /// Calls the planner requested.
        tool_calls: Vec<ParsedToolCall>,
    },
    /// Results of executing the previous agent turn's calls.
    Tools {
        /// One entry per executed call, in call order.
        raw_tool_call_results: Vec<RawToolCallResult>,
    },
    /// Planner output that could not be turned into valid tool calls.
    Error {
        /// What went wrong.
        message: String,
    },
}

impl AgentToolRecord {
    /// Raw tool results carried by this record (empty unless `Tools`).
    #[must_use]
    pub fn raw_tool_call_results(&self) -> &[RawToolCallResult] {
        match self {
            Self::Tools {
                raw_tool_call_results,
            } => raw_tool_call_results,
            Self::Agent { .. } | Self::Error { .. } => &[],
        }
    }
}

/// The record threaded through every node of one run.
#[derive(Debug, Clone, Serialize)]
pub struct ChatState {
    /// Original user text.
    pub query: String,
    /// Prior conversation turns.
    pub chat_history: Vec<ChatMessage>,
    /// Request-scoped chatbot configuration. Read-only during the run.
    pub chatbot_config: ChatbotConfig,
    /// Whether the client wants streamed output.
    pub stream: bool,
    /// Whether trace lines should be streamed.
    pub enable_trace: bool,
    /// Client connection for streamed output.
    pub ws_connection_id: Option<String>,
    /// Client message id.
    pub message_id: String,
    /// Human-readable progress lines.
    pub trace_infos: Vec<String>,
    /// Auxiliary outputs returned beside the answer.
    pub extra_response: Map<String, Value>,
    /// Standalone rewrite of the query.
    pub query_rewrite: Option<String>,
    /// Routing outcome of intention detection.
    pub intent_type: Option<IntentType>,
    /// Few-shot examples from intention detection.
    pub intent_fewshot_examples: Vec<IntentExample>,
    /// Distinct tool names implied by the examples.
    pub intent_fewshot_tools: Vec<String>,
    /// Agent/tool turns of the planning loop.
    pub agent_tool_history: Vec<AgentToolRecord>,
    /// Maximum planning cycles.
    pub agent_repeated_call_limit: u32,
    /// Planning cycles run so far.
    pub agent_current_call_number: u32,
    /// `agent_current_call_number < agent_repeated_call_limit`, as last
    /// computed by the agent router.
    pub agent_repeated_call_validation: bool,
    /// Whether the last planner output parsed into valid tool calls.
    pub function_calling_parse_ok: bool,
    /// Set when a ONCE tool result became the answer.
    pub function_calling_is_run_once: bool,
    /// Calls to execute next.
    pub function_calling_parsed_tool_calls: Vec<ParsedToolCall>,
    /// Final answer.
    pub answer: Option<Value>,
}

impl ChatState {
    /// Creates the initial state for one run.
    #[must_use]
    pub fn new(query: impl Into<String>, chatbot_config: ChatbotConfig) -> Self {
        Self {
            query: query.into(),
            chat_history: Vec::new(),
            chatbot_config,
            stream: false,
            enable_trace: false,
            ws_connection_id: None,
            message_id: String::new(),
            trace_infos: Vec::new(),
            extra_response: Map::new(),
            query_rewrite: None,
            intent_type: None,
            intent_fewshot_examples: Vec::new(),
            intent_fewshot_tools: Vec::new(),
            agent_tool_history: Vec::new(),
            agent_repeated_call_limit: DEFAULT_REPEATED_CALL_LIMIT,
            agent_current_call_number: 0,
            agent_repeated_call_validation: false,
            function_calling_parse_ok: false,
            function_calling_is_run_once: false,
            function_calling_parsed_tool_calls: Vec::new(),
            answer: None,
        }
    }

    /// First raw result of the most recent tool-history entry.
    #[must_use]
    pub fn last_tool_result(&self) -> Option<&RawToolCallResult> {
        self.agent_tool_history
            .last()
            .and_then(|record| record.raw_tool_call_results().first())
    }
}

/// Partial update returned by a node.
///
/// `Vec` fields are appended, `extra_response` is deep-merged, `Option`
/// fields replace the current value when `Some`.
#[derive(Debug, Clone, Default)]
pub struct ChatStateUpdate {
    /// Turns to append to `chat_history`.
    pub chat_history: Vec<ChatMessage>,
    /// Lines to append to `trace_infos`.
    pub trace_infos: Vec<String>,
    /// Keys to merge into `extra_response`.
    pub extra_response: Map<String, Value>,
    /// New `query_rewrite`.
    pub query_rewrite: Option<String>,
    /// New `intent_type` (set once).
    pub intent_type: Option<IntentType>,
    /// New few-shot examples.
    pub intent_fewshot_examples: Option<Vec<IntentExample>>,
    /// New few-shot tools.
    pub intent_fewshot_tools: Option<Vec<String>>,
    /// Records to append to `agent_tool_history`.
    pub agent_tool_history: Vec<AgentToolRecord>,
    /// New call number (must not decrease).
    pub agent_current_call_number: Option<u32>,
    /// New validation flag.
    pub agent_repeated_call_validation: Option<bool>,
    /// New parse flag.
    pub function_calling_parse_ok: Option<bool>,
    /// New run-once flag.
    pub function_calling_is_run_once: Option<bool>,
    /// New calls to execute.
    pub function_calling_parsed_tool_calls: Option<Vec<ParsedToolCall>>,
    /// Final answer (write once).
    pub answer: Option<Value>,
}

impl ChatStateUpdate {
    /// Update that only (re)writes the answer.
    #[must_use]
    pub fn answer(answer: Option<Value>) -> Self {
        Self {
            answer,
            ..Self::default()
        }
    }
}

impl GraphState for ChatState {
    type Update = ChatStateUpdate;

    fn merge(&mut self, update: ChatStateUpdate) -> Result<(), AgentError> {
        if let Some(intent) = update.intent_type {
            match self.intent_type {
                Some(current) if current != intent => {
                    return Err(AgentError::StateViolation {
                        field: "intent_type",
                        message: format!("already set to '{current}', refusing '{intent}'"),
                    });
                }
                _ => self.intent_type = Some(intent),
            }
        }

        if let Some(answer) = update.answer {
            match &self.answer {
                Some(current) if *current != answer => {
                    return Err(AgentError::StateViolation {
                        field: "answer",
                        message: "answer is write-once".to_string(),
                    });
                }
                _ => self.answer = Some(answer),
            }
        }

        if let Some(number) = update.agent_current_call_number {
            if number < self.agent_current_call_number {
                return Err(AgentError::StateViolation {
                    field: "agent_current_call_number",
                    message: format!(
                        "call number cannot decrease from {} to {number}",
                        self.agent_current_call_number
                    ),
                });
            }
            self.agent_current_call_number = number;
        }

        self.chat_history.extend(update.chat_history);
        self.trace_infos.extend(update.trace_infos);
        self.agent_tool_history.extend(update.agent_tool_history);
        deep_merge(&mut self.extra_response, update.extra_response);

        if let Some(rewrite) = update.query_rewrite {
            self.query_rewrite = Some(rewrite);
        }
        if let Some(examples) = update.intent_fewshot_examples {
            self.intent_fewshot_examples = examples;
        }
        if let Some(tools) = update.intent_fewshot_tools {
            self.intent_fewshot_tools = tools;
        }
        if let Some(flag) = update.agent_repeated_call_validation {
            self.agent_repeated_call_validation = flag;
        }
        if let Some(flag) = update.function_calling_parse_ok {
            self.function_calling_parse_ok = flag;
        }
        if let Some(flag) = update.function_calling_is_run_once {
            self.function_calling_is_run_once = flag;
        }
        if let Some(calls) = update.function_calling_parsed_tool_calls {
            self.function_calling_parsed_tool_calls = calls;
        }
        Ok(())
    }
}

/// Merges `update` into `target`: nested objects merge key by key, any
/// other value replaces the existing one. Keys are never removed.
pub fn deep_merge(target: &mut Map<String, Value>, update: Map<String, Value>) {
    for (key, value) in update {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn state() -> ChatState {
        ChatState::new("hello", ChatbotConfig::default())
    }

    #[test]
    fn test_extra_response_is_additive() {
        let mut s = state();
        s.merge(ChatStateUpdate {
            extra_response: object(json!({"figures": ["a"]})),
            ..ChatStateUpdate::default()
        })
        .unwrap_or_else(|e| panic!("merge failed: {e}"));
        s.merge(ChatStateUpdate {
            extra_response: object(json!({"other": "b"})),
            ..ChatStateUpdate::default()
        })
        .unwrap_or_else(|e| panic!("merge failed: {e}"));

        assert_eq!(Value::Object(s.extra_response), json!({"figures": ["a"], "other": "b"}));
    }

    #[test]
    fn test_deep_merge_nested_objects() {
        let mut target = object(json!({"meta": {"a": 1, "b": {"x": 1}}}));
        deep_merge(&mut target, object(json!({"meta": {"b": {"y": 2}, "c": 3}})));
        assert_eq!(
            Value::Object(target),
            json!({"meta": {"a": 1, "b": {"x": 1, "y": 2}, "c": 3}})
        );
    }

    #[test]
    fn test_intent_type_is_set_once() {
        let mut s = state();
        let set = |intent| ChatStateUpdate {
            intent_type: Some(intent),
            ..ChatStateUpdate::default()
        };
        assert!(s.merge(set(IntentType::IntentionDetected)).is_ok());
        assert!(s.merge(set(IntentType::IntentionDetected)).is_ok());
        let err = s.merge(set(IntentType::SimilarQueryFound));
        assert!(matches!(
            err,
            Err(AgentError::StateViolation {
                field: "intent_type",
                ..
            })
        ));
    }

    #[test]
    fn test_answer_is_write_once() {
        let mut s = state();
        assert!(s.merge(ChatStateUpdate::answer(Some(json!("first")))).is_ok());
        assert!(s.merge(ChatStateUpdate::answer(Some(json!("first")))).is_ok());
        assert!(s.merge(ChatStateUpdate::answer(Some(json!("second")))).is_err());
        assert_eq!(s.answer, Some(json!("first")));
    }

    #[test]
    fn test_call_number_cannot_decrease() {
        let mut s = state();
        let set = |n| ChatStateUpdate {
            agent_current_call_number: Some(n),
            ..ChatStateUpdate::default()
        };
        assert!(s.merge(set(2)).is_ok());
        assert!(s.merge(set(1)).is_err());
        assert_eq!(s.agent_current_call_number, 2);
    }

    #[test]
    fn test_last_tool_result_skips_non_tool_records() {
        let mut s = state();
        assert!(s.last_tool_result().is_none());
        s.agent_tool_history.push(AgentToolRecord::Tools {
            raw_tool_call_results: vec![RawToolCallResult {
                tool_call_id: "call_0".to_string(),
                name: "rag_tool".to_string(),
                kwargs: Map::new(),
                output: ToolOutput::ok(json!("answer")),
            }],
        });
        assert_eq!(s.last_tool_result().map(|r| r.name.as_str()), Some("rag_tool"));

        s.agent_tool_history.push(AgentToolRecord::Error {
            message: "bad".to_string(),
        });
        assert!(s.last_tool_result().is_none());
    }

    #[test]
    fn test_intent_type_wire_names() {
        let json = serde_json::to_string(&IntentType::SimilarQueryFound).unwrap_or_default();
        assert_eq!(json, "\"similar query found\"");
        let parsed: IntentType =
            serde_json::from_str("\"intention detected\"").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(parsed, IntentType::IntentionDetected);
    }

    #[test]
    fn test_intent_example_keeps_extra_fields() {
        let example: IntentExample = serde_json::from_value(json!({
            "intent": "get_weather",
            "query": "weather in Paris?",
            "score": 0.9
        }))
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(example.intent, "get_weather");
        assert_eq!(example.score, Some(0.9));
        assert_eq!(example.extra.get("query"), Some(&json!("weather in Paris?")));
    }

    proptest! {
        #[test]
        fn prop_deep_merge_never_drops_keys(
            left in proptest::collection::btree_map("[a-e]", 0i64..10, 0..5),
            right in proptest::collection::btree_map("[a-h]", 0i64..10, 0..5),
        ) {
            let mut target: Map<String, Value> =
                left.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let update: Map<String, Value> =
                right.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            deep_merge(&mut target, update);

            for key in left.keys().chain(right.keys()) {
                prop_assert!(target.contains_key(key));
            }
            for (key, value) in &right {
                prop_assert_eq!(target.get(key), Some(&json!(value)));
            }
        }

        #[test]
        fn prop_trace_infos_append_in_order(
            batches in proptest::collection::vec(proptest::collection::vec("[a-z]{1,6}", 0..4), 0..6),
        ) {
            let mut s = state();
            for batch in &batches {
                s.merge(ChatStateUpdate {
                    trace_infos: batch.clone(),
                    ..ChatStateUpdate::default()
                })
                .unwrap_or_else(|e| panic!("merge failed: {e}"));
            }
            let expected: Vec<String> = batches.into_iter().flatten().collect();
            prop_assert_eq!(s.trace_infos, expected);
        }
    }
}
