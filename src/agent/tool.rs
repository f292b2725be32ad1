//! Tool types and built-in tool definitions.
//!
//! [`ToolDefinition`] and [`ToolCall`] are the provider-facing
//! function-calling types. [`ToolDescriptor`] is what the registry stores:
//! the definition plus how the tool runs and what a result means for the
//! planning loop ([`ToolRunningMode`]).

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Name of the generic retrieval-augmented generation tool.
pub const RAG_TOOL: &str = "rag_tool";
/// Name of the tool the planner uses to answer directly.
pub const GIVE_FINAL_RESPONSE: &str = "give_final_response";
/// Name of the tool the planner uses to ask a clarifying question.
pub const GIVE_RHETORICAL_QUESTION: &str = "give_rhetorical_question";
/// Name of the direct chat tool.
pub const CHAT: &str = "chat";

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match a registry entry).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

/// What a tool result means for the planning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolRunningMode {
    /// The result is the final answer; planning stops.
    Once,
    /// The result feeds the next planning cycle.
    Repeatable,
}

impl std::fmt::Display for ToolRunningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Once => f.write_str("once"),
            Self::Repeatable => f.write_str("repeatable"),
        }
    }
}

/// How a tool is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolKind {
    /// Retrieve then generate. `None` searches every configured retriever.
    Rag {
        /// Retriever bound to this tool.
        retriever: Option<String>,
    },
    /// Returns the `response` argument as the answer.
    FinalResponse,
    /// Returns the `question` argument as the answer.
    RhetoricalQuestion,
    /// Generates directly from the query and history.
    Chat,
    /// Executed by the external tool-execution service.
    Remote,
}

/// Registry entry for one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Function-calling definition.
    pub definition: ToolDefinition,
    /// Running mode.
    pub mode: ToolRunningMode,
    /// Execution strategy.
    pub kind: ToolKind,
}

impl ToolDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        mode: ToolRunningMode,
        kind: ToolKind,
    ) -> Self {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            mode,
            kind,
        }
    }

    /// Tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Retrieval tool bound to one knowledge-base retriever.
    #[must_use]
    pub fn retriever(name: &str, description: &str) -> Self {
        Self::new(
            name,
            description,
            no_arguments(),
            ToolRunningMode::Once,
            ToolKind::Rag {
                retriever: Some(name.to_string()),
            },
        )
    }

    /// Tool served by the remote tool-execution service. Arguments are
    /// passed through unchecked.
    #[must_use]
    pub fn remote(name: &str, description: &str, mode: ToolRunningMode) -> Self {
        Self::new(
            name,
            description,
            json!({"type": "object", "properties": {}, "additionalProperties": true}),
            mode,
            ToolKind::Remote,
        )
    }
}

/// Tools available to every run.
#[must_use]
pub fn builtin_tools() -> Vec<ToolDescriptor> {
    vec![
        def_rag_tool(),
        def_give_final_response(),
        def_give_rhetorical_question(),
        def_chat(),
        def_get_weather(),
        def_comfort(),
    ]
}

fn no_arguments() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

/// Defines the `rag_tool` tool.
fn def_rag_tool() -> ToolDescriptor {
    ToolDescriptor::new(
        RAG_TOOL,
        "Answer the question from the knowledge base: retrieve relevant passages from every \
         configured retriever and generate a grounded answer.",
        no_arguments(),
        ToolRunningMode::Once,
        ToolKind::Rag { retriever: None },
    )
}

/// Defines the `give_final_response` tool.
fn def_give_final_response() -> ToolDescriptor {
    ToolDescriptor::new(
        GIVE_FINAL_RESPONSE,
        "Give the final answer to the user when no other tool is needed.",
        json!({
            "type": "object",
            "properties": {
                "response": {
                    "type": "string",
                    "description": "The answer shown to the user."
                }
            },
            "required": ["response"],
            "additionalProperties": false
        }),
        ToolRunningMode::Once,
        ToolKind::FinalResponse,
    )
}

/// Defines the `give_rhetorical_question` tool.
fn def_give_rhetorical_question() -> ToolDescriptor {
    ToolDescriptor::new(
        GIVE_RHETORICAL_QUESTION,
        "Ask the user a clarifying question when the request is ambiguous or missing \
         required details.",
        json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask the user."
                }
            },
            "required": ["question"],
            "additionalProperties": false
        }),
        ToolRunningMode::Once,
        ToolKind::RhetoricalQuestion,
    )
}

/// Defines the `chat` tool.
fn def_chat() -> ToolDescriptor {
    ToolDescriptor::new(
        CHAT,
        "Chat with the user directly (greetings, small talk) without consulting the \
         knowledge base.",
        no_arguments(),
        ToolRunningMode::Once,
        ToolKind::Chat,
    )
}

/// Defines the `get_weather` tool.
fn def_get_weather() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_weather",
        "Get the current weather for a city.",
        json!({
            "type": "object",
            "properties": {
                "city_name": {
                    "type": "string",
                    "description": "City name, e.g. Paris."
                }
            },
            "required": ["city_name"],
            "additionalProperties": false
        }),
        ToolRunningMode::Repeatable,
        ToolKind::Remote,
    )
}

/// Defines the `comfort` tool.
fn def_comfort() -> ToolDescriptor {
    ToolDescriptor::new(
        "comfort",
        "Comfort a user who is upset or frustrated.",
        no_arguments(),
        ToolRunningMode::Once,
        ToolKind::Remote,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tool_modes() {
        let tools = builtin_tools();
        let mode = |name: &str| tools.iter().find(|t| t.name() == name).map(|t| t.mode);
        assert_eq!(mode(RAG_TOOL), Some(ToolRunningMode::Once));
        assert_eq!(mode(GIVE_FINAL_RESPONSE), Some(ToolRunningMode::Once));
        assert_eq!(mode(GIVE_RHETORICAL_QUESTION), Some(ToolRunningMode::Once));
        assert_eq!(mode(CHAT), Some(ToolRunningMode::Once));
        assert_eq!(mode("get_weather"), Some(ToolRunningMode::Repeatable));
        assert_eq!(mode("comfort"), Some(ToolRunningMode::Once));
    }

    #[test]
    fn test_all_definitions_have_valid_schemas() {
        for tool in builtin_tools() {
            let def = &tool.definition;
            assert!(!def.name.is_empty());
            assert!(!def.description.is_empty());
            assert!(def.parameters.is_object());
            assert_eq!(def.parameters["type"], "object");
        }
    }

    #[test]
    fn test_retriever_descriptor_is_bound_rag() {
        let tool = ToolDescriptor::retriever("QA", "Answer from docs");
        assert_eq!(tool.name(), "QA");
        assert_eq!(tool.mode, ToolRunningMode::Once);
        assert_eq!(
            tool.kind,
            ToolKind::Rag {
                retriever: Some("QA".to_string())
            }
        );
    }

    #[test]
    fn test_tool_call_serialization() {
        let call = ToolCall {
            id: "call_123".to_string(),
            name: "get_weather".to_string(),
            arguments: r#"{"city_name":"Paris"}"#.to_string(),
        };
        let json = serde_json::to_string(&call).unwrap_or_default();
        assert!(json.contains("call_123"));
        assert!(json.contains("get_weather"));
    }

    #[test]
    fn test_running_mode_serialization() {
        let json = serde_json::to_string(&ToolRunningMode::Repeatable).unwrap_or_default();
        assert_eq!(json, "\"repeatable\"");
    }
}
