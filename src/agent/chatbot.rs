//! Request-scoped chatbot configuration.
//!
//! Arrives with every run request and stays read-only for the whole run.
//! Unknown keys are preserved so they can be forwarded to the collaborator
//! services untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::prompt::PromptType;

/// Chatbot configuration carried by a run request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatbotConfig {
    /// Knowledge-base retrievers. Each becomes a retrieval tool for the run.
    #[serde(default)]
    pub knowledge_base_retrievers: Vec<RetrieverConfig>,
    /// Retrievers used by the intention service.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intention_retrievers: Vec<Value>,
    /// Generation model parameters.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Prompt overrides by type.
    #[serde(default)]
    pub prompts: Vec<PromptTemplate>,
    /// Planner settings.
    #[serde(default)]
    pub agent_config: AgentSettings,
    /// Extra tools enabled for this chatbot.
    #[serde(default)]
    pub tools: Vec<ToolRef>,
    /// Intention detection tuning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intention_config: Option<IntentionConfig>,
    /// Remaining keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One knowledge-base retriever.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Retriever (and tool) name.
    pub name: String,
    /// Tool description shown to the planner.
    #[serde(default)]
    pub description: String,
    /// Index, embedding and search settings, opaque here.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Generation model parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend type, e.g. `Bedrock` or `OpenAI`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Model identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Sampling parameters (`temperature`, `max_tokens`, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub model_kwargs: Map<String, Value>,
    /// Remaining keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LlmConfig {
    /// `model_kwargs.temperature`, if numeric.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn temperature(&self) -> Option<f32> {
        self.model_kwargs
            .get("temperature")
            .and_then(Value::as_f64)
            .map(|t| t as f32)
    }

    /// `model_kwargs.max_tokens`, if it fits in a `u32`.
    #[must_use]
    pub fn max_tokens(&self) -> Option<u32> {
        self.model_kwargs
            .get("max_tokens")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }
}

/// Prompt override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Which prompt this overrides.
    #[serde(rename = "type")]
    pub kind: PromptType,
    /// Template text.
    pub text: String,
}

/// Planner settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model the planner (and synthetic calls) are attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Remaining keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference to an enabled tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRef {
    /// Tool name.
    pub name: String,
    /// Remaining keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Intention detection tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentionConfig {
    /// Score at or above which an example's stored answer is returned
    /// directly. `None` keeps the similar-query shortcut off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similar_query_threshold: Option<f64>,
}

impl ChatbotConfig {
    /// Model id used for planning, falling back to the generation model.
    #[must_use]
    pub fn agent_model_id(&self) -> Option<&str> {
        self.agent_config
            .model_id
            .as_deref()
            .or(self.llm.model_id.as_deref())
    }

    /// Request-scoped prompt override for `kind`, if any. The last entry
    /// of a type wins.
    #[must_use]
    pub fn prompt(&self, kind: PromptType) -> Option<&str> {
        self.prompts
            .iter()
            .rev()
            .find(|p| p.kind == kind)
            .map(|p| p.text.as_str())
    }

    /// Retriever named `name`.
    #[must_use]
    pub fn retriever(&self, name: &str) -> Option<&RetrieverConfig> {
        self.knowledge_base_retrievers.iter().find(|r| r.name == name)
    }

    /// Configured similar-query threshold.
    #[must_use]
    pub fn similar_query_threshold(&self) -> Option<f64> {
        self.intention_config
            .and_then(|c| c.similar_query_threshold)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> ChatbotConfig {
        serde_json::from_value(json!({
            "bot_id": "a1b2",
            "knowledge_base_retrievers": [
                {"name": "QA", "description": "Answer from docs", "index": "test-qa"}
            ],
            "llm": {
                "type": "Bedrock",
                "model_id": "claude-3-sonnet",
                "model_kwargs": {"temperature": 0.0, "max_tokens": 4096}
            },
            "prompts": [
                {"type": "RAG", "text": "Use these docs: {context}"},
                {"type": "GENERAL", "text": "You are a customer service chatbot."}
            ],
            "tools": [{"name": "get_weather"}, {"name": "comfort"}]
        }))
        .unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    #[test]
    fn test_parse_full_config() {
        let config = sample();
        assert_eq!(config.knowledge_base_retrievers.len(), 1);
        assert_eq!(config.knowledge_base_retrievers[0].extra.get("index"), Some(&json!("test-qa")));
        assert_eq!(config.llm.kind.as_deref(), Some("Bedrock"));
        assert_eq!(config.llm.max_tokens(), Some(4096));
        assert_eq!(config.llm.temperature(), Some(0.0));
        assert_eq!(config.tools.len(), 2);
        assert_eq!(config.extra.get("bot_id"), Some(&json!("a1b2")));
    }

    #[test]
    fn test_agent_model_falls_back_to_llm() {
        let mut config = sample();
        assert_eq!(config.agent_model_id(), Some("claude-3-sonnet"));
        config.agent_config.model_id = Some("planner".to_string());
        assert_eq!(config.agent_model_id(), Some("planner"));
    }

    #[test]
    fn test_prompt_override_lookup() {
        let config = sample();
        assert_eq!(config.prompt(PromptType::Rag), Some("Use these docs: {context}"));
        assert!(config.prompt(PromptType::ConvSummary).is_none());
    }

    #[test]
    fn test_empty_config_defaults() {
        let config: ChatbotConfig =
            serde_json::from_value(json!({})).unwrap_or_else(|e| panic!("{e}"));
        assert!(config.knowledge_base_retrievers.is_empty());
        assert!(config.similar_query_threshold().is_none());
        assert!(config.agent_model_id().is_none());
    }
}
