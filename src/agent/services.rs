//! Typed collaborator contracts on top of [`ServiceInvoker`].
//!
//! Request bodies are serialized with `serde` and responses decoded into the
//! shapes the graph nodes rely on. A response that does not decode is a
//! service failure, not a panic.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::chatbot::{LlmConfig, RetrieverConfig};
use super::invoke::{ServiceInvoker, ServiceName};
use super::message::ChatMessage;
use super::state::{ChatState, IntentExample, ToolOutput};
use crate::error::AgentError;

/// Retrieval type requested from the retrieval service.
pub const RETRIEVAL_TYPE: &str = "qd";

/// Task type forwarded to the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTask {
    /// Retrieval-grounded answer.
    Rag,
    /// Direct chat answer.
    Chat,
}

/// Body of a retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    /// Query text.
    pub query: String,
    /// Retrieval type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Retrievers to search.
    pub retrievers: Vec<RetrieverConfig>,
}

/// Retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDoc {
    /// Passage text.
    pub page_content: String,
    /// Figures attached to the passage.
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "figures")]
    pub figure: Vec<Value>,
    /// Remaining fields (score, source, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Figures may arrive as a list, a single object or `null`.
fn figures<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// `result` part of a retrieval response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Retrieved passages, best first.
    #[serde(default)]
    pub docs: Vec<RetrievedDoc>,
}

/// Response of a retrieval call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResponse {
    /// Retrieval result.
    #[serde(default)]
    pub result: RetrievalResult,
}

/// `llm_config` part of a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Chatbot model parameters, flattened.
    #[serde(flatten)]
    pub llm: LlmConfig,
    /// Whether to stream tokens.
    pub stream: bool,
    /// Generation task.
    pub intent_type: GenerationTask,
    /// System prompt, already rendered.
    pub system_prompt: String,
}

/// `llm_input` part of a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInput {
    /// Retrieved passages (RAG only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<String>>,
    /// User query.
    pub query: String,
    /// Prior turns.
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
}

/// Body of a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model configuration.
    pub llm_config: GenerationConfig,
    /// Model input.
    pub llm_input: GenerationInput,
}

/// Body of a remote tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteToolRequest {
    /// Tool name.
    pub tool_name: String,
    /// Tool arguments.
    pub kwargs: Map<String, Value>,
    /// User query.
    pub query: String,
    /// Client message id.
    pub message_id: String,
}

/// Asks the rewrite service for a standalone version of the query.
///
/// # Errors
///
/// Fails when the service fails or returns something other than a string.
pub async fn rewrite_query(
    invoker: &dyn ServiceInvoker,
    state: &ChatState,
) -> Result<String, AgentError> {
    let request = to_request(ServiceName::QueryRewrite, state)?;
    let response = invoker.invoke(ServiceName::QueryRewrite, request).await?;
    match response {
        Value::String(text) => Ok(text),
        Value::Null => Ok(state.query.clone()),
        other => Err(AgentError::service(
            ServiceName::QueryRewrite,
            format!("expected a string, got {other}"),
        )),
    }
}

/// Asks the intention service for few-shot examples.
///
/// # Errors
///
/// Fails when the service fails or the examples do not decode.
pub async fn detect_intention(
    invoker: &dyn ServiceInvoker,
    state: &ChatState,
) -> Result<Vec<IntentExample>, AgentError> {
    let request = to_request(ServiceName::IntentionDetection, state)?;
    let response = invoker.invoke(ServiceName::IntentionDetection, request).await?;
    from_response(ServiceName::IntentionDetection, response)
}

/// Runs a retrieval.
///
/// # Errors
///
/// Fails when the service fails or the response does not decode.
pub async fn retrieve(
    invoker: &dyn ServiceInvoker,
    request: &RetrievalRequest,
) -> Result<RetrievalResponse, AgentError> {
    let body = to_request(ServiceName::Retrieval, request)?;
    let response = invoker.invoke(ServiceName::Retrieval, body).await?;
    from_response(ServiceName::Retrieval, response)
}

/// Runs a generation. The generated payload is returned as-is (usually a
/// string).
///
/// # Errors
///
/// Fails when the service fails.
pub async fn generate(
    invoker: &dyn ServiceInvoker,
    request: &GenerationRequest,
) -> Result<Value, AgentError> {
    let body = to_request(ServiceName::Generation, request)?;
    invoker.invoke(ServiceName::Generation, body).await
}

/// Runs a tool on the remote tool-execution service.
///
/// A response shaped like `{code, result, error}` is taken as the tool
/// output; any other payload counts as a successful result.
///
/// # Errors
///
/// Fails when the service call itself fails.
pub async fn execute_remote_tool(
    invoker: &dyn ServiceInvoker,
    request: &RemoteToolRequest,
) -> Result<ToolOutput, AgentError> {
    let body = to_request(ServiceName::ToolExecution, request)?;
    let response = invoker.invoke(ServiceName::ToolExecution, body).await?;
    if response.get("code").is_some_and(Value::is_i64) {
        if let Ok(output) = serde_json::from_value::<ToolOutput>(response.clone()) {
            return Ok(output);
        }
    }
    Ok(ToolOutput::ok(response))
}

fn to_request(service: ServiceName, body: &impl Serialize) -> Result<Value, AgentError> {
    serde_json::to_value(body)
        .map_err(|e| AgentError::service(service, format!("request serialization failed: {e}")))
}

fn from_response<T: DeserializeOwned>(service: ServiceName, response: Value) -> Result<T, AgentError> {
    serde_json::from_value(response)
        .map_err(|e| AgentError::service(service, format!("unexpected response: {e}")))
}
