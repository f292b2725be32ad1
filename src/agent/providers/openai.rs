//! `OpenAI`-compatible provider on top of `async-openai`.
//!
//! The planner uses it for function calling, the LLM-backed services for
//! rewrite and generation. Point `base_url` at any compatible gateway.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent, ChatCompletionTool,
    ChatCompletionToolChoiceOption, ChatCompletionToolType, CreateChatCompletionRequest,
    CreateChatCompletionResponse, FunctionCall, FunctionObject,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use crate::agent::config::AppConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::{LlmProvider, TextStream};
use crate::agent::tool::{ToolCall, ToolDefinition};
use crate::error::AgentError;

/// Chat-completions provider for `OpenAI` and compatible endpoints.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Provider for the configured key and endpoint.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        Self::with_credentials(&config.api_key, config.base_url.as_deref())
    }

    /// Provider for an explicit key and optional endpoint.
    #[must_use]
    pub fn with_credentials(api_key: &str, base_url: Option<&str>) -> Self {
        let settings = base_url.map_or_else(
            || OpenAIConfig::new().with_api_key(api_key),
            |url| OpenAIConfig::new().with_api_key(api_key).with_api_base(url),
        );
        Self {
            client: Client::with_config(settings),
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let response = self
            .client
            .chat()
            .create(completion_request(request, false))
            .await
            .map_err(request_error)?;
        let response = chat_response(response);
        debug!(
            model = %request.model,
            tool_calls = response.tool_calls.len(),
            finish_reason = response.finish_reason.as_deref().unwrap_or("none"),
            total_tokens = response.usage.total_tokens,
            "chat completion received"
        );
        Ok(response)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, AgentError> {
        let stream = self
            .client
            .chat()
            .create_stream(completion_request(request, true))
            .await
            .map_err(request_error)?;

        Ok(Box::pin(stream.map(|chunk| {
            chunk
                .map(|chunk| {
                    chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                        .unwrap_or_default()
                })
                .map_err(|e| AgentError::Stream {
                    message: e.to_string(),
                })
        })))
    }
}

/// Maps an SDK failure, keeping the HTTP status when the transport saw one.
fn request_error(err: OpenAIError) -> AgentError {
    let status = match &err {
        OpenAIError::Reqwest(inner) => inner.status().map(|s| s.as_u16()),
        _ => None,
    };
    AgentError::ApiRequest {
        message: err.to_string(),
        status,
    }
}

/// Builds the SDK request. Tool choice is left to the model whenever tools
/// are offered.
fn completion_request(request: &ChatRequest, stream: bool) -> CreateChatCompletionRequest {
    let tools: Vec<ChatCompletionTool> = request.tools.iter().map(function_tool).collect();
    let has_tools = !tools.is_empty();

    CreateChatCompletionRequest {
        model: request.model.clone(),
        messages: request.messages.iter().map(request_message).collect(),
        temperature: request.temperature.filter(|&t| t != 0.0),
        max_completion_tokens: request.max_tokens,
        stream: (stream || request.stream).then_some(true),
        tool_choice: has_tools.then_some(ChatCompletionToolChoiceOption::Auto),
        tools: has_tools.then_some(tools),
        ..Default::default()
    }
}

fn function_tool(definition: &ToolDefinition) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: definition.name.clone(),
            description: Some(definition.description.clone()),
            parameters: Some(definition.parameters.clone()),
            strict: None,
        },
    }
}

fn request_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
    let text = msg.content.clone();
    match msg.role {
        Role::System => ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: ChatCompletionRequestSystemMessageContent::Text(text),
            name: None,
        }),
        Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(text),
            name: None,
        }),
        Role::Tool => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
            content: ChatCompletionRequestToolMessageContent::Text(text),
            tool_call_id: msg.tool_call_id.clone().unwrap_or_default(),
        }),
        Role::Assistant => {
            let tool_calls: Vec<ChatCompletionMessageToolCall> = msg
                .tool_calls
                .iter()
                .map(|call| ChatCompletionMessageToolCall {
                    id: call.id.clone(),
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect();

            #[allow(deprecated)]
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: (!text.is_empty())
                    .then_some(ChatCompletionRequestAssistantMessageContent::Text(text)),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                name: None,
                refusal: None,
                audio: None,
                function_call: None,
            })
        }
    }
}

/// Reads the first choice of a completion.
fn chat_response(response: CreateChatCompletionResponse) -> ChatResponse {
    let usage = response
        .usage
        .map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

    let Some(choice) = response.choices.into_iter().next() else {
        return ChatResponse {
            usage,
            ..ChatResponse::default()
        };
    };

    ChatResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        tool_calls: choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect(),
        finish_reason: choice
            .finish_reason
            .map(|reason| format!("{reason:?}").to_lowercase()),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::agent::message::{
        assistant_message, assistant_tool_calls_message, system_message, tool_message,
        user_message,
    };

    fn planner_request(tools: Vec<ToolDefinition>) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![system_message("plan"), user_message("weather in Paris?")],
            temperature: Some(0.0),
            max_tokens: Some(512),
            stream: false,
            tools,
        }
    }

    #[test]
    fn test_roles_map_to_sdk_variants() {
        assert!(matches!(
            request_message(&system_message("s")),
            ChatCompletionRequestMessage::System(_)
        ));
        assert!(matches!(
            request_message(&user_message("u")),
            ChatCompletionRequestMessage::User(_)
        ));
        let ChatCompletionRequestMessage::Tool(tool) = request_message(&tool_message("call_9", "21C"))
        else {
            panic!("expected tool message");
        };
        assert_eq!(tool.tool_call_id, "call_9");
    }

    #[test]
    fn test_assistant_turn_round_trips_tool_calls() {
        let msg = assistant_tool_calls_message(
            "Checking.",
            vec![ToolCall {
                id: "call_1".to_string(),
                name: "get_weather".to_string(),
                arguments: r#"{"city_name":"Paris"}"#.to_string(),
            }],
        );
        let ChatCompletionRequestMessage::Assistant(a) = request_message(&msg) else {
            panic!("expected assistant message");
        };
        assert!(a.content.is_some());
        let calls = a.tool_calls.unwrap_or_default();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "get_weather");

        let ChatCompletionRequestMessage::Assistant(plain) =
            request_message(&assistant_message("Sunny."))
        else {
            panic!("expected assistant message");
        };
        assert!(plain.tool_calls.is_none());
    }

    #[test]
    fn test_tools_enable_auto_tool_choice() {
        let request = planner_request(vec![ToolDefinition {
            name: "give_final_response".to_string(),
            description: "Answer the user".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }]);
        let built = completion_request(&request, false);
        assert_eq!(built.tools.as_ref().map(Vec::len), Some(1));
        assert!(matches!(
            built.tool_choice,
            Some(ChatCompletionToolChoiceOption::Auto)
        ));
        assert!(built.temperature.is_none());
        assert!(built.stream.is_none());
    }

    #[test]
    fn test_plain_generation_request() {
        let mut request = planner_request(Vec::new());
        request.temperature = Some(0.3);
        let built = completion_request(&request, true);
        assert!(built.tools.is_none());
        assert!(built.tool_choice.is_none());
        assert_eq!(built.stream, Some(true));
        assert_eq!(built.temperature, Some(0.3));
    }

    #[test]
    fn test_chat_response_reads_tool_calls() {
        let raw: CreateChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "rag_tool", "arguments": "{}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap_or_else(|e| panic!("{e}"));

        let response = chat_response(raw);
        assert!(response.content.is_empty());
        assert_eq!(response.tool_calls[0].name, "rag_tool");
        assert_eq!(response.finish_reason.as_deref(), Some("toolcalls"));
        assert_eq!(response.usage.total_tokens, 15);
    }
}
