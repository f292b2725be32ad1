//! Function-calling planner.
//!
//! One planning cycle: build the conversation (system prompt with the
//! intention examples, chat history, the query, then every agent/tool turn
//! so far), offer the scoped tool set, and parse the model's reply into
//! [`ParsedToolCall`]s.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::message::{
    ChatMessage, ChatRequest, ChatResponse, assistant_tool_calls_message, system_message,
    tool_message, user_message,
};
use super::prompt::{PromptSet, PromptType, build_agent_system_prompt};
use super::provider::LlmProvider;
use super::registry::RequestToolRegistry;
use super::state::{AgentToolRecord, ChatState, ChatStateUpdate, ParsedToolCall, ToolOutput};
use super::tool::{GIVE_FINAL_RESPONSE, GIVE_RHETORICAL_QUESTION, ToolCall};
use super::traits::Agent;
use crate::error::AgentError;

/// Maximum raw byte length of tool argument JSON from the LLM.
const MAX_TOOL_ARGS_LEN: usize = 100_000;

/// Planner backed by an [`LlmProvider`] with function calling.
pub struct LlmToolCallPlanner {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    prompts: Arc<PromptSet>,
}

impl LlmToolCallPlanner {
    /// Creates a planner.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        max_tokens: u32,
        prompts: Arc<PromptSet>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
            prompts,
        }
    }

    fn build_messages(&self, state: &ChatState) -> Vec<ChatMessage> {
        let base = self.prompts.resolve(&state.chatbot_config, PromptType::Agent);
        let system = build_agent_system_prompt(base, &state.intent_fewshot_examples);

        let mut messages = Vec::with_capacity(state.chat_history.len() + state.agent_tool_history.len() + 2);
        messages.push(system_message(&system));
        messages.extend(state.chat_history.iter().cloned());
        messages.push(user_message(&state.query));
        for record in &state.agent_tool_history {
            append_record(&mut messages, record);
        }
        messages
    }
}

impl std::fmt::Debug for LlmToolCallPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmToolCallPlanner")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Agent for LlmToolCallPlanner {
    fn name(&self) -> &'static str {
        "tool_call_planner"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    async fn plan(
        &self,
        state: &ChatState,
        tools: &RequestToolRegistry,
    ) -> Result<ChatStateUpdate, AgentError> {
        let call_number = state.agent_current_call_number + 1;
        let offered = scoped_tool_names(state, tools);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: self.build_messages(state),
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            stream: false,
            tools: tools.definitions_for(offered.iter().map(String::as_str)),
        };
        debug!(
            agent = self.name(),
            call_number,
            tools = request.tools.len(),
            messages = request.messages.len(),
            "planning"
        );

        let response = self.provider.chat(&request).await?;
        Ok(planner_update(&response, tools, &self.model, call_number))
    }
}

/// Tools the planner may call this cycle.
///
/// With intention tools: those tools, the request's configured tools and
/// the two response tools. Without: every tool visible to the run.
#[must_use]
pub fn scoped_tool_names(state: &ChatState, tools: &RequestToolRegistry) -> BTreeSet<String> {
    if state.intent_fewshot_tools.is_empty() {
        return tools.list_names();
    }
    state
        .intent_fewshot_tools
        .iter()
        .cloned()
        .chain(state.chatbot_config.tools.iter().map(|t| t.name.clone()))
        .chain([
            GIVE_FINAL_RESPONSE.to_string(),
            GIVE_RHETORICAL_QUESTION.to_string(),
        ])
        .filter(|name| tools.contains(name))
        .collect()
}

/// Turns a planner reply into a state update.
#[must_use]
pub fn planner_update(
    response: &ChatResponse,
    tools: &RequestToolRegistry,
    model_id: &str,
    call_number: u32,
) -> ChatStateUpdate {
    match parse_tool_calls(response, tools, model_id, call_number) {
        Ok(calls) => ChatStateUpdate {
            agent_current_call_number: Some(call_number),
            function_calling_parse_ok: Some(true),
            function_calling_parsed_tool_calls: Some(calls.clone()),
            agent_tool_history: vec![AgentToolRecord::Agent {
                content: response.content.clone(),
                tool_calls: calls,
            }],
            ..ChatStateUpdate::default()
        },
        Err(message) => {
            warn!(call_number, error = %message, "planner output rejected");
            ChatStateUpdate {
                agent_current_call_number: Some(call_number),
                function_calling_parse_ok: Some(false),
                function_calling_parsed_tool_calls: Some(Vec::new()),
                agent_tool_history: vec![AgentToolRecord::Error { message }],
                ..ChatStateUpdate::default()
            }
        }
    }
}

fn parse_tool_calls(
    response: &ChatResponse,
    tools: &RequestToolRegistry,
    model_id: &str,
    call_number: u32,
) -> Result<Vec<ParsedToolCall>, String> {
    if response.tool_calls.is_empty() {
        let text = response.content.trim();
        if text.is_empty() {
            return Err("the reply contained neither text nor tool calls".to_string());
        }
        let mut kwargs = Map::new();
        kwargs.insert("response".to_string(), Value::String(text.to_string()));
        return Ok(vec![ParsedToolCall {
            id: format!("call_{call_number}_0"),
            name: GIVE_FINAL_RESPONSE.to_string(),
            kwargs,
            model_id: model_id.to_string(),
        }]);
    }

    response
        .tool_calls
        .iter()
        .enumerate()
        .map(|(i, call)| {
            if !tools.contains(&call.name) {
                return Err(format!("unknown tool '{}'", call.name));
            }
            Ok(ParsedToolCall {
                id: if call.id.is_empty() {
                    format!("call_{call_number}_{i}")
                } else {
                    call.id.clone()
                },
                name: call.name.clone(),
                kwargs: parse_arguments(call)?,
                model_id: model_id.to_string(),
            })
        })
        .collect()
}

fn parse_arguments(call: &ToolCall) -> Result<Map<String, Value>, String> {
    if call.arguments.len() > MAX_TOOL_ARGS_LEN {
        return Err(format!(
            "arguments of '{}' too large ({} bytes, max {MAX_TOOL_ARGS_LEN})",
            call.name,
            call.arguments.len()
        ));
    }
    if call.arguments.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(format!("arguments of '{}' are not a JSON object", call.name)),
        Err(e) => Err(format!("arguments of '{}' are not valid JSON: {e}", call.name)),
    }
}

fn append_record(messages: &mut Vec<ChatMessage>, record: &AgentToolRecord) {
    match record {
        AgentToolRecord::Agent {
            content,
            tool_calls,
        } => {
            let calls = tool_calls
                .iter()
                .map(|c| ToolCall {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    arguments: Value::Object(c.kwargs.clone()).to_string(),
                })
                .collect();
            messages.push(assistant_tool_calls_message(content, calls));
        }
        AgentToolRecord::Tools {
            raw_tool_call_results,
        } => {
            for result in raw_tool_call_results {
                messages.push(tool_message(&result.tool_call_id, &tool_content(&result.output)));
            }
        }
        AgentToolRecord::Error { message } => {
            messages.push(user_message(&format!(
                "Your previous reply could not be used ({message}). Answer by calling one of the available tools."
            )));
        }
    }
}

fn tool_content(output: &ToolOutput) -> String {
    if !output.is_ok() {
        return format!("error: {}", output.error.as_deref().unwrap_or("tool failed"));
    }
    match &output.result {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
