//! The six nodes of the chat graph.
//!
//! Each node reads the state, may call a collaborator through the
//! [`RunContext`] and returns a [`ChatStateUpdate`]; the graph runtime
//! merges it.

use async_trait::async_trait;
use serde_json::Map;

use super::runner::RunContext;
use super::services::{detect_intention, rewrite_query};
use super::state::{
    AgentToolRecord, ChatState, ChatStateUpdate, IntentType, ParsedToolCall, RawToolCallResult,
    deep_merge,
};
use super::tool::{GIVE_FINAL_RESPONSE, RAG_TOOL, ToolRunningMode};
use crate::error::AgentError;
use crate::graph::Node;

/// Node id of [`QueryPreprocess`].
pub const QUERY_PREPROCESS: &str = "query_preprocess";
/// Node id of [`IntentionDetection`].
pub const INTENTION_DETECTION: &str = "intention_detection";
/// Node id of [`MatchedQueryReturn`].
pub const MATCHED_QUERY_RETURN: &str = "matched_query_return";
/// Node id of [`AgentNode`].
pub const AGENT: &str = "agent";
/// Node id of [`ToolsExecution`].
pub const TOOLS_EXECUTION: &str = "tools_execution";
/// Node id of [`FinalResultsPreparation`].
pub const FINAL_RESULTS_PREPARATION: &str = "final_results_preparation";

/// Rewrites the query into a standalone question.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryPreprocess;

#[async_trait]
impl Node<ChatState, RunContext> for QueryPreprocess {
    fn id(&self) -> &'static str {
        QUERY_PREPROCESS
    }

    async fn run(&self, state: &ChatState, ctx: &RunContext) -> Result<ChatStateUpdate, AgentError> {
        let rewrite = rewrite_query(ctx.invoker.as_ref(), state).await?;
        let line = ctx.trace.emit(state, format!("**query_rewrite:**\n{rewrite}"));
        Ok(ChatStateUpdate {
            query_rewrite: Some(rewrite),
            trace_infos: vec![line],
            ..ChatStateUpdate::default()
        })
    }
}

/// Fetches few-shot examples and decides the intent.
///
/// With `intention_config.similar_query_threshold` set, the first example
/// scoring at or above the threshold that carries a stored answer short-cuts
/// the run to that answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentionDetection;

#[async_trait]
impl Node<ChatState, RunContext> for IntentionDetection {
    fn id(&self) -> &'static str {
        INTENTION_DETECTION
    }

    async fn run(&self, state: &ChatState, ctx: &RunContext) -> Result<ChatStateUpdate, AgentError> {
        let examples = detect_intention(ctx.invoker.as_ref(), state).await?;

        let mut tools: Vec<String> = Vec::new();
        for example in &examples {
            if !tools.contains(&example.intent) {
                tools.push(example.intent.clone());
            }
        }

        let matched = state.chatbot_config.similar_query_threshold().and_then(|threshold| {
            examples
                .iter()
                .find(|e| e.answer.is_some() && e.score.is_some_and(|s| s >= threshold))
        });
        let (intent, answer) = match matched {
            Some(example) => (IntentType::SimilarQueryFound, example.answer.clone()),
            None => (IntentType::IntentionDetected, None),
        };

        let serialized = serde_json::to_string_pretty(&examples).unwrap_or_else(|_| "[]".to_string());
        let line = ctx.trace.emit(state, format!("**intention retrieved:**\n{serialized}"));

        Ok(ChatStateUpdate {
            intent_type: Some(intent),
            intent_fewshot_examples: Some(examples),
            intent_fewshot_tools: Some(tools),
            answer,
            trace_infos: vec![line],
            ..ChatStateUpdate::default()
        })
    }
}

/// Passes the matched answer through.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchedQueryReturn;

#[async_trait]
impl Node<ChatState, RunContext> for MatchedQueryReturn {
    fn id(&self) -> &'static str {
        MATCHED_QUERY_RETURN
    }

    async fn run(&self, state: &ChatState, _ctx: &RunContext) -> Result<ChatStateUpdate, AgentError> {
        Ok(ChatStateUpdate::answer(state.answer.clone()))
    }
}

/// Planning core of the agent loop.
///
/// Decision order:
/// 1. first cycle whose only result came from `give_final_response`:
///    force `rag_tool` (takes precedence over 2);
/// 2. last result came from a ONCE tool: its result is the answer, failed
///    or not;
/// 3. no few-shot examples: force `rag_tool`;
/// 4. otherwise ask the planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentNode;

impl AgentNode {
    fn once_answer(state: &ChatState, ctx: &RunContext) -> Result<Option<ChatStateUpdate>, AgentError> {
        if !(state.agent_repeated_call_validation
            && state.function_calling_parse_ok
            && !state.agent_tool_history.is_empty())
        {
            return Ok(None);
        }
        let Some(result) = state.last_tool_result() else {
            return Ok(None);
        };
        let tool = ctx.tools.lookup(&result.name)?;
        if tool.mode != ToolRunningMode::Once {
            return Ok(None);
        }

        let line = ctx.trace.emit(state, format!("**{}** answered the query", result.name));
        Ok(Some(ChatStateUpdate {
            answer: Some(result.output.result.clone()),
            function_calling_is_run_once: Some(true),
            trace_infos: vec![line],
            ..ChatStateUpdate::default()
        }))
    }

    fn forced_rag(state: &ChatState, ctx: &RunContext, reason: &str) -> ChatStateUpdate {
        let model_id = state
            .chatbot_config
            .agent_model_id()
            .unwrap_or_else(|| ctx.planner.model())
            .to_string();
        let call = ParsedToolCall {
            id: format!("call_{}_{RAG_TOOL}", state.agent_tool_history.len()),
            name: RAG_TOOL.to_string(),
            kwargs: Map::new(),
            model_id,
        };
        let line = ctx.trace.emit(state, format!("**agent:** {reason}, calling {RAG_TOOL}"));
        ChatStateUpdate {
            function_calling_parsed_tool_calls: Some(vec![call.clone()]),
            function_calling_parse_ok: Some(true),
            agent_repeated_call_validation: Some(true),
            agent_tool_history: vec![AgentToolRecord::Agent {
                content: String::new(),
                tool_calls: vec![call],
            }],
            trace_infos: vec![line],
            ..ChatStateUpdate::default()
        }
    }
}

#[async_trait]
impl Node<ChatState, RunContext> for AgentNode {
    fn id(&self) -> &'static str {
        AGENT
    }

    async fn run(&self, state: &ChatState, ctx: &RunContext) -> Result<ChatStateUpdate, AgentError> {
        let first_tool_final_response = state.agent_current_call_number == 1
            && state.function_calling_parse_ok
            && state
                .last_tool_result()
                .is_some_and(|r| r.name == GIVE_FINAL_RESPONSE);

        if !first_tool_final_response {
            if let Some(update) = Self::once_answer(state, ctx)? {
                return Ok(update);
            }
        }

        if state.intent_fewshot_examples.is_empty() {
            return Ok(Self::forced_rag(state, ctx, "no intention examples"));
        }
        if first_tool_final_response {
            return Ok(Self::forced_rag(state, ctx, "first reply was a final response"));
        }

        ctx.planner.plan(state, &ctx.tools).await
    }
}

/// Executes the calls the agent node planned.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolsExecution;

#[async_trait]
impl Node<ChatState, RunContext> for ToolsExecution {
    fn id(&self) -> &'static str {
        TOOLS_EXECUTION
    }

    async fn run(&self, state: &ChatState, ctx: &RunContext) -> Result<ChatStateUpdate, AgentError> {
        if !state.function_calling_parse_ok || state.function_calling_parsed_tool_calls.is_empty() {
            return Ok(ChatStateUpdate::default());
        }

        let mut update = ChatStateUpdate::default();
        let mut results = Vec::with_capacity(state.function_calling_parsed_tool_calls.len());
        for call in &state.function_calling_parsed_tool_calls {
            let tool = ctx.tools.lookup(&call.name)?;
            let run = ctx.executor.execute(state, call, tool, &ctx.trace).await;

            let status = if run.output.is_ok() { "ok" } else { "failed" };
            update.trace_infos.extend(run.trace_infos);
            update
                .trace_infos
                .push(ctx.trace.emit(state, format!("**{}** ({}): {status}", call.name, tool.mode)));
            deep_merge(&mut update.extra_response, run.extra_response);
            results.push(RawToolCallResult {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                kwargs: call.kwargs.clone(),
                output: run.output,
            });
        }

        update.agent_tool_history.push(AgentToolRecord::Tools {
            raw_tool_call_results: results,
        });
        Ok(update)
    }
}

/// Terminal pass-through of the answer; streams it to the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalResultsPreparation;

#[async_trait]
impl Node<ChatState, RunContext> for FinalResultsPreparation {
    fn id(&self) -> &'static str {
        FINAL_RESULTS_PREPARATION
    }

    async fn run(&self, state: &ChatState, ctx: &RunContext) -> Result<ChatStateUpdate, AgentError> {
        let answer = state.answer.clone().ok_or_else(|| AgentError::StateViolation {
            field: "answer",
            message: "run reached the final node without an answer".to_string(),
        })?;
        ctx.trace.emit_answer(state, &answer);
        Ok(ChatStateUpdate::answer(Some(answer)))
    }
}
