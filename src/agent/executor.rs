//! Tool executor that dispatches parsed tool calls by tool kind.
//!
//! RAG tools run retrieval then generation, the response tools echo their
//! argument, `chat` runs a plain generation and remote tools go to the
//! tool-execution service. Failures never abort the run: they come back as
//! a failed [`ToolOutput`] for the next planning cycle to see.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::invoke::ServiceInvoker;
use super::prompt::{PromptSet, PromptType};
use super::services::{
    GenerationConfig, GenerationInput, GenerationRequest, GenerationTask, RETRIEVAL_TYPE,
    RemoteToolRequest, RetrievalRequest, execute_remote_tool, generate, retrieve,
};
use super::state::{ChatState, ParsedToolCall, ToolOutput};
use super::tool::{ToolDescriptor, ToolKind};
use super::trace::TraceEmitter;
use crate::error::AgentError;

/// Key under which RAG figures are returned beside the answer.
pub const FIGURES_KEY: &str = "figures";

/// Result of executing one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRun {
    /// Tool output recorded in the tool history.
    pub output: ToolOutput,
    /// Keys to merge into `extra_response`.
    pub extra_response: Map<String, Value>,
    /// Trace lines produced while running.
    pub trace_infos: Vec<String>,
}

impl ToolRun {
    fn output(output: ToolOutput) -> Self {
        Self {
            output,
            extra_response: Map::new(),
            trace_infos: Vec::new(),
        }
    }
}

/// Executes tool calls against the collaborator services.
#[derive(Clone)]
pub struct ToolExecutor {
    invoker: Arc<dyn ServiceInvoker>,
    prompts: Arc<PromptSet>,
}

impl ToolExecutor {
    /// Creates a new executor.
    #[must_use]
    pub fn new(invoker: Arc<dyn ServiceInvoker>, prompts: Arc<PromptSet>) -> Self {
        Self { invoker, prompts }
    }

    /// Runs one call. Never fails: errors are captured in the output.
    pub async fn execute(
        &self,
        state: &ChatState,
        call: &ParsedToolCall,
        tool: &ToolDescriptor,
        trace: &TraceEmitter,
    ) -> ToolRun {
        let result = match &tool.kind {
            ToolKind::Rag { retriever } => self.run_rag(state, retriever.as_deref(), trace).await,
            ToolKind::FinalResponse => argument(call, "response").map(ToolRun::output),
            ToolKind::RhetoricalQuestion => argument(call, "question").map(ToolRun::output),
            ToolKind::Chat => self.run_chat(state).await.map(ToolRun::output),
            ToolKind::Remote => self.run_remote(state, call).await.map(ToolRun::output),
        };

        match result {
            Ok(run) => {
                debug!(tool = %call.name, call_id = %call.id, ok = run.output.is_ok(), "tool execution complete");
                run
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "tool execution failed");
                ToolRun::output(ToolOutput::failed(e.to_string()))
            }
        }
    }

    async fn run_rag(
        &self,
        state: &ChatState,
        retriever: Option<&str>,
        trace: &TraceEmitter,
    ) -> Result<ToolRun, AgentError> {
        let config = &state.chatbot_config;
        let retrievers = match retriever {
            None => config.knowledge_base_retrievers.clone(),
            Some(name) => config.retriever(name).cloned().into_iter().collect(),
        };

        let retrieved = retrieve(
            self.invoker.as_ref(),
            &RetrievalRequest {
                query: state.query.clone(),
                kind: RETRIEVAL_TYPE.to_string(),
                retrievers,
            },
        )
        .await?;

        let mut contexts = Vec::with_capacity(retrieved.result.docs.len());
        let mut figures: Vec<Value> = Vec::new();
        for doc in retrieved.result.docs {
            for figure in doc.figure {
                if !figures.contains(&figure) {
                    figures.push(figure);
                }
            }
            contexts.push(doc.page_content);
        }

        let trace_line = trace.emit(
            state,
            format!("**rag contexts** ({}):\n{}", contexts.len(), contexts.join("\n---\n")),
        );

        let answer = generate(
            self.invoker.as_ref(),
            &GenerationRequest {
                llm_config: GenerationConfig {
                    llm: config.llm.clone(),
                    stream: state.stream,
                    intent_type: GenerationTask::Rag,
                    system_prompt: self.prompts.resolve(config, PromptType::Rag).to_string(),
                },
                llm_input: GenerationInput {
                    contexts: Some(contexts),
                    query: state.query.clone(),
                    chat_history: state.chat_history.clone(),
                },
            },
        )
        .await?;

        let mut extra_response = Map::new();
        extra_response.insert(FIGURES_KEY.to_string(), Value::Array(figures));
        Ok(ToolRun {
            output: ToolOutput::ok(answer),
            extra_response,
            trace_infos: vec![trace_line],
        })
    }

    async fn run_chat(&self, state: &ChatState) -> Result<ToolOutput, AgentError> {
        let config = &state.chatbot_config;
        let answer = generate(
            self.invoker.as_ref(),
            &GenerationRequest {
                llm_config: GenerationConfig {
                    llm: config.llm.clone(),
                    stream: state.stream,
                    intent_type: GenerationTask::Chat,
                    system_prompt: self.prompts.resolve(config, PromptType::General).to_string(),
                },
                llm_input: GenerationInput {
                    contexts: None,
                    query: state.query.clone(),
                    chat_history: state.chat_history.clone(),
                },
            },
        )
        .await?;
        Ok(ToolOutput::ok(answer))
    }

    async fn run_remote(
        &self,
        state: &ChatState,
        call: &ParsedToolCall,
    ) -> Result<ToolOutput, AgentError> {
        execute_remote_tool(
            self.invoker.as_ref(),
            &RemoteToolRequest {
                tool_name: call.name.clone(),
                kwargs: call.kwargs.clone(),
                query: state.query.clone(),
                message_id: state.message_id.clone(),
            },
        )
        .await
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor").finish_non_exhaustive()
    }
}

/// Required string-ish argument of a response tool.
fn argument(call: &ParsedToolCall, key: &str) -> Result<ToolOutput, AgentError> {
    call.kwargs
        .get(key)
        .cloned()
        .map(ToolOutput::ok)
        .ok_or_else(|| AgentError::ToolExecution {
            name: call.name.clone(),
            message: format!("missing argument '{key}'"),
        })
}
