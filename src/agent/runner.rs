//! Run entry point.
//!
//! [`ChatbotApp`] is the long-lived application context: it builds the
//! chat graph once and shares it, with the base tool registry and the
//! collaborators, across every run. Each [`ChatbotApp::run`] seeds a fresh
//! [`ChatState`], registers the request's retrievers and tools in a per-run
//! overlay, invokes the graph and flattens `{answer, ..extra_response}`.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::chatbot::ChatbotConfig;
use super::client::create_provider;
use super::config::AppConfig;
use super::executor::ToolExecutor;
use super::invoke::{OfflineInvoker, RetryingInvoker, ServiceInvoker};
use super::llm_service::LlmServiceInvoker;
use super::message::ChatMessage;
use super::planner::LlmToolCallPlanner;
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::registry::{RequestToolRegistry, ToolRegistry};
use super::state::{ChatState, DEFAULT_REPEATED_CALL_LIMIT};
use super::tool::ToolRunningMode;
use super::trace::{StreamSink, TraceEmitter};
use super::traits::Agent;
use super::workflow::{ChatGraph, build_chat_graph};
use crate::error::AgentError;
use crate::graph::DEFAULT_RECURSION_LIMIT;

/// Maximum query length in bytes.
const MAX_QUERY_LEN: usize = 10_000;

/// Collaborators and run-scoped registries handed to every node.
pub struct RunContext {
    /// Base registry plus this run's retriever and config tools.
    pub tools: RequestToolRegistry,
    /// External invocation adapter.
    pub invoker: Arc<dyn ServiceInvoker>,
    /// Planning collaborator.
    pub planner: Arc<dyn Agent>,
    /// Tool execution collaborator.
    pub executor: ToolExecutor,
    /// Trace emitter for this run.
    pub trace: TraceEmitter,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("tools", &self.tools.list_names())
            .field("planner", &self.planner.name())
            .finish_non_exhaustive()
    }
}

const fn default_true() -> bool {
    true
}

/// One chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Request-scoped chatbot configuration.
    pub chatbot_config: ChatbotConfig,
    /// User text.
    pub query: String,
    /// Client message id.
    pub custom_message_id: String,
    /// Client connection for streamed output.
    #[serde(default)]
    pub ws_connection_id: Option<String>,
    /// Whether `chat_history` is passed to the run.
    #[serde(default = "default_true")]
    pub use_history: bool,
    /// Prior conversation turns.
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    /// Whether the client wants streamed output.
    #[serde(default = "default_true")]
    pub stream: bool,
    /// Whether trace lines are streamed.
    #[serde(default = "default_true")]
    pub enable_trace: bool,
}

impl RunRequest {
    /// Request with defaults for everything but the query and config.
    #[must_use]
    pub fn new(query: impl Into<String>, chatbot_config: ChatbotConfig) -> Self {
        Self {
            chatbot_config,
            query: query.into(),
            custom_message_id: String::new(),
            ws_connection_id: None,
            use_history: true,
            chat_history: Vec::new(),
            stream: true,
            enable_trace: true,
        }
    }

    fn validate(&self) -> Result<(), AgentError> {
        if self.query.trim().is_empty() {
            return Err(AgentError::InvalidRequest {
                message: "query cannot be empty".to_string(),
            });
        }
        if self.query.len() > MAX_QUERY_LEN {
            return Err(AgentError::InvalidRequest {
                message: format!(
                    "query exceeds maximum length ({} bytes, max {MAX_QUERY_LEN})",
                    self.query.len()
                ),
            });
        }
        Ok(())
    }
}

/// Answer plus the flattened `extra_response` keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    /// Final answer.
    pub answer: Value,
    /// Auxiliary outputs such as `figures`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Application context shared by all runs.
pub struct ChatbotApp {
    graph: Arc<ChatGraph>,
    tools: Arc<ToolRegistry>,
    invoker: Arc<dyn ServiceInvoker>,
    planner: Arc<dyn Agent>,
    prompts: Arc<PromptSet>,
    repeated_call_limit: u32,
    recursion_limit: usize,
}

impl ChatbotApp {
    /// Builds the graph and wires the collaborators. Built-in tools are
    /// registered in the base registry.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Compilation`] if the graph does not compile.
    pub fn new(
        invoker: Arc<dyn ServiceInvoker>,
        planner: Arc<dyn Agent>,
        prompts: Arc<PromptSet>,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            graph: Arc::new(build_chat_graph(DEFAULT_RECURSION_LIMIT)?),
            tools: Arc::new(ToolRegistry::with_builtins()),
            invoker,
            planner,
            prompts,
            repeated_call_limit: DEFAULT_REPEATED_CALL_LIMIT,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        })
    }

    /// Builds the application from process configuration.
    ///
    /// With `services_url` set, every collaborator is reached over HTTP.
    /// Otherwise rewrite and generation use the LLM provider and the other
    /// services use the offline stand-in.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] if the provider or HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, AgentError> {
        let provider = create_provider(config)?;
        let prompts = Arc::new(PromptSet::load(config.prompt_dir.as_deref()));
        let invoker = service_invoker(config, Arc::clone(&provider), Arc::clone(&prompts))?;
        let planner: Arc<dyn Agent> = Arc::new(LlmToolCallPlanner::new(
            provider,
            config.planner_model.clone(),
            config.planner_max_tokens,
            Arc::clone(&prompts),
        ));

        Ok(Self::new(invoker, planner, prompts)?
            .with_limits(config.repeated_call_limit, config.recursion_limit))
    }

    /// Replaces the base tool registry.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    /// Sets the planning-cycle limit and the graph step limit.
    #[must_use]
    pub const fn with_limits(mut self, repeated_call_limit: u32, recursion_limit: usize) -> Self {
        self.repeated_call_limit = repeated_call_limit;
        self.recursion_limit = recursion_limit;
        self
    }

    /// The compiled chat graph.
    #[must_use]
    pub fn graph(&self) -> &ChatGraph {
        &self.graph
    }

    /// The base tool registry.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Steps a run may take: never fewer than the planning loop needs to
    /// reach the call-limit check.
    #[must_use]
    pub fn step_limit(&self) -> usize {
        let loop_steps = 2 * self.repeated_call_limit as usize + 4;
        self.recursion_limit.max(loop_steps)
    }

    /// Runs one request without a streaming side channel.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on invalid input, collaborator failures, an
    /// exhausted call budget or an exhausted step budget.
    pub async fn run(&self, request: RunRequest) -> Result<RunResponse, AgentError> {
        self.run_with_trace(request, TraceEmitter::new()).await
    }

    /// Runs one request, streaming trace lines and the answer to `sink`.
    ///
    /// # Errors
    ///
    /// See [`ChatbotApp::run`].
    pub async fn run_with_sink(
        &self,
        request: RunRequest,
        sink: StreamSink,
    ) -> Result<RunResponse, AgentError> {
        self.run_with_trace(request, TraceEmitter::with_sink(sink))
            .await
    }

    async fn run_with_trace(
        &self,
        request: RunRequest,
        trace: TraceEmitter,
    ) -> Result<RunResponse, AgentError> {
        request.validate()?;
        let started = Instant::now();
        let message_id = request.custom_message_id.clone();

        let ctx = RunContext {
            tools: self.request_tools(&request.chatbot_config),
            invoker: Arc::clone(&self.invoker),
            planner: Arc::clone(&self.planner),
            executor: ToolExecutor::new(Arc::clone(&self.invoker), Arc::clone(&self.prompts)),
            trace,
        };
        let state = self.seed_state(request);
        info!(
            %message_id,
            tools = ctx.tools.list_names().len(),
            step_limit = self.step_limit(),
            "run started"
        );

        let result = self
            .graph
            .invoke_with_limit(state, &ctx, self.step_limit())
            .await;
        let state = match result {
            Ok(state) => state,
            Err(e) => {
                warn!(%message_id, error = %e, "run failed");
                return Err(e);
            }
        };

        let answer = state.answer.ok_or_else(|| AgentError::StateViolation {
            field: "answer",
            message: "run completed without an answer".to_string(),
        })?;
        let mut extra = state.extra_response;
        extra.remove("answer");

        info!(
            %message_id,
            calls = state.agent_current_call_number,
            traces = state.trace_infos.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "run finished"
        );
        Ok(RunResponse { answer, extra })
    }

    fn request_tools(&self, config: &ChatbotConfig) -> RequestToolRegistry {
        let mut tools = RequestToolRegistry::new(Arc::clone(&self.tools));
        for retriever in &config.knowledge_base_retrievers {
            tools.register_rag_tool(&retriever.name, &retriever.description);
        }
        for tool in &config.tools {
            if !tools.contains(&tool.name) {
                let description = tool
                    .extra
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                tools.register_remote_tool(&tool.name, description, ToolRunningMode::Repeatable);
            }
        }
        tools
    }

    fn seed_state(&self, request: RunRequest) -> ChatState {
        let mut state = ChatState::new(request.query, request.chatbot_config);
        state.stream = request.stream;
        state.enable_trace = request.enable_trace;
        state.message_id = request.custom_message_id;
        state.ws_connection_id = request.ws_connection_id;
        if request.use_history {
            state.chat_history = request.chat_history;
        }
        state.agent_repeated_call_limit = self.repeated_call_limit;
        state.agent_current_call_number = 0;
        state
    }
}

impl std::fmt::Debug for ChatbotApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatbotApp")
            .field("graph", &self.graph)
            .field("tools", &self.tools.list_names())
            .field("planner", &self.planner.name())
            .field("repeated_call_limit", &self.repeated_call_limit)
            .field("recursion_limit", &self.recursion_limit)
            .finish_non_exhaustive()
    }
}

fn service_invoker(
    config: &AppConfig,
    provider: Arc<dyn LlmProvider>,
    prompts: Arc<PromptSet>,
) -> Result<Arc<dyn ServiceInvoker>, AgentError> {
    if let Some(url) = config.services_url.as_deref() {
        #[cfg(feature = "http")]
        {
            let http = super::http::HttpServiceInvoker::new(url, config.timeout)?;
            return Ok(Arc::new(RetryingInvoker::new(http, config.max_retries)));
        }
        #[cfg(not(feature = "http"))]
        warn!(url, "built without the `http` feature, ignoring services_url");
    }

    let local = LlmServiceInvoker::new(
        provider,
        config.generation_model.clone(),
        config.generation_max_tokens,
        prompts,
        Arc::new(OfflineInvoker),
    );
    Ok(Arc::new(RetryingInvoker::new(local, config.max_retries)))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::agent::chatbot::{RetrieverConfig, ToolRef};
    use crate::agent::state::ChatStateUpdate;
    use crate::agent::tool::{RAG_TOOL, ToolKind};

    struct NeverPlans;

    #[async_trait::async_trait]
    impl Agent for NeverPlans {
        fn name(&self) -> &'static str {
            "never"
        }

        fn model(&self) -> &str {
            "none"
        }

        async fn plan(
            &self,
            _state: &ChatState,
            _tools: &RequestToolRegistry,
        ) -> Result<ChatStateUpdate, AgentError> {
            panic!("planner must not be called");
        }
    }

    fn app() -> ChatbotApp {
        ChatbotApp::new(
            Arc::new(OfflineInvoker),
            Arc::new(NeverPlans),
            Arc::new(PromptSet::defaults()),
        )
        .unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn test_request_defaults() {
        let request: RunRequest = serde_json::from_value(json!({
            "chatbot_config": {},
            "query": "hi",
            "custom_message_id": "m-1"
        }))
        .unwrap_or_else(|e| panic!("{e}"));
        assert!(request.use_history);
        assert!(request.stream);
        assert!(request.enable_trace);
        assert!(request.ws_connection_id.is_none());
        assert!(request.chat_history.is_empty());
    }

    #[test]
    fn test_seed_state_drops_history_when_not_used() {
        let mut request = RunRequest::new("q", ChatbotConfig::default());
        request.chat_history = vec![crate::agent::message::user_message("earlier")];
        request.use_history = false;
        let state = app().seed_state(request);
        assert!(state.chat_history.is_empty());
        assert_eq!(state.agent_repeated_call_limit, 5);
        assert_eq!(state.agent_current_call_number, 0);
        assert!(state.trace_infos.is_empty());
        assert!(state.extra_response.is_empty());
    }

    #[test]
    fn test_request_tools_overlay() {
        let mut config = ChatbotConfig::default();
        config.knowledge_base_retrievers.push(RetrieverConfig {
            name: "faq".to_string(),
            description: "Frequently asked questions".to_string(),
            extra: Map::new(),
        });
        config.tools.push(ToolRef {
            name: "order_status".to_string(),
            extra: Map::new(),
        });
        config.tools.push(ToolRef {
            name: RAG_TOOL.to_string(),
            extra: Map::new(),
        });

        let app = app();
        let tools = app.request_tools(&config);
        let faq = tools.lookup("faq").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(faq.mode, ToolRunningMode::Once);
        assert_eq!(
            faq.kind,
            ToolKind::Rag {
                retriever: Some("faq".to_string())
            }
        );
        let order = tools.lookup("order_status").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(order.mode, ToolRunningMode::Repeatable);
        assert_eq!(
            tools.lookup(RAG_TOOL).map(|t| t.kind.clone()).ok(),
            Some(ToolKind::Rag { retriever: None })
        );
        assert!(!app.tools().contains("faq"));
    }

    #[test]
    fn test_step_limit_covers_call_limit() {
        assert_eq!(app().step_limit(), DEFAULT_RECURSION_LIMIT);
        assert_eq!(app().with_limits(20, 10).step_limit(), 44);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let result = app().run(RunRequest::new("   ", ChatbotConfig::default())).await;
        assert!(matches!(result, Err(AgentError::InvalidRequest { .. })));
    }

    #[test]
    fn test_response_flattens_extra() {
        let mut extra = Map::new();
        extra.insert("figures".to_string(), json!([]));
        let response = RunResponse {
            answer: json!("hi"),
            extra,
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap_or_default(),
            json!({"answer": "hi", "figures": []})
        );
    }
}
