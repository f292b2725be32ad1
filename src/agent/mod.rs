//! Conversational RAG chatbot agent.
//!
//! A chat request runs through a compiled state graph that rewrites the
//! query, detects the intention, then loops between a tool-calling planner
//! and tool execution until a ONCE tool produces the answer.
//!
//! # Architecture
//!
//! ```text
//! RunRequest → ChatbotApp::run
//!   ├── query_preprocess       (query rewrite service)
//!   ├── intention_detection    (intention service)
//!   │     ├── similar query found → matched_query_return
//!   │     └── intention detected  → agent
//!   ├── agent ⇄ tools_execution (planner / retrieval, generation, remote tools)
//!   └── final_results_preparation → {answer, ..extra_response}
//! ```
//!
//! Collaborator services are reached through [`ServiceInvoker`]; the
//! planner through the [`Agent`] trait, backed by an [`LlmProvider`].

pub mod chatbot;
pub mod client;
pub mod config;
pub mod executor;
#[cfg(feature = "http")]
pub mod http;
pub mod invoke;
pub mod llm_service;
pub mod message;
pub mod nodes;
pub mod planner;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod router;
pub mod runner;
pub mod services;
pub mod state;
pub mod tool;
pub mod trace;
pub mod traits;
pub mod workflow;

// Re-export key types
pub use chatbot::ChatbotConfig;
pub use config::AppConfig;
pub use executor::ToolExecutor;
pub use invoke::{OfflineInvoker, RetryingInvoker, ServiceInvoker, ServiceName};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use planner::LlmToolCallPlanner;
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use registry::{RequestToolRegistry, ToolRegistry};
pub use router::{AgentRoute, IntentRoute};
pub use runner::{ChatbotApp, RunContext, RunRequest, RunResponse};
pub use state::{ChatState, ChatStateUpdate, IntentType};
pub use tool::{ToolCall, ToolDefinition, ToolDescriptor, ToolRunningMode};
pub use trace::{StreamEvent, StreamSink, TraceEmitter};
pub use traits::Agent;
pub use workflow::{ChatGraph, build_chat_graph};
