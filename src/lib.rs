//! agent-flow: conversational RAG chatbot agent orchestration.
//!
//! A chat request passes through a small state graph: the query is
//! rewritten against the conversation, an intention is detected, and a
//! tool-calling planner alternates with tool execution (retrieval plus
//! generation, canned answers, clarifying questions, remote tools) until a
//! terminal tool produces the answer.
//!
//! - [`graph`] is the generic state-graph engine.
//! - [`agent`] holds the chat state, nodes, routers, planner, tools and
//!   the long-lived [`agent::ChatbotApp`].
//! - [`cli`] is the `agent-flow` command-line front end.
//!
//! # Example
//!
//! ```no_run
//! use agent_flow::agent::{AppConfig, ChatbotApp, ChatbotConfig, RunRequest};
//!
//! # async fn demo() -> agent_flow::Result<()> {
//! let config = AppConfig::from_env()?;
//! let app = ChatbotApp::from_config(&config)?;
//! let request = RunRequest::new("What is the return policy?", ChatbotConfig::default());
//! let response = app.run(request).await?;
//! assert!(response.answer.is_string());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod error;
pub mod graph;
pub mod logging;

pub use error::{AgentError, CommandError, CompilationError, Error, Result};
