//! Error types for agent-flow.
//!
//! [`AgentError`] covers the orchestration library (graph runtime, tool
//! registry, collaborator invocations, LLM providers). [`CommandError`]
//! covers the CLI layer. [`Error`] unifies both for the binary.

use thiserror::Error;

use crate::agent::invoke::ServiceName;

/// Result alias used by the CLI layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Orchestration failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors raised while compiling a state graph.
///
/// Returned by `StateGraph::compile` when the declared topology cannot be
/// executed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompilationError {
    /// An edge references a node id that was never added.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// The graph has no entry point.
    #[error("graph has no entry point")]
    MissingEntry,

    /// A node was given two outgoing edges.
    #[error("node '{0}' already has an outgoing edge")]
    DuplicateEdge(String),

    /// A node has no outgoing edge and would strand the run.
    #[error("node '{0}' has no outgoing edge")]
    NoOutgoingEdge(String),
}

/// Errors produced by the orchestration library.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A tool name is absent from the registry.
    #[error("tool not found: {name}")]
    ToolNotFound {
        /// Requested tool name.
        name: String,
    },

    /// An external collaborator call failed.
    #[error("service '{service}' invocation failed: {message}")]
    ServiceInvocation {
        /// Service that was invoked.
        service: ServiceName,
        /// Failure cause.
        message: String,
    },

    /// The agent loop used its whole call budget without reaching a
    /// terminal condition.
    #[error("agent repeated call limit exceeded ({current}/{limit}) without a final answer")]
    RepeatedCallLimitExceeded {
        /// Configured limit.
        limit: u32,
        /// Agent call number at the time of the check.
        current: u32,
    },

    /// A node update broke a chat state invariant.
    #[error("state invariant violated on '{field}': {message}")]
    StateViolation {
        /// Offending state field.
        field: &'static str,
        /// Description.
        message: String,
    },

    /// The graph ran more steps than allowed.
    #[error("graph recursion limit of {limit} steps reached")]
    RecursionLimit {
        /// Step limit.
        limit: usize,
    },

    /// The graph topology is invalid.
    #[error("graph compilation failed: {0}")]
    Compilation(#[from] CompilationError),

    /// The run request is malformed.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description.
        message: String,
    },

    /// No API key was configured for the LLM provider.
    #[error("API key missing: set OPENAI_API_KEY or AGENT_FLOW_API_KEY")]
    ApiKeyMissing,

    /// The LLM provider rejected or failed a request.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Failure description.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// A model response could not be parsed.
    #[error("failed to parse response: {message}")]
    ResponseParse {
        /// Parse failure description.
        message: String,
        /// Raw content that failed to parse.
        content: String,
    },

    /// A streaming response failed mid-flight.
    #[error("stream error: {message}")]
    Stream {
        /// Failure description.
        message: String,
    },

    /// The configured provider name is unknown.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name.
        name: String,
    },

    /// A tool failed while executing.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Failure description.
        message: String,
    },
}

impl AgentError {
    /// Builds a [`AgentError::ServiceInvocation`] from any displayable cause.
    pub fn service(service: ServiceName, cause: impl std::fmt::Display) -> Self {
        Self::ServiceInvocation {
            service,
            message: cause.to_string(),
        }
    }
}

/// Errors produced by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A command-line argument is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The command failed while running.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Output could not be rendered.
    #[error("output formatting failed: {0}")]
    OutputFormat(String),

    /// Filesystem or stdio failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
