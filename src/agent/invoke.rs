//! External invocation adapter.
//!
//! Every out-of-process collaborator (query rewrite, intention detection,
//! retrieval, generation, tool execution) is reached through one contract:
//! [`ServiceInvoker::invoke`] takes a service name and a JSON request and
//! returns a JSON response or [`AgentError::ServiceInvocation`].
//!
//! Implementations:
//! - [`OfflineInvoker`]: local stand-in for rewrite, intention and
//!   retrieval; rejects generation and remote tools.
//! - [`RetryingInvoker`]: retries idempotent services only.
//! - `LlmServiceInvoker` (`llm_service`): serves rewrite and generation
//!   from an [`LlmProvider`](super::provider::LlmProvider).
//! - `HttpServiceInvoker` (`http`, feature `http`): POSTs to a service
//!   gateway.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::error::AgentError;

/// Default delay between retries of an idempotent call.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Collaborator services the orchestration core calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
    /// Rewrites the query into a standalone question.
    QueryRewrite,
    /// Retrieves intention few-shot examples.
    IntentionDetection,
    /// Knowledge-base retrieval.
    Retrieval,
    /// Text generation.
    Generation,
    /// Remote tool execution.
    ToolExecution,
}

impl ServiceName {
    /// Stable name used in logs, errors and URLs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueryRewrite => "query_rewrite",
            Self::IntentionDetection => "intention_detection",
            Self::Retrieval => "retrieval",
            Self::Generation => "generation",
            Self::ToolExecution => "tool_execution",
        }
    }

    /// Whether a failed call may be retried. Tool execution may have side
    /// effects and is never retried.
    #[must_use]
    pub const fn is_idempotent(self) -> bool {
        !matches!(self, Self::ToolExecution)
    }

    /// URL path segment for HTTP backends.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::QueryRewrite => "query-rewrite",
            Self::IntentionDetection => "intention-detection",
            Self::Retrieval => "retrieval",
            Self::Generation => "generation",
            Self::ToolExecution => "tool-execution",
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform call contract to the collaborator services.
///
/// Each call is a single attempt from the caller's point of view: it either
/// returns a structured response or fails.
#[async_trait]
pub trait ServiceInvoker: Send + Sync {
    /// Invokes `service` with `request`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ServiceInvocation`] on transport or service
    /// failure.
    async fn invoke(&self, service: ServiceName, request: Value) -> Result<Value, AgentError>;
}

#[async_trait]
impl<T: ServiceInvoker + ?Sized> ServiceInvoker for Arc<T> {
    async fn invoke(&self, service: ServiceName, request: Value) -> Result<Value, AgentError> {
        (**self).invoke(service, request).await
    }
}

/// Local stand-in for the collaborator services.
///
/// Rewrite returns the query unchanged, intention detection finds no
/// examples and retrieval finds no documents. Generation and remote tools
/// have no local equivalent and fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineInvoker;

#[async_trait]
impl ServiceInvoker for OfflineInvoker {
    async fn invoke(&self, service: ServiceName, request: Value) -> Result<Value, AgentError> {
        match service {
            ServiceName::QueryRewrite => Ok(request.get("query").cloned().unwrap_or(Value::Null)),
            ServiceName::IntentionDetection => Ok(json!([])),
            ServiceName::Retrieval => Ok(json!({"result": {"docs": []}})),
            ServiceName::Generation | ServiceName::ToolExecution => Err(AgentError::service(
                service,
                "no backend configured (set AGENT_FLOW_SERVICES_URL)",
            )),
        }
    }
}

/// Retries failed idempotent calls up to `max_retries` extra times.
#[derive(Debug, Clone)]
pub struct RetryingInvoker<I> {
    inner: I,
    max_retries: u32,
    backoff: Duration,
}

impl<I: ServiceInvoker> RetryingInvoker<I> {
    /// Wraps `inner`.
    #[must_use]
    pub const fn new(inner: I, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Sets the delay between attempts.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl<I: ServiceInvoker> ServiceInvoker for RetryingInvoker<I> {
    async fn invoke(&self, service: ServiceName, request: Value) -> Result<Value, AgentError> {
        let retries = if service.is_idempotent() {
            self.max_retries
        } else {
            0
        };

        let mut attempt = 0;
        loop {
            match self.inner.invoke(service, request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e @ AgentError::ServiceInvocation { .. }) if attempt < retries => {
                    attempt += 1;
                    warn!(%service, attempt, max_retries = retries, error = %e, "retrying service call");
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use test_case::test_case;

    use super::*;

    /// Fails the first `failures` calls, then echoes the request.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ServiceInvoker for Flaky {
        async fn invoke(&self, service: ServiceName, request: Value) -> Result<Value, AgentError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(AgentError::service(service, "unavailable"))
            } else {
                Ok(request)
            }
        }
    }

    #[test_case(ServiceName::QueryRewrite, true ; "rewrite")]
    #[test_case(ServiceName::IntentionDetection, true ; "intention")]
    #[test_case(ServiceName::Retrieval, true ; "retrieval")]
    #[test_case(ServiceName::Generation, true ; "generation")]
    #[test_case(ServiceName::ToolExecution, false ; "tool execution")]
    fn test_idempotency(service: ServiceName, expected: bool) {
        assert_eq!(service.is_idempotent(), expected);
    }

    #[tokio::test]
    async fn test_retry_recovers_idempotent_call() {
        let invoker = RetryingInvoker::new(Flaky::new(2), 2).with_backoff(Duration::ZERO);
        let response = invoker
            .invoke(ServiceName::Retrieval, json!({"q": 1}))
            .await
            .unwrap_or_else(|e| panic!("invoke failed: {e}"));
        assert_eq!(response, json!({"q": 1}));
        assert_eq!(invoker.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let invoker = RetryingInvoker::new(Flaky::new(5), 1).with_backoff(Duration::ZERO);
        let result = invoker.invoke(ServiceName::Generation, json!({})).await;
        assert!(matches!(
            result,
            Err(AgentError::ServiceInvocation {
                service: ServiceName::Generation,
                ..
            })
        ));
        assert_eq!(invoker.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_tool_execution_is_never_retried() {
        let invoker = RetryingInvoker::new(Flaky::new(1), 3).with_backoff(Duration::ZERO);
        let result = invoker.invoke(ServiceName::ToolExecution, json!({})).await;
        assert!(result.is_err());
        assert_eq!(invoker.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offline_invoker_contracts() {
        let offline = OfflineInvoker;
        let rewrite = offline
            .invoke(ServiceName::QueryRewrite, json!({"query": "hello"}))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(rewrite, json!("hello"));

        let docs = offline
            .invoke(ServiceName::Retrieval, json!({}))
            .await
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(docs["result"]["docs"], json!([]));

        assert!(offline.invoke(ServiceName::Generation, json!({})).await.is_err());
    }

    #[test]
    fn test_service_display() {
        assert_eq!(ServiceName::Retrieval.to_string(), "retrieval");
        assert_eq!(ServiceName::ToolExecution.path(), "tool-execution");
    }
}
