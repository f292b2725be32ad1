//! Pluggable LLM provider trait.
//!
//! The planner and the LLM-backed rewrite/generation services talk to a
//! model only through [`LlmProvider`], so tests substitute scripted
//! providers and deployments pick any OpenAI-compatible endpoint.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use super::message::{ChatRequest, ChatResponse};
use crate::error::AgentError;

/// Stream of generated text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>;

/// Trait for LLM provider backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on API failures, timeouts, or parse errors.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;

    /// Executes a streaming chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] on connection or streaming failures.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<TextStream, AgentError>;
}

/// Drains a [`TextStream`] into one string.
///
/// # Errors
///
/// Returns the first chunk error.
pub async fn collect_stream(mut stream: TextStream) -> Result<String, AgentError> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk?);
    }
    Ok(text)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_stream_concatenates() {
        let chunks: Vec<Result<String, AgentError>> =
            vec![Ok("Hel".to_string()), Ok("lo".to_string())];
        let stream: TextStream = Box::pin(futures_util::stream::iter(chunks));
        let text = collect_stream(stream).await.unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(text, "Hello");
    }

    #[tokio::test]
    async fn test_collect_stream_propagates_error() {
        let chunks: Vec<Result<String, AgentError>> = vec![
            Ok("partial".to_string()),
            Err(AgentError::Stream {
                message: "reset".to_string(),
            }),
        ];
        let stream: TextStream = Box::pin(futures_util::stream::iter(chunks));
        assert!(collect_stream(stream).await.is_err());
    }
}
