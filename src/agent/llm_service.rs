//! LLM-backed query rewrite and generation services.
//!
//! [`LlmServiceInvoker`] answers [`ServiceName::QueryRewrite`] and
//! [`ServiceName::Generation`] with an [`LlmProvider`] and forwards every
//! other service to a fallback invoker. Used when no service gateway is
//! configured.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::chatbot::ChatbotConfig;
use super::invoke::{ServiceInvoker, ServiceName};
use super::message::{ChatMessage, ChatRequest, system_message, user_message};
use super::prompt::{PromptSet, PromptType, render_conv_summary, render_rag_prompt};
use super::provider::{LlmProvider, collect_stream};
use super::services::GenerationRequest;
use crate::error::AgentError;

/// Parts of the chat state the rewrite needs.
#[derive(Debug, Deserialize)]
struct RewriteInput {
    query: String,
    #[serde(default)]
    chat_history: Vec<ChatMessage>,
    #[serde(default)]
    chatbot_config: ChatbotConfig,
}

/// Serves rewrite and generation from an LLM provider.
pub struct LlmServiceInvoker {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    prompts: Arc<PromptSet>,
    fallback: Arc<dyn ServiceInvoker>,
}

impl LlmServiceInvoker {
    /// Creates the invoker.
    ///
    /// `model` is used for every call; the chatbot's own `llm.model_id` names
    /// a model of the remote generation service and is not sent to this
    /// provider.
    #[must_use]
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        max_tokens: u32,
        prompts: Arc<PromptSet>,
        fallback: Arc<dyn ServiceInvoker>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
            prompts,
            fallback,
        }
    }

    async fn rewrite(&self, request: Value) -> Result<Value, AgentError> {
        let input: RewriteInput = serde_json::from_value(request)
            .map_err(|e| AgentError::service(ServiceName::QueryRewrite, e))?;
        if input.chat_history.is_empty() {
            return Ok(Value::String(input.query));
        }

        let template = self
            .prompts
            .resolve(&input.chatbot_config, PromptType::ConvSummary);
        let prompt = render_conv_summary(template, &input.chat_history, &input.query);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![user_message(&prompt)],
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            stream: false,
            tools: Vec::new(),
        };
        let response = self
            .provider
            .chat(&request)
            .await
            .map_err(|e| AgentError::service(ServiceName::QueryRewrite, e))?;

        let rewritten = response.content.trim();
        debug!(original = %input.query, rewritten, "query rewritten");
        if rewritten.is_empty() {
            Ok(Value::String(input.query))
        } else {
            Ok(Value::String(rewritten.to_string()))
        }
    }

    async fn generate(&self, request: Value) -> Result<Value, AgentError> {
        let GenerationRequest {
            llm_config,
            llm_input,
        } = serde_json::from_value(request)
            .map_err(|e| AgentError::service(ServiceName::Generation, e))?;

        let system_prompt = match &llm_input.contexts {
            Some(contexts) if llm_config.system_prompt.contains("{context}") => {
                render_rag_prompt(&llm_config.system_prompt, contexts)
            }
            Some(contexts) if !contexts.is_empty() => format!(
                "{}\n\n{}",
                llm_config.system_prompt,
                render_rag_prompt("<docs>\n{context}\n</docs>", contexts)
            ),
            _ => llm_config.system_prompt.clone(),
        };

        let mut messages = Vec::with_capacity(llm_input.chat_history.len() + 2);
        messages.push(system_message(&system_prompt));
        messages.extend(llm_input.chat_history);
        messages.push(user_message(&llm_input.query));

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: llm_config.llm.temperature(),
            max_tokens: Some(llm_config.llm.max_tokens().unwrap_or(self.max_tokens)),
            stream: llm_config.stream,
            tools: Vec::new(),
        };

        let text = if llm_config.stream {
            let stream = self.provider.chat_stream(&request).await;
            match stream {
                Ok(stream) => collect_stream(stream).await,
                Err(e) => Err(e),
            }
        } else {
            self.provider.chat(&request).await.map(|r| r.content)
        }
        .map_err(|e| AgentError::service(ServiceName::Generation, e))?;

        Ok(Value::String(text))
    }
}

impl std::fmt::Debug for LlmServiceInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmServiceInvoker")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ServiceInvoker for LlmServiceInvoker {
    async fn invoke(&self, service: ServiceName, request: Value) -> Result<Value, AgentError> {
        match service {
            ServiceName::QueryRewrite => self.rewrite(request).await,
            ServiceName::Generation => self.generate(request).await,
            ServiceName::IntentionDetection | ServiceName::Retrieval | ServiceName::ToolExecution => {
                self.fallback.invoke(service, request).await
            }
        }
    }
}
