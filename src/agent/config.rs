//! Process configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use super::state::DEFAULT_REPEATED_CALL_LIMIT;
use crate::error::AgentError;
use crate::graph::DEFAULT_RECURSION_LIMIT;

/// Default planner model.
const DEFAULT_PLANNER_MODEL: &str = "gpt-4o-mini";
/// Default generation model for the LLM-backed generation service.
const DEFAULT_GENERATION_MODEL: &str = "gpt-4o-mini";
/// Default planner max tokens.
const DEFAULT_PLANNER_MAX_TOKENS: u32 = 1024;
/// Default generation max tokens.
const DEFAULT_GENERATION_MAX_TOKENS: u32 = 4096;
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Default max retries. Every invocation is a single attempt unless the
/// operator opts in.
const DEFAULT_MAX_RETRIES: u32 = 0;

/// Configuration for the chatbot process.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model used by the tool-calling planner.
    pub planner_model: String,
    /// Model used for rewrite and generation when no service gateway is set.
    pub generation_model: String,
    /// Maximum tokens for planner responses.
    pub planner_max_tokens: u32,
    /// Maximum tokens for generated answers.
    pub generation_max_tokens: u32,
    /// Base URL of the collaborator service gateway.
    ///
    /// When unset, rewrite and generation run against the LLM provider and
    /// intention detection, retrieval and remote tools use the offline
    /// stand-in.
    pub services_url: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Extra attempts for failed idempotent service calls.
    pub max_retries: u32,
    /// Planning cycles allowed per run.
    pub repeated_call_limit: u32,
    /// Graph steps allowed per run.
    pub recursion_limit: usize,
    /// Directory containing prompt template files.
    ///
    /// Missing files fall back to compiled-in defaults.
    pub prompt_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Creates a new builder for `AppConfig`.
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AppConfig`].
#[derive(Debug, Clone, Default)]
pub struct AppConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    planner_model: Option<String>,
    generation_model: Option<String>,
    planner_max_tokens: Option<u32>,
    generation_max_tokens: Option<u32>,
    services_url: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    repeated_call_limit: Option<u32>,
    recursion_limit: Option<usize>,
    prompt_dir: Option<PathBuf>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl AppConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("AGENT_FLOW_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("AGENT_FLOW_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("AGENT_FLOW_BASE_URL"))
                .ok();
        }
        if self.planner_model.is_none() {
            self.planner_model = std::env::var("AGENT_FLOW_PLANNER_MODEL").ok();
        }
        if self.generation_model.is_none() {
            self.generation_model = std::env::var("AGENT_FLOW_GENERATION_MODEL").ok();
        }
        if self.planner_max_tokens.is_none() {
            self.planner_max_tokens = env_parse("AGENT_FLOW_PLANNER_MAX_TOKENS");
        }
        if self.generation_max_tokens.is_none() {
            self.generation_max_tokens = env_parse("AGENT_FLOW_GENERATION_MAX_TOKENS");
        }
        if self.services_url.is_none() {
            self.services_url = std::env::var("AGENT_FLOW_SERVICES_URL").ok();
        }
        if self.timeout.is_none() {
            self.timeout = env_parse("AGENT_FLOW_TIMEOUT_SECS").map(Duration::from_secs);
        }
        if self.max_retries.is_none() {
            self.max_retries = env_parse("AGENT_FLOW_MAX_RETRIES");
        }
        if self.repeated_call_limit.is_none() {
            self.repeated_call_limit = env_parse("AGENT_FLOW_REPEATED_CALL_LIMIT");
        }
        if self.recursion_limit.is_none() {
            self.recursion_limit = env_parse("AGENT_FLOW_RECURSION_LIMIT");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("AGENT_FLOW_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the planner model.
    #[must_use]
    pub fn planner_model(mut self, model: impl Into<String>) -> Self {
        self.planner_model = Some(model.into());
        self
    }

    /// Sets the generation model.
    #[must_use]
    pub fn generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = Some(model.into());
        self
    }

    /// Sets the planner max tokens.
    #[must_use]
    pub const fn planner_max_tokens(mut self, n: u32) -> Self {
        self.planner_max_tokens = Some(n);
        self
    }

    /// Sets the generation max tokens.
    #[must_use]
    pub const fn generation_max_tokens(mut self, n: u32) -> Self {
        self.generation_max_tokens = Some(n);
        self
    }

    /// Sets the collaborator service gateway URL.
    #[must_use]
    pub fn services_url(mut self, url: impl Into<String>) -> Self {
        self.services_url = Some(url.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the planning cycle limit.
    #[must_use]
    pub const fn repeated_call_limit(mut self, n: u32) -> Self {
        self.repeated_call_limit = Some(n);
        self
    }

    /// Sets the graph step limit.
    #[must_use]
    pub const fn recursion_limit(mut self, n: usize) -> Self {
        self.recursion_limit = Some(n);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Builds the [`AppConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<AppConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        Ok(AppConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            planner_model: self
                .planner_model
                .unwrap_or_else(|| DEFAULT_PLANNER_MODEL.to_string()),
            generation_model: self
                .generation_model
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            planner_max_tokens: self
                .planner_max_tokens
                .unwrap_or(DEFAULT_PLANNER_MAX_TOKENS),
            generation_max_tokens: self
                .generation_max_tokens
                .unwrap_or(DEFAULT_GENERATION_MAX_TOKENS),
            services_url: self.services_url,
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            repeated_call_limit: self
                .repeated_call_limit
                .unwrap_or(DEFAULT_REPEATED_CALL_LIMIT),
            recursion_limit: self.recursion_limit.unwrap_or(DEFAULT_RECURSION_LIMIT),
            prompt_dir: self.prompt_dir,
        })
    }
}
