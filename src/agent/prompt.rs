//! System prompts and template rendering.
//!
//! Four prompt types exist: the planner prompt (`AGENT`), retrieval-grounded
//! generation (`RAG`), plain chat (`GENERAL`) and the conversation summary
//! used for query rewriting (`CONV_SUMMARY`). Each resolves in order:
//! request override in `chatbot_config.prompts`, file in the prompt
//! directory, compiled-in default.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::chatbot::ChatbotConfig;
use super::message::{ChatMessage, Role};
use super::state::IntentExample;

/// System prompt for the tool-calling planner.
pub const AGENT_SYSTEM_PROMPT: &str = r"You are a helpful assistant that answers by calling tools.

## Instructions

1. Read the user's question and the conversation so far.
2. Pick the single tool that moves the conversation forward and call it with valid arguments.
3. When a knowledge-base tool fits the question, prefer it over answering from memory.
4. When you can answer directly, call `give_final_response`.
5. When the question is ambiguous, call `give_rhetorical_question` to ask the user for the missing detail.
6. Never invent tool names or arguments that are not in the tool schema.

Tool results from earlier steps are shown in the conversation. If a tool failed, read the error and try a different tool or different arguments.";

/// System prompt for retrieval-grounded generation.
///
/// `{context}` is replaced by the retrieved passages.
pub const RAG_SYSTEM_PROMPT: &str = r"You are a customer service chatbot. Answer the user's question using only the documents below. If the documents do not contain the answer, say that you don't know.

Here are some documents for you to reference for your query.
<docs>
{context}
</docs>";

/// System prompt for direct chat.
pub const GENERAL_SYSTEM_PROMPT: &str = "You are a helpful customer service chatbot. Answer concisely and politely.";

/// Query rewrite prompt.
///
/// `{history}` is replaced by the formatted conversation and `{question}`
/// by the latest user message.
pub const CONV_SUMMARY_PROMPT: &str = r"Given the following conversation between `USER` and `AI`, and a follow up `USER` reply, put yourself in the shoes of `USER` and rephrase the follow up `USER` reply to be a standalone reply.

Chat History:
{history}

The USER's follow up reply: {question}";

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/agent-flow/prompts";

/// Filename for the planner prompt template.
const AGENT_FILENAME: &str = "agent.md";
/// Filename for the RAG prompt template.
const RAG_FILENAME: &str = "rag.md";
/// Filename for the general chat prompt template.
const GENERAL_FILENAME: &str = "general.md";
/// Filename for the conversation summary template.
const CONV_SUMMARY_FILENAME: &str = "conv_summary.md";

/// Prompt kinds a chatbot configuration can override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptType {
    /// Planner system prompt.
    Agent,
    /// Retrieval-grounded generation.
    Rag,
    /// Direct chat.
    General,
    /// Conversation summary for query rewriting.
    ConvSummary,
}

/// Resolved system prompts.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from CLI flags, environment variables, or the default path.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Planner prompt.
    pub agent: String,
    /// RAG generation prompt.
    pub rag: String,
    /// Direct chat prompt.
    pub general: String,
    /// Conversation summary prompt.
    pub conv_summary: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument (from config or `--prompt-dir`)
    /// 2. `AGENT_FLOW_PROMPT_DIR` environment variable
    /// 3. `~/.config/agent-flow/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("AGENT_FLOW_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            agent: load_file(AGENT_FILENAME, AGENT_SYSTEM_PROMPT),
            rag: load_file(RAG_FILENAME, RAG_SYSTEM_PROMPT),
            general: load_file(GENERAL_FILENAME, GENERAL_SYSTEM_PROMPT),
            conv_summary: load_file(CONV_SUMMARY_FILENAME, CONV_SUMMARY_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            agent: AGENT_SYSTEM_PROMPT.to_string(),
            rag: RAG_SYSTEM_PROMPT.to_string(),
            general: GENERAL_SYSTEM_PROMPT.to_string(),
            conv_summary: CONV_SUMMARY_PROMPT.to_string(),
        }
    }

    /// Process-level template for `kind`.
    #[must_use]
    pub fn get(&self, kind: PromptType) -> &str {
        match kind {
            PromptType::Agent => &self.agent,
            PromptType::Rag => &self.rag,
            PromptType::General => &self.general,
            PromptType::ConvSummary => &self.conv_summary,
        }
    }

    /// Template for `kind`, preferring the request's override.
    #[must_use]
    pub fn resolve<'a>(&'a self, config: &'a ChatbotConfig, kind: PromptType) -> &'a str {
        config.prompt(kind).unwrap_or_else(|| self.get(kind))
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (AGENT_FILENAME, AGENT_SYSTEM_PROMPT),
            (RAG_FILENAME, RAG_SYSTEM_PROMPT),
            (GENERAL_FILENAME, GENERAL_SYSTEM_PROMPT),
            (CONV_SUMMARY_FILENAME, CONV_SUMMARY_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// Fills `{context}` with the retrieved passages, one `<doc>` each.
#[must_use]
pub fn render_rag_prompt(template: &str, contexts: &[String]) -> String {
    let mut docs = String::new();
    for (i, context) in contexts.iter().enumerate() {
        let _ = writeln!(docs, "<doc index=\"{}\">\n{context}\n</doc>", i + 1);
    }
    template.replace("{context}", docs.trim_end())
}

/// Fills `{history}` and `{question}` in the conversation summary template.
#[must_use]
pub fn render_conv_summary(template: &str, history: &[ChatMessage], question: &str) -> String {
    let mut lines = String::new();
    for message in history {
        let speaker = match message.role {
            Role::User => "USER",
            Role::Assistant => "AI",
            Role::System | Role::Tool => continue,
        };
        let _ = writeln!(lines, "{speaker}: {}", message.content);
    }
    template
        .replace("{history}", lines.trim_end())
        .replace("{question}", question)
}

/// Appends the intention few-shot examples to the planner prompt.
#[must_use]
pub fn build_agent_system_prompt(base: &str, examples: &[IntentExample]) -> String {
    if examples.is_empty() {
        return base.to_string();
    }
    let examples_json = serde_json::to_string_pretty(examples).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{base}\n\n## Examples\n\nSimilar questions and the tool (`intent`) that handled them:\n<examples>\n{examples_json}\n</examples>"
    )
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::agent::chatbot::PromptTemplate;
    use crate::agent::message::{ChatMessage, user_message};

    #[test]
    fn test_prompts_not_empty() {
        let set = PromptSet::defaults();
        for kind in [
            PromptType::Agent,
            PromptType::Rag,
            PromptType::General,
            PromptType::ConvSummary,
        ] {
            assert!(!set.get(kind).is_empty());
        }
        assert!(RAG_SYSTEM_PROMPT.contains("{context}"));
        assert!(CONV_SUMMARY_PROMPT.contains("{history}"));
    }

    #[test]
    fn test_prompt_type_wire_names() {
        let json = serde_json::to_string(&PromptType::ConvSummary).unwrap_or_default();
        assert_eq!(json, "\"CONV_SUMMARY\"");
        let json = serde_json::to_string(&PromptType::Rag).unwrap_or_default();
        assert_eq!(json, "\"RAG\"");
    }

    #[test]
    fn test_request_override_wins() {
        let set = PromptSet::defaults();
        let mut config = ChatbotConfig::default();
        assert_eq!(set.resolve(&config, PromptType::General), GENERAL_SYSTEM_PROMPT);
        config.prompts.push(PromptTemplate {
            kind: PromptType::General,
            text: "Be brief.".to_string(),
        });
        assert_eq!(set.resolve(&config, PromptType::General), "Be brief.");
    }

    #[test]
    fn test_render_rag_prompt() {
        let rendered = render_rag_prompt("Docs:\n{context}", &["alpha".to_string(), "beta".to_string()]);
        assert!(rendered.contains("<doc index=\"1\">\nalpha\n</doc>"));
        assert!(rendered.contains("<doc index=\"2\">\nbeta\n</doc>"));
        assert!(!rendered.contains("{context}"));
    }

    #[test]
    fn test_render_rag_prompt_empty_contexts() {
        assert_eq!(render_rag_prompt("Docs:{context}", &[]), "Docs:");
    }

    #[test]
    fn test_render_conv_summary() {
        let history = vec![
            user_message("What is the weather in Paris?"),
            ChatMessage {
                role: Role::Assistant,
                content: "Sunny.".to_string(),
                tool_calls: Vec::new(),
                tool_call_id: None,
            },
        ];
        let rendered = render_conv_summary(CONV_SUMMARY_PROMPT, &history, "And tomorrow?");
        assert!(rendered.contains("USER: What is the weather in Paris?\nAI: Sunny."));
        assert!(rendered.ends_with("The USER's follow up reply: And tomorrow?"));
    }

    #[test]
    fn test_agent_prompt_with_examples() {
        let examples = vec![IntentExample {
            intent: "get_weather".to_string(),
            score: None,
            answer: None,
            extra: Map::new(),
        }];
        let prompt = build_agent_system_prompt("base", &examples);
        assert!(prompt.starts_with("base"));
        assert!(prompt.contains("get_weather"));
        assert_eq!(build_agent_system_prompt("base", &[]), "base");
    }

    #[test]
    fn test_write_defaults_and_load() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let written = PromptSet::write_defaults(dir.path()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(written.len(), 4);

        std::fs::write(dir.path().join(GENERAL_FILENAME), "custom general")
            .unwrap_or_else(|e| panic!("{e}"));
        let again = PromptSet::write_defaults(dir.path()).unwrap_or_else(|e| panic!("{e}"));
        assert!(again.is_empty());

        let set = PromptSet::load(Some(dir.path()));
        assert_eq!(set.general, "custom general");
        assert_eq!(set.rag, RAG_SYSTEM_PROMPT);
    }
}
