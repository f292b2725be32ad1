//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// agent-flow: conversational RAG chatbot agent.
///
/// Runs chat requests through the agent orchestration graph: query
/// rewrite, intention detection, tool-calling planning and answer assembly.
#[derive(Parser, Debug)]
#[command(name = "agent-flow")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "AGENT_FLOW_LOG_JSON")]
    pub log_json: bool,

    /// Output format (text, json, ndjson).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one chat request through the graph.
    ///
    /// The request is a JSON document with `chatbot_config`, `query`,
    /// `custom_message_id` and optional `ws_connection_id`, `use_history`,
    /// `chat_history`, `stream` and `enable_trace`.
    #[command(after_help = r#"Examples:
  agent-flow run --request request.json
  cat request.json | agent-flow run --request -
  agent-flow run --query "What is the return policy?"
  agent-flow --format json run --request request.json | jq .answer
"#)]
    Run {
        /// Request file, or `-` for stdin.
        #[arg(short, long)]
        request: Option<PathBuf>,

        /// Query text. Overrides the request's query, or runs with an
        /// empty chatbot configuration when no request is given.
        #[arg(short, long)]
        query: Option<String>,

        /// Collaborator service gateway URL.
        #[arg(long, env = "AGENT_FLOW_SERVICES_URL")]
        services_url: Option<String>,

        /// Model used by the planner.
        #[arg(long)]
        planner_model: Option<String>,

        /// Directory containing prompt template files.
        #[arg(long)]
        prompt_dir: Option<PathBuf>,

        /// Extra attempts for failed idempotent service calls.
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Print the chat graph as a Mermaid flowchart.
    Graph,

    /// List the built-in tools.
    Tools,

    /// Write default prompt templates to a directory.
    ///
    /// Existing files are not overwritten.
    InitPrompts {
        /// Target directory (default: ~/.config/agent-flow/prompts).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_global_format() {
        let cli = Cli::try_parse_from(["agent-flow", "run", "--request", "-", "--format", "json"])
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(cli.format, "json");
        assert!(matches!(
            cli.command,
            Commands::Run { request: Some(ref p), .. } if p.as_os_str() == "-"
        ));
    }

    #[test]
    fn test_parse_init_prompts() {
        let cli = Cli::try_parse_from(["agent-flow", "init-prompts", "--dir", "/tmp/p"])
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert!(matches!(cli.command, Commands::InitPrompts { dir: Some(_) }));
    }
}
