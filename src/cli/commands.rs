//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

#![allow(clippy::format_push_string)]

use std::fmt::Write as _;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::agent::chatbot::ChatbotConfig;
use crate::agent::config::AppConfig;
use crate::agent::prompt::PromptSet;
use crate::agent::registry::ToolRegistry;
use crate::agent::runner::{ChatbotApp, RunRequest};
use crate::agent::workflow::build_chat_graph;
use crate::cli::output::{OutputFormat, format_run_response, format_tools};
use crate::cli::parser::{Cli, Commands};
use crate::error::{AgentError, CommandError, Result};
use crate::graph::DEFAULT_RECURSION_LIMIT;

/// Parameters for the run command.
#[derive(Debug, Clone, Default)]
pub struct RunCommandParams<'a> {
    /// Request file, or `-` for stdin.
    pub request: Option<&'a Path>,
    /// Query override.
    pub query: Option<&'a str>,
    /// Collaborator service gateway URL.
    pub services_url: Option<&'a str>,
    /// Planner model override.
    pub planner_model: Option<&'a str>,
    /// Prompt template directory.
    pub prompt_dir: Option<&'a Path>,
    /// Retry override.
    pub max_retries: Option<u32>,
}

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Run {
            request,
            query,
            services_url,
            planner_model,
            prompt_dir,
            max_retries,
        } => {
            let params = RunCommandParams {
                request: request.as_deref(),
                query: query.as_deref(),
                services_url: services_url.as_deref(),
                planner_model: planner_model.as_deref(),
                prompt_dir: prompt_dir.as_deref(),
                max_retries: *max_retries,
            };
            cmd_run(&params, format)
        }
        Commands::Graph => cmd_graph(format),
        Commands::Tools => Ok(cmd_tools(format)),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

fn read_all(mut reader: impl Read) -> Result<String> {
    let mut buf = String::new();
    reader
        .read_to_string(&mut buf)
        .map_err(CommandError::from)?;
    Ok(buf)
}

/// Loads the run request from a file, stdin or the `--query` flag.
fn load_request(params: &RunCommandParams<'_>) -> Result<RunRequest> {
    let mut request = match params.request {
        Some(path) => {
            let raw = if path.as_os_str() == "-" {
                read_all(std::io::stdin().lock())?
            } else {
                std::fs::read_to_string(path).map_err(|e| {
                    CommandError::InvalidArgument(format!("cannot read {}: {e}", path.display()))
                })?
            };
            serde_json::from_str::<RunRequest>(&raw)
                .map_err(|e| CommandError::InvalidArgument(format!("invalid request JSON: {e}")))?
        }
        None => {
            let query = params.query.ok_or_else(|| {
                CommandError::InvalidArgument("either --request or --query is required".to_string())
            })?;
            RunRequest::new(query, ChatbotConfig::default())
        }
    };
    if let Some(query) = params.query {
        request.query = query.to_string();
    }
    Ok(request)
}

fn cmd_run(params: &RunCommandParams<'_>, format: OutputFormat) -> Result<String> {
    let request = load_request(params)?;

    let mut builder = AppConfig::builder();
    if let Some(url) = params.services_url {
        builder = builder.services_url(url);
    }
    if let Some(model) = params.planner_model {
        builder = builder.planner_model(model);
    }
    if let Some(dir) = params.prompt_dir {
        builder = builder.prompt_dir(dir);
    }
    if let Some(n) = params.max_retries {
        builder = builder.max_retries(n);
    }
    let config = builder.from_env().build().map_err(|e| {
        CommandError::ExecutionFailed(format!("configuration error: {e}"))
    })?;

    let app = ChatbotApp::from_config(&config)?;

    // Create tokio runtime as sync/async bridge
    let rt = tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("failed to create async runtime: {e}"))
    })?;
    let response = rt.block_on(app.run(request))?;

    match format {
        OutputFormat::Text => Ok(format_run_response(&response)),
        OutputFormat::Json | OutputFormat::Ndjson => Ok(format.to_json(&response)),
    }
}

fn cmd_graph(format: OutputFormat) -> Result<String> {
    let graph = build_chat_graph(DEFAULT_RECURSION_LIMIT).map_err(AgentError::from)?;
    match format {
        OutputFormat::Text => Ok(graph.describe()),
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "entry": graph.entry(),
                "nodes": graph.node_ids(),
                "recursion_limit": graph.recursion_limit(),
                "mermaid": graph.describe(),
            });
            Ok(format.to_json(&json))
        }
    }
}

fn cmd_tools(format: OutputFormat) -> String {
    let registry = ToolRegistry::with_builtins();
    match format {
        OutputFormat::Text => format_tools(registry.iter()),
        OutputFormat::Json | OutputFormat::Ndjson => {
            let mut tools: Vec<_> = registry.iter().collect();
            tools.sort_by(|a, b| a.name().cmp(b.name()));
            format.to_json(&tools)
        }
    }
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(PathBuf::from)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                return Ok(format!(
                    "All prompt templates already exist in: {}\n",
                    target_dir.display()
                ));
            }
            let mut output = format!(
                "Wrote {} prompt template(s) to: {}\n",
                written.len(),
                target_dir.display()
            );
            for path in &written {
                let _ = writeln!(
                    output,
                    "  {}",
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("unknown")
                );
            }
            output.push_str("\nEdit these files to customize the chatbot prompts.\n");
            Ok(output)
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written.iter().map(|p| p.to_string_lossy().into_owned()).collect::<Vec<_>>(),
                "count": written.len()
            });
            Ok(format.to_json(&json))
        }
    }
}
