//! CLI layer for agent-flow.
//!
//! Provides the command-line interface using clap, with commands for
//! running chat requests and inspecting the graph, tools and prompts.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
