//! Output formatting for CLI commands.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::agent::runner::RunResponse;
use crate::agent::tool::ToolDescriptor;

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
    /// One compact JSON document per line.
    Ndjson,
}

impl OutputFormat {
    /// Parses a format name. Unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "ndjson" | "jsonl" => Self::Ndjson,
            _ => Self::Text,
        }
    }

    /// Serializes `value` in this format's JSON flavour.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        let rendered = match self {
            Self::Ndjson => serde_json::to_string(value),
            Self::Json | Self::Text => serde_json::to_string_pretty(value),
        };
        let mut out = rendered.unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
        out.push('\n');
        out
    }
}

/// Renders a run response as text: the answer, then any extra keys.
#[must_use]
pub fn format_run_response(response: &RunResponse) -> String {
    let mut out = match &response.answer {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    };
    out.push('\n');

    if !response.extra.is_empty() {
        out.push_str("\n---\n");
        for (key, value) in &response.extra {
            let _ = writeln!(out, "{key}: {value}");
        }
    }
    out
}

/// Renders the tool table.
#[must_use]
pub fn format_tools<'a>(tools: impl IntoIterator<Item = &'a ToolDescriptor>) -> String {
    let mut tools: Vec<&ToolDescriptor> = tools.into_iter().collect();
    tools.sort_by(|a, b| a.name().cmp(b.name()));

    let width = tools.iter().map(|t| t.name().len()).max().unwrap_or(0);
    let mut out = String::new();
    for tool in tools {
        let _ = writeln!(
            out,
            "{:<width$}  {:<10}  {}",
            tool.name(),
            tool.mode.to_string(),
            tool.definition.description
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::agent::tool::builtin_tools;

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("ndjson"), OutputFormat::Ndjson);
        assert_eq!(OutputFormat::parse("anything"), OutputFormat::Text);
    }

    #[test]
    fn test_ndjson_is_single_line() {
        let out = OutputFormat::Ndjson.to_json(&json!({"a": [1, 2]}));
        assert_eq!(out, "{\"a\":[1,2]}\n");
    }

    #[test]
    fn test_run_response_text() {
        let mut extra = Map::new();
        extra.insert("figures".to_string(), json!([]));
        let out = format_run_response(&RunResponse {
            answer: json!("Paris is sunny."),
            extra,
        });
        assert!(out.starts_with("Paris is sunny.\n"));
        assert!(out.contains("figures: []"));
    }

    #[test]
    fn test_tools_table_sorted() {
        let tools = builtin_tools();
        let out = format_tools(&tools);
        let first = out.lines().next().unwrap_or_default();
        assert!(first.starts_with("chat"));
        assert!(out.contains("repeatable"));
    }
}
